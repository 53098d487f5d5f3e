//! Timeout guard around external query execution

use std::future::Future;
use std::time::Duration;

/// Bounds the duration of one external execution
#[derive(Debug, Clone, Copy)]
pub struct QueryGuard {
    timeout: Duration,
}

impl QueryGuard {
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Get the configured timeout
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute a query future with timeout, keeping the executor's error type
    pub async fn execute_with_error<F, T, E>(&self, query_fn: F) -> Result<T, ExecuteError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        tokio::time::timeout(self.timeout, query_fn)
            .await
            .map_err(|_| ExecuteError::Timeout(self.timeout))?
            .map_err(ExecuteError::Query)
    }
}

/// Error type for [`QueryGuard::execute_with_error`]
#[derive(Debug)]
pub enum ExecuteError<E> {
    Timeout(Duration),
    Query(E),
}

impl<E> ExecuteError<E> {
    /// Check if this is a timeout error
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Check if this is an error from the executor
    #[must_use]
    pub const fn is_query(&self) -> bool {
        matches!(self, Self::Query(_))
    }
}

impl<E: std::fmt::Display> std::fmt::Display for ExecuteError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout(d) => write!(f, "query timeout after {d:?}"),
            Self::Query(e) => write!(f, "{e}"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for ExecuteError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Timeout(_) => None,
            Self::Query(e) => Some(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_guard_timeout_accessor() {
        let guard = QueryGuard::new(Duration::from_secs(42));
        assert_eq!(guard.timeout(), Duration::from_secs(42));
    }

    #[tokio::test]
    async fn test_execute_with_error_timeout() {
        let guard = QueryGuard::new(Duration::from_millis(10));

        let result: Result<i32, ExecuteError<std::io::Error>> = guard
            .execute_with_error(async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(42)
            })
            .await;

        let err = result.unwrap_err();
        assert!(err.is_timeout());
        assert!(!err.is_query());
    }

    #[tokio::test]
    async fn test_execute_with_error_query_error() {
        let guard = QueryGuard::new(Duration::from_secs(5));

        let result: Result<i32, ExecuteError<std::io::Error>> = guard
            .execute_with_error(async { Err::<i32, _>(std::io::Error::other("test error")) })
            .await;

        let err = result.unwrap_err();
        assert!(err.is_query());
        assert!(err.to_string().contains("test error"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_execute_error_display_timeout() {
        let err: ExecuteError<std::io::Error> = ExecuteError::Timeout(Duration::from_secs(30));
        let display = format!("{err}");
        assert!(display.contains("timeout"));
        assert!(std::error::Error::source(&err).is_none());
    }
}
