//! Request, decision and tool payload types

use std::fmt;
use std::time::{Duration, Instant};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::audit::AuditRecord;
use crate::error::Error;
use crate::security::ThreatReport;

/// Parameters of the `mysql_query` tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QueryParams {
    /// SQL statement to execute
    #[schemars(description = "SQL query to execute. Use ? placeholders for parameters")]
    pub query: String,
    /// Positional parameters bound to `?` placeholders
    #[schemars(description = "Positional parameters bound to ? placeholders")]
    #[serde(default)]
    pub params: Option<Vec<Value>>,
    /// Target database (connection default when omitted)
    #[schemars(description = "Target database. Uses the connection default when omitted")]
    #[serde(default)]
    pub database: Option<String>,
}

impl QueryParams {
    /// Build a pipeline request for the given client
    #[must_use]
    pub fn into_request(self, client_id: impl Into<String>) -> Request {
        Request {
            client_id: client_id.into(),
            sql: self.query,
            params: self.params.unwrap_or_default(),
            database: self.database,
            received_at: Instant::now(),
        }
    }
}

/// SQL query execution result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QueryResult {
    /// Column names in result set
    #[schemars(description = "Column names in result set")]
    pub columns: Vec<String>,
    /// Result rows as JSON arrays
    #[schemars(description = "Result rows as JSON arrays")]
    pub rows: Vec<Vec<Value>>,
    /// Number of rows returned, or affected by a write
    #[schemars(description = "Number of rows returned or affected")]
    pub row_count: usize,
}

impl QueryResult {
    #[must_use]
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let row_count = rows.len();
        Self {
            columns,
            rows,
            row_count,
        }
    }

    /// Result of a write that returns no rows
    #[must_use]
    pub const fn affected(row_count: usize) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            row_count,
        }
    }
}

/// One incoming query request
#[derive(Debug, Clone)]
pub struct Request {
    pub client_id: String,
    pub sql: String,
    pub params: Vec<Value>,
    /// `None` targets the connection default database
    pub database: Option<String>,
    pub received_at: Instant,
}

impl Request {
    #[must_use]
    pub fn new(client_id: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            sql: sql.into(),
            params: Vec::new(),
            database: None,
            received_at: Instant::now(),
        }
    }

    #[must_use]
    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }

    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    #[must_use]
    pub const fn received_at(mut self, instant: Instant) -> Self {
        self.received_at = instant;
        self
    }
}

/// Pipeline verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Admit,
    Reject,
    ServeCached,
}

impl Verdict {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Admit => "admit",
            Self::Reject => "reject",
            Self::ServeCached => "serve_cached",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-readable rejection reason
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    BlacklistedPattern,
    NotWhitelisted,
    WriteDisabled,
    DdlForbidden,
    MultiStatement,
    InjectionDetected,
    InvalidStatement,
    RateLimited,
}

impl RejectReason {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BlacklistedPattern => "blacklisted_pattern",
            Self::NotWhitelisted => "not_whitelisted",
            Self::WriteDisabled => "write_disabled",
            Self::DdlForbidden => "ddl_forbidden",
            Self::MultiStatement => "multi_statement",
            Self::InjectionDetected => "injection_detected",
            Self::InvalidStatement => "invalid_statement",
            Self::RateLimited => "rate_limited",
        }
    }

    /// Pattern or policy violation, as opposed to throttling or malformed input
    #[must_use]
    pub const fn is_security(&self) -> bool {
        !matches!(self, Self::RateLimited | Self::InvalidStatement)
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one pipeline run
#[derive(Debug, Clone)]
pub struct Decision {
    pub verdict: Verdict,
    pub reason: Option<RejectReason>,
    /// Rule that produced the rejection (pattern, statement type or signature id)
    pub rule_id: Option<String>,
    pub message: Option<String>,
    /// Only set for [`RejectReason::RateLimited`]
    pub retry_after: Option<Duration>,
    pub payload: Option<QueryResult>,
    pub threats: ThreatReport,
    pub audit: AuditRecord,
}

impl Decision {
    #[must_use]
    pub const fn is_admitted(&self) -> bool {
        matches!(self.verdict, Verdict::Admit | Verdict::ServeCached)
    }

    #[must_use]
    pub const fn is_rejected(&self) -> bool {
        matches!(self.verdict, Verdict::Reject)
    }

    #[must_use]
    pub const fn is_cached(&self) -> bool {
        matches!(self.verdict, Verdict::ServeCached)
    }

    /// Convert into the payload, or the error the request handler should return
    pub fn into_result(self) -> crate::Result<QueryResult> {
        match (self.verdict, self.reason) {
            (Verdict::Reject, Some(RejectReason::RateLimited)) => Err(Error::RateLimitExceeded {
                retry_after: self.retry_after,
            }),
            (Verdict::Reject, Some(RejectReason::InvalidStatement)) => Err(
                Error::InvalidStatement(self.message.unwrap_or_else(|| "invalid statement".into())),
            ),
            (Verdict::Reject, reason) => Err(Error::SecurityRejection {
                reason: reason.unwrap_or(RejectReason::InjectionDetected),
                message: self.message.unwrap_or_default(),
            }),
            (Verdict::Admit | Verdict::ServeCached, _) => Ok(self
                .payload
                .unwrap_or_else(|| QueryResult::affected(0))),
        }
    }
}
