//! Query result cache keys

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde_json::Value;

use crate::security::Statement;

/// Cache key over (normalized SQL, ordered parameters, database).
///
/// The 64-bit fingerprint is only the bucket hash. Equality compares the
/// full canonical text so a collision never serves a foreign result.
#[derive(Debug, Clone)]
pub struct CacheKey {
    fingerprint: u64,
    database: Option<String>,
    canonical: String,
    sql_len: usize,
    tables: Vec<String>,
}

impl CacheKey {
    /// Create key for query result cache.
    ///
    /// `sql` must already be normalized. `tables` are kept for targeted
    /// invalidation and do not take part in equality.
    #[must_use]
    pub fn query_result(
        sql: &str,
        params: &[Value],
        database: Option<&str>,
        tables: &[String],
    ) -> Self {
        let mut canonical = String::with_capacity(sql.len() + 16);
        canonical.push_str(sql);
        canonical.push('\0');
        canonical.push_str(&Value::Array(params.to_vec()).to_string());

        let mut hasher = DefaultHasher::new();
        database.hash(&mut hasher);
        canonical.hash(&mut hasher);

        Self {
            fingerprint: hasher.finish(),
            database: database.map(ToString::to_string),
            canonical,
            sql_len: sql.len(),
            tables: tables.to_vec(),
        }
    }

    /// Key for an analyzed statement.
    ///
    /// A statement with unresolved table references is keyed with no tables,
    /// so every table-scoped invalidation removes it.
    #[must_use]
    pub fn for_statement(statement: &Statement, params: &[Value], database: Option<&str>) -> Self {
        let tables = if statement.tables_complete() {
            statement.tables()
        } else {
            &[]
        };
        Self::query_result(statement.normalized(), params, database, tables)
    }

    #[must_use]
    pub const fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    #[must_use]
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// Tables referenced by the cached query, lowercased
    #[must_use]
    pub fn tables(&self) -> &[String] {
        &self.tables
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint
            && self.database == other.database
            && self.canonical == other.canonical
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.fingerprint);
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "query:{:016x}:{}", self.fingerprint, self.sql_len)
    }
}
