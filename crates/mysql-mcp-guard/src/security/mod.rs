//! Injection detection and statement filtering

pub mod patterns;
mod query_filter;
mod query_guard;
mod statement;

pub use patterns::{MatchSource, Severity, ThreatKind, ThreatMatch, ThreatReport};
pub use query_filter::{
    DeniedPattern, DenyList, FilterDecision, FilterMode, FilterPolicy, Rejection, TableFilter,
    WritePermissions,
};
pub use query_guard::{ExecuteError, QueryGuard};
pub use statement::{Statement, StatementKind};
