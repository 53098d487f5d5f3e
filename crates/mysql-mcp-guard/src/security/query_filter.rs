//! Statement filtering policy

use std::collections::HashSet;
use std::str::FromStr;

use regex::Regex;

use super::patterns::{Severity, ThreatReport};
use super::statement::{Statement, StatementKind};
use crate::Error;
use crate::types::RejectReason;

/// Write permissions, checked independently of the filter mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WritePermissions {
    pub insert: bool,
    pub update: bool,
    pub delete: bool,
}

impl WritePermissions {
    #[must_use]
    pub const fn all() -> Self {
        Self {
            insert: true,
            update: true,
            delete: true,
        }
    }

    #[must_use]
    pub const fn none() -> Self {
        Self {
            insert: false,
            update: false,
            delete: false,
        }
    }

    /// `REPLACE` may delete a row before inserting, so it needs both
    #[must_use]
    pub const fn is_allowed(&self, kind: StatementKind) -> bool {
        match kind {
            StatementKind::Insert => self.insert,
            StatementKind::Update => self.update,
            StatementKind::Delete => self.delete,
            StatementKind::Replace => self.insert && self.delete,
            _ => true,
        }
    }
}

impl FromStr for WritePermissions {
    type Err = std::convert::Infallible;

    /// Parse from comma-separated string (e.g., "insert,update")
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s_upper = s.to_uppercase();
        Ok(Self {
            insert: s_upper.contains("INSERT"),
            update: s_upper.contains("UPDATE"),
            delete: s_upper.contains("DELETE"),
        })
    }
}

/// Case-insensitive regex deny entry
#[derive(Debug, Clone)]
pub struct DeniedPattern {
    source: String,
    regex: Regex,
}

impl DeniedPattern {
    pub fn new(pattern: &str) -> Result<Self, Error> {
        let regex = Regex::new(&format!("(?i){pattern}"))
            .map_err(|e| Error::Config(format!("Invalid denied pattern '{pattern}': {e}")))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn is_match(&self, sql: &str) -> bool {
        self.regex.is_match(sql)
    }
}

/// Statement kinds and regex patterns to deny
#[derive(Debug, Clone, Default)]
pub struct DenyList {
    kinds: HashSet<StatementKind>,
    patterns: Vec<DeniedPattern>,
}

impl DenyList {
    #[must_use]
    pub const fn new(kinds: HashSet<StatementKind>, patterns: Vec<DeniedPattern>) -> Self {
        Self { kinds, patterns }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty() && self.patterns.is_empty()
    }

    #[must_use]
    pub const fn kinds(&self) -> &HashSet<StatementKind> {
        &self.kinds
    }

    #[must_use]
    pub fn patterns(&self) -> &[DeniedPattern] {
        &self.patterns
    }

    /// Id of the first matching entry: the statement type, else the pattern
    fn matched(&self, statement: &Statement, sql: &str) -> Option<String> {
        if self.kinds.contains(&statement.kind()) {
            return Some(statement.kind().as_str().to_string());
        }
        self.patterns
            .iter()
            .find(|p| p.is_match(sql))
            .map(|p| p.source.clone())
    }
}

/// Filter mode configuration
#[derive(Debug, Clone)]
pub enum FilterMode {
    /// Deny listed statement types and patterns, allow everything else
    Blacklist(DenyList),
    /// Allow only listed statement types
    Whitelist(HashSet<StatementKind>),
    /// Whitelist narrowed by a deny list
    Combined {
        allowed: HashSet<StatementKind>,
        denied: DenyList,
    },
}

impl Default for FilterMode {
    fn default() -> Self {
        Self::Blacklist(DenyList::default())
    }
}

impl FilterMode {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Blacklist(_) => "blacklist",
            Self::Whitelist(_) => "whitelist",
            Self::Combined { .. } => "combined",
        }
    }

    /// Create a filter mode from configuration strings
    pub fn from_config(
        mode: &str,
        allowed_statements: &[String],
        denied_statements: &[String],
        denied_patterns: &[String],
    ) -> Result<Self, Error> {
        let allowed = parse_kinds(allowed_statements)?;
        let denied = DenyList::new(
            parse_kinds(denied_statements)?,
            denied_patterns
                .iter()
                .filter(|p| !p.trim().is_empty())
                .map(|p| DeniedPattern::new(p))
                .collect::<Result<_, _>>()?,
        );

        match mode.trim().to_lowercase().as_str() {
            "blacklist" | "deny" | "" => Ok(Self::Blacklist(denied)),
            "whitelist" | "allow" => {
                if allowed.is_empty() {
                    return Err(Error::Config(
                        "Whitelist mode requires at least one allowed statement type".into(),
                    ));
                }
                Ok(Self::Whitelist(allowed))
            }
            "combined" | "both" => {
                if allowed.is_empty() {
                    return Err(Error::Config(
                        "Combined mode requires at least one allowed statement type".into(),
                    ));
                }
                Ok(Self::Combined { allowed, denied })
            }
            _ => Err(Error::Config(format!(
                "Invalid filter mode: {mode}. Use 'blacklist', 'whitelist', or 'combined'"
            ))),
        }
    }

    fn check(&self, statement: &Statement, sql: &str) -> Option<Rejection> {
        let not_whitelisted = |allowed: &HashSet<StatementKind>| {
            (!allowed.contains(&statement.kind())).then(|| Rejection {
                reason: RejectReason::NotWhitelisted,
                rule_id: Some(statement.kind().as_str().to_string()),
                message: format!("{} statements are not in the allowed list", statement.kind()),
            })
        };
        let blacklisted = |denied: &DenyList| {
            denied.matched(statement, sql).map(|rule| Rejection {
                reason: RejectReason::BlacklistedPattern,
                message: format!("Query matches denied rule '{rule}'"),
                rule_id: Some(rule),
            })
        };

        match self {
            Self::Blacklist(denied) => blacklisted(denied),
            Self::Whitelist(allowed) => not_whitelisted(allowed),
            Self::Combined { allowed, denied } => {
                not_whitelisted(allowed).or_else(|| blacklisted(denied))
            }
        }
    }
}

/// Table-level allow and deny lists.
///
/// Names are compared lowercased and without a database qualifier, so
/// `app.users` in a list matches `users` in every database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableFilter {
    allowed: HashSet<String>,
    denied: HashSet<String>,
}

impl TableFilter {
    /// An empty `allowed` list allows every table not denied
    #[must_use]
    pub fn new(allowed: &[String], denied: &[String]) -> Self {
        Self {
            allowed: normalize_tables(allowed),
            denied: normalize_tables(denied),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty() && self.denied.is_empty()
    }

    #[must_use]
    pub const fn allowed(&self) -> &HashSet<String> {
        &self.allowed
    }

    #[must_use]
    pub const fn denied(&self) -> &HashSet<String> {
        &self.denied
    }

    /// A statement whose table references could not all be resolved is
    /// rejected whenever either list is set.
    fn check(&self, statement: &Statement) -> Option<Rejection> {
        if self.is_empty() {
            return None;
        }

        if let Some(table) = statement.tables().iter().find(|t| self.denied.contains(*t)) {
            return Some(Rejection {
                reason: RejectReason::BlacklistedPattern,
                rule_id: Some(format!("table:{table}")),
                message: format!("Access to table '{table}' is denied"),
            });
        }

        let reason = if self.allowed.is_empty() {
            RejectReason::BlacklistedPattern
        } else {
            RejectReason::NotWhitelisted
        };
        if !statement.tables_complete() {
            return Some(Rejection {
                reason,
                rule_id: Some("table:unresolved".into()),
                message: "Referenced tables could not be determined".into(),
            });
        }

        if self.allowed.is_empty() {
            return None;
        }
        statement
            .tables()
            .iter()
            .find(|t| !self.allowed.contains(*t))
            .map(|table| Rejection {
                reason: RejectReason::NotWhitelisted,
                rule_id: Some(format!("table:{table}")),
                message: format!("Table '{table}' is not in the allowed list"),
            })
    }
}

fn normalize_tables(names: &[String]) -> HashSet<String> {
    names
        .iter()
        .map(|name| {
            let name = name.trim();
            let last = name.rsplit('.').next().unwrap_or(name);
            last.trim_matches('`').to_lowercase()
        })
        .filter(|name| !name.is_empty())
        .collect()
}

fn parse_kinds(names: &[String]) -> Result<HashSet<StatementKind>, Error> {
    names
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}

/// Rejection produced by the filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub reason: RejectReason,
    pub rule_id: Option<String>,
    pub message: String,
}

/// Filter verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDecision {
    Admit,
    Reject(Rejection),
}

impl FilterDecision {
    #[must_use]
    pub const fn is_admitted(&self) -> bool {
        matches!(self, Self::Admit)
    }

    #[must_use]
    pub const fn reason(&self) -> Option<RejectReason> {
        match self {
            Self::Admit => None,
            Self::Reject(r) => Some(r.reason),
        }
    }
}

/// Immutable filtering policy applied to every request of a run
#[derive(Debug, Clone, Default)]
pub struct FilterPolicy {
    mode: FilterMode,
    tables: TableFilter,
    writes: WritePermissions,
}

impl FilterPolicy {
    #[must_use]
    pub fn new(mode: FilterMode, writes: WritePermissions) -> Self {
        Self {
            mode,
            tables: TableFilter::default(),
            writes,
        }
    }

    #[must_use]
    pub fn with_tables(mut self, tables: TableFilter) -> Self {
        self.tables = tables;
        self
    }

    #[must_use]
    pub const fn mode(&self) -> &FilterMode {
        &self.mode
    }

    #[must_use]
    pub const fn tables(&self) -> &TableFilter {
        &self.tables
    }

    #[must_use]
    pub const fn writes(&self) -> WritePermissions {
        self.writes
    }

    /// Evaluate one statement.
    ///
    /// Order: invalid statement, stacked statements, high-severity injection,
    /// DDL/administrative statements, filter mode, table lists, write
    /// permissions.
    #[must_use]
    pub fn evaluate(&self, statement: &Statement, sql: &str, threats: &ThreatReport) -> FilterDecision {
        self.check(statement, sql, threats)
            .map_or(FilterDecision::Admit, FilterDecision::Reject)
    }

    fn check(&self, statement: &Statement, sql: &str, threats: &ThreatReport) -> Option<Rejection> {
        if statement.is_empty() {
            return Some(Rejection {
                reason: RejectReason::InvalidStatement,
                rule_id: None,
                message: "Empty query".into(),
            });
        }
        if statement.is_unterminated() {
            return Some(Rejection {
                reason: RejectReason::InvalidStatement,
                rule_id: None,
                message: "Unterminated string literal, identifier or comment".into(),
            });
        }

        if statement.is_stacked() {
            return Some(Rejection {
                reason: RejectReason::MultiStatement,
                rule_id: None,
                message: "Multiple statements detected in query".into(),
            });
        }

        if let Some(threat) = threats.first_at_least(Severity::High) {
            return Some(Rejection {
                reason: RejectReason::InjectionDetected,
                rule_id: Some(threat.rule_id.to_string()),
                message: format!("Potential SQL injection detected in {}", threat.source),
            });
        }

        let kind = statement.kind();
        if kind.is_ddl() || kind.is_admin() {
            return Some(Rejection {
                reason: RejectReason::DdlForbidden,
                rule_id: Some(kind.as_str().to_string()),
                message: if kind.is_ddl() {
                    "DDL operations are not allowed".into()
                } else {
                    format!("{kind} statements are not allowed")
                },
            });
        }

        if let Some(rejection) = self.mode.check(statement, sql) {
            return Some(rejection);
        }

        if let Some(rejection) = self.tables.check(statement) {
            return Some(rejection);
        }

        if kind.is_write() && !self.writes.is_allowed(kind) {
            return Some(Rejection {
                reason: RejectReason::WriteDisabled,
                rule_id: Some(kind.as_str().to_string()),
                message: format!("{kind} operations are not allowed"),
            });
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::patterns;

    fn eval(policy: &FilterPolicy, sql: &str) -> FilterDecision {
        let statement = Statement::analyze(sql);
        let threats = patterns::scan_statement(&statement, &[]);
        policy.evaluate(&statement, sql, &threats)
    }

    fn kinds(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    fn blacklist(statements: &[&str], patterns: &[&str]) -> FilterMode {
        FilterMode::from_config("blacklist", &[], &kinds(statements), &kinds(patterns)).unwrap()
    }

    #[test]
    fn test_default_policy_allows_reads_and_blocks_writes() {
        let policy = FilterPolicy::default();
        assert!(eval(&policy, "SELECT * FROM users").is_admitted());
        assert!(eval(&policy, "SHOW TABLES").is_admitted());
        assert_eq!(
            eval(&policy, "INSERT INTO users (name) VALUES ('a')").reason(),
            Some(RejectReason::WriteDisabled)
        );
        assert_eq!(
            eval(&policy, "UPDATE users SET a = 1").reason(),
            Some(RejectReason::WriteDisabled)
        );
        assert_eq!(
            eval(&policy, "DELETE FROM users").reason(),
            Some(RejectReason::WriteDisabled)
        );
    }

    #[test]
    fn test_write_permissions_individually() {
        let policy = FilterPolicy::new(
            FilterMode::default(),
            WritePermissions {
                insert: true,
                update: false,
                delete: false,
            },
        );
        assert!(eval(&policy, "INSERT INTO t VALUES (1)").is_admitted());
        assert_eq!(
            eval(&policy, "UPDATE t SET a = 1").reason(),
            Some(RejectReason::WriteDisabled)
        );
        assert_eq!(
            eval(&policy, "REPLACE INTO t VALUES (1)").reason(),
            Some(RejectReason::WriteDisabled)
        );

        let all = FilterPolicy::new(FilterMode::default(), WritePermissions::all());
        assert!(eval(&all, "REPLACE INTO t VALUES (1)").is_admitted());
    }

    #[test]
    fn test_ddl_always_forbidden() {
        let modes = [
            FilterMode::default(),
            FilterMode::Whitelist([StatementKind::Drop].into_iter().collect()),
            FilterMode::Combined {
                allowed: [StatementKind::Create].into_iter().collect(),
                denied: DenyList::default(),
            },
        ];

        for mode in modes {
            let policy = FilterPolicy::new(mode, WritePermissions::all());
            for sql in [
                "DROP TABLE users",
                "CREATE TABLE t (id INT)",
                "TRUNCATE TABLE t",
                "ALTER TABLE t ADD c INT",
                "GRANT ALL ON *.* TO 'x'@'%'",
            ] {
                assert_eq!(eval(&policy, sql).reason(), Some(RejectReason::DdlForbidden), "{sql}");
            }
        }
    }

    #[test]
    fn test_ddl_message() {
        let FilterDecision::Reject(rejection) = eval(&FilterPolicy::default(), "DROP TABLE t") else {
            panic!("expected rejection");
        };
        assert_eq!(rejection.message, "DDL operations are not allowed");
        assert_eq!(rejection.rule_id.as_deref(), Some("DROP"));
    }

    #[test]
    fn test_multi_statement_in_every_mode() {
        let modes = [
            blacklist(&["DROP"], &[]),
            FilterMode::Whitelist([StatementKind::Select].into_iter().collect()),
            FilterMode::Combined {
                allowed: [StatementKind::Select].into_iter().collect(),
                denied: DenyList::default(),
            },
        ];

        for mode in modes {
            let policy = FilterPolicy::new(mode, WritePermissions::all());
            for sql in [
                "SELECT * FROM users; DROP TABLE users;",
                "SELECT 1; SELECT 2",
                "SELECT 1;DELETE FROM t",
                "INSERT INTO t VALUES (1); UPDATE t SET a = 2",
            ] {
                let decision = eval(&policy, sql);
                assert_eq!(decision.reason(), Some(RejectReason::MultiStatement), "{sql}");
            }
        }
    }

    #[test]
    fn test_multi_statement_message() {
        let FilterDecision::Reject(rejection) =
            eval(&FilterPolicy::default(), "SELECT 1; DROP TABLE t")
        else {
            panic!("expected rejection");
        };
        assert_eq!(rejection.message, "Multiple statements detected in query");
    }

    #[test]
    fn test_whitelist_select_only_rejects_insert_even_if_permitted() {
        let mode = FilterMode::from_config("whitelist", &kinds(&["SELECT"]), &[], &[]).unwrap();
        let policy = FilterPolicy::new(mode, WritePermissions::all());

        assert!(eval(&policy, "SELECT * FROM t").is_admitted());
        assert_eq!(
            eval(&policy, "INSERT INTO t VALUES (1)").reason(),
            Some(RejectReason::NotWhitelisted)
        );
        assert_eq!(
            eval(&policy, "SHOW TABLES").reason(),
            Some(RejectReason::NotWhitelisted)
        );
    }

    #[test]
    fn test_blacklist_statement_kind() {
        let policy = FilterPolicy::new(blacklist(&["DELETE"], &[]), WritePermissions::all());
        let decision = eval(&policy, "DELETE FROM sessions");
        assert_eq!(decision.reason(), Some(RejectReason::BlacklistedPattern));
        assert!(eval(&policy, "UPDATE sessions SET a = 1").is_admitted());
    }

    #[test]
    fn test_blacklist_patterns() {
        let policy = FilterPolicy::new(
            blacklist(&[], &[".*information_schema.*", r"\bmysql\.user\b"]),
            WritePermissions::none(),
        );

        let FilterDecision::Reject(rejection) =
            eval(&policy, "SELECT * FROM INFORMATION_SCHEMA.TABLES")
        else {
            panic!("expected rejection");
        };
        assert_eq!(rejection.reason, RejectReason::BlacklistedPattern);
        assert_eq!(rejection.rule_id.as_deref(), Some(".*information_schema.*"));

        assert_eq!(
            eval(&policy, "SELECT user FROM mysql.user").reason(),
            Some(RejectReason::BlacklistedPattern)
        );
        assert!(eval(&policy, "SELECT * FROM orders").is_admitted());
    }

    #[test]
    fn test_combined_mode() {
        let mode = FilterMode::from_config(
            "combined",
            &kinds(&["SELECT", "SHOW"]),
            &[],
            &kinds(&["salary"]),
        )
        .unwrap();
        let policy = FilterPolicy::new(mode, WritePermissions::none());

        assert!(eval(&policy, "SELECT name FROM staff").is_admitted());
        assert_eq!(
            eval(&policy, "SELECT salary FROM staff").reason(),
            Some(RejectReason::BlacklistedPattern)
        );
        assert_eq!(
            eval(&policy, "DESCRIBE staff").reason(),
            Some(RejectReason::NotWhitelisted)
        );
    }

    #[test]
    fn test_injection_outranks_mode_and_writes() {
        let mode = FilterMode::from_config("whitelist", &kinds(&["SELECT"]), &[], &[]).unwrap();
        let policy = FilterPolicy::new(mode, WritePermissions::none());

        assert_eq!(
            eval(&policy, "SELECT * FROM users WHERE name = '' OR '1'='1'").reason(),
            Some(RejectReason::InjectionDetected)
        );
        assert_eq!(
            eval(&policy, "INSERT INTO t SELECT SLEEP(5)").reason(),
            Some(RejectReason::InjectionDetected)
        );
    }

    #[test]
    fn test_injection_outranks_ddl() {
        let decision = eval(&FilterPolicy::default(), "DROP TABLE t /*! x */");
        assert_eq!(decision.reason(), Some(RejectReason::InjectionDetected));
    }

    #[test]
    fn test_medium_threats_do_not_reject() {
        let policy = FilterPolicy::default();
        assert!(eval(&policy, "SELECT a FROM t UNION SELECT b FROM u").is_admitted());
        assert!(eval(&policy, "SELECT * FROM t -- list everything").is_admitted());
    }

    #[test]
    fn test_param_threat_rejects() {
        let statement = Statement::analyze("SELECT * FROM users WHERE name = ?");
        let threats = patterns::scan_statement(&statement, &[serde_json::json!("admin'--")]);
        let decision = FilterPolicy::default().evaluate(&statement, statement.masked(), &threats);

        let FilterDecision::Reject(rejection) = decision else {
            panic!("expected rejection");
        };
        assert_eq!(rejection.reason, RejectReason::InjectionDetected);
        assert_eq!(rejection.rule_id.as_deref(), Some("comment-quote-breakout"));
        assert!(rejection.message.contains("param[0]"));
    }

    #[test]
    fn test_invalid_statements() {
        let policy = FilterPolicy::default();
        assert_eq!(eval(&policy, "").reason(), Some(RejectReason::InvalidStatement));
        assert_eq!(eval(&policy, "  ; ").reason(), Some(RejectReason::InvalidStatement));
        assert_eq!(
            eval(&policy, "SELECT 'unterminated").reason(),
            Some(RejectReason::InvalidStatement)
        );
    }

    #[test]
    fn test_other_statements_follow_mode() {
        assert!(eval(&FilterPolicy::default(), "SET @a = 1").is_admitted());

        let mode = FilterMode::from_config("whitelist", &kinds(&["SELECT"]), &[], &[]).unwrap();
        let policy = FilterPolicy::new(mode, WritePermissions::none());
        assert_eq!(
            eval(&policy, "CALL cleanup()").reason(),
            Some(RejectReason::NotWhitelisted)
        );
    }

    #[test]
    fn test_from_config_whitelist_requires_statements() {
        let result = FilterMode::from_config("whitelist", &[], &[], &[]);
        assert!(result.unwrap_err().is_config());
    }

    #[test]
    fn test_from_config_invalid_mode() {
        assert!(FilterMode::from_config("strict", &[], &[], &[]).is_err());
    }

    #[test]
    fn test_from_config_invalid_pattern() {
        let result = FilterMode::from_config("blacklist", &[], &[], &kinds(&["(unclosed"]));
        assert!(result.unwrap_err().to_string().contains("(unclosed"));
    }

    #[test]
    fn test_from_config_invalid_statement_type() {
        let result = FilterMode::from_config("whitelist", &kinds(&["SELECT", "FROB"]), &[], &[]);
        assert!(result.is_err());
    }

    #[test]
    fn test_from_config_blank_mode_is_blacklist() {
        let mode = FilterMode::from_config("", &[], &[], &[]).unwrap();
        assert_eq!(mode.name(), "blacklist");
    }

    fn tables(allowed: &[&str], denied: &[&str]) -> FilterPolicy {
        FilterPolicy::new(FilterMode::default(), WritePermissions::all())
            .with_tables(TableFilter::new(&kinds(allowed), &kinds(denied)))
    }

    #[test]
    fn test_table_allow_list() {
        let policy = tables(&["users", "orders"], &[]);

        assert!(eval(&policy, "SELECT * FROM users").is_admitted());
        assert!(
            eval(&policy, "SELECT * FROM users JOIN orders ON users.id = orders.user_id")
                .is_admitted()
        );
        assert!(
            eval(&policy, "SELECT * FROM users WHERE id IN (SELECT user_id FROM orders)")
                .is_admitted()
        );

        let FilterDecision::Reject(rejection) = eval(&policy, "SELECT * FROM passwords") else {
            panic!("expected rejection");
        };
        assert_eq!(rejection.reason, RejectReason::NotWhitelisted);
        assert_eq!(rejection.rule_id.as_deref(), Some("table:passwords"));

        assert_eq!(
            eval(&policy, "SELECT * FROM users JOIN passwords ON users.id = passwords.user_id")
                .reason(),
            Some(RejectReason::NotWhitelisted)
        );
        assert_eq!(
            eval(&policy, "INSERT INTO audit VALUES (1)").reason(),
            Some(RejectReason::NotWhitelisted)
        );
    }

    #[test]
    fn test_table_deny_list() {
        let policy = tables(&[], &["audit_logs", "PASSWORDS"]);

        assert!(eval(&policy, "SELECT * FROM users").is_admitted());

        let FilterDecision::Reject(rejection) = eval(&policy, "SELECT * FROM audit_logs") else {
            panic!("expected rejection");
        };
        assert_eq!(rejection.reason, RejectReason::BlacklistedPattern);
        assert_eq!(rejection.rule_id.as_deref(), Some("table:audit_logs"));

        assert_eq!(
            eval(&policy, "SELECT u.* FROM users u WHERE NOT EXISTS (SELECT 1 FROM audit_logs)")
                .reason(),
            Some(RejectReason::BlacklistedPattern)
        );
        assert_eq!(
            eval(&policy, "SELECT * FROM app.`Passwords`").reason(),
            Some(RejectReason::BlacklistedPattern)
        );
    }

    #[test]
    fn test_table_lists_reject_unresolved_references() {
        let FilterDecision::Reject(rejection) =
            eval(&tables(&["users"], &[]), "SELECT * FROM users JOIN ? ON 1 = 1")
        else {
            panic!("expected rejection");
        };
        assert_eq!(rejection.reason, RejectReason::NotWhitelisted);
        assert_eq!(rejection.rule_id.as_deref(), Some("table:unresolved"));

        assert!(eval(&FilterPolicy::default(), "SELECT * FROM users JOIN ? ON 1 = 1").is_admitted());
    }

    #[test]
    fn test_table_filter_normalizes_names() {
        let filter = TableFilter::new(&kinds(&[" App.Users ", "`orders`", ""]), &[]);
        assert_eq!(filter.allowed().len(), 2);
        assert!(filter.allowed().contains("users"));
        assert!(filter.allowed().contains("orders"));
        assert!(filter.denied().is_empty());
        assert!(TableFilter::default().is_empty());
    }

    #[test]
    fn test_write_permissions_from_str() {
        let perms: WritePermissions = "insert, delete".parse().unwrap();
        assert!(perms.insert);
        assert!(!perms.update);
        assert!(perms.delete);
    }
}
