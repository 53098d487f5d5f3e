//! Injection signature matching
//!
//! Scans the masked query text (literal contents emptied, quoted identifiers
//! reduced to word characters, comments kept) and every string parameter
//! against a fixed rule table. Matching is case-insensitive and runs over
//! whitespace-normalized text in which control characters count as whitespace.
//!
//! Bound parameters are data and should never carry SQL syntax, so every
//! match found in a parameter is reported with [`Severity::High`].

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::statement::Statement;

/// Threat severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signature family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatKind {
    StackedQuery,
    CommentTampering,
    Tautology,
    UnionExfiltration,
    TimeBasedBlind,
    FileAccess,
}

/// Where a signature was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "index")]
pub enum MatchSource {
    Query,
    Param(usize),
}

impl fmt::Display for MatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query => f.write_str("query"),
            Self::Param(i) => write!(f, "param[{i}]"),
        }
    }
}

/// One matched signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreatMatch {
    pub rule_id: &'static str,
    pub kind: ThreatKind,
    pub severity: Severity,
    pub source: MatchSource,
}

/// All signatures matched by one request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ThreatReport {
    matches: Vec<ThreatMatch>,
}

impl ThreatReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    #[must_use]
    pub fn matches(&self) -> &[ThreatMatch] {
        &self.matches
    }

    #[must_use]
    pub fn highest_severity(&self) -> Option<Severity> {
        self.matches.iter().map(|m| m.severity).max()
    }

    /// First match at or above the given severity
    #[must_use]
    pub fn first_at_least(&self, severity: Severity) -> Option<&ThreatMatch> {
        self.matches.iter().find(|m| m.severity >= severity)
    }

    #[must_use]
    pub fn rule_ids(&self) -> Vec<&'static str> {
        self.matches.iter().map(|m| m.rule_id).collect()
    }

    fn push(&mut self, found: ThreatMatch) {
        if !self
            .matches
            .iter()
            .any(|m| m.rule_id == found.rule_id && m.source == found.source)
        {
            self.matches.push(found);
        }
    }
}

/// Which inputs a rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Query,
    Params,
    Both,
}

#[derive(Debug)]
struct Rule {
    id: &'static str,
    kind: ThreatKind,
    severity: Severity,
    scope: Scope,
    regex: Regex,
}

const RULE_TABLE: &[(&str, ThreatKind, Severity, Scope, &str)] = &[
    (
        "stacked-query",
        ThreatKind::StackedQuery,
        Severity::High,
        Scope::Both,
        r";\s*(select|insert|update|delete|replace|drop|create|alter|truncate|rename|grant|revoke|call|exec|execute|set|show|use|load|handler|lock|unlock|shutdown|declare)\b",
    ),
    (
        "comment-line-dash",
        ThreatKind::CommentTampering,
        Severity::Medium,
        Scope::Query,
        r"--(\s|$)",
    ),
    (
        "comment-line-hash",
        ThreatKind::CommentTampering,
        Severity::Medium,
        Scope::Query,
        r"#",
    ),
    (
        "comment-inline",
        ThreatKind::CommentTampering,
        Severity::Medium,
        Scope::Query,
        r"/\*[^!]",
    ),
    (
        "comment-executable",
        ThreatKind::CommentTampering,
        Severity::High,
        Scope::Both,
        r"/\*!",
    ),
    (
        "comment-quote-breakout",
        ThreatKind::CommentTampering,
        Severity::High,
        Scope::Params,
        r#"['"`]\s*\)*\s*(--|#|/\*)"#,
    ),
    (
        "tautology-or-literal",
        ThreatKind::Tautology,
        Severity::High,
        Scope::Both,
        r#"\bor\s+('[^']*'|"[^"]*"|\d+)\s*(=|<=>|like)\s*('[^']*'?|"[^"]*"?|\d+)"#,
    ),
    (
        "tautology-or-true",
        ThreatKind::Tautology,
        Severity::Medium,
        Scope::Both,
        r"\bor\s+(true|not\s+false)\b",
    ),
    (
        "tautology-and-numeric",
        ThreatKind::Tautology,
        Severity::Medium,
        Scope::Both,
        r"\band\s+(\d+)\s*=\s*(\d+)\b",
    ),
    (
        "union-select",
        ThreatKind::UnionExfiltration,
        Severity::Medium,
        Scope::Both,
        r"\bunion(\s+|\s*/\*.*?\*/\s*)+((all|distinct)\s+)?select\b",
    ),
    (
        "sleep-function",
        ThreatKind::TimeBasedBlind,
        Severity::High,
        Scope::Both,
        r"\b(sleep|pg_sleep)\s*\(",
    ),
    (
        "benchmark-function",
        ThreatKind::TimeBasedBlind,
        Severity::High,
        Scope::Both,
        r"\bbenchmark\s*\(",
    ),
    (
        "waitfor-delay",
        ThreatKind::TimeBasedBlind,
        Severity::High,
        Scope::Both,
        r"\bwaitfor\s+delay\b",
    ),
    (
        "load-file",
        ThreatKind::FileAccess,
        Severity::High,
        Scope::Both,
        r"\bload_file\s*\(",
    ),
    (
        "into-outfile",
        ThreatKind::FileAccess,
        Severity::High,
        Scope::Both,
        r"\binto\s+(outfile|dumpfile)\b",
    ),
    (
        "load-data",
        ThreatKind::FileAccess,
        Severity::High,
        Scope::Both,
        r"\bload\s+data\b",
    ),
];

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    RULE_TABLE
        .iter()
        .filter_map(|&(id, kind, severity, scope, pattern)| {
            match Regex::new(&format!("(?i){pattern}")) {
                Ok(regex) => Some(Rule {
                    id,
                    kind,
                    severity,
                    scope,
                    regex,
                }),
                Err(e) => {
                    tracing::error!(rule_id = id, error = %e, "Invalid built-in injection rule");
                    None
                }
            }
        })
        .collect()
});

/// Scan raw SQL text and its parameters
#[must_use]
pub fn scan(sql: &str, params: &[Value]) -> ThreatReport {
    scan_statement(&Statement::analyze(sql), params)
}

/// Scan an analyzed statement and its parameters
#[must_use]
pub fn scan_statement(statement: &Statement, params: &[Value]) -> ThreatReport {
    let mut report = ThreatReport::default();

    let text = normalize(statement.masked());
    for rule in RULES.iter().filter(|r| r.scope != Scope::Params) {
        if rule.regex.is_match(&text) {
            report.push(ThreatMatch {
                rule_id: rule.id,
                kind: rule.kind,
                severity: rule.severity,
                source: MatchSource::Query,
            });
        }
    }

    for (index, param) in params.iter().enumerate() {
        let mut strings = Vec::new();
        collect_strings(param, &mut strings);
        for value in strings {
            let text = normalize(value);
            for rule in RULES.iter().filter(|r| r.scope != Scope::Query) {
                if rule.regex.is_match(&text) {
                    report.push(ThreatMatch {
                        rule_id: rule.id,
                        kind: rule.kind,
                        severity: Severity::High,
                        source: MatchSource::Param(index),
                    });
                }
            }
        }
    }

    report
}

/// Lowercase, map control characters to spaces and collapse whitespace runs
fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut space = false;
    for c in text.chars() {
        if c.is_whitespace() || c.is_control() {
            space = true;
            continue;
        }
        if space && !out.is_empty() {
            out.push(' ');
        }
        space = false;
        out.extend(c.to_lowercase());
    }
    out
}

/// Numbers, booleans and nulls cannot carry syntax; only strings are scanned
fn collect_strings<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}
