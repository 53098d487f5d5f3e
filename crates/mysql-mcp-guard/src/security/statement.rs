//! Lexical statement analysis
//!
//! A single pass over the SQL text produces three views:
//!
//! - **code**: comments removed, string literal contents emptied, lowercased.
//!   Used for classification, stacked-statement detection and table extraction.
//! - **masked**: comments kept, string literal contents emptied, quoted
//!   identifier bodies reduced to word characters. Used by the pattern matcher
//!   so that literal data and identifier names cannot trigger signatures.
//! - **normalized**: original text with whitespace runs outside literals
//!   collapsed and trailing terminators stripped. Used for cache keys.
//!
//! MySQL executable comments (`/*! ... */`) are treated as code.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::Error;

/// Statement category derived from the leading keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    Select,
    Show,
    Describe,
    Explain,
    Insert,
    Update,
    Delete,
    Replace,
    Create,
    Drop,
    Alter,
    Truncate,
    Rename,
    Grant,
    Revoke,
    Other,
}

impl StatementKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Show => "SHOW",
            Self::Describe => "DESCRIBE",
            Self::Explain => "EXPLAIN",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Replace => "REPLACE",
            Self::Create => "CREATE",
            Self::Drop => "DROP",
            Self::Alter => "ALTER",
            Self::Truncate => "TRUNCATE",
            Self::Rename => "RENAME",
            Self::Grant => "GRANT",
            Self::Revoke => "REVOKE",
            Self::Other => "OTHER",
        }
    }

    fn from_keyword(word: &str) -> Option<Self> {
        Some(match word {
            "select" => Self::Select,
            "show" => Self::Show,
            "describe" | "desc" => Self::Describe,
            "explain" => Self::Explain,
            "insert" => Self::Insert,
            "update" => Self::Update,
            "delete" => Self::Delete,
            "replace" => Self::Replace,
            "create" => Self::Create,
            "drop" => Self::Drop,
            "alter" => Self::Alter,
            "truncate" => Self::Truncate,
            "rename" => Self::Rename,
            "grant" => Self::Grant,
            "revoke" => Self::Revoke,
            _ => return None,
        })
    }

    /// Schema-changing statements
    #[must_use]
    pub const fn is_ddl(&self) -> bool {
        matches!(
            self,
            Self::Create | Self::Drop | Self::Alter | Self::Truncate | Self::Rename
        )
    }

    /// Privilege-management statements
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self, Self::Grant | Self::Revoke)
    }

    /// Data-modifying statements subject to write permissions
    #[must_use]
    pub const fn is_write(&self) -> bool {
        matches!(
            self,
            Self::Insert | Self::Update | Self::Delete | Self::Replace
        )
    }

    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        matches!(
            self,
            Self::Select | Self::Show | Self::Describe | Self::Explain
        )
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatementKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let word = s.trim().to_lowercase();
        if word == "other" {
            return Ok(Self::Other);
        }
        Self::from_keyword(&word)
            .ok_or_else(|| Error::Config(format!("Unknown statement type: {s}")))
    }
}

/// Result of analyzing one request's SQL text
#[derive(Debug, Clone)]
pub struct Statement {
    kind: StatementKind,
    code: String,
    masked: String,
    normalized: String,
    empty: bool,
    stacked: bool,
    unterminated: bool,
    tables: Vec<String>,
    tables_complete: bool,
    volatile: bool,
}

impl Statement {
    /// Analyze SQL text. Never fails; malformed input is reported through
    /// [`Self::is_empty`] and [`Self::is_unterminated`].
    #[must_use]
    pub fn analyze(sql: &str) -> Self {
        let scan = Scan::run(sql);
        let code = scan.code.to_lowercase();
        let tokens = tokenize(&code);

        let empty = code.trim_matches(|c: char| c.is_whitespace() || c == ';').is_empty();
        // terminators inside literals and quoted identifiers never become tokens
        let stacked = tokens
            .iter()
            .skip_while(|t| **t != Token::Punct(';'))
            .any(|t| *t != Token::Punct(';'));
        let kind = classify(&tokens);
        let (tables, resolved) = extract_tables(&tokens);
        // DDL may name tables outside the introducer positions (RENAME ... TO)
        let tables_complete = resolved && !kind.is_ddl();
        let volatile = VOLATILE.iter().any(|re| re.is_match(&code));

        Self {
            kind,
            code,
            masked: scan.masked,
            normalized: scan.normalized,
            empty,
            stacked,
            unterminated: scan.unterminated,
            tables,
            tables_complete,
            volatile,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> StatementKind {
        self.kind
    }

    /// True when the text holds nothing but whitespace, comments or terminators
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.empty
    }

    /// True when a terminator is followed by further code
    #[must_use]
    pub const fn is_stacked(&self) -> bool {
        self.stacked
    }

    /// True when a string literal, quoted identifier or block comment is left open
    #[must_use]
    pub const fn is_unterminated(&self) -> bool {
        self.unterminated
    }

    /// Lowercased text with comments removed and literal contents emptied
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Text with literal contents emptied, identifier bodies reduced to word
    /// characters and comments kept
    #[must_use]
    pub fn masked(&self) -> &str {
        &self.masked
    }

    /// Whitespace-collapsed text for cache keys
    #[must_use]
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// Lowercased table names referenced by the statement (best effort)
    #[must_use]
    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    /// False when a table reference could not be resolved. Table-scoped
    /// decisions must then treat the statement as touching any table.
    #[must_use]
    pub const fn tables_complete(&self) -> bool {
        self.tables_complete
    }

    /// True when the result depends on something besides table contents
    #[must_use]
    pub const fn is_volatile(&self) -> bool {
        self.volatile
    }

    /// Deterministic single read eligible for the result cache
    #[must_use]
    pub const fn is_cacheable(&self) -> bool {
        matches!(self.kind, StatementKind::Select)
            && !self.volatile
            && !self.stacked
            && !self.unterminated
            && !self.empty
    }
}

/// Functions, keywords and clauses that make a SELECT non-deterministic
static VOLATILE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\b(now|sysdate|rand|uuid|uuid_short|curdate|curtime|current_date|current_time|current_timestamp|localtime|localtimestamp|unix_timestamp|utc_date|utc_time|utc_timestamp|connection_id|last_insert_id|found_rows|row_count|user|current_user|session_user|system_user|database|schema|version|sleep|benchmark|get_lock|release_lock|is_free_lock|is_used_lock|random_bytes)\s*\(",
        r"\b(current_date|current_time|current_timestamp|current_user|localtime|localtimestamp|utc_date|utc_time|utc_timestamp)\b",
        r"@",
        r"\bsql_no_cache\b",
        r"\bfor\s+(update|share)\b",
        r"\block\s+in\s+share\s+mode\b",
        r"\binto\b",
    ]
    .iter()
    .filter_map(|pattern| match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::error!(pattern, error = %e, "Invalid built-in volatility pattern");
            None
        }
    })
    .collect()
});

struct Scan {
    code: String,
    masked: String,
    normalized: String,
    pending_space: bool,
    unterminated: bool,
}

impl Scan {
    fn run(sql: &str) -> Self {
        let chars: Vec<char> = sql.chars().collect();
        let len = chars.len();
        let mut scan = Self {
            code: String::with_capacity(sql.len()),
            masked: String::with_capacity(sql.len()),
            normalized: String::with_capacity(sql.len()),
            pending_space: false,
            unterminated: false,
        };
        let mut executable = false;
        let mut i = 0;

        while i < len {
            let c = chars[i];
            let next = chars.get(i + 1).copied();

            match c {
                '\'' | '"' => {
                    let end = closing_quote(&chars, i, c);
                    let stop = end.map_or(len, |e| e + 1);
                    let raw: String = chars[i..stop].iter().collect();
                    scan.code.push(c);
                    scan.masked.push(c);
                    if end.is_some() {
                        scan.code.push(c);
                        scan.masked.push(c);
                    } else {
                        scan.unterminated = true;
                    }
                    scan.push_normalized(&raw);
                    i = stop;
                }
                '`' => {
                    let end = closing_quote(&chars, i, '`');
                    let stop = end.map_or(len, |e| e + 1);
                    let raw: String = chars[i..stop].iter().collect();
                    if end.is_none() {
                        scan.unterminated = true;
                    }
                    scan.code.push_str(&raw);
                    scan.masked.push('`');
                    scan.masked.extend(
                        chars[i + 1..end.unwrap_or(len)]
                            .iter()
                            .map(|&b| if is_word_char(b) { b } else { '_' }),
                    );
                    if end.is_some() {
                        scan.masked.push('`');
                    }
                    scan.push_normalized(&raw);
                    i = stop;
                }
                '#' => i = scan.line_comment(&chars, i),
                '-' if next == Some('-')
                    && chars.get(i + 2).is_none_or(|n| n.is_whitespace()) =>
                {
                    i = scan.line_comment(&chars, i);
                }
                '/' if next == Some('*') => {
                    if chars.get(i + 2) == Some(&'!') {
                        let mut stop = i + 3;
                        while stop < len && chars[stop].is_ascii_digit() {
                            stop += 1;
                        }
                        let raw: String = chars[i..stop].iter().collect();
                        scan.code.push(' ');
                        scan.masked.push_str(&raw);
                        scan.push_normalized(&raw);
                        executable = true;
                        i = stop;
                    } else {
                        let end = find_block_end(&chars, i + 2);
                        let stop = end.unwrap_or(len);
                        let raw: String = chars[i..stop].iter().collect();
                        if end.is_none() {
                            scan.unterminated = true;
                        }
                        scan.code.push(' ');
                        scan.masked.push_str(&raw);
                        scan.push_normalized(&raw);
                        i = stop;
                    }
                }
                '*' if executable && next == Some('/') => {
                    scan.code.push(' ');
                    scan.masked.push_str("*/");
                    scan.push_normalized("*/");
                    executable = false;
                    i += 2;
                }
                c if c.is_whitespace() || c.is_control() => {
                    scan.code.push(' ');
                    scan.masked.push(' ');
                    scan.pending_space = true;
                    i += 1;
                }
                c => {
                    scan.code.push(c);
                    scan.masked.push(c);
                    let mut buf = [0u8; 4];
                    scan.push_normalized(c.encode_utf8(&mut buf));
                    i += 1;
                }
            }
        }

        if executable {
            scan.unterminated = true;
        }

        let trimmed_len = scan
            .normalized
            .trim_end_matches(|c: char| c.is_whitespace() || c == ';')
            .len();
        scan.normalized.truncate(trimmed_len);
        scan
    }

    fn push_normalized(&mut self, s: &str) {
        if self.pending_space && !self.normalized.is_empty() {
            self.normalized.push(' ');
        }
        self.pending_space = false;
        self.normalized.push_str(s);
    }

    /// Consume a line comment up to (not including) the newline
    fn line_comment(&mut self, chars: &[char], start: usize) -> usize {
        let stop = chars[start..]
            .iter()
            .position(|&c| c == '\n')
            .map_or(chars.len(), |p| start + p);
        let raw: String = chars[start..stop].iter().collect();
        self.code.push(' ');
        self.masked.push_str(&raw);
        self.push_normalized(&raw);
        stop
    }
}

/// Index of the quote closing the literal opened at `start`.
/// Handles backslash escapes and doubled quotes.
fn closing_quote(chars: &[char], start: usize, quote: char) -> Option<usize> {
    let mut j = start + 1;
    while j < chars.len() {
        let c = chars[j];
        if c == '\\' && quote != '`' {
            j += 2;
            continue;
        }
        if c == quote {
            if chars.get(j + 1) == Some(&quote) {
                j += 2;
                continue;
            }
            return Some(j);
        }
        j += 1;
    }
    None
}

/// Index just past the `*/` closing a block comment
fn find_block_end(chars: &[char], from: usize) -> Option<usize> {
    (from..chars.len().saturating_sub(1))
        .find(|&j| chars[j] == '*' && chars[j + 1] == '/')
        .map(|j| j + 2)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Word(&'a str),
    Quoted(&'a str),
    Literal,
    Punct(char),
}

/// Split the code view into words, quoted identifiers, literals and punctuation
fn tokenize(code: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < code.len() {
        let Some(c) = code[i..].chars().next() else {
            break;
        };
        let width = c.len_utf8();

        if c.is_whitespace() {
            i += width;
        } else if c == '\'' || c == '"' {
            let close = code[i + 1..].find(c).map_or(code.len(), |p| i + 1 + p + 1);
            tokens.push(Token::Literal);
            i = close;
        } else if c == '`' {
            let rest = &code[i + 1..];
            let close = rest.find('`').unwrap_or(rest.len());
            tokens.push(Token::Quoted(&rest[..close]));
            i = i + 1 + close + 1;
        } else if is_word_char(c) {
            let start = i;
            while i < code.len() && code[i..].chars().next().is_some_and(is_word_char) {
                i += code[i..].chars().next().map_or(1, char::len_utf8);
            }
            tokens.push(Token::Word(&code[start..i]));
        } else {
            tokens.push(Token::Punct(c));
            i += width;
        }
    }

    tokens
}

const fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$' || !c.is_ascii()
}

/// Leading keyword, skipping parentheses and resolving `WITH` to the first
/// top-level keyword after the CTE list
fn classify(tokens: &[Token<'_>]) -> StatementKind {
    let mut iter = tokens.iter().skip_while(|t| matches!(t, Token::Punct('(')));

    match iter.next() {
        Some(Token::Word("with")) => {
            let mut depth = 0usize;
            for token in iter {
                match token {
                    Token::Punct('(') => depth += 1,
                    Token::Punct(')') => depth = depth.saturating_sub(1),
                    Token::Word(word) if depth == 0 => {
                        if let Some(kind) = StatementKind::from_keyword(word) {
                            return kind;
                        }
                    }
                    _ => {}
                }
            }
            StatementKind::Other
        }
        Some(Token::Word(word)) => {
            StatementKind::from_keyword(word).unwrap_or(StatementKind::Other)
        }
        _ => StatementKind::Other,
    }
}

/// Keywords after which a table reference follows
const TABLE_INTRODUCERS: &[&str] = &[
    "from",
    "join",
    "straight_join",
    "update",
    "into",
    "table",
    "truncate",
    "insert",
    "replace",
];

/// Modifiers that may sit between an introducer and the table name
const TABLE_MODIFIERS: &[&str] = &[
    "low_priority",
    "high_priority",
    "delayed",
    "ignore",
    "quick",
    "if",
    "not",
    "exists",
    "temporary",
    "table",
    "into",
    "only",
    "lateral",
];

/// Words that end a table reference instead of aliasing it
const ALIAS_STOPWORDS: &[&str] = &[
    "where",
    "join",
    "inner",
    "left",
    "right",
    "cross",
    "natural",
    "straight_join",
    "outer",
    "full",
    "on",
    "using",
    "group",
    "order",
    "limit",
    "having",
    "union",
    "set",
    "values",
    "value",
    "select",
    "partition",
    "force",
    "use",
    "ignore",
    "for",
    "lock",
    "window",
    "into",
    "as",
    "to",
    "like",
    "modify",
    "add",
    "change",
    "rename",
    "drop",
    "engine",
    "intersect",
    "except",
];

/// Targets that look like names but are not tables
const NON_TABLES: &[&str] = &["dual", "outfile", "dumpfile"];

/// Words that may follow an introducer without naming a table
const NON_TABLE_TARGETS: &[&str] = &["select", "with", "values", "value", "set"];

/// Table names in order of appearance, and whether every table reference
/// could be resolved
fn extract_tables(tokens: &[Token<'_>]) -> (Vec<String>, bool) {
    let mut tables: Vec<String> = Vec::new();
    let mut resolved = true;
    // one entry per open parenthesis; function arguments hold no table
    // references until a subquery starts inside them
    let mut scopes: Vec<bool> = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        let prev = i.checked_sub(1).map(|p| &tokens[p]);
        let token = tokens[i];
        i += 1;

        let word = match token {
            Token::Punct('(') => {
                scopes.push(!is_call(prev));
                continue;
            }
            Token::Punct(')') => {
                scopes.pop();
                continue;
            }
            Token::Word("select") => {
                if let Some(scope) = scopes.last_mut() {
                    *scope = true;
                }
                continue;
            }
            Token::Word(word) => word,
            _ => continue,
        };
        if !TABLE_INTRODUCERS.contains(&word)
            || !scopes.last().copied().unwrap_or(true)
            || !introduces_table(word, prev, tokens.get(i))
        {
            continue;
        }

        loop {
            while let Some(Token::Word(w)) = tokens.get(i)
                && TABLE_MODIFIERS.contains(w)
            {
                i += 1;
            }

            // parenthesized join list
            while tokens.get(i) == Some(&Token::Punct('(')) {
                scopes.push(true);
                i += 1;
            }

            let Some((name, next)) = table_name(tokens, i) else {
                match tokens.get(i) {
                    None | Some(Token::Punct('@')) => {}
                    Some(Token::Word(w)) if NON_TABLE_TARGETS.contains(w) => {}
                    Some(_) => resolved = false,
                }
                break;
            };
            i = next;
            if !NON_TABLES.contains(&name.as_str()) && !tables.contains(&name) {
                tables.push(name);
            }

            // optional alias
            match tokens.get(i) {
                Some(Token::Word("as")) => i += 2,
                Some(Token::Word(w)) if !ALIAS_STOPWORDS.contains(w) => i += 1,
                Some(Token::Quoted(_)) => i += 1,
                _ => {}
            }

            if tokens.get(i) == Some(&Token::Punct(',')) {
                i += 1;
            } else {
                break;
            }
        }
    }

    (tables, resolved)
}

/// An opening parenthesis directly after a name starts an argument list
fn is_call(prev: Option<&Token<'_>>) -> bool {
    match prev {
        Some(Token::Word(w)) => !TABLE_INTRODUCERS.contains(w),
        Some(Token::Quoted(_)) => true,
        _ => false,
    }
}

/// Rule out keyword uses that share a spelling with an introducer
fn introduces_table(word: &str, prev: Option<&Token<'_>>, next: Option<&Token<'_>>) -> bool {
    match word {
        // FOR UPDATE, ON DUPLICATE KEY UPDATE
        "update" => !matches!(prev, Some(Token::Word("for" | "key"))),
        // SELECT STRAIGHT_JOIN optimizer hint
        "straight_join" => !matches!(
            prev,
            Some(Token::Word(
                "select" | "all" | "distinct" | "distinctrow" | "high_priority"
            ))
        ),
        // INSERT() and REPLACE() string functions
        "insert" | "replace" => next != Some(&Token::Punct('(')),
        _ => true,
    }
}

/// Read a possibly qualified name starting at `i`, keeping the last segment
fn table_name(tokens: &[Token<'_>], mut i: usize) -> Option<(String, usize)> {
    let mut name = match tokens.get(i)? {
        Token::Word(w) if !ALIAS_STOPWORDS.contains(w) => (*w).to_string(),
        Token::Quoted(q) => q.to_lowercase(),
        _ => return None,
    };
    i += 1;

    while tokens.get(i) == Some(&Token::Punct('.')) {
        match tokens.get(i + 1) {
            Some(Token::Word(w)) => name = (*w).to_string(),
            Some(Token::Quoted(q)) => name = q.to_lowercase(),
            _ => break,
        }
        i += 2;
    }

    Some((name, i))
}
