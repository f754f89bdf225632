//! Relaxed-isolation statement rewriting.
//!
//! Every table referenced by a `FROM` or `JOIN` clause of an outbound SELECT
//! gets a `WITH (NOLOCK)` table hint, so reporting reads never wait on
//! writers holding row locks. Statements that are not SELECTs, or that were
//! already tagged by hand, pass through untouched. A statement carrying the
//! `FORCE_NOLOCK_ON_ALL_TABLES` marker is tagged on every reference even when
//! some of them already carry hints.
//!
//! Rewriting is textual. String literals, comments and delimited identifiers
//! are masked first and table valued functions are skipped. The hint lands
//! after the table alias as T-SQL requires. Any scanning failure restores the original statement.

use std::borrow::Cow;

use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, error};

use super::error::RewriteError;
use super::isolation::StatementInterceptor;
use super::lexer;

pub const NOLOCK_HINT: &str = "WITH (NOLOCK)";
pub const FORCE_ALL_MARKER: &str = "FORCE_NOLOCK_ON_ALL_TABLES";

pub const METRIC_SQL_REWRITE_TOTAL: &str = "ppreporter_sql_rewrite_total";

const TABLE_VALUED_FUNCTIONS: &[&str] = &[
    "OPENJSON",
    "OPENXML",
    "OPENROWSET",
    "OPENQUERY",
    "OPENDATASOURCE",
    "FREETEXTTABLE",
    "CONTAINSTABLE",
];

/// Words that may follow a table reference without being its alias.
const RESERVED_AFTER_TABLE: &[&str] = &[
    "AND", "APPLY", "AS", "CROSS", "ELSE", "END", "EXCEPT", "FOR", "FROM", "FULL", "GROUP",
    "HAVING", "INNER", "INTERSECT", "JOIN", "LEFT", "NATURAL", "OFFSET", "ON", "OPTION", "OR",
    "ORDER", "OUTER", "PIVOT", "RIGHT", "SELECT", "TABLESAMPLE", "THEN", "UNION", "UNPIVOT",
    "USING", "WHEN", "WHERE", "WINDOW", "WITH",
];

static TABLE_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:FROM|JOIN)\s+(?P<table>(?:\[(?:[^\]]|\]\])+\]|[A-Za-z_#][\w#$@]*)(?:\.(?:\[(?:[^\]]|\]\])+\]|[A-Za-z_][\w$@]*)){0,3})",
    )
    .expect("table reference pattern is valid")
});

static ALIAS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s+(?:AS\s+)?(?P<alias>\[(?:[^\]]|\]\])+\]|[A-Za-z_][\w$@]*)")
        .expect("alias pattern is valid")
});

static HINT_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(?:WITH\s*)?\(").expect("hint block pattern is valid"));

static NOLOCK_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bNOLOCK\b").expect("hint pattern is valid"));

static MARKER_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[ \t]*--[ \t]*FORCE_NOLOCK_ON_ALL_TABLES[ \t]*(?:\r?\n|$)")
        .expect("marker line pattern is valid")
});

static MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)FORCE_NOLOCK_ON_ALL_TABLES").expect("marker pattern is valid"));

/// Outcome of inspecting one statement. Never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteDecision {
    pub already_tagged: bool,
    pub force_all: bool,
    pub rewritten_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Rewritten,
    Passthrough,
    AlreadyTagged,
    Failed,
}

impl Outcome {
    fn as_str(self) -> &'static str {
        match self {
            Outcome::Rewritten => "rewritten",
            Outcome::Passthrough => "passthrough",
            Outcome::AlreadyTagged => "already_tagged",
            Outcome::Failed => "failed",
        }
    }
}

/// Stateless; cheap to clone and share.
#[derive(Debug, Default, Clone, Copy)]
pub struct QueryRewriter;

impl QueryRewriter {
    pub fn new() -> Self {
        Self
    }

    pub fn rewrite(&self, statement: &str) -> String {
        self.decide(statement).rewritten_text
    }

    pub fn decide(&self, statement: &str) -> RewriteDecision {
        let (decision, outcome) = self.evaluate(statement);
        counter!(METRIC_SQL_REWRITE_TOTAL, "outcome" => outcome.as_str()).increment(1);
        decision
    }

    fn evaluate(&self, statement: &str) -> (RewriteDecision, Outcome) {
        let unchanged = |already_tagged, force_all| RewriteDecision {
            already_tagged,
            force_all,
            rewritten_text: statement.to_owned(),
        };

        if !is_select(statement) {
            return (unchanged(false, false), Outcome::Passthrough);
        }

        let already_tagged = NOLOCK_WORD.is_match(statement);
        let force_all = MARKER.is_match(statement);
        if already_tagged && !force_all {
            return (unchanged(true, false), Outcome::AlreadyTagged);
        }

        let candidate = if force_all {
            strip_marker(statement)
        } else {
            Cow::Borrowed(statement)
        };

        match tag_tables(&candidate) {
            Ok((text, tagged)) => {
                debug!(tagged, force_all, "statement rewritten for relaxed isolation");
                let outcome = if tagged == 0 && !force_all {
                    Outcome::Passthrough
                } else {
                    Outcome::Rewritten
                };
                let decision = RewriteDecision {
                    already_tagged,
                    force_all,
                    rewritten_text: text,
                };
                (decision, outcome)
            }
            Err(err) => {
                error!(
                    error = %err,
                    statement_len = statement.len(),
                    "statement rewrite failed; executing original text"
                );
                (unchanged(already_tagged, force_all), Outcome::Failed)
            }
        }
    }
}

impl StatementInterceptor for QueryRewriter {
    fn intercept(&self, statement: &str) -> String {
        self.rewrite(statement)
    }
}

fn is_select(statement: &str) -> bool {
    let rest = &statement[lexer::skip_leading_trivia(statement)..];
    let Some(word) = rest.get(..6) else {
        return false;
    };
    word.eq_ignore_ascii_case("SELECT")
        && rest[6..]
            .chars()
            .next()
            .is_none_or(|ch| !(ch.is_alphanumeric() || ch == '_'))
}

fn strip_marker(statement: &str) -> Cow<'_, str> {
    match MARKER_LINE.replace_all(statement, "") {
        Cow::Borrowed(text) => MARKER.replace_all(text, ""),
        Cow::Owned(text) => Cow::Owned(MARKER.replace_all(&text, "").into_owned()),
    }
}

/// Inserts hints into `sql`; returns the new text and how many references were tagged.
fn tag_tables(sql: &str) -> Result<(String, usize), RewriteError> {
    let spans = lexer::scan(sql)?;
    let mut out = String::with_capacity(sql.len() + 64);
    let mut copied = 0;
    let mut tagged = 0;

    for caps in TABLE_REF.captures_iter(sql) {
        let (Some(clause), Some(table)) = (caps.get(0), caps.name("table")) else {
            continue;
        };
        if spans.hides(clause.start()) || is_function_call(sql, table.as_str(), table.end()) {
            continue;
        }

        let anchor = alias_end(sql, table.end()).unwrap_or(table.end());
        let (at, insert) = match existing_hints(&sql[anchor..]) {
            ExistingHints::None => (anchor, format!(" {NOLOCK_HINT}")),
            ExistingHints::Block { open, close } => {
                let inner = &sql[anchor + open..anchor + close];
                if NOLOCK_WORD.is_match(inner) {
                    continue;
                }
                (anchor + open, String::from("NOLOCK, "))
            }
            ExistingHints::Malformed => continue,
        };
        if at < copied {
            continue;
        }

        out.push_str(&sql[copied..at]);
        out.push_str(&insert);
        copied = at;
        tagged += 1;
    }

    out.push_str(&sql[copied..]);
    Ok((out, tagged))
}

fn is_function_call(sql: &str, table: &str, table_end: usize) -> bool {
    let last_segment = table.rsplit('.').next().unwrap_or(table);
    if TABLE_VALUED_FUNCTIONS
        .iter()
        .any(|name| last_segment.eq_ignore_ascii_case(name))
    {
        return true;
    }
    sql[table_end..].trim_start().starts_with('(')
}

/// End offset of the alias following the table reference, if there is one.
fn alias_end(sql: &str, table_end: usize) -> Option<usize> {
    let caps = ALIAS.captures(&sql[table_end..])?;
    let alias = caps.name("alias")?;
    let word = alias.as_str();
    if !word.starts_with('[')
        && RESERVED_AFTER_TABLE
            .iter()
            .any(|reserved| word.eq_ignore_ascii_case(reserved))
    {
        return None;
    }
    Some(table_end + alias.end())
}

enum ExistingHints {
    None,
    /// Offsets just past `(` and of the matching `)`, relative to the anchor.
    Block { open: usize, close: usize },
    Malformed,
}

fn existing_hints(rest: &str) -> ExistingHints {
    let Some(found) = HINT_BLOCK.find(rest) else {
        return ExistingHints::None;
    };
    let open = found.end();
    let mut depth = 1usize;
    for (offset, ch) in rest[open..].char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return ExistingHints::Block {
                        open,
                        close: open + offset,
                    };
                }
            }
            _ => {}
        }
    }
    ExistingHints::Malformed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewrite(sql: &str) -> String {
        QueryRewriter::new().rewrite(sql)
    }

    #[test]
    fn tags_each_reference_form() {
        assert_eq!(
            rewrite("SELECT * FROM [dbo].[Game]"),
            "SELECT * FROM [dbo].[Game] WITH (NOLOCK)"
        );
        assert_eq!(
            rewrite("select * from [Country] where Id = 1"),
            "select * from [Country] WITH (NOLOCK) where Id = 1"
        );
        assert_eq!(
            rewrite("SELECT Code FROM currencies ORDER BY Code"),
            "SELECT Code FROM currencies WITH (NOLOCK) ORDER BY Code"
        );
    }

    #[test]
    fn hint_follows_the_alias() {
        let sql = "SELECT g.Id FROM Games AS g INNER JOIN [Providers] p ON p.Id = g.ProviderId WHERE g.IsActive = 1";
        assert_eq!(
            rewrite(sql),
            "SELECT g.Id FROM Games AS g WITH (NOLOCK) INNER JOIN [Providers] p WITH (NOLOCK) ON p.Id = g.ProviderId WHERE g.IsActive = 1"
        );
    }

    #[test]
    fn handles_every_join_form() {
        let sql = "SELECT * FROM a RIGHT JOIN b ON a.Id = b.Id FULL OUTER JOIN c ON c.Id = b.Id CROSS JOIN d";
        assert_eq!(
            rewrite(sql),
            "SELECT * FROM a WITH (NOLOCK) RIGHT JOIN b WITH (NOLOCK) ON a.Id = b.Id FULL OUTER JOIN c WITH (NOLOCK) ON c.Id = b.Id CROSS JOIN d WITH (NOLOCK)"
        );
    }

    #[test]
    fn rewriting_is_idempotent() {
        let once = rewrite("SELECT * FROM [dbo].[WhiteLabels] w JOIN Countries c ON c.Id = w.CountryId");
        assert_eq!(rewrite(&once), once);
        assert_eq!(rewrite(&rewrite(&once)), once);

        let tagged = "SELECT * FROM Games WITH (nolock) JOIN Providers ON 1 = 1";
        let decision = QueryRewriter::new().decide(tagged);
        assert!(decision.already_tagged);
        assert_eq!(decision.rewritten_text, tagged);
    }

    #[test]
    fn force_marker_tags_all_references_and_is_removed() {
        let sql = "-- FORCE_NOLOCK_ON_ALL_TABLES\nSELECT d.Id FROM [dbo].[DailyActions] d LEFT JOIN [WhiteLabels] w ON w.Id = d.WhiteLabelId JOIN players p ON p.Id = d.PlayerId";
        let decision = QueryRewriter::new().decide(sql);

        assert!(decision.force_all);
        assert_eq!(
            decision.rewritten_text,
            "SELECT d.Id FROM [dbo].[DailyActions] d WITH (NOLOCK) LEFT JOIN [WhiteLabels] w WITH (NOLOCK) ON w.Id = d.WhiteLabelId JOIN players p WITH (NOLOCK) ON p.Id = d.PlayerId"
        );
        assert!(!decision.rewritten_text.contains(FORCE_ALL_MARKER));
    }

    #[test]
    fn force_marker_merges_into_existing_hint_blocks() {
        let sql = "/* FORCE_NOLOCK_ON_ALL_TABLES */ SELECT * FROM t WITH (INDEX(ix_t)) JOIN u WITH (NOLOCK) ON u.Id = t.Id";
        assert_eq!(
            rewrite(sql),
            "/*  */ SELECT * FROM t WITH (NOLOCK, INDEX(ix_t)) JOIN u WITH (NOLOCK) ON u.Id = t.Id"
        );
    }

    #[test]
    fn non_select_statements_pass_through() {
        for sql in [
            "INSERT INTO Games (Name) SELECT Name FROM Staging",
            "UPDATE g SET IsActive = 0 FROM Games g JOIN Providers p ON p.Id = g.ProviderId",
            "DELETE FROM Games WHERE Id = 3",
            "SELECTED_ROWS",
        ] {
            assert_eq!(rewrite(sql), sql);
        }
    }

    #[test]
    fn leading_comments_do_not_hide_a_select() {
        assert_eq!(
            rewrite("-- report: daily\n/* tag */ SELECT * FROM t"),
            "-- report: daily\n/* tag */ SELECT * FROM t WITH (NOLOCK)"
        );
    }

    #[test]
    fn table_valued_functions_are_skipped() {
        let sql = "SELECT * FROM OPENJSON(@json) j JOIN dbo.fn_Rows(1) r ON 1 = 1 JOIN Games g ON g.Id = r.Id";
        assert_eq!(
            rewrite(sql),
            "SELECT * FROM OPENJSON(@json) j JOIN dbo.fn_Rows(1) r ON 1 = 1 JOIN Games g WITH (NOLOCK) ON g.Id = r.Id"
        );
    }

    #[test]
    fn literals_and_comments_are_left_alone() {
        let sql = "SELECT 'FROM x' AS s FROM t -- JOIN y";
        assert_eq!(rewrite(sql), "SELECT 'FROM x' AS s FROM t WITH (NOLOCK) -- JOIN y");
    }

    #[test]
    fn keywords_inside_delimited_identifiers_are_left_alone() {
        assert_eq!(
            rewrite("SELECT p.RegistrationDate AS [Join Date] FROM Players p"),
            "SELECT p.RegistrationDate AS [Join Date] FROM Players p WITH (NOLOCK)"
        );
        assert_eq!(
            rewrite(r#"SELECT d.Date AS "From Date" FROM DailyActions d JOIN [Left Join] j ON j.Id = d.Id"#),
            r#"SELECT d.Date AS "From Date" FROM DailyActions d WITH (NOLOCK) JOIN [Left Join] j WITH (NOLOCK) ON j.Id = d.Id"#
        );
    }

    #[test]
    fn nested_subqueries_tag_inner_tables_only() {
        let sql = "SELECT * FROM (SELECT Id FROM [dbo].[DailyActions] WHERE PlayerId IN (SELECT Id FROM Players)) AS d";
        assert_eq!(
            rewrite(sql),
            "SELECT * FROM (SELECT Id FROM [dbo].[DailyActions] WITH (NOLOCK) WHERE PlayerId IN (SELECT Id FROM Players WITH (NOLOCK))) AS d"
        );
    }

    #[test]
    fn common_table_expressions_pass_through() {
        let sql = "WITH recent AS (SELECT * FROM DailyActions) SELECT * FROM recent";
        assert_eq!(rewrite(sql), sql);
    }

    #[test]
    fn scanning_failure_restores_original_text() {
        let sql = "SELECT 'unterminated FROM t";
        let decision = QueryRewriter::new().decide(sql);
        assert_eq!(decision.rewritten_text, sql);
        assert!(!decision.already_tagged);
    }

    #[test]
    fn select_without_tables_is_unchanged() {
        assert_eq!(rewrite("SELECT 1"), "SELECT 1");
        assert_eq!(rewrite("SELECT GETDATE()"), "SELECT GETDATE()");
    }
}
