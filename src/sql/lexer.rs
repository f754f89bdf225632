//! Minimal T-SQL scanner.
//!
//! Only knows enough to tell code from non-code. String literals and comments
//! are reported as masked spans. Bracketed and double-quoted identifiers are
//! reported separately; quote characters and keywords inside them are inert.

use std::ops::Range;

use super::error::RewriteError;

/// Byte ranges the rewriter must never treat as SQL keywords.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Spans {
    /// String literals and comments.
    pub masked: Vec<Range<usize>>,
    /// `[...]` and `"..."` identifiers, delimiters included.
    pub identifiers: Vec<Range<usize>>,
}

impl Spans {
    /// True when `offset` falls inside a literal, a comment or a delimited identifier.
    pub fn hides(&self, offset: usize) -> bool {
        self.masked
            .iter()
            .chain(&self.identifiers)
            .any(|span| span.contains(&offset))
    }
}

pub fn scan(sql: &str) -> Result<Spans, RewriteError> {
    let bytes = sql.as_bytes();
    let mut spans = Spans::default();
    let mut pos = 0;

    while pos < bytes.len() {
        match bytes[pos] {
            b'\'' => {
                let end = literal_end(bytes, pos)
                    .ok_or(RewriteError::UnterminatedLiteral { offset: pos })?;
                spans.masked.push(pos..end);
                pos = end;
            }
            b'-' if bytes.get(pos + 1) == Some(&b'-') => {
                let end = line_comment_end(bytes, pos);
                spans.masked.push(pos..end);
                pos = end;
            }
            b'/' if bytes.get(pos + 1) == Some(&b'*') => {
                let end = block_comment_end(bytes, pos)
                    .ok_or(RewriteError::UnterminatedComment { offset: pos })?;
                spans.masked.push(pos..end);
                pos = end;
            }
            b'[' => {
                let end = delimited_end(bytes, pos, b']')
                    .ok_or(RewriteError::UnbalancedBracket { offset: pos })?;
                spans.identifiers.push(pos..end);
                pos = end;
            }
            b'"' => {
                let end = delimited_end(bytes, pos, b'"')
                    .ok_or(RewriteError::UnterminatedLiteral { offset: pos })?;
                spans.identifiers.push(pos..end);
                pos = end;
            }
            _ => pos += 1,
        }
    }

    Ok(spans)
}

/// Offset of the first token that is neither whitespace nor a comment.
///
/// An unterminated block comment swallows the rest of the text.
pub fn skip_leading_trivia(sql: &str) -> usize {
    let bytes = sql.as_bytes();
    let mut pos = 0;
    loop {
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        if bytes[pos..].starts_with(b"--") {
            pos = line_comment_end(bytes, pos);
        } else if bytes[pos..].starts_with(b"/*") {
            pos = block_comment_end(bytes, pos).unwrap_or(bytes.len());
        } else {
            return pos;
        }
    }
}

/// `''` inside a literal is an escaped quote.
fn literal_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut pos = start + 1;
    while pos < bytes.len() {
        if bytes[pos] == b'\'' {
            if bytes.get(pos + 1) == Some(&b'\'') {
                pos += 2;
                continue;
            }
            return Some(pos + 1);
        }
        pos += 1;
    }
    None
}

fn line_comment_end(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |offset| start + offset + 1)
}

/// T-SQL block comments nest.
fn block_comment_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut pos = start;
    while pos + 1 < bytes.len() {
        match (bytes[pos], bytes[pos + 1]) {
            (b'/', b'*') => {
                depth += 1;
                pos += 2;
            }
            (b'*', b'/') => {
                depth -= 1;
                pos += 2;
                if depth == 0 {
                    return Some(pos);
                }
            }
            _ => pos += 1,
        }
    }
    None
}

/// Doubled closing delimiters are escapes, as in `[a]]b]`.
fn delimited_end(bytes: &[u8], start: usize, close: u8) -> Option<usize> {
    let mut pos = start + 1;
    while pos < bytes.len() {
        if bytes[pos] == close {
            if bytes.get(pos + 1) == Some(&close) {
                pos += 2;
                continue;
            }
            return Some(pos + 1);
        }
        pos += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_literals_and_comments() {
        let sql = "SELECT 'from x' -- join y\nFROM t /* from z */";
        let spans = scan(sql).unwrap();
        let masked: Vec<&str> = spans.masked.iter().map(|s| &sql[s.clone()]).collect();
        assert_eq!(masked, vec!["'from x'", "-- join y\n", "/* from z */"]);
    }

    #[test]
    fn escaped_quotes_stay_inside_the_literal() {
        let sql = "SELECT 'it''s' FROM t";
        let spans = scan(sql).unwrap();
        assert_eq!(spans.masked, vec![7..14]);
        assert!(!spans.hides(sql.find("FROM").unwrap()));
    }

    #[test]
    fn quotes_inside_brackets_are_not_literals() {
        let spans = scan("SELECT [it's] FROM [a]]b]").unwrap();
        assert!(spans.masked.is_empty());
        assert_eq!(spans.identifiers, vec![7..13, 19..25]);
    }

    #[test]
    fn keywords_inside_delimited_identifiers_are_hidden() {
        let sql = r#"SELECT [Join Date], "From Date" FROM t"#;
        let spans = scan(sql).unwrap();

        assert!(spans.hides(sql.find("Join").unwrap()));
        assert!(spans.hides(sql.find("From").unwrap()));
        assert!(!spans.hides(sql.find("FROM").unwrap()));
    }

    #[test]
    fn nested_block_comments() {
        let sql = "/* a /* b */ c */SELECT 1";
        assert_eq!(scan(sql).unwrap().masked, vec![0..17]);
    }

    #[test]
    fn unterminated_constructs_are_errors() {
        assert_eq!(
            scan("SELECT 'abc FROM t"),
            Err(RewriteError::UnterminatedLiteral { offset: 7 })
        );
        assert_eq!(
            scan("SELECT 1 /* FROM t"),
            Err(RewriteError::UnterminatedComment { offset: 9 })
        );
        assert_eq!(
            scan("SELECT 1 FROM [dbo"),
            Err(RewriteError::UnbalancedBracket { offset: 14 })
        );
    }

    #[test]
    fn skips_leading_comments() {
        let sql = "  -- tag\n/* more */\n SELECT 1";
        assert_eq!(&sql[skip_leading_trivia(sql)..], "SELECT 1");
        assert_eq!(skip_leading_trivia("/* open"), "/* open".len());
    }
}
