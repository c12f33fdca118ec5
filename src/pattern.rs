//! Pattern descriptors
//!
//! A `Pattern` is one user-supplied expression plus its matching options.
//! `user_index` is echoed back verbatim on every hit, which is how callers
//! map hits to their own bookkeeping; it also serves as the VM label, so
//! the practical ceiling is the label operand width (checked at compile
//! time, not here).

use serde::{Deserialize, Serialize};

/// One expression with its matching options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    /// The pattern text
    pub expression: String,
    /// Encoding names to expand the pattern under; empty means the
    /// builder's default list
    pub encodings: Vec<String>,
    /// Case-insensitive matching
    pub case_insensitive: bool,
    /// Treat the expression as a literal string, no metacharacters
    pub fixed_string: bool,
    /// Caller's identifier, reported on hits
    pub user_index: u64,
}

impl Pattern {
    /// A case-sensitive regex pattern with default encodings
    pub fn new(expression: impl Into<String>, user_index: u64) -> Self {
        Self {
            expression: expression.into(),
            encodings: Vec::new(),
            case_insensitive: false,
            fixed_string: false,
            user_index,
        }
    }

    /// Set the encoding list
    pub fn with_encodings<I, S>(mut self, encodings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.encodings = encodings.into_iter().map(Into::into).collect();
        self
    }

    /// Enable case-insensitive matching
    pub fn case_insensitive(mut self, yes: bool) -> Self {
        self.case_insensitive = yes;
        self
    }

    /// Treat the expression as a fixed string
    pub fn fixed_string(mut self, yes: bool) -> Self {
        self.fixed_string = yes;
        self
    }
}

/// Parse a pattern-list file: one pattern per line, empty lines skipped,
/// `user_index` numbered by position in the file (empty lines included,
/// so indices stay stable when a line is temporarily blanked).
pub fn parse_pattern_file(text: &str) -> Vec<Pattern> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.is_empty())
        .map(|(i, line)| Pattern::new(line, i as u64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_chain() {
        let p = Pattern::new("foo.*bar", 3)
            .with_encodings(["UTF-8", "UTF-16LE"])
            .case_insensitive(true);
        assert_eq!(p.expression, "foo.*bar");
        assert_eq!(p.encodings, vec!["UTF-8", "UTF-16LE"]);
        assert!(p.case_insensitive);
        assert!(!p.fixed_string);
        assert_eq!(p.user_index, 3);
    }

    #[test]
    fn test_pattern_file() {
        let pats = parse_pattern_file("foo\n\nbar\nbaz\n");
        assert_eq!(pats.len(), 3);
        assert_eq!(pats[0].expression, "foo");
        assert_eq!(pats[0].user_index, 0);
        assert_eq!(pats[1].expression, "bar");
        assert_eq!(pats[1].user_index, 2);
        assert_eq!(pats[2].user_index, 3);
    }
}
