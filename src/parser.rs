//! Pattern surface parser
//!
//! Recursive descent from pattern text to the parse-tree vocabulary.
//! Supported syntax: literals, `.`, alternation, grouping, character
//! classes (`[...]`, `[^...]`, ranges, escapes), repetition
//! (`? * + {n} {n,} {n,m}`) with non-greedy `?` suffixes, and escapes
//! (`\n \t \r \f \v \a \e \0`, `\xHH`, `\x{H..H}`, escaped metacharacters).
//!
//! Backreferences, lookaround, and anchors are not part of the language.

use crate::byteset::ByteSet;
use crate::parsetree::{ParseNode, ParseTree};

/// Upper bound for `{n,m}` counts; repetitions unroll into NFA vertices,
/// so unbounded counts would let one pattern allocate without limit.
const MAX_REPEAT: u32 = 1024;

/// A parse failure, positioned within the pattern text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    /// Byte offset of the failure
    pub position: usize,
    /// Description of the failure
    pub message: String,
}

impl ParseFailure {
    fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

/// Parse a pattern into a tree.
///
/// An empty pattern yields a tree with no root; the builder reports that
/// as `EmptyPattern`.
pub fn parse(pattern: &str) -> Result<ParseTree, ParseFailure> {
    if pattern.is_empty() {
        return Ok(ParseTree::default());
    }
    let mut p = Parser::new(pattern);
    let root = p.alternation()?;
    if let Some((pos, c)) = p.peek() {
        return Err(ParseFailure::new(pos, format!("unexpected '{}'", c)));
    }
    Ok(ParseTree::new(root))
}

/// Parse a fixed string: every character is a literal, no metacharacters.
pub fn parse_fixed(text: &str) -> ParseTree {
    let mut root: Option<ParseNode> = None;
    for c in text.chars() {
        let lit = ParseNode::literal(c as u32);
        root = Some(match root {
            None => lit,
            Some(prev) => ParseNode::cat(prev, lit),
        });
    }
    ParseTree { root }
}

struct Parser<'a> {
    chars: Vec<(usize, char)>,
    pos: usize,
    len: usize,
    text: &'a str,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        let chars: Vec<(usize, char)> = text.char_indices().collect();
        Self {
            len: text.len(),
            pos: 0,
            chars,
            text,
        }
    }

    fn peek(&self) -> Option<(usize, char)> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn eat(&mut self, want: char) -> bool {
        if let Some((_, c)) = self.peek() {
            if c == want {
                self.pos += 1;
                return true;
            }
        }
        false
    }

    fn here(&self) -> usize {
        self.peek().map(|(p, _)| p).unwrap_or(self.len)
    }

    fn alternation(&mut self) -> Result<ParseNode, ParseFailure> {
        let mut node = self.concatenation()?;
        while self.eat('|') {
            let right = self.concatenation()?;
            node = ParseNode::alt(node, right);
        }
        Ok(node)
    }

    fn concatenation(&mut self) -> Result<ParseNode, ParseFailure> {
        let mut node: Option<ParseNode> = None;
        loop {
            match self.peek() {
                None | Some((_, '|')) | Some((_, ')')) => break,
                _ => {}
            }
            let atom = self.repetition()?;
            node = Some(match node {
                None => atom,
                Some(prev) => ParseNode::cat(prev, atom),
            });
        }
        node.ok_or_else(|| ParseFailure::new(self.here(), "empty subexpression"))
    }

    fn repetition(&mut self) -> Result<ParseNode, ParseFailure> {
        let mut node = self.atom()?;
        loop {
            let (min, max) = match self.peek() {
                Some((_, '?')) => {
                    self.pos += 1;
                    (0, Some(1))
                }
                Some((_, '*')) => {
                    self.pos += 1;
                    (0, None)
                }
                Some((_, '+')) => {
                    self.pos += 1;
                    (1, None)
                }
                Some((_, '{')) => match self.counted_bounds()? {
                    Some(b) => b,
                    // '{' with no count is a literal brace; stop the loop
                    None => break,
                },
                _ => break,
            };
            let greedy = !self.eat('?');
            node = ParseNode::rep(node, min, max, greedy);
        }
        Ok(node)
    }

    /// `{n}`, `{n,}`, `{n,m}` after the opening brace has been seen.
    ///
    /// Returns None (without consuming) when the brace does not open a
    /// count, so `a{x` treats `{` as a literal.
    fn counted_bounds(&mut self) -> Result<Option<(u32, Option<u32>)>, ParseFailure> {
        let start = self.pos;
        self.pos += 1; // '{'
        let open_at = self.chars[start].0;

        let min = match self.number() {
            Some(n) => n,
            None => {
                self.pos = start;
                return Ok(None);
            }
        };
        let max = if self.eat(',') {
            match self.number() {
                Some(n) => Some(n),
                None => None, // {n,}
            }
        } else {
            Some(min) // {n}
        };
        if !self.eat('}') {
            self.pos = start;
            return Ok(None);
        }
        if min > MAX_REPEAT || max.map(|m| m > MAX_REPEAT).unwrap_or(false) {
            return Err(ParseFailure::new(
                open_at,
                format!("repetition bound exceeds {}", MAX_REPEAT),
            ));
        }
        if let Some(m) = max {
            if m < min {
                return Err(ParseFailure::new(open_at, "repetition bounds out of order"));
            }
        }
        Ok(Some((min, max)))
    }

    fn number(&mut self) -> Option<u32> {
        let mut value: u32 = 0;
        let mut any = false;
        while let Some((_, c)) = self.peek() {
            if let Some(d) = c.to_digit(10) {
                value = value.saturating_mul(10).saturating_add(d);
                self.pos += 1;
                any = true;
            } else {
                break;
            }
        }
        any.then_some(value)
    }

    fn atom(&mut self) -> Result<ParseNode, ParseFailure> {
        let (at, c) = self
            .peek()
            .ok_or_else(|| ParseFailure::new(self.len, "unexpected end of pattern"))?;
        match c {
            '(' => {
                self.pos += 1;
                let node = self.alternation()?;
                if !self.eat(')') {
                    return Err(ParseFailure::new(at, "unbalanced '('"));
                }
                Ok(node)
            }
            ')' => Err(ParseFailure::new(at, "unbalanced ')'")),
            '.' => {
                self.pos += 1;
                Ok(ParseNode::Dot)
            }
            '[' => self.char_class(),
            '*' | '+' | '?' => Err(ParseFailure::new(at, "nothing to repeat")),
            '\\' => {
                let cp = self.escape()?;
                Ok(ParseNode::literal(cp))
            }
            _ => {
                self.pos += 1;
                Ok(ParseNode::literal(c as u32))
            }
        }
    }

    fn escape(&mut self) -> Result<u32, ParseFailure> {
        let (at, _) = self.bump().unwrap(); // '\'
        let (_, c) = self
            .bump()
            .ok_or_else(|| ParseFailure::new(at, "trailing backslash"))?;
        let cp = match c {
            'n' => 0x0A,
            't' => 0x09,
            'r' => 0x0D,
            'f' => 0x0C,
            'v' => 0x0B,
            'a' => 0x07,
            'e' => 0x1B,
            '0' => 0x00,
            'x' => return self.hex_escape(at),
            '.' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '\\' | '-'
            | '^' | '$' => c as u32,
            _ => {
                return Err(ParseFailure::new(
                    at,
                    format!("unsupported escape '\\{}'", c),
                ))
            }
        };
        Ok(cp)
    }

    fn hex_escape(&mut self, at: usize) -> Result<u32, ParseFailure> {
        if self.eat('{') {
            let mut value: u32 = 0;
            let mut digits = 0;
            while let Some((_, c)) = self.peek() {
                if let Some(d) = c.to_digit(16) {
                    value = (value << 4) | d;
                    digits += 1;
                    self.pos += 1;
                    if digits > 6 {
                        return Err(ParseFailure::new(at, "hex escape too long"));
                    }
                } else {
                    break;
                }
            }
            if digits == 0 || !self.eat('}') {
                return Err(ParseFailure::new(at, "malformed \\x{...} escape"));
            }
            if value > 0x10FFFF {
                return Err(ParseFailure::new(at, "codepoint above U+10FFFF"));
            }
            Ok(value)
        } else {
            let mut value: u32 = 0;
            for _ in 0..2 {
                let d = self
                    .peek()
                    .and_then(|(_, c)| c.to_digit(16))
                    .ok_or_else(|| ParseFailure::new(at, "malformed \\xHH escape"))?;
                value = (value << 4) | d;
                self.pos += 1;
            }
            Ok(value)
        }
    }

    fn char_class(&mut self) -> Result<ParseNode, ParseFailure> {
        let (open_at, _) = self.bump().unwrap(); // '['
        let negated = self.eat('^');
        let mut set = ByteSet::new();
        let mut first = true;

        loop {
            let (at, c) = self
                .peek()
                .ok_or_else(|| ParseFailure::new(open_at, "unclosed character class"))?;
            if c == ']' && !first {
                self.pos += 1;
                break;
            }
            first = false;

            let lo = if c == '\\' {
                self.class_byte(self.here())?
            } else {
                self.pos += 1;
                self.codepoint_to_class_byte(at, c as u32)?
            };

            // range?
            if self.peek().map(|(_, c)| c) == Some('-')
                && self.chars.get(self.pos + 1).map(|(_, c)| *c) != Some(']')
                && self.chars.get(self.pos + 1).is_some()
            {
                self.pos += 1; // '-'
                let (hat, hc) = self.peek().unwrap();
                let hi = if hc == '\\' {
                    self.class_byte(hat)?
                } else {
                    self.pos += 1;
                    self.codepoint_to_class_byte(hat, hc as u32)?
                };
                if hi < lo {
                    return Err(ParseFailure::new(at, "character range out of order"));
                }
                for b in lo..=hi {
                    set.insert(b);
                }
            } else {
                set.insert(lo);
            }
        }

        if negated {
            set = set.complement();
        }
        if set.is_empty() {
            return Err(ParseFailure::new(open_at, "empty character class"));
        }
        let end = self.here();
        Ok(ParseNode::CharClass {
            set,
            label: Some(self.text[open_at..end].to_string()),
        })
    }

    fn class_byte(&mut self, at: usize) -> Result<u8, ParseFailure> {
        let cp = self.escape()?;
        self.codepoint_to_class_byte(at, cp)
    }

    fn codepoint_to_class_byte(&self, at: usize, cp: u32) -> Result<u8, ParseFailure> {
        u8::try_from(cp)
            .map_err(|_| ParseFailure::new(at, "codepoint above 0xFF in character class"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(c: char) -> ParseNode {
        ParseNode::literal(c as u32)
    }

    #[test]
    fn test_literal_concat() {
        let t = parse("ab").unwrap();
        assert_eq!(t.root, Some(ParseNode::cat(lit('a'), lit('b'))));
    }

    #[test]
    fn test_alternation_left_assoc() {
        let t = parse("a|b|c").unwrap();
        assert_eq!(
            t.root,
            Some(ParseNode::alt(ParseNode::alt(lit('a'), lit('b')), lit('c')))
        );
    }

    #[test]
    fn test_grouping_binds() {
        let t = parse("a(b|c)").unwrap();
        assert_eq!(
            t.root,
            Some(ParseNode::cat(lit('a'), ParseNode::alt(lit('b'), lit('c'))))
        );
    }

    #[test]
    fn test_postfix_forms() {
        assert_eq!(
            parse("a?").unwrap().root,
            Some(ParseNode::rep(lit('a'), 0, Some(1), true))
        );
        assert_eq!(
            parse("a*?").unwrap().root,
            Some(ParseNode::rep(lit('a'), 0, None, false))
        );
        assert_eq!(
            parse("a+").unwrap().root,
            Some(ParseNode::rep(lit('a'), 1, None, true))
        );
        assert_eq!(
            parse("a{2,5}?").unwrap().root,
            Some(ParseNode::rep(lit('a'), 2, Some(5), false))
        );
        assert_eq!(
            parse("a{3,}").unwrap().root,
            Some(ParseNode::rep(lit('a'), 3, None, true))
        );
        assert_eq!(
            parse("a{2}").unwrap().root,
            Some(ParseNode::rep(lit('a'), 2, Some(2), true))
        );
    }

    #[test]
    fn test_literal_brace() {
        // '{' not opening a count is an ordinary character
        let t = parse("a{x").unwrap();
        assert_eq!(
            t.root,
            Some(ParseNode::cat(ParseNode::cat(lit('a'), lit('{')), lit('x')))
        );
    }

    #[test]
    fn test_char_class() {
        let t = parse("[a-cz]").unwrap();
        match t.root.unwrap() {
            ParseNode::CharClass { set, label } => {
                let got: Vec<u8> = set.iter().collect();
                assert_eq!(got, vec![b'a', b'b', b'c', b'z']);
                assert_eq!(label.as_deref(), Some("[a-cz]"));
            }
            other => panic!("expected class, got {:?}", other),
        }
    }

    #[test]
    fn test_negated_class() {
        let t = parse("[^a]").unwrap();
        match t.root.unwrap() {
            ParseNode::CharClass { set, .. } => {
                assert_eq!(set.count(), 255);
                assert!(!set.contains(b'a'));
            }
            other => panic!("expected class, got {:?}", other),
        }
    }

    #[test]
    fn test_class_leading_bracket_literal() {
        let t = parse("[]a]").unwrap();
        match t.root.unwrap() {
            ParseNode::CharClass { set, .. } => {
                assert!(set.contains(b']'));
                assert!(set.contains(b'a'));
                assert_eq!(set.count(), 2);
            }
            other => panic!("expected class, got {:?}", other),
        }
    }

    #[test]
    fn test_escapes() {
        assert_eq!(parse("\\n").unwrap().root, Some(ParseNode::literal(0x0A)));
        assert_eq!(parse("\\x41").unwrap().root, Some(ParseNode::literal(0x41)));
        assert_eq!(
            parse("\\x{1F600}").unwrap().root,
            Some(ParseNode::literal(0x1F600))
        );
        assert_eq!(parse("\\.").unwrap().root, Some(ParseNode::literal(b'.' as u32)));
    }

    #[test]
    fn test_dot() {
        assert_eq!(parse(".").unwrap().root, Some(ParseNode::Dot));
    }

    #[test]
    fn test_empty_pattern_has_no_root() {
        assert_eq!(parse("").unwrap().root, None);
    }

    #[test]
    fn test_errors() {
        assert!(parse("(a").is_err());
        assert!(parse("a)").is_err());
        assert!(parse("*a").is_err());
        assert!(parse("a|").is_err());
        assert!(parse("[a").is_err());
        assert!(parse("[z-a]").is_err());
        assert!(parse("a{5,2}").is_err());
        assert!(parse("\\q").is_err());
        assert!(parse("a\\").is_err());
        assert!(parse("a{2000}").is_err());
        assert!(parse("[\\x{100}]").is_err());
    }

    #[test]
    fn test_error_position() {
        let err = parse("ab)cd").unwrap_err();
        assert_eq!(err.position, 2);
    }

    #[test]
    fn test_parse_fixed_is_literal() {
        let t = parse_fixed("a.b");
        assert_eq!(
            t.root,
            Some(ParseNode::cat(
                ParseNode::cat(lit('a'), lit('.')),
                lit('b')
            ))
        );
        assert_eq!(parse_fixed("").root, None);
    }
}
