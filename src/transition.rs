//! Single-byte transition predicates
//!
//! Every non-start NFA vertex owns exactly one `Transition`: the predicate
//! a byte must satisfy to *enter* that vertex. The original design was a
//! virtual class hierarchy lowered by placement-new into a packed buffer;
//! here it is a tagged enum whose `lower` appends to a `Vec<Instruction>`.

use crate::byteset::ByteSet;
use crate::instruction::Instruction;
use std::fmt;

/// A byte predicate attached to an NFA vertex
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Transition {
    /// Exactly one byte
    Lit(u8),
    /// Either of two bytes; the common shape for case-folded ASCII pairs
    Either(u8, u8),
    /// An inclusive byte range
    Range(u8, u8),
    /// An arbitrary byte set, with an optional human-readable label for
    /// graph output (e.g. the source character-class text)
    Set(ByteSet, Option<String>),
}

impl Transition {
    /// Build the narrowest transition holding exactly `set`.
    ///
    /// Narrowing order: single byte, two bytes, contiguous range, full
    /// set. The set must not be empty.
    pub fn from_byte_set(set: ByteSet, label: Option<String>) -> Transition {
        debug_assert!(!set.is_empty(), "empty transition byte set");
        match set.count() {
            1 => Transition::Lit(set.min().unwrap()),
            2 => {
                let mut it = set.iter();
                Transition::Either(it.next().unwrap(), it.next().unwrap())
            }
            _ if set.is_contiguous() => Transition::Range(set.min().unwrap(), set.max().unwrap()),
            _ => Transition::Set(set, label),
        }
    }

    /// Does `b` satisfy this predicate?
    #[inline]
    pub fn matches(&self, b: u8) -> bool {
        match self {
            Transition::Lit(x) => b == *x,
            Transition::Either(x, y) => b == *x || b == *y,
            Transition::Range(lo, hi) => *lo <= b && b <= *hi,
            Transition::Set(set, _) => set.contains(b),
        }
    }

    /// The full set of accepted bytes
    pub fn accepted_bytes(&self) -> ByteSet {
        match self {
            Transition::Lit(x) => ByteSet::single(*x),
            Transition::Either(x, y) => {
                let mut s = ByteSet::single(*x);
                s.insert(*y);
                s
            }
            Transition::Range(lo, hi) => ByteSet::range(*lo, *hi),
            Transition::Set(set, _) => *set,
        }
    }

    /// Union the accepted bytes into `out`
    pub fn or_bytes(&self, out: &mut ByteSet) {
        match self {
            Transition::Lit(x) => out.insert(*x),
            Transition::Either(x, y) => {
                out.insert(*x);
                out.insert(*y);
            }
            Transition::Range(lo, hi) => {
                for b in *lo..=*hi {
                    out.insert(b);
                }
            }
            Transition::Set(set, _) => out.union_with(set),
        }
    }

    /// Number of code words `lower` will emit
    pub fn num_instructions(&self) -> usize {
        match self.narrowed() {
            Transition::Set(..) => 9,
            _ => 1,
        }
    }

    /// The narrowest equivalent transition
    fn narrowed(&self) -> Transition {
        match self {
            Transition::Set(set, label) => Transition::from_byte_set(*set, label.clone()),
            other => other.clone(),
        }
    }

    /// Append the matching instruction(s) for this predicate.
    ///
    /// Demotes to the narrowest form first, so a `Set` holding one byte
    /// emits a plain `LIT`. Returns the number of words appended.
    pub fn lower(&self, out: &mut Vec<Instruction>) -> usize {
        match self.narrowed() {
            Transition::Lit(b) => {
                out.push(Instruction::lit(b));
                1
            }
            Transition::Either(b1, b2) => {
                out.push(Instruction::either(b1, b2));
                1
            }
            Transition::Range(lo, hi) => {
                out.push(Instruction::range(lo, hi));
                1
            }
            Transition::Set(set, _) => {
                out.push(Instruction::bit_vector());
                for w in set.words() {
                    out.push(Instruction::raw((*w & 0xFFFF_FFFF) as u32));
                    out.push(Instruction::raw((*w >> 32) as u32));
                }
                9
            }
        }
    }

    /// Short human-readable form for Graphviz output
    pub fn display_label(&self) -> String {
        fn ch(b: u8) -> String {
            if b.is_ascii_graphic() || b == b' ' {
                (b as char).to_string()
            } else {
                format!("\\x{:02x}", b)
            }
        }
        match self {
            Transition::Lit(b) => ch(*b),
            Transition::Either(b1, b2) => format!("{}|{}", ch(*b1), ch(*b2)),
            Transition::Range(lo, hi) => format!("[{}-{}]", ch(*lo), ch(*hi)),
            Transition::Set(_, Some(label)) => label.clone(),
            Transition::Set(set, None) => format!("{:?}", set),
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_label())
    }
}
