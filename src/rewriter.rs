//! Parse-tree rewriting
//!
//! Three normalization passes run between parsing and NFA construction.
//! They matter for correctness, not just size: the trailing non-greedy
//! reduction is what gives `aa|b+?` its unit-width `b` hits, and the
//! empty-subtree reduction is what lets `ab{0}c` compile at all.
//!
//! 1. Subtrees that can match *only* the empty string are removed:
//!    `ST{0}` and `T{0}S` become `S`, `S|T{0}` becomes `S?`, and a
//!    pattern that is entirely empty-matching loses its root.
//! 2. Useless repetitions: `T{1,1}` and `T{1,1}?` are spliced out;
//!    `T{n}?` means the same as `T{n}`.
//! 3. A non-greedy repetition in trailing position, followed only by
//!    subpatterns admitting the empty string, can never match more than
//!    its minimum: `S{n,m}?` reduces to `S{n}`.

use crate::parsetree::{ParseNode, ParseTree};

/// Can `n` match the empty string?
pub fn has_zero_length_match(n: &ParseNode) -> bool {
    match n {
        ParseNode::Alternation { left, right } => {
            has_zero_length_match(left) || has_zero_length_match(right)
        }
        ParseNode::Concatenation { left, right } => {
            has_zero_length_match(left) && has_zero_length_match(right)
        }
        ParseNode::Repetition { node, min, .. } => *min == 0 || has_zero_length_match(node),
        ParseNode::Dot | ParseNode::CharClass { .. } | ParseNode::Literal { .. } => false,
    }
}

/// Would `n` match the empty string ahead of any longer alternative?
pub fn prefers_zero_length_match(n: &ParseNode) -> bool {
    match n {
        // left has priority, so the right branch never decides
        ParseNode::Alternation { left, .. } => prefers_zero_length_match(left),
        ParseNode::Concatenation { left, right } => {
            prefers_zero_length_match(left) && prefers_zero_length_match(right)
        }
        ParseNode::Repetition {
            node,
            min,
            max,
            greedy,
        } => {
            if *greedy {
                *max == Some(0) || prefers_zero_length_match(node)
            } else {
                *min == 0 || prefers_zero_length_match(node)
            }
        }
        ParseNode::Dot | ParseNode::CharClass { .. } | ParseNode::Literal { .. } => false,
    }
}

/// Can `n` match *nothing but* the empty string?
pub fn has_only_zero_length_match(n: &ParseNode) -> bool {
    match n {
        // left has priority; a preferred empty left starves the right
        ParseNode::Alternation { left, .. } => has_only_zero_length_match(left),
        ParseNode::Concatenation { left, right } => {
            has_only_zero_length_match(left) && has_only_zero_length_match(right)
        }
        ParseNode::Repetition {
            node, min, max, ..
        } => (*min == 0 && *max == Some(0)) || has_only_zero_length_match(node),
        ParseNode::Dot | ParseNode::CharClass { .. } | ParseNode::Literal { .. } => false,
    }
}

/// Remove subtrees that admit only zero-length matches.
///
/// Returns true if anything changed. The tree's root becomes None when
/// the whole pattern reduces away.
pub fn reduce_empty_subtrees(tree: &mut ParseTree) -> bool {
    let mut changed = false;
    if let Some(root) = tree.root.take() {
        tree.root = reduce_empty(root, &mut changed);
    }
    changed
}

fn reduce_empty(n: ParseNode, changed: &mut bool) -> Option<ParseNode> {
    if has_only_zero_length_match(&n) {
        *changed = true;
        return None;
    }
    Some(match n {
        ParseNode::Alternation { left, right } => {
            // the top check looked at the left branch, so it survives
            let left = reduce_empty(*left, changed).expect("left branch admits real matches");
            match reduce_empty(*right, changed) {
                Some(right) => ParseNode::alt(left, right),
                // S|T{0} = S?
                None => ParseNode::rep(left, 0, Some(1), true),
            }
        }
        ParseNode::Concatenation { left, right } => {
            match (reduce_empty(*left, changed), reduce_empty(*right, changed)) {
                (Some(l), Some(r)) => ParseNode::cat(l, r),
                (Some(l), None) => l,
                (None, Some(r)) => r,
                (None, None) => unreachable!("caught by the empty-only check"),
            }
        }
        ParseNode::Repetition {
            node,
            min,
            max,
            greedy,
        } => {
            let node = reduce_empty(*node, changed).expect("caught by the empty-only check");
            ParseNode::rep(node, min, max, greedy)
        }
        leaf => leaf,
    })
}

/// Splice out `T{1,1}` / `T{1,1}?` and rewrite `T{n}?` to `T{n}`.
pub fn reduce_useless_repetitions(tree: &mut ParseTree) -> bool {
    let mut changed = false;
    if let Some(root) = tree.root.take() {
        tree.root = Some(reduce_useless(root, &mut changed));
    }
    changed
}

fn reduce_useless(n: ParseNode, changed: &mut bool) -> ParseNode {
    match n {
        ParseNode::Repetition {
            node,
            min: 1,
            max: Some(1),
            ..
        } => {
            *changed = true;
            // recurse, to handle nested repetitions
            reduce_useless(*node, changed)
        }
        ParseNode::Repetition {
            node,
            min,
            max,
            greedy: false,
        } if Some(min) == max => {
            *changed = true;
            ParseNode::rep(reduce_useless(*node, changed), min, max, true)
        }
        ParseNode::Repetition {
            node,
            min,
            max,
            greedy,
        } => ParseNode::rep(reduce_useless(*node, changed), min, max, greedy),
        ParseNode::Alternation { left, right } => ParseNode::alt(
            reduce_useless(*left, changed),
            reduce_useless(*right, changed),
        ),
        ParseNode::Concatenation { left, right } => ParseNode::cat(
            reduce_useless(*left, changed),
            reduce_useless(*right, changed),
        ),
        leaf => leaf,
    }
}

/// Reduce trailing non-greedy repetitions: as a postfix, `S{n,m}?T` with
/// `T` admitting zero-length matches is `S{n}T`, and bare `S{n,m}?` is
/// the special case `T = R{0}`.
pub fn reduce_trailing_nongreedy(tree: &mut ParseTree) -> bool {
    let mut changed = false;
    if let Some(root) = tree.root.take() {
        tree.root = Some(reduce_trailing(root, true, &mut changed));
    }
    changed
}

fn reduce_trailing(n: ParseNode, trailing: bool, changed: &mut bool) -> ParseNode {
    match n {
        ParseNode::Repetition {
            node,
            min,
            max: _,
            greedy: false,
        } if trailing => {
            *changed = true;
            ParseNode::rep(reduce_trailing(*node, trailing, changed), min, Some(min), true)
        }
        ParseNode::Repetition {
            node,
            min,
            max,
            greedy,
        } => ParseNode::rep(reduce_trailing(*node, trailing, changed), min, max, greedy),
        ParseNode::Alternation { left, right } => ParseNode::alt(
            reduce_trailing(*left, trailing, changed),
            reduce_trailing(*right, trailing, changed),
        ),
        ParseNode::Concatenation { left, right } => {
            let left_trailing = trailing && has_zero_length_match(&right);
            let left = reduce_trailing(*left, left_trailing, changed);
            let right = reduce_trailing(*right, trailing, changed);
            ParseNode::cat(left, right)
        }
        leaf => leaf,
    }
}

/// Run all rewrite passes to a fixed point. Returns true if the tree
/// changed at all.
pub fn rewrite(tree: &mut ParseTree) -> bool {
    let mut any = false;
    loop {
        let mut changed = reduce_empty_subtrees(tree);
        changed |= reduce_useless_repetitions(tree);
        changed |= reduce_trailing_nongreedy(tree);
        if !changed {
            return any;
        }
        any = true;
    }
}
