//! Parse tree to NFA
//!
//! A Thompson-style position-automaton builder: fragments carry the set of
//! entry vertices, the set of exit vertices, and whether the whole
//! fragment can be skipped. Since predicates live on vertices, there are
//! no epsilon edges; skippability and alternation priority are expressed
//! entirely through which vertices end up in the in/out lists and the
//! order edges are appended.
//!
//! Greediness is edge order. A greedy repetition adds its loop edges as
//! soon as the repetition is built, so they precede any continuation edge
//! appended later; a non-greedy repetition parks its loop edges on the
//! fragment and the concatenation flushes them after the continuation
//! edges go in. `a+?b` therefore ends up with the `b` edge ahead of the
//! self-loop, which is exactly what makes the VM prefer the short match.

use crate::byteset::ByteSet;
use crate::encoder::{case_folds, encoder_by_name, fold_byte_set, Chain, Encoder};
use crate::error::Error;
use crate::graph::{Graph, VertexId};
use crate::parsetree::{ParseNode, ParseTree};
use crate::pattern::Pattern;
use crate::rewriter::has_zero_length_match;
use crate::transition::Transition;
use log::trace;

/// An in-construction subgraph
#[derive(Debug, Clone, Default)]
struct Fragment {
    /// Entry vertices, in priority order
    in_list: Vec<VertexId>,
    /// Exit vertices
    out_list: Vec<VertexId>,
    /// The fragment can match zero bytes
    skippable: bool,
    /// When skippable, the skip path outranks the fragment (non-greedy)
    prefer_skip: bool,
    /// Loop edges waiting for their continuation edges to be appended
    /// first (non-greedy repetitions)
    deferred: Vec<(VertexId, VertexId)>,
}

fn push_unique(list: &mut Vec<VertexId>, v: VertexId) {
    if !list.contains(&v) {
        list.push(v);
    }
}

fn extend_unique(list: &mut Vec<VertexId>, add: &[VertexId]) {
    for &v in add {
        push_unique(list, v);
    }
}

/// Builds one (pattern, encoding) pair's NFA
///
/// A pattern with several encodings compiles to one NFA per encoding,
/// alternated by the graph merge; chains never mix encodings, so a hit
/// is always a well-formed byte sequence of exactly one encoding.
pub struct NfaBuilder {
    graph: Graph,
    label: u32,
    case_insensitive: bool,
    encoder: &'static dyn Encoder,
    // error context
    user_index: u64,
    expression: String,
}

impl NfaBuilder {
    /// Build the NFA for `pattern` under `encoding` from its rewritten
    /// parse tree; `label` tags the match states.
    pub fn build(
        pattern: &Pattern,
        tree: &ParseTree,
        encoding: &str,
        label: u32,
    ) -> Result<Graph, Error> {
        let root = match &tree.root {
            Some(root) => root,
            None => {
                return Err(Error::EmptyPattern {
                    user_index: pattern.user_index,
                    expression: pattern.expression.clone(),
                })
            }
        };
        if has_zero_length_match(root) {
            return Err(Error::EmptyPattern {
                user_index: pattern.user_index,
                expression: pattern.expression.clone(),
            });
        }

        let encoder = encoder_by_name(encoding).ok_or_else(|| Error::UnknownEncoding {
            user_index: pattern.user_index,
            encoding: encoding.to_string(),
        })?;

        let mut builder = NfaBuilder {
            graph: Graph::new(),
            label,
            case_insensitive: pattern.case_insensitive,
            encoder,
            user_index: pattern.user_index,
            expression: pattern.expression.clone(),
        };

        let mut frag = builder.node(root)?;
        if frag.skippable {
            // the start vertex would be a match
            return Err(Error::EmptyPattern {
                user_index: pattern.user_index,
                expression: pattern.expression.clone(),
            });
        }

        for &v in &frag.in_list {
            builder.graph.add_edge_dedup(0, v);
        }
        builder.flush(&mut frag);
        for &v in &frag.out_list {
            let info = builder.graph.vertex_mut(v);
            info.is_match = true;
            info.label = builder.label;
        }

        trace!(
            "built NFA for pattern {}: {} vertices",
            pattern.user_index,
            builder.graph.num_vertices()
        );
        Ok(builder.graph)
    }

    fn flush(&mut self, frag: &mut Fragment) {
        for (u, v) in frag.deferred.drain(..) {
            self.graph.add_edge_dedup(u, v);
        }
    }

    fn node(&mut self, n: &ParseNode) -> Result<Fragment, Error> {
        match n {
            ParseNode::Alternation { left, right } => {
                let f1 = self.node(left)?;
                let f2 = self.node(right)?;
                Ok(self.alternate(f1, f2))
            }
            ParseNode::Concatenation { left, right } => {
                let f1 = self.node(left)?;
                let f2 = self.node(right)?;
                Ok(self.concatenate(f1, f2))
            }
            ParseNode::Repetition {
                node,
                min,
                max,
                greedy,
            } => self.repeat(node, *min, *max, *greedy),
            ParseNode::Dot => {
                let chains = self.encoder.encode_range(0, self.encoder.max_codepoint());
                Ok(self.splice_chains(chains, Some(".".to_string())))
            }
            ParseNode::CharClass { set, label } => {
                let set = if self.case_insensitive {
                    fold_byte_set(set)
                } else {
                    *set
                };
                let mut chains = Vec::new();
                for (lo, hi) in byte_set_runs(&set) {
                    chains.extend(self.encoder.encode_range(lo as u32, hi as u32));
                }
                Ok(self.splice_chains(chains, label.clone()))
            }
            ParseNode::Literal { codepoint } => self.literal(*codepoint),
        }
    }

    fn literal(&mut self, cp: u32) -> Result<Fragment, Error> {
        let cps = if self.case_insensitive {
            case_folds(cp)
        } else {
            vec![cp]
        };
        let mut chains = Vec::new();
        let mut representable = false;
        for &fold in &cps {
            if let Some(alts) = self.encoder.encode_codepoint(fold) {
                chains.extend(alts);
                // only the original codepoint is mandatory; folds
                // outside the encoder's range are skipped
                if fold == cp {
                    representable = true;
                }
            }
        }
        if !representable {
            return Err(Error::NonRepresentable {
                user_index: self.user_index,
                expression: self.expression.clone(),
                encoding: self.encoder.name().to_string(),
                codepoint: cp,
            });
        }
        Ok(self.splice_chains(chains, None))
    }

    /// Splice encoder chains into the graph: one vertex per chain
    /// position, single-byte chains merged into one vertex.
    fn splice_chains(&mut self, chains: Vec<Chain>, label: Option<String>) -> Fragment {
        let mut frag = Fragment::default();

        let mut singles = ByteSet::new();
        for chain in &chains {
            if chain.len() == 1 {
                singles.union_with(&chain[0].to_byte_set());
            }
        }
        if !singles.is_empty() {
            let v = self
                .graph
                .add_vertex(Transition::from_byte_set(singles, label));
            frag.in_list.push(v);
            frag.out_list.push(v);
        }

        for chain in &chains {
            if chain.len() < 2 {
                continue;
            }
            let mut prev = None;
            let mut head = 0;
            for range in chain {
                let v = self
                    .graph
                    .add_vertex(Transition::from_byte_set(range.to_byte_set(), None));
                match prev {
                    None => head = v,
                    Some(p) => self.graph.add_edge(p, v),
                }
                prev = Some(v);
            }
            frag.in_list.push(head);
            frag.out_list.push(prev.unwrap());
        }

        debug_assert!(!frag.in_list.is_empty(), "encoder produced no chains");
        frag
    }

    fn alternate(&mut self, f1: Fragment, f2: Fragment) -> Fragment {
        let mut frag = Fragment {
            in_list: f1.in_list,
            out_list: f1.out_list,
            skippable: f1.skippable || f2.skippable,
            prefer_skip: f1.prefer_skip || f2.prefer_skip,
            deferred: f1.deferred,
        };
        extend_unique(&mut frag.in_list, &f2.in_list);
        extend_unique(&mut frag.out_list, &f2.out_list);
        frag.deferred.extend(f2.deferred);
        frag
    }

    fn concatenate(&mut self, mut f1: Fragment, f2: Fragment) -> Fragment {
        for &u in &f1.out_list {
            for &v in &f2.in_list {
                self.graph.add_edge_dedup(u, v);
            }
        }
        if !f2.skippable {
            // f1's exits are sealed; any parked loop edges now trail the
            // continuation edges just added
            self.flush(&mut f1);
        }

        let in_list = if f1.skippable {
            let mut list = Vec::new();
            if f1.prefer_skip {
                extend_unique(&mut list, &f2.in_list);
                extend_unique(&mut list, &f1.in_list);
            } else {
                extend_unique(&mut list, &f1.in_list);
                extend_unique(&mut list, &f2.in_list);
            }
            list
        } else {
            f1.in_list
        };

        let out_list = if f2.skippable {
            let mut list = f2.out_list;
            extend_unique(&mut list, &f1.out_list);
            list
        } else {
            f2.out_list
        };

        let mut deferred = f1.deferred;
        deferred.extend(f2.deferred);

        Fragment {
            in_list,
            out_list,
            skippable: f1.skippable && f2.skippable,
            prefer_skip: f1.prefer_skip || f2.prefer_skip,
            deferred,
        }
    }

    fn repeat(
        &mut self,
        child: &ParseNode,
        min: u32,
        max: Option<u32>,
        greedy: bool,
    ) -> Result<Fragment, Error> {
        // unroll the mandatory copies
        let mut acc: Option<Fragment> = None;
        let mut last_in: Vec<VertexId> = Vec::new();
        for _ in 0..min {
            let c = self.node(child)?;
            last_in = c.in_list.clone();
            acc = Some(match acc {
                None => c,
                Some(a) => self.concatenate(a, c),
            });
        }

        match max {
            None => {
                // the plus: loop every exit back to the final copy's entries
                let (mut frag, loop_targets) = match acc {
                    Some(a) => (a, last_in),
                    None => {
                        let c = self.node(child)?;
                        let targets = c.in_list.clone();
                        (c, targets)
                    }
                };
                let mut loops = Vec::new();
                for &u in &frag.out_list {
                    for &v in &loop_targets {
                        loops.push((u, v));
                    }
                }
                if greedy {
                    for (u, v) in loops {
                        self.graph.add_edge_dedup(u, v);
                    }
                } else {
                    frag.deferred.extend(loops);
                }
                frag.skippable = frag.skippable || min == 0;
                if min == 0 {
                    frag.prefer_skip = frag.prefer_skip || !greedy;
                }
                Ok(frag)
            }
            Some(m) => {
                // append optional copies; every accumulated exit can enter
                // the next copy or stop
                for _ in min..m {
                    let c = self.node(child)?;
                    acc = Some(match acc {
                        None => {
                            let mut c = c;
                            c.skippable = true;
                            c.prefer_skip = c.prefer_skip || !greedy;
                            c
                        }
                        Some(mut a) => {
                            let mut entries = Vec::new();
                            for &u in &a.out_list {
                                for &v in &c.in_list {
                                    entries.push((u, v));
                                }
                            }
                            if greedy {
                                for (u, v) in entries {
                                    self.graph.add_edge_dedup(u, v);
                                }
                            } else {
                                a.deferred.extend(entries);
                            }
                            a.deferred.extend(c.deferred);
                            extend_unique(&mut a.out_list, &c.out_list);
                            a
                        }
                    });
                }
                // min == max == 0 cannot reach here: the rewriter prunes it
                Ok(acc.expect("rewriter removed zero-width repetitions"))
            }
        }
    }
}

/// Contiguous runs of a byte set, ascending
fn byte_set_runs(set: &ByteSet) -> Vec<(u8, u8)> {
    let mut runs = Vec::new();
    let mut it = set.iter().peekable();
    while let Some(lo) = it.next() {
        let mut hi = lo;
        while it.peek() == Some(&hi.wrapping_add(1)) {
            hi = it.next().unwrap();
        }
        runs.push((lo, hi));
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::rewriter::rewrite;

    fn build(pattern: &str) -> Graph {
        try_build(pattern).unwrap()
    }

    fn try_build(pattern: &str) -> Result<Graph, Error> {
        build_with(&Pattern::new(pattern, 0), "ASCII")
    }

    fn build_with(pattern: &Pattern, encoding: &str) -> Result<Graph, Error> {
        let mut tree = parse(&pattern.expression).unwrap();
        rewrite(&mut tree);
        NfaBuilder::build(pattern, &tree, encoding, 0)
    }

    #[test]
    fn test_a_or_b() {
        let g = build("a|b");
        assert_eq!(g.num_vertices(), 3);
        assert_eq!(g.out_degree(0), 2);
        assert_eq!(g.out_degree(1), 0);
        assert_eq!(g.out_degree(2), 0);
        assert!(g.vertex(1).is_match);
        assert!(g.vertex(2).is_match);
    }

    #[test]
    fn test_a_or_b_or_c() {
        let g = build("a|b|c");
        assert_eq!(g.num_vertices(), 4);
        assert_eq!(g.out_degree(0), 3);
        for v in 1..4 {
            assert_eq!(g.out_degree(v), 0);
            assert!(g.vertex(v).is_match);
        }
    }

    #[test]
    fn test_ab() {
        let g = build("ab");
        assert_eq!(g.num_vertices(), 3);
        assert_eq!(g.out_degree(0), 1);
        assert_eq!(g.out_degree(1), 1);
        assert_eq!(g.out_degree(2), 0);
        assert!(!g.vertex(1).is_match);
        assert!(g.vertex(2).is_match);
    }

    #[test]
    fn test_alternation_and_concatenation() {
        let g = build("a|bc");
        assert_eq!(g.num_vertices(), 4);
        assert_eq!(g.out_degree(0), 2);
        assert_eq!(g.out_degree(1), 0);
        assert_eq!(g.out_degree(2), 1);
        assert_eq!(g.out_degree(3), 0);
        assert!(g.vertex(1).is_match);
        assert!(!g.vertex(2).is_match);
        assert!(g.vertex(3).is_match);
    }

    #[test]
    fn test_group() {
        let g = build("a(b|c)");
        assert_eq!(g.num_vertices(), 4);
        assert_eq!(g.out_degree(0), 1);
        assert_eq!(g.out_degree(1), 2);
        assert_eq!(g.out_degree(2), 0);
        assert_eq!(g.out_degree(3), 0);
    }

    #[test]
    fn test_trailing_question() {
        // ab? : both the a and the b vertices are matches
        let g = build("ab?");
        assert_eq!(g.num_vertices(), 3);
        assert_eq!(g.out_degree(0), 1);
        assert_eq!(g.out_degree(1), 1);
        assert_eq!(g.out_degree(2), 0);
        assert!(g.vertex(1).is_match);
        assert!(g.vertex(2).is_match);
    }

    #[test]
    fn test_question_first() {
        let g = build("a?b");
        assert_eq!(g.num_vertices(), 3);
        assert_eq!(g.out_degree(0), 2);
        assert_eq!(g.out_degree(1), 1);
        assert_eq!(g.out_degree(2), 0);
        // greedy: the a path outranks the skip
        assert_eq!(g.out_vertices(0), &[1, 2]);
        assert!(!g.vertex(1).is_match);
        assert!(g.vertex(2).is_match);
    }

    #[test]
    fn test_nongreedy_question_first() {
        // a??b : the skip path outranks the a path
        let g = build("a??b");
        assert_eq!(g.num_vertices(), 3);
        assert_eq!(g.out_degree(0), 2);
        assert_eq!(g.out_vertices(0), &[2, 1]);
    }

    #[test]
    fn test_two_question_marks() {
        let g = build("ab?c?d");
        assert_eq!(g.num_vertices(), 5);
        assert_eq!(g.out_degree(0), 1);
        assert_eq!(g.in_degree(0), 0);
        // a: enter b, skip to c, skip to d
        assert_eq!(g.out_degree(1), 3);
        assert_eq!(g.in_degree(1), 1);
        // b?
        assert_eq!(g.out_degree(2), 2);
        assert_eq!(g.in_degree(2), 1);
        // c?
        assert_eq!(g.out_degree(3), 1);
        assert_eq!(g.in_degree(3), 2);
        // d
        assert_eq!(g.out_degree(4), 0);
        assert_eq!(g.in_degree(4), 3);
    }

    #[test]
    fn test_plus() {
        let g = build("a+");
        assert_eq!(g.num_vertices(), 2);
        assert_eq!(g.out_degree(0), 1);
        assert_eq!(g.in_degree(0), 0);
        assert_eq!(g.out_degree(1), 1);
        assert_eq!(g.in_degree(1), 2);
        assert!(g.vertex(1).is_match);
    }

    #[test]
    fn test_nongreedy_plus_then_literal() {
        // a+?b : continuation edge ahead of the loop edge
        let g = build("a+?b");
        assert_eq!(g.num_vertices(), 3);
        assert_eq!(g.out_degree(0), 1);
        assert_eq!(g.out_vertex(0, 0), 1);
        assert_eq!(g.in_degree(1), 2);
        assert_eq!(g.out_degree(1), 2);
        assert_eq!(g.out_vertex(1, 0), 2);
        assert_eq!(g.out_vertex(1, 1), 1);
        assert_eq!(g.in_degree(2), 1);
        assert_eq!(g.out_degree(2), 0);
        assert!(!g.vertex(1).is_match);
        assert!(g.vertex(2).is_match);
    }

    #[test]
    fn test_greedy_plus_then_literal() {
        // a+b : loop edge ahead of the continuation edge
        let g = build("a+b");
        assert_eq!(g.out_vertices(1), &[1, 2]);
    }

    #[test]
    fn test_star_inside() {
        let g = build("ab*c");
        assert_eq!(g.num_vertices(), 4);
        assert_eq!(g.out_degree(0), 1);
        assert_eq!(g.out_degree(1), 2);
        assert_eq!(g.out_degree(2), 2);
        assert_eq!(g.in_degree(2), 2);
        assert_eq!(g.out_degree(3), 0);
        assert_eq!(g.in_degree(3), 2);
    }

    #[test]
    fn test_counted_repetition() {
        let g = build("a{2}b");
        // 0 -> a -> a -> b(match)
        assert_eq!(g.num_vertices(), 4);
        assert_eq!(g.out_degree(1), 1);
        assert_eq!(g.out_degree(2), 1);
        assert!(g.vertex(3).is_match);
    }

    #[test]
    fn test_counted_range_repetition() {
        let g = build("b{1,3}");
        // b -> b -> b, every copy a match, plus skip edges
        assert_eq!(g.num_vertices(), 4);
        assert!(g.vertex(1).is_match);
        assert!(g.vertex(2).is_match);
        assert!(g.vertex(3).is_match);
        // first copy reaches both later copies
        assert_eq!(g.out_degree(1), 2);
    }

    #[test]
    fn test_unbounded_min_repetition() {
        let g = build("b{2,}");
        assert_eq!(g.num_vertices(), 3);
        assert!(!g.vertex(1).is_match);
        assert!(g.vertex(2).is_match);
        // the final copy loops to itself
        assert!(g.has_edge(2, 2));
    }

    #[test]
    fn test_empty_patterns_rejected() {
        assert!(matches!(try_build("a?"), Err(Error::EmptyPattern { .. })));
        assert!(matches!(try_build("aa|b?"), Err(Error::EmptyPattern { .. })));
        assert!(matches!(try_build("a*"), Err(Error::EmptyPattern { .. })));
        assert!(matches!(try_build(""), Err(Error::EmptyPattern { .. })));
        assert!(matches!(try_build("a{0}"), Err(Error::EmptyPattern { .. })));
    }

    #[test]
    fn test_case_fold_single_vertex() {
        let g = build_with(&Pattern::new("a", 0).case_insensitive(true), "ASCII").unwrap();
        assert_eq!(g.num_vertices(), 2);
        let t = g.vertex(1).trans.as_ref().unwrap();
        assert!(t.matches(b'a'));
        assert!(t.matches(b'A'));
        assert!(!t.matches(b'b'));
    }

    #[test]
    fn test_class_is_single_vertex() {
        let g = build("[bch]at");
        assert_eq!(g.num_vertices(), 4);
        let t = g.vertex(1).trans.as_ref().unwrap();
        assert!(t.matches(b'b') && t.matches(b'c') && t.matches(b'h'));
        assert!(!t.matches(b'a'));
    }

    #[test]
    fn test_utf8_literal_chain() {
        // U+20AC is three bytes in UTF-8
        let g = build_with(&Pattern::new("\\x{20AC}", 0), "UTF-8").unwrap();
        assert_eq!(g.num_vertices(), 4);
        assert_eq!(g.out_degree(0), 1);
        assert!(g.vertex(3).is_match);
        assert!(g.vertex(1).trans.as_ref().unwrap().matches(0xE2));
    }

    #[test]
    fn test_utf16_literal_chain() {
        // 'a' in UTF-16LE is 61 00
        let g = build_with(&Pattern::new("a", 0), "UTF-16LE").unwrap();
        assert_eq!(g.num_vertices(), 3);
        assert!(g.vertex(1).trans.as_ref().unwrap().matches(0x61));
        assert!(g.vertex(2).trans.as_ref().unwrap().matches(0x00));
        assert!(g.vertex(2).is_match);
    }

    #[test]
    fn test_nonrepresentable() {
        let p = Pattern::new("\\x{20AC}", 5);
        let err = build_with(&p, "ASCII").unwrap_err();
        match err {
            Error::NonRepresentable {
                user_index,
                codepoint,
                ..
            } => {
                assert_eq!(user_index, 5);
                assert_eq!(codepoint, 0x20AC);
            }
            other => panic!("expected NonRepresentable, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_encoding() {
        let p = Pattern::new("a", 1).with_encodings(["EBCDIC"]);
        let err = build_with(&p, "EBCDIC").unwrap_err();
        assert!(matches!(err, Error::UnknownEncoding { .. }));
    }

    #[test]
    fn test_match_labels_assigned() {
        let p = Pattern::new("ab", 0);
        let mut tree = parse("ab").unwrap();
        rewrite(&mut tree);
        let g = NfaBuilder::build(&p, &tree, "ASCII", 9).unwrap();
        assert_eq!(g.vertex(2).label, 9);
        assert_eq!(g.vertex(1).label, crate::instruction::UNSET);
    }
}
