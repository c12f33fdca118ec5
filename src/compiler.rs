//! NFA-level compilation passes
//!
//! Three stages sit between the per-pattern NFAs and code generation:
//!
//! 1. `merge_into_fsm` folds each pattern's NFA into the accumulated
//!    machine, sharing deterministic prefix paths trie-style. Vertices
//!    merge only when their predicates, labels, and match flags agree and
//!    both sit on a unique path from the root, which keeps the merge
//!    language-preserving.
//! 2. `label_guard_states` propagates pattern labels backward from match
//!    states onto every vertex whose continuations are owned by a single
//!    pattern, then strips labels that are implied by all predecessors.
//!    What survives is the label *frontier*: exactly the spots where the
//!    generated code must emit a LABEL instruction.
//! 3. `subset_dfa` runs a bounded subset determinization. Reached subsets
//!    become vertices keyed by their ordered member list, preserving
//!    alternation priority; members that disagree on label or match flag
//!    are split rather than collapsed. Past the exploration depth the
//!    original NFA subgraph is spliced in unchanged.

use crate::byteset::ByteSet;
use crate::graph::{Graph, VertexId};
use crate::instruction::UNSET;
use log::debug;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;

/// Knobs for the compilation pipeline
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Run bounded subset determinization
    pub determinize: bool,
    /// Subset exploration depth before splicing the NFA verbatim
    pub determinize_depth: u32,
    /// Encodings used for patterns that do not name their own
    pub default_encodings: Vec<String>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            determinize: true,
            determinize_depth: 10,
            default_encodings: vec!["ASCII".to_string()],
        }
    }
}

/// Graph-to-graph compilation passes
pub struct Compiler;

impl Compiler {
    /// Merge `src` into `dst`, sharing prefix structure where safe.
    pub fn merge_into_fsm(dst: &mut Graph, src: &Graph) {
        let mut src2dst: Vec<Option<VertexId>> = vec![None; src.num_vertices()];
        src2dst[0] = Some(0);
        let mut queue: VecDeque<VertexId> = VecDeque::new();
        queue.push_back(0);

        while let Some(u) = queue.pop_front() {
            let du = src2dst[u as usize].expect("queued vertices are mapped");
            for &v in src.out_vertices(u) {
                if let Some(dv) = src2dst[v as usize] {
                    dst.add_edge_dedup(du, dv);
                    continue;
                }
                let merged = dst
                    .out_vertices(du)
                    .iter()
                    .copied()
                    .find(|&c| Self::can_merge(dst, c, src, v));
                let dv = match merged {
                    Some(c) => {
                        dst.add_edge_dedup(du, c);
                        c
                    }
                    None => {
                        let info = src.vertex(v);
                        let nv = dst.add_vertex(
                            info.trans.clone().expect("non-start vertices carry predicates"),
                        );
                        dst.vertex_mut(nv).label = info.label;
                        dst.vertex_mut(nv).is_match = info.is_match;
                        dst.add_edge(du, nv);
                        nv
                    }
                };
                src2dst[v as usize] = Some(dv);
                queue.push_back(v);
            }
        }
    }

    /// May src vertex `v` share dst vertex `c`?
    ///
    /// Requires equal byte sets, labels, and match flags, and a unique
    /// path from the root on both sides (in-degree one, which also rules
    /// out loop heads). The unique-path invariant is what makes sharing
    /// sound: any input reaching the shared vertex corresponds to the
    /// same prefix in every owning pattern.
    fn can_merge(dst: &Graph, c: VertexId, src: &Graph, v: VertexId) -> bool {
        if dst.in_degree(c) != 1 || src.in_degree(v) != 1 {
            return false;
        }
        let ci = dst.vertex(c);
        let vi = src.vertex(v);
        ci.label == vi.label
            && ci.is_match == vi.is_match
            && match (&ci.trans, &vi.trans) {
                (Some(a), Some(b)) => a.accepted_bytes() == b.accepted_bytes(),
                _ => false,
            }
    }

    /// Label propagation followed by minimization; see module docs.
    pub fn label_guard_states(g: &mut Graph) {
        Self::propagate_match_labels(g);
        Self::remove_non_minimal_labels(g);
    }

    /// Backward fixed-point: a vertex gets a label when every match it
    /// can reach belongs to that one pattern.
    pub fn propagate_match_labels(g: &mut Graph) {
        #[derive(Clone, Copy, PartialEq)]
        enum Flow {
            Bottom,
            One(u32),
            Many,
        }

        fn join(a: Flow, b: Flow) -> Flow {
            match (a, b) {
                (Flow::Bottom, x) | (x, Flow::Bottom) => x,
                (Flow::One(x), Flow::One(y)) if x == y => Flow::One(x),
                _ => Flow::Many,
            }
        }

        let n = g.num_vertices();
        let mut flow = vec![Flow::Bottom; n];
        for v in g.vertices() {
            let info = g.vertex(v);
            if info.is_match {
                flow[v as usize] = Flow::One(info.label);
            }
        }

        // fixed point over the reversed edges
        let mut changed = true;
        while changed {
            changed = false;
            for v in g.vertices() {
                let mut acc = if g.vertex(v).is_match {
                    Flow::One(g.vertex(v).label)
                } else {
                    Flow::Bottom
                };
                for &s in g.out_vertices(v) {
                    acc = join(acc, flow[s as usize]);
                }
                if acc != flow[v as usize] {
                    flow[v as usize] = acc;
                    changed = true;
                }
            }
        }

        for v in g.vertices() {
            if v == 0 || g.vertex(v).is_match {
                continue;
            }
            g.vertex_mut(v).label = match flow[v as usize] {
                Flow::One(l) => l,
                _ => UNSET,
            };
        }
    }

    /// Strip labels implied by every predecessor, leaving the frontier.
    ///
    /// Match vertices always keep theirs: the match flag without a label
    /// would be meaningless, and later passes re-propagate from them.
    pub fn remove_non_minimal_labels(g: &mut Graph) {
        let mut clear = Vec::new();
        for v in g.vertices() {
            if v == 0 || g.vertex(v).is_match {
                continue;
            }
            let label = g.vertex(v).label;
            if label == UNSET {
                continue;
            }
            let preds = g.in_vertices(v);
            if !preds.is_empty() && preds.iter().all(|&p| g.vertex(p).label == label) {
                clear.push(v);
            }
        }
        // decided against the original labels, applied afterward
        for v in clear {
            g.vertex_mut(v).label = UNSET;
        }
    }

    /// Bounded subset determinization of `src` from its start vertex.
    pub fn subset_dfa(src: &Graph, depth: u32) -> Graph {
        let mut dst = Graph::new();
        // subset + entering byte set identifies a dst vertex
        let mut keyed: FxHashMap<(Vec<VertexId>, ByteSet), VertexId> = FxHashMap::default();
        let mut copied: FxHashMap<VertexId, VertexId> = FxHashMap::default();
        let mut work: VecDeque<(VertexId, Vec<VertexId>, u32)> = VecDeque::new();
        work.push_back((0, vec![0], depth));

        while let Some((dv, subset, d)) = work.pop_front() {
            if d == 0 {
                // past the bound: splice the original subgraph back in
                for &m in &subset {
                    for &s in src.out_vertices(m) {
                        let sv = Self::copy_subgraph(&mut dst, src, s, &mut copied);
                        dst.add_edge_dedup(dv, sv);
                    }
                }
                continue;
            }

            // distinct successors in priority order
            let mut succs: Vec<VertexId> = Vec::new();
            for &m in &subset {
                for &s in src.out_vertices(m) {
                    if !succs.contains(&s) {
                        succs.push(s);
                    }
                }
            }

            // group bytes by the exact successor list they select
            let mut groups: Vec<(Vec<VertexId>, ByteSet)> = Vec::new();
            for b in 0u32..256 {
                let list: Vec<VertexId> = succs
                    .iter()
                    .copied()
                    .filter(|&s| {
                        src.vertex(s)
                            .trans
                            .as_ref()
                            .map(|t| t.matches(b as u8))
                            .unwrap_or(false)
                    })
                    .collect();
                if list.is_empty() {
                    continue;
                }
                if let Some(entry) = groups.iter_mut().find(|(l, _)| *l == list) {
                    entry.1.insert(b as u8);
                } else {
                    let mut set = ByteSet::new();
                    set.insert(b as u8);
                    groups.push((list, set));
                }
            }

            for (list, bytes) in groups {
                // split members that disagree on label or match flag;
                // runs keep originating priority, never collapse
                let mut runs: Vec<Vec<VertexId>> = Vec::new();
                for s in list {
                    let info = src.vertex(s);
                    let fits = runs.last().map(|run| {
                        let first = src.vertex(run[0]);
                        first.label == info.label && first.is_match == info.is_match
                    });
                    if fits == Some(true) {
                        runs.last_mut().unwrap().push(s);
                    } else {
                        runs.push(vec![s]);
                    }
                }

                for run in runs {
                    let key = (run.clone(), bytes);
                    let nv = match keyed.get(&key) {
                        Some(&nv) => nv,
                        None => {
                            let first = src.vertex(run[0]);
                            let nv = dst.add_vertex(
                                crate::transition::Transition::from_byte_set(bytes, None),
                            );
                            dst.vertex_mut(nv).label = first.label;
                            dst.vertex_mut(nv).is_match = first.is_match;
                            keyed.insert(key, nv);
                            work.push_back((nv, run, d - 1));
                            nv
                        }
                    };
                    dst.add_edge_dedup(dv, nv);
                }
            }
        }

        debug!(
            "determinized: {} -> {} vertices (depth {})",
            src.num_vertices(),
            dst.num_vertices(),
            depth
        );
        dst
    }

    /// Copy the subgraph rooted at `root` into `dst`, preserving edge
    /// order; `copied` shares vertices across splice points.
    pub fn copy_subgraph(
        dst: &mut Graph,
        src: &Graph,
        root: VertexId,
        copied: &mut FxHashMap<VertexId, VertexId>,
    ) -> VertexId {
        if let Some(&nv) = copied.get(&root) {
            return nv;
        }

        // discover and create vertices first, then wire edges in order
        let mut discovered = Vec::new();
        let mut work = vec![root];
        while let Some(v) = work.pop() {
            if copied.contains_key(&v) {
                continue;
            }
            let info = src.vertex(v);
            let nv = dst.add_vertex(
                info.trans.clone().expect("non-start vertices carry predicates"),
            );
            dst.vertex_mut(nv).label = info.label;
            dst.vertex_mut(nv).is_match = info.is_match;
            copied.insert(v, nv);
            discovered.push(v);
            for &s in src.out_vertices(v) {
                if !copied.contains_key(&s) {
                    work.push(s);
                }
            }
        }

        for v in discovered {
            let dv = copied[&v];
            for &s in src.out_vertices(v) {
                dst.add_edge_dedup(dv, copied[&s]);
            }
        }
        copied[&root]
    }
}
