//! NFA to bytecode
//!
//! Two phases. First a specialized BFS assigns every vertex a discover
//! rank: successors of straight-line vertices go to the *front* of the
//! deque so chains emit contiguously and fall through without jumps.
//! Second, each state emits its snippet in rank order:
//!
//! ```text
//! [byte test] [LABEL?] [MATCH?] [CHECK_HALT?] [transfers | FINISH | HALT]
//! ```
//!
//! The check comes after MATCH: a thread the overlap rule kills at MATCH
//! must not have claimed the check bit, or it would take a viable
//! later-start thread down with it. Terminal states emit no check at all
//! for the same reason: match arbitration already deduplicates their
//! submissions, and a suppressed submission can be a lost hit.
//!
//! Transfers are either a jump table (high fan-out, unlabeled source,
//! profitable pivot analysis) or forks for the lower-priority successors
//! followed by a jump (or a fall-through) into the priority-first one.
//! The running thread always takes the priority path; forked threads are
//! appended behind it, which preserves left-first alternation.
//!
//! Sizing runs before emission so every state has a known start address.
//! If the program outgrows 24-bit operands the whole emission switches to
//! the wide transfer forms; past `u32` it fails with `ProgramTooLarge`.

use crate::byteset::ByteSet;
use crate::error::Error;
use crate::graph::{Graph, VertexId};
use crate::instruction::{Instruction, MAX_OPERAND, UNSET};
use log::debug;
use std::collections::VecDeque;

/// Bytecode plus the VM preallocation counts
#[derive(Debug, Clone)]
pub struct GeneratedCode {
    /// The instruction stream
    pub code: Vec<Instruction>,
    /// Domain size for the per-frame check set: one more than the number
    /// of shared states, index 0 reserved
    pub num_checked_states: u32,
}

/// Union of the start vertex's out-transitions; drives the fast skip.
pub fn first_bytes(graph: &Graph) -> ByteSet {
    let mut set = ByteSet::new();
    for &t in graph.out_vertices(0) {
        if let Some(trans) = &graph.vertex(t).trans {
            trans.or_bytes(&mut set);
        }
    }
    set
}

/// Per-byte successor lists of `v`, in priority order.
pub fn pivot_states(graph: &Graph, v: VertexId) -> Vec<Vec<VertexId>> {
    let mut tbl: Vec<Vec<VertexId>> = vec![Vec::new(); 256];
    for &ov in graph.out_vertices(v) {
        if let Some(trans) = &graph.vertex(ov).trans {
            let bytes = trans.accepted_bytes();
            for b in bytes.iter() {
                if !tbl[b as usize].contains(&ov) {
                    tbl[b as usize].push(ov);
                }
            }
        }
    }
    tbl
}

/// Largest successor list in a pivot table.
pub fn max_outbound(tbl: &[Vec<VertexId>]) -> usize {
    tbl.iter().map(|v| v.len()).max().unwrap_or(0)
}

struct JumpTable {
    tbl: Vec<Vec<VertexId>>,
    lo: u8,
    hi: u8,
    full: bool,
}

impl JumpTable {
    fn words(&self, wide: bool) -> usize {
        let span = if self.full {
            256
        } else {
            self.hi as usize - self.lo as usize + 1
        };
        let chain_word = if wide { 2 } else { 1 };
        let indirect: usize = self
            .tbl
            .iter()
            .map(|l| if l.len() > 1 { l.len() * chain_word } else { 0 })
            .sum();
        1 + span + indirect
    }
}

struct Layout {
    rank: Vec<u32>,
    order: Vec<VertexId>,
    check_index: Vec<u32>,
    num_checked: u32,
}

/// Emit bytecode for the graph.
pub fn generate(graph: &Graph) -> Result<GeneratedCode, Error> {
    let layout = discover(graph);

    for v in graph.vertices() {
        let label = graph.vertex(v).label;
        if label != UNSET && label > MAX_OPERAND {
            return Err(Error::ProgramTooLarge(format!(
                "pattern label {} exceeds the 24-bit operand",
                label
            )));
        }
    }
    if layout.num_checked > MAX_OPERAND {
        return Err(Error::ProgramTooLarge(format!(
            "{} checked states exceed the 24-bit operand",
            layout.num_checked
        )));
    }

    for wide in [false, true] {
        let mut starts = vec![0u32; graph.num_vertices()];
        let mut total: u64 = 0;
        for &v in &layout.order {
            starts[v as usize] = total as u32;
            total += snippet_size(graph, v, &layout, wide) as u64;
        }
        if !wide && total > MAX_OPERAND as u64 {
            continue; // retry with wide transfers
        }
        if total > u32::MAX as u64 {
            return Err(Error::ProgramTooLarge(format!(
                "{} instruction words exceed 32-bit offsets",
                total
            )));
        }

        let mut code = Vec::with_capacity(total as usize);
        for &v in &layout.order {
            debug_assert_eq!(code.len() as u32, starts[v as usize]);
            emit_state(graph, v, &layout, &starts, wide, &mut code);
            debug_assert_eq!(
                code.len() - starts[v as usize] as usize,
                snippet_size(graph, v, &layout, wide)
            );
        }

        debug!(
            "generated {} words for {} states ({} checked{})",
            code.len(),
            layout.order.len(),
            layout.num_checked,
            if wide { ", wide" } else { "" }
        );
        return Ok(GeneratedCode {
            code,
            num_checked_states: layout.num_checked + 1,
        });
    }
    unreachable!("wide emission always returns");
}

/// The discovery BFS: 1-out-degree vertices push their successor to the
/// deque front, so straight-line runs get consecutive ranks.
fn discover(graph: &Graph) -> Layout {
    let n = graph.num_vertices();
    let mut rank = vec![UNSET; n];
    let mut check_index = vec![UNSET; n];
    let mut order = Vec::with_capacity(n);
    let mut discovered = vec![false; n];
    let mut num_checked = 0u32;

    let mut deque: VecDeque<VertexId> = VecDeque::new();
    discovered[0] = true;
    deque.push_back(0);

    while let Some(v) = deque.pop_front() {
        rank[v as usize] = order.len() as u32;
        order.push(v);
        if graph.in_degree(v) > 1 {
            num_checked += 1;
            check_index[v as usize] = num_checked;
        }
        let front = graph.out_degree(v) < 2;
        for &t in graph.out_vertices(v) {
            if !discovered[t as usize] {
                discovered[t as usize] = true;
                if front {
                    deque.push_front(t);
                } else {
                    deque.push_back(t);
                }
            }
        }
    }

    Layout {
        rank,
        order,
        check_index,
        num_checked,
    }
}

fn jump_table_for(graph: &Graph, v: VertexId) -> Option<JumpTable> {
    let out_degree = graph.out_degree(v);
    if out_degree <= 3 || (v != 0 && graph.vertex(v).label != UNSET) {
        return None;
    }
    let tbl = pivot_states(graph, v);
    if max_outbound(&tbl) >= out_degree {
        return None;
    }
    let lo = tbl.iter().position(|l| !l.is_empty())? as u8;
    let hi = tbl.iter().rposition(|l| !l.is_empty())? as u8;
    let full = lo == 0 && hi == 255;
    Some(JumpTable { tbl, lo, hi, full })
}

fn snippet_size(graph: &Graph, v: VertexId, layout: &Layout, wide: bool) -> usize {
    let info = graph.vertex(v);
    let mut n = 0usize;

    if let Some(trans) = &info.trans {
        n += trans.num_instructions();
    }
    if v != 0 && info.label != UNSET {
        n += 1;
    }

    let outs = graph.out_vertices(v);
    if outs.is_empty() {
        // FINISH for matches, HALT for dead ends
        return n + 1;
    }
    if info.is_match {
        n += 1; // MATCH
    }
    if layout.check_index[v as usize] != UNSET {
        n += 1;
    }

    if let Some(jt) = jump_table_for(graph, v) {
        return n + jt.words(wide);
    }

    let t_words = if wide { 2 } else { 1 };
    n += (outs.len() - 1) * t_words;
    if layout.rank[outs[0] as usize] != layout.rank[v as usize] + 1 {
        n += t_words;
    }
    n
}

fn push_transfer(code: &mut Vec<Instruction>, target: u32, fork: bool, wide: bool) {
    if wide {
        code.push(if fork {
            Instruction::long_fork()
        } else {
            Instruction::long_jump()
        });
        code.push(Instruction::raw(target));
    } else {
        code.push(if fork {
            Instruction::fork(target)
        } else {
            Instruction::jump(target)
        });
    }
}

fn emit_state(
    graph: &Graph,
    v: VertexId,
    layout: &Layout,
    starts: &[u32],
    wide: bool,
    code: &mut Vec<Instruction>,
) {
    let info = graph.vertex(v);

    if let Some(trans) = &info.trans {
        trans.lower(code);
    }
    if v != 0 && info.label != UNSET {
        code.push(Instruction::label(info.label));
    }

    let outs = graph.out_vertices(v);
    if outs.is_empty() {
        code.push(if info.is_match {
            Instruction::finish()
        } else {
            Instruction::halt()
        });
        return;
    }
    if info.is_match {
        code.push(Instruction::match_op());
    }
    if layout.check_index[v as usize] != UNSET {
        code.push(Instruction::check_halt(layout.check_index[v as usize]));
    }

    if let Some(jt) = jump_table_for(graph, v) {
        emit_jump_table(&jt, starts, wide, code);
        return;
    }

    for &s in &outs[1..] {
        push_transfer(code, starts[s as usize], true, wide);
    }
    if layout.rank[outs[0] as usize] != layout.rank[v as usize] + 1 {
        push_transfer(code, starts[outs[0] as usize], false, wide);
    }
}

fn emit_jump_table(jt: &JumpTable, starts: &[u32], wide: bool, code: &mut Vec<Instruction>) {
    let (lo, hi) = if jt.full {
        (0usize, 255usize)
    } else {
        (jt.lo as usize, jt.hi as usize)
    };
    code.push(if jt.full {
        Instruction::jump_table()
    } else {
        Instruction::jump_table_range(jt.lo, jt.hi)
    });

    let span = hi - lo + 1;
    let chain_word = if wide { 2 } else { 1 };
    let mut chain_addr = code.len() as u32 + span as u32;

    // dispatch entries: 0 dies, single successors go direct, shared
    // bytes indirect through a fork chain
    for b in lo..=hi {
        let list = &jt.tbl[b];
        match list.len() {
            0 => code.push(Instruction::raw(0)),
            1 => code.push(Instruction::raw(starts[list[0] as usize])),
            n => {
                code.push(Instruction::raw(chain_addr));
                chain_addr += (n * chain_word) as u32;
            }
        }
    }

    for b in lo..=hi {
        let list = &jt.tbl[b];
        if list.len() > 1 {
            for &s in &list[1..] {
                push_transfer(code, starts[s as usize], true, wide);
            }
            push_transfer(code, starts[list[0] as usize], false, wide);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use crate::instruction::{disassemble, OpCode};
    use crate::nfabuilder::NfaBuilder;
    use crate::parser::parse;
    use crate::pattern::Pattern;
    use crate::rewriter::rewrite;

    fn nfa(pattern: &str, label: u32) -> Graph {
        let p = Pattern::new(pattern, label as u64);
        let mut tree = parse(pattern).unwrap();
        rewrite(&mut tree);
        NfaBuilder::build(&p, &tree, "ASCII", label).unwrap()
    }

    fn compiled(pattern: &str) -> (Graph, GeneratedCode) {
        let mut g = nfa(pattern, 0);
        Compiler::label_guard_states(&mut g);
        let gen = generate(&g).unwrap();
        (g, gen)
    }

    fn opcodes(code: &[Instruction]) -> Vec<OpCode> {
        let mut ops = Vec::new();
        let mut pc = 0;
        while pc < code.len() {
            let ins = code[pc];
            ops.push(ins.opcode().unwrap());
            pc += ins.len();
        }
        ops
    }

    #[test]
    fn test_straight_line_falls_through() {
        let (_, gen) = compiled("abc");
        // lit a, label, lit b, lit c, finish: no jumps anywhere
        let ops = opcodes(&gen.code);
        assert!(!ops.contains(&OpCode::Jump));
        assert!(!ops.contains(&OpCode::Fork));
        assert_eq!(*ops.last().unwrap(), OpCode::Finish);
        assert_eq!(gen.num_checked_states, 1);
    }

    #[test]
    fn test_alternation_forks() {
        let (_, gen) = compiled("ab|cd");
        let ops = opcodes(&gen.code);
        assert!(ops.contains(&OpCode::Fork));
        assert_eq!(ops.iter().filter(|&&o| o == OpCode::Finish).count(), 2);
    }

    #[test]
    fn test_shared_state_gets_check_halt() {
        // both branches converge on c, which continues to x
        let (g, gen) = compiled("(ab|b)cx");
        assert_eq!(g.num_shared_vertices(), 1);
        assert_eq!(gen.num_checked_states, 2);
        let ops = opcodes(&gen.code);
        assert!(ops.contains(&OpCode::CheckHalt));
    }

    #[test]
    fn test_terminal_shared_state_has_no_check() {
        // the shared vertex is an accept state with no out-edges; it
        // still counts for preallocation but emits no check
        let (g, gen) = compiled("(ab|b)c");
        assert_eq!(g.num_shared_vertices(), 1);
        assert_eq!(gen.num_checked_states, 2);
        let ops = opcodes(&gen.code);
        assert!(!ops.contains(&OpCode::CheckHalt));
    }

    #[test]
    fn test_loop_emits_jump() {
        let (_, gen) = compiled("a+b");
        let ops = opcodes(&gen.code);
        // the self-loop cannot fall through
        assert!(ops.contains(&OpCode::Jump) || ops.contains(&OpCode::Fork));
    }

    #[test]
    fn test_jump_table_synthesis() {
        // start vertex with five disjoint single-byte branches
        let (_, gen) = compiled("ax|bx|cx|dx|ex");
        let ops = opcodes(&gen.code);
        assert!(
            ops.contains(&OpCode::JumpTable) || ops.contains(&OpCode::JumpTableRange),
            "expected a jump table, got {:?}",
            ops
        );
    }

    #[test]
    fn test_no_jump_table_below_fanout() {
        let (_, gen) = compiled("ax|bx|cx");
        let ops = opcodes(&gen.code);
        assert!(!ops.contains(&OpCode::JumpTable));
        assert!(!ops.contains(&OpCode::JumpTableRange));
    }

    #[test]
    fn test_jump_table_range_entries_resolve() {
        let (_, gen) = compiled("ax|bx|cx|dx|ex");
        // find the table and check every non-zero entry lands on a
        // byte-test instruction
        let mut pc = 0;
        let mut checked = false;
        while pc < gen.code.len() {
            let ins = gen.code[pc];
            if ins.opcode() == Some(OpCode::JumpTableRange) {
                let (lo, hi) = (ins.byte1() as usize, ins.byte2() as usize);
                assert_eq!((lo, hi), (b'a' as usize, b'e' as usize));
                for i in 0..=(hi - lo) {
                    let target = gen.code[pc + 1 + i].word() as usize;
                    assert!(target != 0, "every byte in the span has a successor");
                    assert!(target < gen.code.len());
                    assert_eq!(gen.code[target].opcode(), Some(OpCode::Lit));
                }
                checked = true;
            }
            pc += ins.len();
        }
        assert!(checked, "no jump table found");
    }

    #[test]
    fn test_labeled_vertex_blocks_jump_table() {
        // a labeled non-start vertex keeps fork chains even at high
        // fan-out; build one by hand
        let mut g = Graph::new();
        use crate::transition::Transition;
        let head = g.add_vertex(Transition::Lit(b'x'));
        g.add_edge(0, head);
        g.vertex_mut(head).label = 3;
        for b in [b'a', b'b', b'c', b'd', b'e'] {
            let v = g.add_vertex(Transition::Lit(b));
            g.add_edge(head, v);
            g.vertex_mut(v).is_match = true;
            g.vertex_mut(v).label = 3;
        }
        let gen = generate(&g).unwrap();
        let ops = opcodes(&gen.code);
        assert!(!ops.contains(&OpCode::JumpTable));
        assert!(!ops.contains(&OpCode::JumpTableRange));
        assert_eq!(ops.iter().filter(|&&o| o == OpCode::Fork).count(), 4);
    }

    #[test]
    fn test_first_bytes() {
        let g = nfa("foo|bar", 0);
        let fb = first_bytes(&g);
        assert!(fb.contains(b'f'));
        assert!(fb.contains(b'b'));
        assert!(!fb.contains(b'o'));
        assert_eq!(fb.count(), 2);
    }

    #[test]
    fn test_pivot_states() {
        let g = nfa("[ab]x|ay", 0);
        let tbl = pivot_states(&g, 0);
        assert_eq!(tbl[b'a' as usize].len(), 2);
        assert_eq!(tbl[b'b' as usize].len(), 1);
        assert_eq!(tbl[b'z' as usize].len(), 0);
        assert_eq!(max_outbound(&tbl), 2);
    }

    #[test]
    fn test_disassembly_roundtrip_shape() {
        let (_, gen) = compiled("a(b|c)de");
        let text = disassemble(&gen.code);
        assert!(text.contains("lit 'a'"));
        assert!(text.contains("checkhalt 1"));
        assert!(text.contains("finish"));
    }

    #[test]
    fn test_labels_at_frontier_and_match() {
        // one LABEL where the pattern's region starts, one at the match
        // state; the interior carries none
        let (_, gen) = compiled("abcd");
        let ops = opcodes(&gen.code);
        assert_eq!(ops.iter().filter(|&&o| o == OpCode::Label).count(), 2);
    }
}
