//! The execution engine
//!
//! A cooperative thread simulator: each logical thread is a program
//! counter plus the offset where its match attempt began. Per input byte
//! the VM runs every thread in priority order; a thread executes its
//! non-consuming instructions (LABEL, MATCH, CHECK_HALT, forks, jumps)
//! and then tests the current byte, parking into the next frame's list on
//! success. Forked threads are appended behind the running one, which
//! preserves left-first alternation. A fresh entry thread is seeded every
//! frame whose byte can start a match; when no threads are live the VM
//! skips ahead with memchr over the first-byte set.
//!
//! # Match arbitration
//!
//! MATCH stamps the thread's prospective end offset; the hit is only
//! *submitted* when the thread genuinely dies (failed byte test, HALT,
//! FINISH). Per label the VM keeps at most one pending hit plus the
//! committed frontier in `match_ends`:
//!
//! - a thread whose start lies inside committed territory dies at MATCH;
//! - a submitted hit starting inside the pending one is dropped, same
//!   start keeps the longer end (leftmost-longest);
//! - a pending hit is delivered once no surviving thread with that label
//!   (or no label yet) started at or before it, at the arrival of a
//!   non-overlapping successor, or at `close_out`.
//!
//! Threads killed by CHECK_HALT submit nothing: they are duplicates of a
//! higher-priority thread, not dead ends.
//!
//! Thread lists persist across `search` calls, so block-by-block
//! streaming matches single-buffer semantics exactly; `close_out` runs
//! the trailing epsilons and flushes every pending hit.

use crate::instruction::{OpCode, UNSET};
use crate::program::Program;
use crate::sparse::SparseSet;
use serde::Serialize;

/// Sentinel for a thread with no match recorded
const NO_MATCH: u64 = u64::MAX;

/// One reported match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    /// Byte offset of the first matched byte
    pub start: u64,
    /// One past the last matched byte
    pub end: u64,
    /// The matching pattern's user index
    pub user_index: u64,
}

#[derive(Debug, Clone, Copy)]
struct Thread {
    pc: u32,
    start: u64,
    label: u32,
    matched_at: u64,
}

impl Thread {
    fn entry(start: u64) -> Thread {
        Thread {
            pc: 0,
            start,
            label: UNSET,
            matched_at: NO_MATCH,
        }
    }
}

enum SkipKind {
    One(u8),
    Two(u8, u8),
    Three(u8, u8, u8),
    Set,
}

/// A running search over one program
pub struct Vm<'a> {
    prog: &'a Program,
    first: Vec<Thread>,
    active: Vec<Thread>,
    next: Vec<Thread>,
    /// per-frame CHECK_HALT dedup
    seen: SparseSet,
    /// labels with a pending hit
    live: SparseSet,
    /// pending hit per label, valid while the label is live
    pending: Vec<(u64, u64)>,
    /// committed frontier per label
    match_ends: Vec<u64>,
    end_offset: u64,
    skip: SkipKind,
}

impl<'a> Vm<'a> {
    /// A VM over `prog`, ready to search
    pub fn new(prog: &'a Program) -> Vm<'a> {
        let labels = prog.max_label().map(|m| m as usize + 1).unwrap_or(0);
        let skip = {
            let mut it = prog.first_byte_set.iter();
            match prog.first_byte_set.count() {
                1 => SkipKind::One(it.next().unwrap()),
                2 => SkipKind::Two(it.next().unwrap(), it.next().unwrap()),
                3 => SkipKind::Three(it.next().unwrap(), it.next().unwrap(), it.next().unwrap()),
                _ => SkipKind::Set,
            }
        };
        Vm {
            prog,
            first: vec![Thread::entry(0)],
            active: Vec::new(),
            next: Vec::new(),
            seen: SparseSet::with_capacity(prog.num_checked_states as usize),
            live: SparseSet::with_capacity(labels),
            pending: vec![(0, 0); labels],
            match_ends: vec![0; labels],
            end_offset: 0,
            skip,
        }
    }

    /// Drop all search state: threads, pending hits, committed frontiers.
    pub fn reset(&mut self) {
        self.active.clear();
        self.next.clear();
        self.seen.clear();
        self.live.clear();
        for e in self.match_ends.iter_mut() {
            *e = 0;
        }
        self.end_offset = 0;
    }

    /// Scan a block. `start_offset` is the global offset of `buf[0]`;
    /// hits are reported in global offsets. Returns true when threads
    /// survive past the block end; continue with the next block at the
    /// following offset, and call `close_out` after the last one.
    pub fn search(
        &mut self,
        buf: &[u8],
        start_offset: u64,
        on_hit: &mut dyn FnMut(SearchHit),
    ) -> bool {
        let mut pos = 0usize;
        loop {
            if pos >= buf.len() {
                break;
            }
            std::mem::swap(&mut self.active, &mut self.next);
            self.next.clear();
            if self.active.is_empty() && self.live.is_empty() {
                match self.fast_skip(buf, pos) {
                    Some(p) => pos = p,
                    None => break,
                }
            }

            let byte = buf[pos];
            let offset = start_offset + pos as u64;
            self.seen.clear();
            if self.prog.first_byte_set.contains(byte) {
                for i in 0..self.first.len() {
                    let mut t = self.first[i];
                    t.start = offset;
                    self.active.push(t);
                }
            }

            let mut i = 0;
            while i < self.active.len() {
                let t = self.active[i];
                self.run_thread(t, Some(byte), offset, on_hit);
                i += 1;
            }
            self.active.clear();
            self.flush_pending(on_hit);
            pos += 1;
        }
        self.end_offset = start_offset + buf.len() as u64;
        !self.next.is_empty()
    }

    /// Anchored variant: run only the entry closure at `start_offset`,
    /// with no per-frame seeding and no fast skip.
    pub fn starts_with(
        &mut self,
        buf: &[u8],
        start_offset: u64,
        on_hit: &mut dyn FnMut(SearchHit),
    ) {
        self.reset();
        self.next.push(Thread::entry(start_offset));
        let mut pos = 0usize;
        while pos < buf.len() && !self.next.is_empty() {
            std::mem::swap(&mut self.active, &mut self.next);
            self.next.clear();
            let byte = buf[pos];
            let offset = start_offset + pos as u64;
            self.seen.clear();
            let mut i = 0;
            while i < self.active.len() {
                let t = self.active[i];
                self.run_thread(t, Some(byte), offset, on_hit);
                i += 1;
            }
            self.active.clear();
            self.flush_pending(on_hit);
            pos += 1;
        }
        self.end_offset = start_offset + pos as u64;
    }

    /// Run trailing epsilons for the carried threads and deliver every
    /// pending hit. Call once after the final `search` block.
    pub fn close_out(&mut self, on_hit: &mut dyn FnMut(SearchHit)) {
        let offset = self.end_offset;
        self.seen.clear();
        std::mem::swap(&mut self.active, &mut self.next);
        self.next.clear();
        let mut i = 0;
        while i < self.active.len() {
            let t = self.active[i];
            self.run_thread(t, None, offset, on_hit);
            i += 1;
        }
        self.active.clear();
        self.next.clear();

        let labels: Vec<u32> = self.live.iter().collect();
        for l in labels {
            let (s, e) = self.pending[l as usize];
            self.match_ends[l as usize] = e;
            on_hit(SearchHit {
                start: s,
                end: e,
                user_index: l as u64,
            });
        }
        self.live.clear();
    }

    fn fast_skip(&self, buf: &[u8], pos: usize) -> Option<usize> {
        let hay = &buf[pos..];
        let found = match self.skip {
            SkipKind::One(a) => memchr::memchr(a, hay),
            SkipKind::Two(a, b) => memchr::memchr2(a, b, hay),
            SkipKind::Three(a, b, c) => memchr::memchr3(a, b, c, hay),
            SkipKind::Set => hay
                .iter()
                .position(|&b| self.prog.first_byte_set.contains(b)),
        };
        found.map(|i| pos + i)
    }

    /// Execute one thread for this frame: non-consuming instructions,
    /// then the byte test. `byte` is None past the end of input.
    fn run_thread(
        &mut self,
        mut t: Thread,
        byte: Option<u8>,
        offset: u64,
        on_hit: &mut dyn FnMut(SearchHit),
    ) {
        let code = &self.prog.code;
        loop {
            let ins = code[t.pc as usize];
            match ins.opcode() {
                Some(OpCode::Lit) => {
                    if byte == Some(ins.byte1()) {
                        t.pc += 1;
                        self.next.push(t);
                    } else {
                        self.submit(&t, on_hit);
                    }
                    return;
                }
                Some(OpCode::Either) => {
                    if byte == Some(ins.byte1()) || byte == Some(ins.byte2()) {
                        t.pc += 1;
                        self.next.push(t);
                    } else {
                        self.submit(&t, on_hit);
                    }
                    return;
                }
                Some(OpCode::Range) => {
                    match byte {
                        Some(b) if ins.byte1() <= b && b <= ins.byte2() => {
                            t.pc += 1;
                            self.next.push(t);
                        }
                        _ => self.submit(&t, on_hit),
                    }
                    return;
                }
                Some(OpCode::BitVector) => {
                    let hit = byte.map_or(false, |b| {
                        let word = code[t.pc as usize + 1 + (b >> 5) as usize].word();
                        word & (1u32 << (b & 31)) != 0
                    });
                    if hit {
                        t.pc += 9;
                        self.next.push(t);
                    } else {
                        self.submit(&t, on_hit);
                    }
                    return;
                }
                Some(OpCode::JumpTable) => {
                    let target = match byte {
                        Some(b) => code[t.pc as usize + 1 + b as usize].word(),
                        None => 0,
                    };
                    if target == 0 {
                        self.submit(&t, on_hit);
                        return;
                    }
                    t.pc = target;
                }
                Some(OpCode::JumpTableRange) => {
                    let (lo, hi) = (ins.byte1(), ins.byte2());
                    let target = match byte {
                        Some(b) if lo <= b && b <= hi => {
                            code[t.pc as usize + 1 + (b - lo) as usize].word()
                        }
                        _ => 0,
                    };
                    if target == 0 {
                        self.submit(&t, on_hit);
                        return;
                    }
                    t.pc = target;
                }
                Some(OpCode::Jump) => t.pc = ins.operand(),
                Some(OpCode::LongJump) => t.pc = code[t.pc as usize + 1].word(),
                Some(OpCode::Fork) => {
                    self.active.push(Thread {
                        pc: ins.operand(),
                        ..t
                    });
                    t.pc += 1;
                }
                Some(OpCode::LongFork) => {
                    self.active.push(Thread {
                        pc: code[t.pc as usize + 1].word(),
                        ..t
                    });
                    t.pc += 2;
                }
                Some(OpCode::CheckHalt) => {
                    if self.seen.insert(ins.operand()) {
                        t.pc += 1;
                    } else {
                        // a duplicate of a higher-priority thread; no hit
                        return;
                    }
                }
                Some(OpCode::Label) => {
                    t.label = ins.operand();
                    t.pc += 1;
                }
                Some(OpCode::Match) => {
                    let l = t.label as usize;
                    if t.label == UNSET || l >= self.match_ends.len() {
                        return;
                    }
                    if t.start < self.match_ends[l] {
                        // anything this thread reports would overlap a
                        // committed hit
                        return;
                    }
                    t.matched_at = offset;
                    t.pc += 1;
                }
                Some(OpCode::Halt) => {
                    self.submit(&t, on_hit);
                    return;
                }
                Some(OpCode::Finish) => {
                    t.matched_at = offset;
                    self.submit(&t, on_hit);
                    return;
                }
                None => return,
            }
        }
    }

    /// A thread died for real; arbitrate its recorded match, if any.
    fn submit(&mut self, t: &Thread, on_hit: &mut dyn FnMut(SearchHit)) {
        if t.matched_at == NO_MATCH || t.label == UNSET {
            return;
        }
        let l = t.label as usize;
        if l >= self.match_ends.len() {
            return;
        }
        let (s, e) = (t.start, t.matched_at);
        if s < self.match_ends[l] {
            return;
        }

        if self.live.contains(t.label) {
            let (ps, pe) = self.pending[l];
            if s == ps {
                if e > pe {
                    self.pending[l] = (s, e);
                }
            } else if s < ps {
                self.pending[l] = (s, e);
            } else if s >= pe {
                // non-overlapping successor: the pending hit is final
                self.match_ends[l] = pe;
                on_hit(SearchHit {
                    start: ps,
                    end: pe,
                    user_index: t.label as u64,
                });
                self.pending[l] = (s, e);
            }
            // a later start inside the pending hit loses to it
        } else {
            self.live.insert(t.label);
            self.pending[l] = (s, e);
        }
    }

    /// Deliver pending hits that no surviving thread can improve on.
    fn flush_pending(&mut self, on_hit: &mut dyn FnMut(SearchHit)) {
        if self.live.is_empty() {
            return;
        }
        let labels: Vec<u32> = self.live.iter().collect();
        let mut kept: Vec<u32> = Vec::new();
        for l in labels {
            let (s, e) = self.pending[l as usize];
            let blocked = self
                .next
                .iter()
                .any(|t| (t.label == l || t.label == UNSET) && t.start <= s);
            if blocked {
                kept.push(l);
            } else {
                self.match_ends[l as usize] = e;
                on_hit(SearchHit {
                    start: s,
                    end: e,
                    user_index: l as u64,
                });
            }
        }
        self.live.clear();
        for l in kept {
            self.live.insert(l);
        }
    }
}
