//! Packed bytecode instructions
//!
//! Every instruction is one 32-bit word: opcode in the low byte, operands
//! packed above it. A few opcodes are followed by payload words: a full
//! `u32` target for the wide transfers, 8 words of ByteSet for
//! `BIT_VECTOR`, and the dispatch entries for the jump tables. All
//! transfer targets are absolute instruction indices; a jump-table entry
//! of 0 means the dispatching thread dies.
//!
//! Single-word transfers and the `CHECK_HALT`/`LABEL` operands carry at
//! most 24 bits. Code generation switches to `LONG_JUMP`/`LONG_FORK` when
//! a target does not fit.

use std::fmt;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Sentinel for "no label" on threads and vertices
pub const UNSET: u32 = 0xFFFF_FFFF;

/// Largest value a single-word operand can carry
pub const MAX_OPERAND: u32 = 0x00FF_FFFF;

/// One 32-bit bytecode word
#[derive(Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(transparent)]
pub struct Instruction(u32);

/// Opcode values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    /// Require input byte == operand, else the thread dies
    Lit = 0,
    /// Require input byte to be one of two operand bytes
    Either = 1,
    /// Require input byte in the inclusive operand range
    Range = 2,
    /// Require input byte in the ByteSet carried in the next 8 words
    BitVector = 3,
    /// Dispatch on the input byte through the next 256 words
    JumpTable = 4,
    /// Dispatch on the input byte through `hi-lo+1` words; outside bytes die
    JumpTableRange = 5,
    /// Unconditional transfer to a 24-bit target
    Jump = 6,
    /// Unconditional transfer to the u32 target in the next word
    LongJump = 7,
    /// Spawn a thread at the 24-bit target; the current thread continues
    Fork = 8,
    /// Fork variant with the u32 target in the next word
    LongFork = 9,
    /// Die if this frame already passed check index `n`, else record it
    CheckHalt = 10,
    /// Tag the executing thread with a pattern label
    Label = 11,
    /// Record a pending match ending at the current offset
    Match = 12,
    /// The thread dies
    Halt = 13,
    /// Record a match and die; used at accept states with no out-edges
    Finish = 14,
}

impl OpCode {
    /// Decode an opcode byte
    pub fn from_u8(v: u8) -> Option<OpCode> {
        match v {
            0 => Some(OpCode::Lit),
            1 => Some(OpCode::Either),
            2 => Some(OpCode::Range),
            3 => Some(OpCode::BitVector),
            4 => Some(OpCode::JumpTable),
            5 => Some(OpCode::JumpTableRange),
            6 => Some(OpCode::Jump),
            7 => Some(OpCode::LongJump),
            8 => Some(OpCode::Fork),
            9 => Some(OpCode::LongFork),
            10 => Some(OpCode::CheckHalt),
            11 => Some(OpCode::Label),
            12 => Some(OpCode::Match),
            13 => Some(OpCode::Halt),
            14 => Some(OpCode::Finish),
            _ => None,
        }
    }
}

impl Instruction {
    /// A raw payload word (jump-table entry, long target, ByteSet chunk)
    pub fn raw(word: u32) -> Self {
        Instruction(word)
    }

    fn packed(op: OpCode, operand: u32) -> Self {
        debug_assert!(operand <= MAX_OPERAND);
        Instruction((op as u32) | (operand << 8))
    }

    /// `LIT b`
    pub fn lit(b: u8) -> Self {
        Self::packed(OpCode::Lit, b as u32)
    }

    /// `EITHER b1 b2`
    pub fn either(b1: u8, b2: u8) -> Self {
        Self::packed(OpCode::Either, (b1 as u32) | ((b2 as u32) << 8))
    }

    /// `RANGE lo hi`
    pub fn range(lo: u8, hi: u8) -> Self {
        Self::packed(OpCode::Range, (lo as u32) | ((hi as u32) << 8))
    }

    /// `BIT_VECTOR` marker; the 8 payload words follow
    pub fn bit_vector() -> Self {
        Self::packed(OpCode::BitVector, 0)
    }

    /// `JUMP_TABLE` marker; 256 payload words follow
    pub fn jump_table() -> Self {
        Self::packed(OpCode::JumpTable, 0)
    }

    /// `JUMP_TABLE_RANGE lo hi`; `hi-lo+1` payload words follow
    pub fn jump_table_range(lo: u8, hi: u8) -> Self {
        Self::packed(OpCode::JumpTableRange, (lo as u32) | ((hi as u32) << 8))
    }

    /// `JUMP target` (24-bit)
    pub fn jump(target: u32) -> Self {
        Self::packed(OpCode::Jump, target)
    }

    /// `LONG_JUMP` marker; the u32 target follows
    pub fn long_jump() -> Self {
        Self::packed(OpCode::LongJump, 0)
    }

    /// `FORK target` (24-bit)
    pub fn fork(target: u32) -> Self {
        Self::packed(OpCode::Fork, target)
    }

    /// `LONG_FORK` marker; the u32 target follows
    pub fn long_fork() -> Self {
        Self::packed(OpCode::LongFork, 0)
    }

    /// `CHECK_HALT n`
    pub fn check_halt(n: u32) -> Self {
        Self::packed(OpCode::CheckHalt, n)
    }

    /// `LABEL n`
    pub fn label(n: u32) -> Self {
        Self::packed(OpCode::Label, n)
    }

    /// `MATCH`
    pub fn match_op() -> Self {
        Self::packed(OpCode::Match, 0)
    }

    /// `HALT`
    pub fn halt() -> Self {
        Self::packed(OpCode::Halt, 0)
    }

    /// `FINISH`
    pub fn finish() -> Self {
        Self::packed(OpCode::Finish, 0)
    }

    /// Opcode of this word, or None for an unrecognized byte
    #[inline]
    pub fn opcode(&self) -> Option<OpCode> {
        OpCode::from_u8((self.0 & 0xFF) as u8)
    }

    /// First operand byte (bits 8..16)
    #[inline]
    pub fn byte1(&self) -> u8 {
        ((self.0 >> 8) & 0xFF) as u8
    }

    /// Second operand byte (bits 16..24)
    #[inline]
    pub fn byte2(&self) -> u8 {
        ((self.0 >> 16) & 0xFF) as u8
    }

    /// 24-bit operand (bits 8..32)
    #[inline]
    pub fn operand(&self) -> u32 {
        self.0 >> 8
    }

    /// The raw word
    #[inline]
    pub fn word(&self) -> u32 {
        self.0
    }

    /// Number of words this instruction occupies, payload included.
    ///
    /// Payload-carrying opcodes report their full footprint; for
    /// `JUMP_TABLE_RANGE` the span comes from the operand bytes.
    pub fn len(&self) -> usize {
        match self.opcode() {
            Some(OpCode::BitVector) => 9,
            Some(OpCode::JumpTable) => 257,
            Some(OpCode::JumpTableRange) => {
                // saturate so a corrupt span cannot underflow before
                // validation rejects it
                2 + self.byte2().saturating_sub(self.byte1()) as usize
            }
            Some(OpCode::LongJump) | Some(OpCode::LongFork) => 2,
            _ => 1,
        }
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.opcode() {
            Some(OpCode::Lit) => {
                let b = self.byte1();
                if b.is_ascii_graphic() {
                    write!(f, "lit '{}'", b as char)
                } else {
                    write!(f, "lit 0x{:02x}", b)
                }
            }
            Some(OpCode::Either) => write!(f, "either 0x{:02x} 0x{:02x}", self.byte1(), self.byte2()),
            Some(OpCode::Range) => write!(f, "range 0x{:02x}-0x{:02x}", self.byte1(), self.byte2()),
            Some(OpCode::BitVector) => write!(f, "bitvector"),
            Some(OpCode::JumpTable) => write!(f, "jumptable"),
            Some(OpCode::JumpTableRange) => {
                write!(f, "jumptablerange 0x{:02x}-0x{:02x}", self.byte1(), self.byte2())
            }
            Some(OpCode::Jump) => write!(f, "jump {}", self.operand()),
            Some(OpCode::LongJump) => write!(f, "longjump"),
            Some(OpCode::Fork) => write!(f, "fork {}", self.operand()),
            Some(OpCode::LongFork) => write!(f, "longfork"),
            Some(OpCode::CheckHalt) => write!(f, "checkhalt {}", self.operand()),
            Some(OpCode::Label) => write!(f, "label {}", self.operand()),
            Some(OpCode::Match) => write!(f, "match"),
            Some(OpCode::Halt) => write!(f, "halt"),
            Some(OpCode::Finish) => write!(f, "finish"),
            None => write!(f, "raw 0x{:08x}", self.0),
        }
    }
}

/// Render a code listing, one instruction per line with its index.
///
/// Payload words are folded into their owning instruction; long transfers
/// show the resolved target.
pub fn disassemble(code: &[Instruction]) -> String {
    use std::fmt::Write;
    let mut out = String::new();
    let mut pc = 0usize;
    while pc < code.len() {
        let ins = code[pc];
        match ins.opcode() {
            Some(OpCode::LongJump) if pc + 1 < code.len() => {
                let _ = writeln!(out, "{:6}: longjump {}", pc, code[pc + 1].word());
            }
            Some(OpCode::LongFork) if pc + 1 < code.len() => {
                let _ = writeln!(out, "{:6}: longfork {}", pc, code[pc + 1].word());
            }
            Some(OpCode::JumpTable) => {
                let _ = writeln!(out, "{:6}: jumptable", pc);
                for b in 0u32..256 {
                    let t = code[pc + 1 + b as usize].word();
                    if t != 0 {
                        let _ = writeln!(out, "        [0x{:02x}] -> {}", b, t);
                    }
                }
            }
            Some(OpCode::JumpTableRange) => {
                let _ = writeln!(out, "{:6}: {:?}", pc, ins);
                let (lo, hi) = (ins.byte1() as usize, ins.byte2() as usize);
                for b in lo..=hi {
                    let t = code[pc + 1 + (b - lo)].word();
                    if t != 0 {
                        let _ = writeln!(out, "        [0x{:02x}] -> {}", b, t);
                    }
                }
            }
            _ => {
                let _ = writeln!(out, "{:6}: {:?}", pc, ins);
            }
        }
        pc += ins.len().min(code.len() - pc);
    }
    out
}
