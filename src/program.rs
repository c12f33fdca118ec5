//! Compiled programs and their binary format
//!
//! A `Program` owns the instruction stream, the first-byte set that
//! drives the fast-skip loop, the check-state count the VM preallocates
//! from, and the pattern table that maps labels back to user patterns.
//! Programs are immutable after compilation and can be shared by any
//! number of VMs.
//!
//! # File format (little-endian)
//!
//! ```text
//! [0..8)    magic "BGRPPROG"
//! [8..12)   u32 version
//! [12..16)  u32 num_checked_states
//! [16..20)  u32 code length in bytes
//! ...       code (4-byte instruction words)
//! u32 pattern count, then per pattern:
//!   u32 expression length, expression bytes,
//!   u32 encoding length, encoding bytes,
//!   u32 user index, u8 flags (bit 0 case-insensitive, bit 1 fixed)
//! [u8; 32]  first-byte set
//! ```
//!
//! A write followed by a read reproduces the program byte-exactly.
//! Loading validates structure and every transfer target before the
//! program reaches a VM, so execution needs no bounds checks beyond
//! the instruction fetch.

use crate::byteset::ByteSet;
use crate::error::Error;
use crate::instruction::{disassemble, Instruction, OpCode};
use crate::pattern::Pattern;
use log::debug;
use memmap2::Mmap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use zerocopy::little_endian::U32 as U32le;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Ref};

/// Magic bytes identifying a compiled program file
pub const MAGIC: &[u8; 8] = b"BGRPPROG";

/// Current format version
pub const VERSION: u32 = 1;

/// One pattern-table entry: the pattern plus the encoding list it was
/// expanded under (comma-joined)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternInfo {
    /// The originating pattern
    pub pattern: Pattern,
    /// Encoding names used for this pattern, comma-joined
    pub encoding: String,
}

/// A compiled multi-pattern program
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    /// Instruction words
    pub code: Vec<Instruction>,
    /// Union of byte values any match can start with
    pub first_byte_set: ByteSet,
    /// Domain size for the VM's per-frame check set
    pub num_checked_states: u32,
    /// Label-indexed pattern table
    pub patterns: Vec<PatternInfo>,
}

#[derive(FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
struct ProgramHeader {
    magic: [u8; 8],
    version: U32le,
    num_checked_states: U32le,
    code_len: U32le,
}

impl Program {
    /// Largest pattern label in the table, or None when empty
    pub fn max_label(&self) -> Option<u32> {
        self.patterns
            .iter()
            .map(|p| p.pattern.user_index as u32)
            .max()
    }

    /// Human-readable code listing
    pub fn listing(&self) -> String {
        disassemble(&self.code)
    }

    /// Serialize to the on-disk format
    pub fn serialize(&self) -> Vec<u8> {
        let header = ProgramHeader {
            magic: *MAGIC,
            version: U32le::new(VERSION),
            num_checked_states: U32le::new(self.num_checked_states),
            code_len: U32le::new(self.code.len() as u32 * 4),
        };

        let mut out = Vec::with_capacity(32 + self.code.len() * 4);
        out.extend_from_slice(header.as_bytes());
        for ins in &self.code {
            out.extend_from_slice(&ins.word().to_le_bytes());
        }
        out.extend_from_slice(&(self.patterns.len() as u32).to_le_bytes());
        for info in &self.patterns {
            let expr = info.pattern.expression.as_bytes();
            out.extend_from_slice(&(expr.len() as u32).to_le_bytes());
            out.extend_from_slice(expr);
            let enc = info.encoding.as_bytes();
            out.extend_from_slice(&(enc.len() as u32).to_le_bytes());
            out.extend_from_slice(enc);
            out.extend_from_slice(&(info.pattern.user_index as u32).to_le_bytes());
            let mut flags = 0u8;
            if info.pattern.case_insensitive {
                flags |= 1;
            }
            if info.pattern.fixed_string {
                flags |= 2;
            }
            out.push(flags);
        }
        out.extend_from_slice(&self.first_byte_set.to_bytes());
        out
    }

    /// Rebuild a program from its serialized form, validating structure
    /// and every transfer target.
    pub fn deserialize(data: &[u8]) -> Result<Program, Error> {
        let (header, rest) = Ref::<_, ProgramHeader>::from_prefix(data)
            .map_err(|_| Error::Deserialize("truncated header".to_string()))?;
        if header.magic != *MAGIC {
            return Err(Error::Deserialize("bad magic".to_string()));
        }
        if header.version.get() != VERSION {
            return Err(Error::Deserialize(format!(
                "unsupported version {}",
                header.version.get()
            )));
        }
        let code_len = header.code_len.get() as usize;
        if code_len % 4 != 0 {
            return Err(Error::Deserialize("code length not word-aligned".to_string()));
        }
        if rest.len() < code_len {
            return Err(Error::Deserialize("truncated code".to_string()));
        }
        let (code_bytes, rest) = rest.split_at(code_len);
        let code: Vec<Instruction> = code_bytes
            .chunks_exact(4)
            .map(|c| Instruction::raw(u32::from_le_bytes([c[0], c[1], c[2], c[3]])))
            .collect();

        let mut r = Reader { data: rest, pos: 0 };
        let pattern_count = r.u32()?;
        let mut patterns = Vec::with_capacity(pattern_count as usize);
        for _ in 0..pattern_count {
            let expression = r.string()?;
            let encoding = r.string()?;
            let user_index = r.u32()? as u64;
            let flags = r.u8()?;
            let encodings: Vec<String> = if encoding.is_empty() {
                Vec::new()
            } else {
                encoding.split(',').map(str::to_string).collect()
            };
            patterns.push(PatternInfo {
                pattern: Pattern {
                    expression,
                    encodings,
                    case_insensitive: flags & 1 != 0,
                    fixed_string: flags & 2 != 0,
                    user_index,
                },
                encoding,
            });
        }
        let fbs = r.bytes(32)?;
        let mut fbs_arr = [0u8; 32];
        fbs_arr.copy_from_slice(fbs);
        if r.pos != r.data.len() {
            return Err(Error::Deserialize("trailing bytes".to_string()));
        }

        let prog = Program {
            code,
            first_byte_set: ByteSet::from_bytes(&fbs_arr),
            num_checked_states: header.num_checked_states.get(),
            patterns,
        };
        prog.validate()?;
        Ok(prog)
    }

    /// Structural validation: recognized opcodes, in-bounds payloads and
    /// transfer targets, table entries either zero or valid offsets.
    fn validate(&self) -> Result<(), Error> {
        let len = self.code.len();
        let target_ok = |t: u32| (t as usize) < len;
        let mut pc = 0usize;
        while pc < len {
            let ins = self.code[pc];
            let op = ins
                .opcode()
                .ok_or_else(|| Error::Deserialize(format!("bad opcode at {}", pc)))?;
            let size = ins.len();
            if pc + size > len {
                return Err(Error::Deserialize(format!(
                    "truncated {:?} at {}",
                    op, pc
                )));
            }
            match op {
                OpCode::Jump | OpCode::Fork => {
                    if !target_ok(ins.operand()) {
                        return Err(Error::Deserialize(format!(
                            "out-of-bounds target at {}",
                            pc
                        )));
                    }
                }
                OpCode::LongJump | OpCode::LongFork => {
                    if !target_ok(self.code[pc + 1].word()) {
                        return Err(Error::Deserialize(format!(
                            "out-of-bounds target at {}",
                            pc
                        )));
                    }
                }
                OpCode::JumpTable => {
                    for i in 0..256 {
                        let t = self.code[pc + 1 + i].word();
                        if t != 0 && !target_ok(t) {
                            return Err(Error::Deserialize(format!(
                                "bad table entry at {}",
                                pc
                            )));
                        }
                    }
                }
                OpCode::JumpTableRange => {
                    let (lo, hi) = (ins.byte1() as usize, ins.byte2() as usize);
                    if hi < lo {
                        return Err(Error::Deserialize(format!("bad table span at {}", pc)));
                    }
                    for i in 0..=(hi - lo) {
                        let t = self.code[pc + 1 + i].word();
                        if t != 0 && !target_ok(t) {
                            return Err(Error::Deserialize(format!(
                                "bad table entry at {}",
                                pc
                            )));
                        }
                    }
                }
                OpCode::CheckHalt => {
                    if ins.operand() >= self.num_checked_states {
                        return Err(Error::Deserialize(format!(
                            "check index out of range at {}",
                            pc
                        )));
                    }
                }
                _ => {}
            }
            pc += size;
        }
        Ok(())
    }

    /// Write the program to a file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let mut file = File::create(path)?;
        file.write_all(&self.serialize())?;
        file.sync_all()?;
        Ok(())
    }

    /// Load a program from a file.
    ///
    /// The file is memory-mapped for the read; the returned program owns
    /// its data, so the mapping does not outlive this call.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Program, Error> {
        let file = File::open(path.as_ref())
            .map_err(|e| Error::Io(format!("failed to open program file: {}", e)))?;
        let mmap = unsafe {
            Mmap::map(&file).map_err(|e| Error::Io(format!("failed to mmap program file: {}", e)))?
        };
        let prog = Program::deserialize(&mmap)?;
        debug!(
            "loaded program: {} words, {} patterns",
            prog.code.len(),
            prog.patterns.len()
        );
        Ok(prog)
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn bytes(&mut self, n: usize) -> Result<&'a [u8], Error> {
        if self.pos + n > self.data.len() {
            return Err(Error::Deserialize("unexpected end of data".to_string()));
        }
        let s = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    fn u8(&mut self) -> Result<u8, Error> {
        Ok(self.bytes(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, Error> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn string(&mut self) -> Result<String, Error> {
        let len = self.u32()? as usize;
        if len > self.data.len() {
            return Err(Error::Deserialize("string length out of range".to_string()));
        }
        let bytes = self.bytes(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::Deserialize("pattern table is not UTF-8".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Program {
        Program {
            code: vec![
                Instruction::lit(b'a'),
                Instruction::label(0),
                Instruction::finish(),
            ],
            first_byte_set: ByteSet::single(b'a'),
            num_checked_states: 1,
            patterns: vec![PatternInfo {
                pattern: Pattern::new("a", 0).with_encodings(["ASCII"]),
                encoding: "ASCII".to_string(),
            }],
        }
    }

    #[test]
    fn test_roundtrip_byte_exact() {
        let prog = sample();
        let bytes = prog.serialize();
        let loaded = Program::deserialize(&bytes).unwrap();
        assert_eq!(loaded, prog);
        // a second write reproduces the bytes exactly
        assert_eq!(loaded.serialize(), bytes);
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = sample().serialize();
        bytes[0] = b'X';
        assert!(matches!(
            Program::deserialize(&bytes),
            Err(Error::Deserialize(_))
        ));
    }

    #[test]
    fn test_bad_version() {
        let mut bytes = sample().serialize();
        bytes[8] = 99;
        assert!(matches!(
            Program::deserialize(&bytes),
            Err(Error::Deserialize(_))
        ));
    }

    #[test]
    fn test_truncated() {
        let bytes = sample().serialize();
        for cut in [4usize, 17, bytes.len() - 1] {
            assert!(
                Program::deserialize(&bytes[..cut]).is_err(),
                "cut at {} accepted",
                cut
            );
        }
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        let mut bytes = sample().serialize();
        bytes.push(0);
        assert!(matches!(
            Program::deserialize(&bytes),
            Err(Error::Deserialize(_))
        ));
    }

    #[test]
    fn test_bad_target_rejected() {
        let mut prog = sample();
        prog.code.push(Instruction::jump(400));
        let bytes = prog.serialize();
        assert!(matches!(
            Program::deserialize(&bytes),
            Err(Error::Deserialize(_))
        ));
    }

    #[test]
    fn test_inverted_table_span_rejected() {
        let mut prog = sample();
        prog.code.push(Instruction::jump_table_range(0xC8, 0x00));
        prog.code.push(Instruction::raw(1));
        let bytes = prog.serialize();
        assert!(matches!(
            Program::deserialize(&bytes),
            Err(Error::Deserialize(_))
        ));
    }

    #[test]
    fn test_bad_check_index_rejected() {
        let mut prog = sample();
        prog.code.insert(1, Instruction::check_halt(7));
        let bytes = prog.serialize();
        assert!(matches!(
            Program::deserialize(&bytes),
            Err(Error::Deserialize(_))
        ));
    }

    #[test]
    fn test_save_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.bgp");
        let prog = sample();
        prog.save(&path).unwrap();
        let loaded = Program::load(&path).unwrap();
        assert_eq!(loaded, prog);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            Program::load("/nonexistent/prog.bgp"),
            Err(Error::Io(_))
        ));
    }
}
