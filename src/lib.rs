//! Bytegrep - Multi-Pattern Regex Engine for Binary Data
//!
//! Bytegrep compiles a set of regular expressions, each with optional
//! per-pattern byte encodings, into one shared automaton, lowers it to a
//! compact bytecode program, and scans arbitrary binary input, reporting
//! every non-overlapping leftmost-longest match with the originating
//! pattern's index. It is built for forensic and high-throughput
//! scanning: case-folded and multi-encoding search (ASCII, UTF-8,
//! UTF-16, UTF-32) over raw bytes, block-by-block streaming with exact
//! semantics, and programs that serialize to a compact binary format.
//!
//! # Quick Start
//!
//! ```rust
//! use bytegrep::{compile_patterns, Pattern, Vm};
//!
//! let program = compile_patterns(vec![
//!     Pattern::new("foo[0-9]+", 0),
//!     Pattern::new("bar", 1).case_insensitive(true),
//! ])?;
//!
//! let mut vm = Vm::new(&program);
//! let mut hits = Vec::new();
//! vm.search(b"foo123 and BAR", 0, &mut |hit| hits.push(hit));
//! vm.close_out(&mut |hit| hits.push(hit));
//!
//! assert_eq!(hits.len(), 2);
//! assert_eq!((hits[0].start, hits[0].end, hits[0].user_index), (0, 6, 0));
//! assert_eq!((hits[1].start, hits[1].end, hits[1].user_index), (11, 14, 1));
//! # Ok::<(), bytegrep::ErrorList>(())
//! ```
//!
//! # Architecture
//!
//! ```text
//! pattern text
//!   │  parser + rewriter
//!   ▼
//! parse tree ──► NfaBuilder ──► NFA (predicates on states)
//!                                │  merge · label guards · subset DFA
//!                                ▼
//!                            CodeGen ──► Program (bytecode + tables)
//!                                          │  Vm::search
//!                                          ▼
//!                                     hit callbacks
//! ```
//!
//! Programs are immutable and cheap to share: one compiled program can
//! back any number of VMs on different inputs concurrently. A `Vm` owns
//! only its thread lists and match bookkeeping.
//!
//! # Streaming
//!
//! `Vm::search` may be called repeatedly with consecutive blocks;
//! partial matches carry over and `close_out` delivers whatever is still
//! pending, so split input produces exactly the hits of the whole.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Module declarations
pub mod builder;
pub mod byteset;
pub mod codegen;
pub mod compiler;
pub mod encoder;
/// Error types for compilation and program I/O
pub mod error;
pub mod graph;
pub mod instruction;
pub mod nfabuilder;
pub mod parser;
pub mod parsetree;
pub mod pattern;
pub mod program;
pub mod rewriter;
mod sparse;
pub mod transition;
pub mod vm;

// Re-exports for the common path

/// One-call compilation of a pattern list
pub use crate::builder::{compile_patterns, ProgramBuilder};

/// Compilation knobs
pub use crate::compiler::CompileOptions;

pub use crate::error::{Error, ErrorList, Result};

/// A pattern plus its matching options
pub use crate::pattern::Pattern;

/// A compiled, shareable program
pub use crate::program::Program;

/// The search engine and its hit type
pub use crate::vm::{SearchHit, Vm};

/// The per-frame sparse set, public for reuse in callers' scan loops
pub use crate::sparse::SparseSet;

// Version information
/// Library version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
