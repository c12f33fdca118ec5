//! Pattern list to program
//!
//! `ProgramBuilder` is the front door: add patterns, then `build()` runs
//! the whole pipeline (parse, rewrite, NFA construction, multi-pattern
//! merge, label passes, optional bounded determinization, code
//! generation) and hands back a `Program`.
//!
//! Bad patterns do not abort the batch: `add_pattern` reports its error
//! immediately and `add_pattern_list` accumulates one error per bad
//! pattern, so a caller loading a large keyword file learns about every
//! problem in one pass. `build()` compiles whatever was accepted.

use crate::codegen;
use crate::compiler::{CompileOptions, Compiler};
use crate::error::{Error, ErrorList};
use crate::graph::Graph;
use crate::nfabuilder::NfaBuilder;
use crate::parser::{parse, parse_fixed};
use crate::pattern::Pattern;
use crate::program::{PatternInfo, Program};
use crate::rewriter::rewrite;
use log::debug;

/// Incremental program construction
pub struct ProgramBuilder {
    options: CompileOptions,
    fsm: Graph,
    patterns: Vec<PatternInfo>,
}

impl ProgramBuilder {
    /// A builder with default options
    pub fn new() -> Self {
        Self::with_options(CompileOptions::default())
    }

    /// A builder with explicit options
    pub fn with_options(options: CompileOptions) -> Self {
        Self {
            options,
            fsm: Graph::new(),
            patterns: Vec::new(),
        }
    }

    /// Number of patterns accepted so far
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Parse, rewrite, and merge one pattern into the machine.
    ///
    /// A pattern with several encodings becomes one NFA per encoding and
    /// one pattern-table entry per (pattern, encoding) pair; all pairs
    /// share the pattern's user index. Nothing is merged until every
    /// encoding compiles, so a failing pattern leaves no partial state.
    pub fn add_pattern(&mut self, pattern: Pattern) -> Result<(), Error> {
        if pattern.user_index >= u32::MAX as u64 {
            return Err(Error::ProgramTooLarge(format!(
                "pattern index {} does not fit the label width",
                pattern.user_index
            )));
        }
        let label = pattern.user_index as u32;

        let mut tree = if pattern.fixed_string {
            parse_fixed(&pattern.expression)
        } else {
            parse(&pattern.expression).map_err(|e| Error::Parse {
                user_index: pattern.user_index,
                expression: pattern.expression.clone(),
                position: e.position,
                message: e.message,
            })?
        };
        rewrite(&mut tree);

        let encodings: Vec<String> = if pattern.encodings.is_empty() {
            self.options.default_encodings.clone()
        } else {
            pattern.encodings.clone()
        };
        let mut nfas = Vec::with_capacity(encodings.len());
        for name in &encodings {
            nfas.push(NfaBuilder::build(&pattern, &tree, name, label)?);
        }

        for (name, nfa) in encodings.into_iter().zip(nfas) {
            Compiler::merge_into_fsm(&mut self.fsm, &nfa);
            let mut entry = pattern.clone();
            entry.encodings = vec![name.clone()];
            self.patterns.push(PatternInfo {
                pattern: entry,
                encoding: name,
            });
        }
        Ok(())
    }

    /// Add every pattern in the list, accumulating failures.
    ///
    /// Patterns that compile are kept even when siblings fail; the error
    /// chain reports each failure with its user index.
    pub fn add_pattern_list(&mut self, patterns: Vec<Pattern>) -> Result<(), ErrorList> {
        let mut errors = ErrorList::new();
        for pattern in patterns {
            if let Err(e) = self.add_pattern(pattern) {
                errors.push(e);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Run the back half of the pipeline and produce the program.
    pub fn build(self) -> Result<Program, Error> {
        let mut fsm = self.fsm;
        Compiler::label_guard_states(&mut fsm);
        if self.options.determinize {
            fsm = Compiler::subset_dfa(&fsm, self.options.determinize_depth);
            Compiler::label_guard_states(&mut fsm);
        }

        let first_byte_set = codegen::first_bytes(&fsm);
        let generated = codegen::generate(&fsm)?;
        debug!(
            "compiled {} patterns into {} words",
            self.patterns.len(),
            generated.code.len()
        );
        Ok(Program {
            code: generated.code,
            first_byte_set,
            num_checked_states: generated.num_checked_states,
            patterns: self.patterns,
        })
    }

    /// The accumulated NFA, for graph output
    pub fn graph(&self) -> &Graph {
        &self.fsm
    }
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Compile a pattern list in one call with default options.
pub fn compile_patterns(patterns: Vec<Pattern>) -> Result<Program, ErrorList> {
    let mut builder = ProgramBuilder::new();
    builder.add_pattern_list(patterns)?;
    builder.build().map_err(ErrorList::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_pattern() {
        let prog = compile_patterns(vec![Pattern::new("foo", 0)]).unwrap();
        assert_eq!(prog.patterns.len(), 1);
        assert!(prog.first_byte_set.contains(b'f'));
        assert_eq!(prog.first_byte_set.count(), 1);
        assert!(!prog.code.is_empty());
    }

    #[test]
    fn test_multiple_patterns_first_bytes() {
        let prog =
            compile_patterns(vec![Pattern::new("foo", 0), Pattern::new("[bh]ar", 1)]).unwrap();
        assert!(prog.first_byte_set.contains(b'f'));
        assert!(prog.first_byte_set.contains(b'b'));
        assert!(prog.first_byte_set.contains(b'h'));
        assert_eq!(prog.first_byte_set.count(), 3);
    }

    #[test]
    fn test_error_accumulation() {
        let mut builder = ProgramBuilder::new();
        let err = builder
            .add_pattern_list(vec![
                Pattern::new("good", 0),
                Pattern::new("a?", 1),
                Pattern::new("(bad", 2),
                Pattern::new("also_good", 3),
            ])
            .unwrap_err();
        assert_eq!(err.len(), 2);
        assert_eq!(err.errors[0].user_index(), Some(1));
        assert_eq!(err.errors[1].user_index(), Some(2));
        // the good patterns still compile
        assert_eq!(builder.pattern_count(), 2);
        assert!(builder.build().is_ok());
    }

    #[test]
    fn test_fixed_string_ignores_metacharacters() {
        let prog =
            compile_patterns(vec![Pattern::new("a.c", 0).fixed_string(true)]).unwrap();
        assert_eq!(prog.first_byte_set.count(), 1);
        assert!(prog.first_byte_set.contains(b'a'));
    }

    #[test]
    fn test_huge_user_index_rejected() {
        let mut builder = ProgramBuilder::new();
        let err = builder
            .add_pattern(Pattern::new("a", u64::MAX))
            .unwrap_err();
        assert!(matches!(err, Error::ProgramTooLarge(_)));
    }

    #[test]
    fn test_default_encoding_override() {
        let options = CompileOptions {
            default_encodings: vec!["UTF-16LE".to_string()],
            ..CompileOptions::default()
        };
        let mut builder = ProgramBuilder::with_options(options);
        builder.add_pattern(Pattern::new("a", 0)).unwrap();
        let prog = builder.build().unwrap();
        // UTF-16LE 'a' starts with byte 0x61, low byte first
        assert!(prog.first_byte_set.contains(0x61));
        assert_eq!(prog.patterns[0].encoding, "UTF-16LE");
    }

    #[test]
    fn test_no_determinize_option() {
        let options = CompileOptions {
            determinize: false,
            ..CompileOptions::default()
        };
        let mut builder = ProgramBuilder::with_options(options);
        builder.add_pattern(Pattern::new("ab|ac", 0)).unwrap();
        assert!(builder.build().is_ok());
    }
}
