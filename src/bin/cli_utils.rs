//! Shared helpers for the CLI commands

use anyhow::{bail, Context, Result};
use bytegrep::{CompileOptions, Pattern, ProgramBuilder};
use std::fs;
use std::path::{Path, PathBuf};

/// Resolve the pattern set from the positional pattern or a pattern file.
pub fn load_patterns(
    pattern: Option<&str>,
    pattern_file: Option<&Path>,
    ignore_case: bool,
    fixed_strings: bool,
) -> Result<Vec<Pattern>> {
    let mut patterns = match (pattern, pattern_file) {
        (_, Some(path)) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read pattern file {}", path.display()))?;
            bytegrep::pattern::parse_pattern_file(&text)
        }
        (Some(expr), None) => vec![Pattern::new(expr, 0)],
        (None, None) => bail!("no pattern given; pass one or use --pattern-file"),
    };
    if patterns.is_empty() {
        bail!("pattern file contains no patterns");
    }
    for p in patterns.iter_mut() {
        p.case_insensitive = ignore_case;
        p.fixed_string = fixed_strings;
    }
    Ok(patterns)
}

/// A builder with the requested default encodings already applied.
pub fn builder_for(encodings: &[String]) -> ProgramBuilder {
    let mut options = CompileOptions::default();
    if !encodings.is_empty() {
        options.default_encodings = encodings.to_vec();
    }
    ProgramBuilder::with_options(options)
}

/// Expand the input set: directories recurse when asked, files pass
/// through. Entries are sorted for deterministic output.
pub fn collect_inputs(inputs: &[PathBuf], recursive: bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        let meta = fs::metadata(input)
            .with_context(|| format!("cannot stat {}", input.display()))?;
        if meta.is_dir() {
            if !recursive {
                bail!(
                    "{} is a directory; use --recursive to search it",
                    input.display()
                );
            }
            walk_dir(input, &mut files)?;
        } else {
            files.push(input.clone());
        }
    }
    files.sort();
    Ok(files)
}

fn walk_dir(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("cannot read directory {}", dir.display()))?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let meta = entry.metadata()?;
        if meta.is_dir() {
            walk_dir(&path, out)?;
        } else if meta.is_file() {
            out.push(path);
        }
    }
    Ok(())
}
