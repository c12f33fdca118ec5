//! The compile subcommand

use crate::cli_utils::{builder_for, load_patterns};
use anyhow::{Context, Result};
use log::debug;
use std::path::PathBuf;

pub fn cmd_compile(
    pattern: Option<String>,
    pattern_file: Option<PathBuf>,
    output: PathBuf,
    encoding: Vec<String>,
    ignore_case: bool,
    fixed_strings: bool,
    listing: bool,
) -> Result<()> {
    let patterns = load_patterns(
        pattern.as_deref(),
        pattern_file.as_deref(),
        ignore_case,
        fixed_strings,
    )?;
    let count = patterns.len();

    let mut builder = builder_for(&encoding);
    builder
        .add_pattern_list(patterns)
        .map_err(|chain| anyhow::anyhow!("{}", chain))?;
    let prog = builder.build()?;

    if listing {
        eprint!("{}", prog.listing());
    }

    prog.save(&output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    debug!(
        "wrote {} ({} patterns, {} code words)",
        output.display(),
        count,
        prog.code.len()
    );
    eprintln!(
        "{}: {} patterns, {} bytes",
        output.display(),
        count,
        prog.serialize().len()
    );
    Ok(())
}
