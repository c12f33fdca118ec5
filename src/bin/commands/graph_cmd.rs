//! The graph subcommand

use crate::cli_utils::{builder_for, load_patterns};
use anyhow::Result;
use bytegrep::graph::write_graphviz;
use std::path::PathBuf;

pub fn cmd_graph(
    pattern: Option<String>,
    pattern_file: Option<PathBuf>,
    encoding: Vec<String>,
    ignore_case: bool,
    fixed_strings: bool,
) -> Result<()> {
    let patterns = load_patterns(
        pattern.as_deref(),
        pattern_file.as_deref(),
        ignore_case,
        fixed_strings,
    )?;

    let mut builder = builder_for(&encoding);
    builder
        .add_pattern_list(patterns)
        .map_err(|chain| anyhow::anyhow!("{}", chain))?;

    print!("{}", write_graphviz(builder.graph()));
    Ok(())
}
