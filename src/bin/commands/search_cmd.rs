//! The search subcommand

use crate::cli_utils::{builder_for, collect_inputs, load_patterns};
use crate::hit_writer::HitWriter;
use anyhow::{Context, Result};
use bytegrep::{Program, Vm};
use log::{debug, warn};
use memmap2::Mmap;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::PathBuf;

/// Options for `bytegrep search`
pub struct SearchArgs {
    pub pattern: Option<String>,
    pub inputs: Vec<PathBuf>,
    pub pattern_file: Option<PathBuf>,
    pub program: Option<PathBuf>,
    pub encoding: Vec<String>,
    pub ignore_case: bool,
    pub fixed_strings: bool,
    pub before_context: usize,
    pub after_context: usize,
    pub print_path: bool,
    pub recursive: bool,
    pub histogram: Option<PathBuf>,
    pub json: bool,
}

pub fn cmd_search(args: SearchArgs) -> Result<()> {
    // with --program the positional pattern is really an input path
    let mut inputs = args.inputs;
    let prog = match &args.program {
        Some(path) => {
            if let Some(p) = args.pattern {
                inputs.insert(0, PathBuf::from(p));
            }
            Program::load(path)
                .with_context(|| format!("failed to load program {}", path.display()))?
        }
        None => {
            let patterns = load_patterns(
                args.pattern.as_deref(),
                args.pattern_file.as_deref(),
                args.ignore_case,
                args.fixed_strings,
            )?;
            let mut builder = builder_for(&args.encoding);
            builder
                .add_pattern_list(patterns)
                .map_err(|chain| anyhow::anyhow!("{}", chain))?;
            builder.build()?
        }
    };
    debug!(
        "program ready: {} patterns, {} code words",
        prog.patterns.len(),
        prog.code.len()
    );

    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut writer = HitWriter::new(
        args.json,
        args.print_path,
        args.before_context,
        args.after_context,
    );

    if inputs.is_empty() || (inputs.len() == 1 && inputs[0].as_os_str() == "-") {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("failed to read stdin")?;
        search_buffer(&prog, &buf, None, &mut writer, &mut out)?;
    } else {
        let files = collect_inputs(&inputs, args.recursive)?;
        for path in files {
            let display = path.display().to_string();
            match map_file(&path) {
                Ok(Some(mmap)) => {
                    search_buffer(&prog, &mmap, Some(&display), &mut writer, &mut out)?
                }
                Ok(None) => {} // empty file
                Err(e) => warn!("skipping {}: {}", display, e),
            }
        }
    }
    out.flush()?;

    if let Some(path) = &args.histogram {
        let mut file = File::create(path)
            .with_context(|| format!("could not open histogram file {}", path.display()))?;
        writer.write_histogram(&mut file, &prog)?;
    }
    debug!("{} hits total", writer.total());
    Ok(())
}

fn map_file(path: &PathBuf) -> Result<Option<Mmap>> {
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(None);
    }
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(Some(mmap))
}

fn search_buffer(
    prog: &Program,
    buf: &[u8],
    path: Option<&str>,
    writer: &mut HitWriter,
    out: &mut dyn Write,
) -> Result<()> {
    let mut vm = Vm::new(prog);
    let mut failed: Option<anyhow::Error> = None;
    {
        let mut on_hit = |hit: bytegrep::SearchHit| {
            if failed.is_none() {
                if let Err(e) = writer.write_hit(&mut *out, &hit, prog, path, buf, 0) {
                    failed = Some(e);
                }
            }
        };
        vm.search(buf, 0, &mut on_hit);
        vm.close_out(&mut on_hit);
    }
    match failed {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
