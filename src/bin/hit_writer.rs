//! Hit output formatting
//!
//! Text hits are `offset<TAB>length<TAB>pattern-index<TAB>expression`,
//! optionally prefixed with the file path; `--json` switches to one JSON
//! object per line. Context printing pulls whole lines around the hit
//! from the searched buffer, and the histogram counts hits per pattern
//! across the entire run.

use anyhow::Result;
use bytegrep::{Program, SearchHit};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;

#[derive(Serialize)]
struct JsonHit<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<&'a str>,
    start: u64,
    end: u64,
    pattern_index: u64,
    expression: &'a str,
}

/// Formats hits and accumulates the histogram
pub struct HitWriter {
    json: bool,
    print_path: bool,
    before_context: usize,
    after_context: usize,
    /// pattern index to hit count, ordered for stable output
    histogram: BTreeMap<u64, u64>,
    total: u64,
}

impl HitWriter {
    /// A writer with the output options from the command line
    pub fn new(json: bool, print_path: bool, before_context: usize, after_context: usize) -> Self {
        Self {
            json,
            print_path,
            before_context,
            after_context,
            histogram: BTreeMap::new(),
            total: 0,
        }
    }

    /// Total hits written so far
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Write one hit. `buf` is the searched block and `base` its global
    /// offset, used for context extraction.
    pub fn write_hit(
        &mut self,
        out: &mut dyn Write,
        hit: &SearchHit,
        prog: &Program,
        path: Option<&str>,
        buf: &[u8],
        base: u64,
    ) -> Result<()> {
        self.total += 1;
        *self.histogram.entry(hit.user_index).or_insert(0) += 1;

        let expression = prog
            .patterns
            .iter()
            .find(|p| p.pattern.user_index == hit.user_index)
            .map(|p| p.pattern.expression.as_str())
            .unwrap_or("");

        if self.json {
            let record = JsonHit {
                path: if self.print_path { path } else { None },
                start: hit.start,
                end: hit.end,
                pattern_index: hit.user_index,
                expression,
            };
            serde_json::to_writer(&mut *out, &record)?;
            writeln!(out)?;
            return Ok(());
        }

        if self.print_path {
            if let Some(p) = path {
                write!(out, "{}:", p)?;
            }
        }
        writeln!(
            out,
            "{}\t{}\t{}\t{}",
            hit.start,
            hit.end - hit.start,
            hit.user_index,
            expression
        )?;

        if self.before_context > 0 || self.after_context > 0 {
            self.write_context(out, hit, buf, base)?;
        }
        Ok(())
    }

    /// Print the lines around the hit, the hit line marked with `>`.
    fn write_context(
        &self,
        out: &mut dyn Write,
        hit: &SearchHit,
        buf: &[u8],
        base: u64,
    ) -> Result<()> {
        let start = (hit.start.saturating_sub(base)) as usize;
        let start = start.min(buf.len());

        // walk back over before_context + 1 line starts
        let mut line_start = start;
        for i in 0..=self.before_context {
            match buf[..line_start].iter().rposition(|&b| b == b'\n') {
                Some(nl) if i < self.before_context => line_start = nl,
                Some(nl) => {
                    line_start = nl + 1;
                    break;
                }
                None => {
                    line_start = 0;
                    break;
                }
            }
        }

        // walk forward over after_context + 1 line ends
        let mut line_end = start;
        for _ in 0..=self.after_context {
            match buf[line_end..].iter().position(|&b| b == b'\n') {
                Some(nl) => line_end += nl + 1,
                None => {
                    line_end = buf.len();
                    break;
                }
            }
        }

        let mut cursor = line_start;
        for line in buf[line_start..line_end].split_inclusive(|&b| b == b'\n') {
            let text = String::from_utf8_lossy(line);
            let text = text.trim_end_matches(['\n', '\r']);
            let global = base + cursor as u64;
            let contains_hit =
                global <= hit.start && hit.start < global + line.len() as u64;
            writeln!(out, "{} {}", if contains_hit { ">" } else { " " }, text)?;
            cursor += line.len();
        }
        Ok(())
    }

    /// Write the per-pattern histogram.
    pub fn write_histogram(&self, out: &mut dyn Write, prog: &Program) -> Result<()> {
        for (index, count) in &self.histogram {
            let expression = prog
                .patterns
                .iter()
                .find(|p| p.pattern.user_index == *index)
                .map(|p| p.pattern.expression.as_str())
                .unwrap_or("");
            writeln!(out, "{}\t{}\t{}", index, count, expression)?;
        }
        Ok(())
    }
}
