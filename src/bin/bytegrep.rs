mod cli_utils;
mod commands;
mod hit_writer;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::{cmd_compile, cmd_graph, cmd_search};

#[derive(Parser)]
#[command(name = "bytegrep")]
#[command(
    about = "Multi-pattern regex search over binary data",
    long_about = "bytegrep - multi-pattern byte-oriented regex engine for forensic scanning\n\n\
    Compile many patterns (with per-pattern encodings and case folding) into one\n\
    automaton and scan files or directories in a single pass. Patterns match raw\n\
    bytes, so UTF-16 text, binary blobs, and disk images all search the same way.\n\n\
    Features:\n\
      • Multi-pattern search with pattern indices on every hit\n\
      • Byte encodings: ASCII/Latin-1, UTF-8, UTF-16LE/BE, UTF-32LE/BE\n\
      • Leftmost-longest, non-overlapping hits per pattern\n\
      • Compiled programs save to disk and reload instantly\n\
      • Memory-mapped input, recursive directory walking\n\n\
    Examples:\n\
      bytegrep search 'foo[0-9]+' file.bin\n\
      bytegrep search -p patterns.txt -e UTF-16LE --recursive dir/\n\
      bytegrep compile -p patterns.txt -o patterns.bgp\n\
      bytegrep search --program patterns.bgp image.dd\n\
      bytegrep graph -p patterns.txt | dot -Tpng > nfa.png"
)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search files for pattern matches
    Search {
        /// Pattern, unless -p/--pattern-file or --program is given
        #[arg(value_name = "PATTERN")]
        pattern: Option<String>,

        /// Input files or directories; "-" or empty reads stdin
        #[arg(value_name = "INPUT")]
        inputs: Vec<PathBuf>,

        /// File with one pattern per line
        #[arg(short = 'p', long)]
        pattern_file: Option<PathBuf>,

        /// Load a compiled program instead of patterns
        #[arg(long, conflicts_with_all = ["pattern_file", "encoding", "ignore_case", "fixed_strings"])]
        program: Option<PathBuf>,

        /// Encodings to expand patterns under (repeatable, comma-separated)
        #[arg(short = 'e', long, value_delimiter = ',')]
        encoding: Vec<String>,

        /// Case-insensitive matching
        #[arg(short = 'i', long)]
        ignore_case: bool,

        /// Treat patterns as literal strings
        #[arg(short = 'F', long)]
        fixed_strings: bool,

        /// Lines of context before each hit
        #[arg(short = 'B', long, default_value = "0")]
        before_context: usize,

        /// Lines of context after each hit
        #[arg(short = 'A', long, default_value = "0")]
        after_context: usize,

        /// Prefix every hit with the file path
        #[arg(long)]
        print_path: bool,

        /// Recurse into directories
        #[arg(short = 'r', long)]
        recursive: bool,

        /// Write a per-pattern hit-count histogram to this file
        #[arg(long, value_name = "FILE")]
        histogram: Option<PathBuf>,

        /// Emit hits as NDJSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Compile patterns to a program file
    Compile {
        /// Pattern, unless -p/--pattern-file is given
        #[arg(value_name = "PATTERN")]
        pattern: Option<String>,

        /// File with one pattern per line
        #[arg(short = 'p', long)]
        pattern_file: Option<PathBuf>,

        /// Output program file
        #[arg(short = 'o', long, value_name = "FILE")]
        output: PathBuf,

        /// Encodings to expand patterns under
        #[arg(short = 'e', long, value_delimiter = ',')]
        encoding: Vec<String>,

        /// Case-insensitive matching
        #[arg(short = 'i', long)]
        ignore_case: bool,

        /// Treat patterns as literal strings
        #[arg(short = 'F', long)]
        fixed_strings: bool,

        /// Print the generated bytecode listing to stderr
        #[arg(long)]
        listing: bool,
    },

    /// Print the pattern NFA as Graphviz DOT
    Graph {
        /// Pattern, unless -p/--pattern-file is given
        #[arg(value_name = "PATTERN")]
        pattern: Option<String>,

        /// File with one pattern per line
        #[arg(short = 'p', long)]
        pattern_file: Option<PathBuf>,

        /// Encodings to expand patterns under
        #[arg(short = 'e', long, value_delimiter = ',')]
        encoding: Vec<String>,

        /// Case-insensitive matching
        #[arg(short = 'i', long)]
        ignore_case: bool,

        /// Treat patterns as literal strings
        #[arg(short = 'F', long)]
        fixed_strings: bool,
    },
}

/// Configure a stderr logger; level follows -v flags.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} [{:5}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply()
        .expect("failed to configure logging");
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Search {
            pattern,
            inputs,
            pattern_file,
            program,
            encoding,
            ignore_case,
            fixed_strings,
            before_context,
            after_context,
            print_path,
            recursive,
            histogram,
            json,
        } => cmd_search(commands::SearchArgs {
            pattern,
            inputs,
            pattern_file,
            program,
            encoding,
            ignore_case,
            fixed_strings,
            before_context,
            after_context,
            print_path,
            recursive,
            histogram,
            json,
        }),
        Commands::Compile {
            pattern,
            pattern_file,
            output,
            encoding,
            ignore_case,
            fixed_strings,
            listing,
        } => cmd_compile(
            pattern,
            pattern_file,
            output,
            encoding,
            ignore_case,
            fixed_strings,
            listing,
        ),
        Commands::Graph {
            pattern,
            pattern_file,
            encoding,
            ignore_case,
            fixed_strings,
        } => cmd_graph(pattern, pattern_file, encoding, ignore_case, fixed_strings),
    }
}
