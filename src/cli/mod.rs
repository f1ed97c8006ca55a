//! Command-line arguments.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

pub use commands::run;

#[derive(Parser, Debug)]
#[command(
    name = "heapsift",
    version,
    about = "Explore Go heap dumps",
    long_about = "Explore heap dumps written by Go's debug.WriteHeapDump.\n\n\
                  Explains why an object is alive, lists its owners, renders its \
                  neighbourhood as SVG and finds objects two dumps have in common."
)]
pub struct Cli {
    /// Heap dump file
    pub dump: PathBuf,

    #[command(subcommand)]
    pub command: Command,

    /// Config file (default: ~/.heapsift/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// File of `<address> <name>` pairs used to label objects
    #[arg(long, global = true)]
    pub oid: Option<PathBuf>,

    /// Go binary that produced the dump; symbols are read with `go tool nm`
    #[arg(long, global = true)]
    pub program: Option<PathBuf>,

    /// Output format for reports
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    pub format: OutputFormat,

    /// Log debug output to stderr
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print every record in the dump
    Print {
        /// Only print records whose line contains this text
        #[arg(long)]
        find: Option<String>,
    },

    /// Show the roots keeping an object alive
    Anchors {
        #[arg(value_parser = parse_address)]
        address: u64,
    },

    /// Show the objects referencing an object, level by level
    Owners {
        #[arg(value_parser = parse_address)]
        address: u64,

        /// Extra levels to walk (default from config)
        #[arg(long)]
        depth: Option<usize>,
    },

    /// Dump the raw bytes of an object
    Hexdump {
        #[arg(value_parser = parse_address)]
        address: u64,
    },

    /// List objects that also occur, structurally, in another dump
    Intersect {
        /// Second heap dump
        other: PathBuf,
    },

    /// Render the objects reachable from an object as SVG
    Svg {
        #[arg(value_parser = parse_address)]
        address: u64,

        /// Output file
        #[arg(short, long, default_value = "heap.svg")]
        output: PathBuf,

        /// Objects drawn before the rest is summarised (default from config)
        #[arg(long)]
        max_nodes: Option<usize>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// `0x`-prefixed hex or plain decimal.
pub fn parse_address(text: &str) -> Result<u64, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| format!("invalid address {text:?}: {e}"))
}
