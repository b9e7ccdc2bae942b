//! CLI argument parsing using clap.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Incremental, include-aware SystemVerilog indexer
#[derive(Parser, Debug)]
#[command(
    name = "hdlindex",
    version = env!("CARGO_PKG_VERSION"),
    about = "Incremental, include-aware SystemVerilog indexer",
    long_about = "Index SystemVerilog sources, resolve `include trees, and query declarations, references and diagnostics.",
    next_line_help = true,
    styles = clap_cargo_style()
)]
pub struct Cli {
    /// Path to a custom settings.toml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory to index
    #[arg(short, long, global = true, default_value = ".")]
    pub base: PathBuf,

    /// Take root files, include directories and defines from an argument file
    #[arg(long, global = true)]
    pub argfile: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create .hdlindex/settings.toml in the current directory
    Init {
        /// Overwrite an existing settings file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the effective settings
    Config,

    /// Build (or refresh) the index and print a summary
    Index {
        /// Directory to index (overrides --base)
        base: Option<PathBuf>,

        /// Worker threads for per-file stages (overrides settings)
        #[arg(short, long, conflicts_with = "no_threads")]
        threads: Option<usize>,

        /// Run every stage on the calling thread
        #[arg(long)]
        no_threads: bool,

        /// Discard any snapshot and rebuild from scratch
        #[arg(short, long)]
        force: bool,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// List every file in the index (roots and everything they include)
    Files {
        /// List unresolved include strings instead
        #[arg(long)]
        missing: bool,
    },

    /// Find global-scope declarations by name
    Find {
        name: String,

        /// Compare names without regard to ASCII case
        #[arg(short, long, conflicts_with = "prefix")]
        ignore_case: bool,

        /// Match every name starting with NAME
        #[arg(short, long)]
        prefix: bool,

        #[arg(long)]
        json: bool,
    },

    /// Find imports, extensions and includes naming NAME
    Refs {
        name: String,

        #[arg(long)]
        json: bool,
    },

    /// Print diagnostics recorded for a file
    Diagnostics {
        path: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// Keep the index current while files change
    Watch {
        /// Quiet period for modified files in milliseconds (overrides settings)
        #[arg(long)]
        debounce: Option<u64>,
    },
}
