//! # Command-Line Interface Module
//!
//! Clap derive definitions for the `mixquery` binary.
//!
//! ## Commands
//!
//! - `init-db`: Create the library schema
//! - `import`: Load a library dump from JSON
//! - `query`: Run an ad-hoc mix and print one page (or every row)
//! - `explain`: Show how a mix is parsed, compiled and rendered to SQL
//! - `mix`: Manage saved mixes
//! - `operators`: List supported operators
//!
//! ## Examples
//!
//! ```bash
//! mixquery import library.json
//! mixquery query 'lib::directory.deep(workout);sort::duration(false);pipe::limit(5)'
//! mixquery mix create "Gym" 'lib::directory.deep(workout);pipe::recommend(8)'
//! mixquery mix run 1 --format m3u8 --output gym.m3u8
//! ```

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

/// How query results are printed.
#[derive(Copy, Clone, Default, PartialEq, Eq, ValueEnum, Debug)]
pub enum OutputFormat {
    /// Aligned columns for the terminal
    #[default]
    Table,
    /// The full result as JSON, including diagnostics and cursor
    Json,
    /// An M3U8 playlist
    M3u8,
}

/// Main application arguments structure.
#[derive(Parser)]
#[command(name = "mixquery")]
#[command(about = "mixquery: declarative mixes over a local music library")]
#[command(version)]
pub struct Args {
    /// Library database file
    ///
    /// Defaults to the platform data directory, e.g.
    /// ~/.local/share/mixquery/library.db on Linux.
    #[arg(long, global = true, env = "MIXQUERY_DB", value_hint = clap::ValueHint::FilePath)]
    pub db: Option<PathBuf>,

    /// JSON configuration file
    ///
    /// Must exist when given. Without it, <data dir>/mixquery/config.json is
    /// used if present.
    #[arg(long, global = true, env = "MIXQUERY_CONFIG", value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Paging and output options shared by `query` and `mix run`.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct PageArgs {
    /// Page to return, starting at 0
    #[arg(long, default_value_t = 0)]
    pub cursor: u64,

    /// Rows per page
    ///
    /// Defaults to pipe::limit when the mix has one, else to the configured
    /// default page size.
    #[arg(long)]
    pub page_size: Option<u64>,

    /// Return every row as a single page
    #[arg(long, conflicts_with_all = ["cursor", "page_size"])]
    pub all: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,

    /// Write the output to a file instead of stdout
    ///
    /// With the m3u8 format a missing .m3u8 extension is added and the file
    /// is replaced atomically.
    #[arg(long, short, value_hint = clap::ValueHint::FilePath)]
    pub output: Option<PathBuf>,
}

/// Enumeration of all available subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Create the library database schema
    ///
    /// Existing tables are kept unless --force is given.
    InitDb {
        /// Delete and recreate the database file
        #[arg(long)]
        force: bool,
    },

    /// Import a library dump
    ///
    /// Reads a JSON document of the form {"files": [...]} where every entry
    /// carries the media file columns plus optional artists, albums,
    /// playlists, stats and analysis. The import runs in one transaction.
    Import {
        /// JSON file to import
        #[arg(value_hint = clap::ValueHint::FilePath)]
        path: PathBuf,
    },

    /// Run an ad-hoc mix
    ///
    /// The mix is written as operator(parameter) segments separated by ';',
    /// e.g. 'lib::artist(3);filter::liked(true);sort::duration(false)'.
    /// Unknown operators are reported on stderr and ignored.
    Query {
        /// Mix text
        mix: String,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Show the parsed operators, compiled query and SQL of a mix
    Explain {
        /// Mix text
        mix: String,
    },

    /// Manage saved mixes
    #[command(subcommand)]
    Mix(MixCommand),

    /// List the supported operators
    Operators,

    /// Generate shell completions
    ///
    /// Usage: mixquery completion bash > ~/.local/share/bash-completion/completions/mixquery
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },

    /// List operator prefixes for completion (hidden command)
    #[command(hide = true)]
    CompleteOperators {
        /// Shell the words are formatted for
        #[arg(long)]
        shell: Option<Shell>,
    },

    /// List saved mixes for completion (hidden command)
    #[command(hide = true)]
    CompleteMixes {
        /// Shell the words are formatted for
        #[arg(long)]
        shell: Option<Shell>,
    },
}

/// Saved mix subcommands.
#[derive(Subcommand)]
pub enum MixCommand {
    /// Save a new mix
    Create {
        /// Display name
        name: String,

        /// Mix text
        mix: String,

        /// Group the mix is listed under
        #[arg(long, default_value = "")]
        group: String,
    },

    /// List saved mixes
    List,

    /// Show a saved mix and its operators
    Show {
        /// Mix id
        id: i64,
    },

    /// Run a saved mix
    Run {
        /// Mix id
        id: i64,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Rename, regroup, lock or unlock a saved mix
    Update {
        /// Mix id
        id: i64,

        /// New display name
        #[arg(long)]
        name: Option<String>,

        /// New group
        #[arg(long)]
        group: Option<String>,

        /// Mark the mix as locked
        #[arg(long, conflicts_with = "unlock")]
        lock: bool,

        /// Clear the locked mark
        #[arg(long)]
        unlock: bool,
    },

    /// Append operators to a saved mix
    ///
    /// Operator/parameter pairs already in the mix are skipped.
    Add {
        /// Mix id
        id: i64,

        /// Mix text with the operators to add
        mix: String,
    },

    /// Replace all operators of a saved mix
    Set {
        /// Mix id
        id: i64,

        /// New mix text
        mix: String,
    },

    /// Delete a saved mix
    Remove {
        /// Mix id
        id: i64,
    },
}
