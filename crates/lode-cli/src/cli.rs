//! CLI argument definitions for lode.
//!
//! Uses `clap` derive macros to define the command surface. Each command
//! corresponds to a handler in the [`super::commands`] module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "lode",
    version,
    about = "A dependency resolver and installer",
    long_about = "lode resolves the dependencies declared in Lode.toml, records the exact \
                  versions in Lode.lock, and installs them reproducibly."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve dependencies and write Lode.lock
    Lock {
        /// Only check that Lode.lock matches Lode.toml
        #[arg(long)]
        check: bool,
    },

    /// Install the packages recorded in Lode.lock
    Install {
        /// Environment directory (default: .lode/env)
        #[arg(long)]
        target: Option<PathBuf>,
        /// Number of packages installed in parallel
        #[arg(short, long)]
        jobs: Option<usize>,
        /// Keep installed packages that are no longer locked
        #[arg(long)]
        no_remove: bool,
    },

    /// Add a dependency to Lode.toml and relock
    Add {
        /// Dependency as NAME or NAME@CONSTRAINT
        spec: String,
        /// Use a local directory as the source
        #[arg(long, conflicts_with = "git")]
        path: Option<PathBuf>,
        /// Use a git repository as the source
        #[arg(long)]
        git: Option<String>,
        /// Git revision, branch or tag to check out
        #[arg(long, requires = "git")]
        rev: Option<String>,
        /// Environment marker, e.g. 'os == "linux"'
        #[arg(long)]
        markers: Option<String>,
        /// Extras to enable, comma separated
        #[arg(long, value_delimiter = ',')]
        extras: Vec<String>,
    },

    /// Remove a dependency from Lode.toml and relock
    Remove {
        /// Dependency name
        name: String,
    },

    /// Relock, moving packages to their newest allowed versions
    Update {
        /// Packages to update (default: all)
        packages: Vec<String>,
    },

    /// Print the locked dependency tree
    Tree {
        /// Maximum depth
        #[arg(long)]
        depth: Option<usize>,
        /// Show what depends on a package
        #[arg(long, conflicts_with = "why")]
        invert: Option<String>,
        /// Show how a package is reached from the project
        #[arg(long)]
        why: Option<String>,
    },
}

/// Parse CLI arguments from the environment.
pub fn parse() -> Cli {
    Cli::parse()
}
