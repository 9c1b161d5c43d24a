// src/cli/mod.rs
//! CLI definitions for cookbook
//!
//! This module contains the command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.
//!
//! - `cook` - Run a recipe through its whole lifecycle
//! - `validate` - Check a recipe without building it
//! - `requirements` - Show the requirements declared for a profile
//! - `probe` - Show what the build machine can do for a target profile

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cookbook")]
#[command(author = "Cookbook Contributors")]
#[command(version)]
#[command(about = "Declarative recipe lifecycle runner for C/C++ packages", long_about = None)]
pub struct Cli {
    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Configure, build, package and test a recipe
    Cook {
        /// Path to the recipe file
        recipe: String,

        /// Host profile: target settings, options and probe overrides
        #[arg(short = 'p', long)]
        profile: Option<String>,

        /// Build profile describing this machine (default: detected)
        #[arg(long)]
        build_profile: Option<String>,

        /// Version index used to resolve requirement ranges
        #[arg(long)]
        index: Option<String>,

        /// Working directory (default: <temp>/cookbook/<name>-<version>)
        #[arg(long)]
        workdir: Option<String>,

        /// Number of parallel build jobs (default: all cores)
        #[arg(short, long)]
        jobs: Option<u32>,

        /// Timeout for each external command, in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Keep source and build folders after a successful cook
        #[arg(long)]
        keep_workdir: bool,

        /// Refuse to download sources over the network
        #[arg(long)]
        offline: bool,

        /// Option override, e.g. -o shared=True (repeatable)
        #[arg(short = 'o', long = "option")]
        options: Vec<String>,

        /// Print the cook result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a recipe without building it
    Validate {
        /// Path to the recipe file
        recipe: String,
    },

    /// Show the requirements a recipe declares for a profile
    Requirements {
        /// Path to the recipe file
        recipe: String,

        /// Host profile
        #[arg(short = 'p', long)]
        profile: Option<String>,

        /// Option override, e.g. -o with_ssl=False (repeatable)
        #[arg(short = 'o', long = "option")]
        options: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show whether this machine can configure and run a target
    Probe {
        /// Host profile describing the target
        #[arg(short = 'p', long)]
        profile: Option<String>,

        /// Build profile describing this machine (default: detected)
        #[arg(long)]
        build_profile: Option<String>,
    },
}
