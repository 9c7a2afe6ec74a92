//! Command-line options.

use std::path::PathBuf;

use clap::{ArgAction, Parser};

/// A YAML-driven, cross-platform task runner.
#[derive(Debug, Parser)]
#[command(name = "drun", version, about)]
pub struct App {
    /// Configuration file (default: probe drun.yml, drun.yaml,
    /// .drun/drun.yml, .drun/drun.yaml)
    #[arg(short, long, value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// List available recipes and exit
    #[arg(long)]
    pub list: bool,

    /// Render and print what would run without spawning processes
    #[arg(long)]
    pub dry_run: bool,

    /// Print rendered scripts and environment before executing
    #[arg(long)]
    pub explain: bool,

    /// Maximum parallel jobs (default: number of CPUs)
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Shell preference or target OS tag (linux, darwin, windows)
    #[arg(long, value_name = "NAME")]
    pub shell: Option<String>,

    /// Override a variable (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    /// Disable the recipe result cache
    #[arg(long)]
    pub no_cache: bool,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Recipe name followed by its positionals and flags
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub recipe_and_args: Vec<String>,
}
