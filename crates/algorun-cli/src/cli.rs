use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "algorun CLI - run pipelines of named, versioned algorithms over in-memory workspaces.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads for parallel computation.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Seed a registry from a pipeline file and run its steps in order.
    Run(RunArgs),
    /// List every algorithm the built-in factory can create.
    Algorithms,
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Path to the pipeline file in TOML format.
    #[arg(required = true, value_name = "PIPELINE")]
    pub pipeline: PathBuf,

    /// Build every step and apply its properties without executing anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Do not record invocations in workspace histories, overriding the pipeline file.
    #[arg(long)]
    pub no_history: bool,

    /// Override the separator used when naming fan-out output members.
    #[arg(long, value_name = "CHAR")]
    pub group_separator: Option<char>,

    /// Set a specific configuration value, overriding the pipeline file.
    /// Can be used multiple times. Example: -S engine.parallel-threshold=128
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}
