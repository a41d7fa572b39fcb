//! CLI argument parsing for jl

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "jl")]
#[command(author, version, about = "Watch a bounded-concurrency job limiter at work", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Submit simulated jobs one by one and wait for every result
    Run(WorkloadArgs),

    /// Run simulated jobs through the batch map, stopping at the first failure
    Map(WorkloadArgs),

    /// Print the effective configuration
    Config,
}

/// Workload options shared by `run` and `map`; unset values come from config
#[derive(Args, Debug, Clone, Default)]
pub struct WorkloadArgs {
    /// Number of jobs to submit
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Max jobs in flight (0 = unlimited)
    #[arg(short = 'n', long)]
    pub concurrency: Option<usize>,

    /// How long each job takes, in milliseconds
    #[arg(short, long)]
    pub delay_ms: Option<u64>,

    /// Job number (1-based) that should fail; repeatable
    #[arg(short, long = "fail")]
    pub fail: Vec<usize>,

    /// Reject queued jobs as soon as a running job fails
    #[arg(long)]
    pub abort_on_error: bool,
}
