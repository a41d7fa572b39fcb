//! jl - watch a bounded-concurrency job limiter at work

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tracing::{debug, info};

use joblimit::cli::{Cli, Command, WorkloadArgs};
use joblimit::config::Config;
use joblimit::demo::{self, DemoEvent, DemoPlan, Observer};
use joblimit::limiter::{Limiter, LimiterConfig};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("joblimit")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > INFO
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => s.parse::<tracing::Level>().unwrap_or_else(|_| {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
            tracing::Level::INFO
        }),
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("joblimit.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized, writing to {}", log_dir.display());
    Ok(())
}

/// Merge command-line overrides over the config file
fn resolve(config: &Config, args: &WorkloadArgs) -> (LimiterConfig, DemoPlan) {
    let limiter = LimiterConfig {
        concurrency: args.concurrency.unwrap_or(config.limiter.concurrency),
        abort_on_error: args.abort_on_error || config.limiter.abort_on_error,
    };
    let plan = DemoPlan {
        jobs: args.jobs.unwrap_or(config.demo.jobs),
        delay: Duration::from_millis(args.delay_ms.unwrap_or(config.demo.delay_ms)),
        fail: args.fail.clone(),
    };
    (limiter, plan)
}

fn printing_observer() -> Observer {
    Arc::new(|event: DemoEvent| match event {
        DemoEvent::Started { job, queued } => {
            println!("{} job {} {}", "started ".cyan(), job, format!("(queued: {})", queued).dimmed());
        }
        DemoEvent::Finished { job, ok, queued } => {
            let label = if ok { "finished".green() } else { "failed  ".red() };
            println!("{} job {} {}", label, job, format!("(queued: {})", queued).dimmed());
        }
    })
}

fn describe(limiter: &Limiter) -> String {
    match limiter.capacity() {
        Some(n) => format!("concurrency {}", n),
        None => "no concurrency limit".to_string(),
    }
}

async fn cmd_run(config: &Config, args: &WorkloadArgs) -> Result<()> {
    let (limiter_config, plan) = resolve(config, args);
    let limiter = Limiter::with_config(limiter_config);
    println!("Running {} jobs with {}", plan.jobs, describe(&limiter).cyan());

    let report = demo::run_jobs(&limiter, &plan, printing_observer()).await;

    println!();
    for (i, result) in report.results.iter().enumerate() {
        match result {
            Ok(value) => println!("{} {:>3}: {}", "✓".green(), i + 1, value),
            Err(e) => println!("{} {:>3}: {}", "✗".red(), i + 1, e),
        }
    }
    println!();
    println!("Peak in flight: {}", report.peak_in_flight);
    println!("Peak queue depth: {}", report.peak_queue_depth);
    Ok(())
}

async fn cmd_map(config: &Config, args: &WorkloadArgs) -> Result<()> {
    let (limiter_config, plan) = resolve(config, args);
    let limiter = Limiter::with_config(limiter_config);
    println!("Mapping {} jobs with {}", plan.jobs, describe(&limiter).cyan());

    let outcome = demo::map_jobs(&limiter, &plan, printing_observer()).await;

    println!();
    match outcome {
        Ok(results) => println!("{} results: {:?}", "✓".green(), results),
        Err(e) => println!("{} batch failed: {}", "✗".red(), e),
    }
    println!("Peak in flight: {}", limiter.stats().peak_in_flight);
    Ok(())
}

fn cmd_config(config: &Config) -> Result<()> {
    print!("{}", config.to_yaml()?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!("jl starting");

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Run(args) => cmd_run(&config, &args).await,
        Command::Map(args) => cmd_map(&config, &args).await,
        Command::Config => cmd_config(&config),
    }
}
