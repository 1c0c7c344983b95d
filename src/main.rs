//! Production Test Engine - safety-constrained verification runner
//!
//! Runs suites of read-only checks against a live production service with
//! bounded concurrency, per-test timeout and retry, and an emergency stop
//! that halts all pending work.
//!
//! ## Features
//!
//! - Sequential or bounded-parallel suite execution
//! - Linear retry backoff and per-attempt timeouts
//! - Emergency stop on operator interrupt or unexpected engine failure
//! - Multiple output formats (Table, JSON, CSV)
//!
//! ## Usage
//!
//! ```bash
//! # Write a configuration and point it at the service
//! prod-test-engine config init
//!
//! # Run all checks sequentially
//! prod-test-engine run
//!
//! # Run availability checks three at a time, JSON report
//! prod-test-engine run --parallel --concurrent 3 --category availability --format json
//!
//! # List checks without running them
//! prod-test-engine list
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

mod checks;
mod cli;
mod config;
mod error;
mod events;
mod executor;
mod http;
mod models;
mod output;
mod safety;
mod utils;

use cli::Args;
use config::{EngineConfig, EnvConfig};
use executor::TestEngine;
use models::{ExecutionStatistics, TestSuiteConfig};
use output::{write_report_to_file, OutputFormat, ResultFormatter, SuiteReport};
use safety::{EmergencyStopManager, HttpConnectionProvider};
use utils::logger::{init_logger, LogLevel};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let env = EnvConfig::load();

    let verbose = args.verbose || env.verbose.unwrap_or(false);
    let level = match args.log_level.as_deref() {
        Some(name) => LogLevel::from_str(name)
            .ok_or_else(|| anyhow::anyhow!("Unknown log level: {name}"))?,
        None => LogLevel::from_verbose(verbose),
    };
    init_logger(level);

    match args.command {
        cli::Command::Run(run_args) => {
            let all_passed = run_suite(run_args, &env).await?;
            if !all_passed {
                std::process::exit(1);
            }
        }
        cli::Command::List(list_args) => {
            list_checks(list_args, &env)?;
        }
        cli::Command::Config(config_args) => {
            manage_config(config_args, &env)?;
        }
    }

    Ok(())
}

/// Config path from the flag, then PROD_TEST_CONFIG, then the user config dir
fn config_path(flag: Option<&str>, env: &EnvConfig) -> PathBuf {
    flag.map(PathBuf::from)
        .or_else(|| env.config_file.as_deref().map(PathBuf::from))
        .unwrap_or_else(EngineConfig::default_path)
}

/// Load the configuration file (or defaults) and apply environment overrides
fn load_config(flag: Option<&str>, env: &EnvConfig) -> Result<EngineConfig> {
    let path = config_path(flag, env);
    let mut config = if path.exists() {
        info!("Loading configuration from {}", path.display());
        EngineConfig::load(&path)?
    } else {
        info!("No configuration at {}, using defaults", path.display());
        EngineConfig::default()
    };

    env.apply_to(&mut config);
    Ok(config)
}

async fn run_suite(args: cli::RunArgs, env: &EnvConfig) -> Result<bool> {
    let mut config = load_config(args.config.as_deref(), env)?;
    if let Some(concurrent) = args.concurrent {
        config.execution.max_concurrent_tests = concurrent;
    }
    if args.fail_fast {
        config.execution.fail_fast = true;
    }

    let validation = config.validate();
    for warning in &validation.warnings {
        warn!("Configuration warning: {}", warning);
    }
    if !validation.is_valid() {
        for err in &validation.errors {
            error!("Configuration error: {}", err);
        }
        bail!(
            "Configuration is invalid ({} error(s))",
            validation.errors.len()
        );
    }

    let format = match args.format.as_deref().or(env.format.as_deref()) {
        Some(name) => OutputFormat::from_str(name)
            .ok_or_else(|| anyhow::anyhow!("Unknown output format: {name}"))?,
        None => OutputFormat::Table,
    };

    let suite_config = if args.parallel {
        TestSuiteConfig::parallel(config.execution.max_concurrent_tests)
    } else {
        TestSuiteConfig::sequential()
    }
    .with_fail_fast(config.execution.fail_fast);
    let suite = checks::builtin_suite(&config, suite_config, args.category.as_deref())?;

    let emergency = Arc::new(EmergencyStopManager::new(config.emergency_stop_enabled));
    let connection = Arc::new(HttpConnectionProvider::from_config(&config)?);
    let engine = Arc::new(TestEngine::new(connection, emergency.clone()));

    engine
        .initialize(config)
        .await
        .context("Failed to initialize test engine")?;

    let interrupt = {
        let engine = engine.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, requesting emergency stop");
                if let Err(e) = engine.request_emergency_stop("interrupted by operator").await {
                    error!("{}", e);
                }
            }
        })
    };

    let outcome = engine.execute_suite(&suite).await;
    interrupt.abort();

    let results = match outcome {
        Ok(results) => results,
        Err(e) => {
            engine.cleanup()?;
            return Err(e).context(format!("Suite {} failed", suite.id));
        }
    };

    let statistics = engine
        .current_statistics()
        .unwrap_or_else(|| ExecutionStatistics::from_results(suite.tests.len(), results.values()));
    let report = SuiteReport::new(&suite.id, &results, &statistics);

    println!("{}", ResultFormatter::new(format).format_report(&report)?);
    if let Some(path) = &args.output {
        write_report_to_file(path, &report, format)?;
        info!("Report saved to {}", path);
    }

    if let Some(state) = emergency.state() {
        warn!(
            "Emergency stop was triggered: {} - {} (by {})",
            state.reason, state.details, state.initiated_by
        );
        for action in &state.recovery_actions {
            warn!("  {}", action);
        }
    }

    engine.cleanup()?;
    emergency.cleanup();

    Ok(statistics.is_all_passed())
}

fn list_checks(args: cli::ListArgs, env: &EnvConfig) -> Result<()> {
    let config = load_config(args.config.as_deref(), env)?;
    let suite = checks::builtin_suite(
        &config,
        TestSuiteConfig::sequential(),
        args.category.as_deref(),
    )?;

    if suite.tests.is_empty() {
        println!("No checks configured. Set target.base_url or PROD_TEST_BASE_URL.");
        return Ok(());
    }

    print!("{}", ResultFormatter::default().format_test_list(&suite));
    Ok(())
}

fn manage_config(args: cli::ConfigArgs, env: &EnvConfig) -> Result<()> {
    match args.action {
        cli::ConfigAction::Init { output, force } => {
            let path = config_path(output.as_deref(), env);
            if path.exists() && !force {
                bail!(
                    "Configuration file already exists: {}. Use --force to overwrite.",
                    path.display()
                );
            }

            EngineConfig::default().save(&path)?;
            println!("✓ Configuration file created: {}", path.display());
            println!("\nSet target.base_url and target.services before running.");
        }

        cli::ConfigAction::Show { config, format } => {
            let config = load_config(config.as_deref(), env)?;
            let output = if format == "json" {
                serde_json::to_string_pretty(&config)?
            } else {
                serde_yaml::to_string(&config)?
            };
            println!("{output}");
        }

        cli::ConfigAction::Validate { file } => {
            let path = config_path(file.as_deref(), env);
            let config = EngineConfig::load(&path)?;
            let report = config.validate();

            for warning in &report.warnings {
                println!("  ⚠ {warning}");
            }
            if report.is_valid() {
                println!("✓ Configuration file is valid: {}", path.display());
            } else {
                println!("✗ Configuration file is invalid: {}", path.display());
                for err in &report.errors {
                    println!("  Error: {err}");
                }
                bail!("{} configuration error(s)", report.errors.len());
            }
        }

        cli::ConfigAction::Env => {
            if env.has_any() {
                env.print_summary();
                println!();
            }
            config::print_env_help();
        }
    }

    Ok(())
}
