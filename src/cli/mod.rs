//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Parser, Subcommand};

/// Safety-constrained production test runner
#[derive(Parser, Debug)]
#[command(name = "prod-test-engine")]
#[command(version)]
#[command(about = "Run read-only verification suites against a production service")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error); overrides --verbose
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the built-in production checks
    Run(RunArgs),

    /// List the checks that would run
    List(ListArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

/// Arguments for run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Configuration file (defaults to PROD_TEST_CONFIG or the user config dir)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Run tests in parallel
    #[arg(short, long)]
    pub parallel: bool,

    /// Number of concurrent tests (when parallel)
    #[arg(short = 'n', long)]
    pub concurrent: Option<usize>,

    /// Stop at the first failing test
    #[arg(long)]
    pub fail_fast: bool,

    /// Only run checks of this category (availability, performance, security)
    #[arg(long)]
    pub category: Option<String>,

    /// Output format (table, json, json-pretty, csv, summary)
    #[arg(short, long)]
    pub format: Option<String>,

    /// Save the report to file
    #[arg(short, long)]
    pub output: Option<String>,
}

/// Arguments for list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Only list checks of this category
    #[arg(long)]
    pub category: Option<String>,
}

/// Arguments for config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a default configuration file
    Init {
        /// Output path
        #[arg(short, long)]
        output: Option<String>,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Show the effective configuration
    Show {
        /// Configuration file
        #[arg(short, long)]
        config: Option<String>,

        /// Output format (yaml, json)
        #[arg(short, long, default_value = "yaml")]
        format: String,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file
        file: Option<String>,
    },

    /// Show environment variable overrides
    Env,
}
