//! svctxn CLI
//!
//! Command-line tools for exercising the svctxn transaction engine.
//!
//! # Commands
//!
//! - `simulate` - Drive a transaction with worker threads and report the outcome
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use commands::simulate::SimulateOptions;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// svctxn command-line tools.
#[derive(Parser)]
#[command(name = "svctxn")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one transaction with simulated child tasks
    Simulate {
        /// Number of child tasks
        #[arg(short, long, default_value = "4")]
        children: usize,

        /// Worker threads reporting for the children
        #[arg(short, long, default_value = "2")]
        workers: usize,

        /// Request a rollback instead of a commit
        #[arg(short, long)]
        rollback: bool,

        /// Have the first child report a problem of this severity
        #[arg(short, long)]
        severity: Option<String>,

        /// Worst severity that still allows a commit
        #[arg(short, long, default_value = "warning")]
        threshold: String,

        /// Milliseconds to wait for the transaction to terminate
        #[arg(long, default_value = "10000")]
        timeout_ms: u64,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Simulate {
            children,
            workers,
            rollback,
            severity,
            threshold,
            timeout_ms,
            format,
        } => {
            let options = SimulateOptions {
                children,
                workers,
                rollback,
                severity,
                threshold,
                timeout: Duration::from_millis(timeout_ms),
            };
            commands::simulate::run(&options, &format)?;
        }
        Commands::Version => {
            println!("svctxn CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("svctxn Core v{}", svctxn_core::VERSION);
        }
    }

    Ok(())
}
