//! # entl CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use entl_cli::expire::{run_expire, ExpireArgs};
use entl_cli::inspect::{run_inspect, InspectArgs};
use entl_cli::seed::{run_seed, SeedArgs};

/// Course entitlements operator CLI.
///
/// Seeds schedule test data, sweeps expired entitlements and inspects
/// entitlement policy state in JSON dataset files.
#[derive(Parser, Debug)]
#[command(name = "entl", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Append a course run with scheduled enrollments for email testing.
    Seed(SeedArgs),

    /// Expire every entitlement whose expiration period has passed.
    Expire(ExpireArgs),

    /// Print the policy report for one entitlement.
    Inspect(InspectArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Seed(args) => run_seed(&args),
        Commands::Expire(args) => run_expire(&args),
        Commands::Inspect(args) => run_inspect(&args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}
