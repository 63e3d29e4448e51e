mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;

use commands::model::{LedgerArgs, ModelArgs};
use commands::scenarios::{ScenariosArgs, SensitivityArgs};

/// Monthly project finance model for solar generation assets
#[derive(Parser)]
#[command(
    name = "solar",
    version,
    about = "Monthly project finance model for solar generation assets",
    long_about = "Runs a monthly cash-flow model for a solar project (PPA or community \
                  solar) with decimal precision: energy, revenue, costs, tax credits and \
                  depreciation, sculpted or level debt, reserves, and returns metrics. \
                  Set RUST_LOG=info (or debug) for progress logging on stderr."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full model and print every output
    Run(ModelArgs),
    /// Run the model and print the headline metrics
    Metrics(ModelArgs),
    /// Run the model and print the monthly cash-flow ledger
    Ledger(LedgerArgs),
    /// Run a batch of named scenarios over a base case
    Scenarios(ScenariosArgs),
    /// Sweep one assumption and report one metric
    Sensitivity(SensitivityArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Run(args) => commands::model::run_full(args),
        Commands::Metrics(args) => commands::model::run_metrics(args),
        Commands::Ledger(args) => commands::model::run_ledger(args),
        Commands::Scenarios(args) => commands::scenarios::run_batch(args),
        Commands::Sensitivity(args) => commands::scenarios::run_sensitivity(args),
        Commands::Version => {
            println!("solar {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
