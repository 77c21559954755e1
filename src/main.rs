//! pysift CLI entry point

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use pysift::{Cli, Commands};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

fn run() -> pysift::Result<()> {
    let cli = Cli::parse();
    match &cli.command {
        Commands::Graph(args) => pysift::commands::graph::run(args, cli.verbose),
        Commands::Select(args) => pysift::commands::select::run(args, cli.verbose),
        Commands::Validate(args) => pysift::commands::validate::run(args, cli.verbose),
    }
}
