//! Quorum CLI entry point.

use clap::Parser;

use quorum::cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => quorum::cli::run(args, cli.json).await,
        Commands::Validate(args) => quorum::cli::validate(&args, cli.json),
    };

    if let Err(err) = result {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
