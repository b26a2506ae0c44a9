mod cli;
mod cmd;
mod error;

use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    // stdout carries query results; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Query(args) => cmd::query::run(args).await,
        Commands::TestConnection(args) => cmd::test_connection::run(args).await,
    };
    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
