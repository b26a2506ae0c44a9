use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "sluice", about = "Stream query results as typed JSON batches")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a query and print one JSON line per batch, then the result metadata
    Query(QueryArgs),
    /// Check that the configured connection works
    TestConnection(ConnectionArgs),
}

#[derive(Args, Clone, Debug)]
pub struct ConnectionArgs {
    /// Path to TOML configuration file
    #[arg(long, default_value = "sluice.toml", env = "SLUICE_CONFIG")]
    pub config: PathBuf,

    /// Use the built-in in-memory store instead of Spanner
    #[arg(long)]
    pub demo: bool,
}

#[derive(Args, Clone, Debug)]
pub struct QueryArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Query text
    #[arg(long, required_unless_present = "file", conflicts_with = "file")]
    pub sql: Option<String>,

    /// File holding the query; must end in `.sql`
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Rows per batch; overrides `batch_size` from the config file
    #[arg(long)]
    pub batch_size: Option<usize>,
}
