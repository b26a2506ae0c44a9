use sluice_engine::{ConnectionStatus, test_connection};

use crate::cli::ConnectionArgs;
use crate::cmd::{emit, load_config, resolver};
use crate::error::CliError;

/// Prints `true` or `{"reason": ...}`. A failed check is not a CLI error.
pub async fn run(args: ConnectionArgs) -> Result<(), CliError> {
    let config = load_config(&args)?;
    let resolver = resolver(args.demo);

    let status = match config.connection_values(&resolver.config_params()) {
        Ok(values) => test_connection(resolver.as_ref(), &values).await,
        Err(e) => ConnectionStatus::Failed { reason: e.reason() },
    };
    tracing::info!(store = resolver.name(), ok = status.is_ok(), "connection test finished");
    emit(&status)
}
