pub mod query;
pub mod test_connection;

use std::io::Write;

use serde::Serialize;

use sluice_api::ConnectionResolver;
use sluice_engine::config::SluiceConfig;
use sluice_source_memory::MemoryResolver;
use sluice_source_spanner::SpannerResolver;

use crate::cli::ConnectionArgs;
use crate::error::CliError;

/// Store behind the connection: Spanner, or the seeded in-memory store.
pub(crate) fn resolver(demo: bool) -> Box<dyn ConnectionResolver> {
    if demo {
        Box::new(MemoryResolver::demo())
    } else {
        Box::new(SpannerResolver::new())
    }
}

/// Load the config file. Demo mode runs without one.
pub(crate) fn load_config(args: &ConnectionArgs) -> Result<SluiceConfig, CliError> {
    if args.demo && !args.config.exists() {
        tracing::debug!(config = %args.config.display(), "no config file, using defaults");
        return Ok(SluiceConfig::parse("")?);
    }
    let config = SluiceConfig::load(&args.config.to_string_lossy())?;
    tracing::info!(config = %args.config.display(), "loaded config");
    Ok(config)
}

/// Write one JSON line to stdout.
pub(crate) fn emit<T: Serialize>(value: &T) -> Result<(), CliError> {
    let mut out = std::io::stdout().lock();
    serde_json::to_writer(&mut out, value)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}
