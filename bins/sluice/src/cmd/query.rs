use serde::Serialize;

use sluice_api::NormalizedRow;
use sluice_engine::{BatchStream, execute, is_query_file};

use crate::cli::QueryArgs;
use crate::cmd::{emit, load_config, resolver};
use crate::error::CliError;

#[derive(Serialize)]
struct BatchLine<'a> {
    batch: usize,
    rows: &'a [NormalizedRow],
}

enum Step<T> {
    Next(T),
    Interrupted,
}

pub async fn run(args: QueryArgs) -> Result<(), CliError> {
    let config = load_config(&args.connection)?;
    let resolver = resolver(args.connection.demo);
    let values = config.connection_values(&resolver.config_params())?;
    let sql = query_text(&args)?;
    let batch_size = args.batch_size.unwrap_or(config.batch_size);

    let stream = execute(resolver.as_ref(), &sql, &values, batch_size).await?;
    print_batches(stream).await
}

fn query_text(args: &QueryArgs) -> Result<String, CliError> {
    if let Some(sql) = &args.sql {
        return Ok(sql.clone());
    }
    let Some(path) = &args.file else {
        return Err(CliError::NoQuery);
    };
    if !is_query_file(path) {
        return Err(CliError::NotSqlFile(path.display().to_string()));
    }
    std::fs::read_to_string(path).map_err(|source| CliError::ReadQuery {
        path: path.display().to_string(),
        source,
    })
}

async fn print_batches(mut stream: BatchStream) -> Result<(), CliError> {
    let mut batches = 0usize;
    let mut rows = 0usize;
    loop {
        let step = tokio::select! {
            next = stream.next_batch() => Step::Next(next),
            _ = tokio::signal::ctrl_c() => Step::Interrupted,
        };
        let batch = match step {
            Step::Interrupted => {
                tracing::warn!(batches, "interrupted, closing query");
                stream.close().await;
                return Err(CliError::Interrupted);
            }
            Step::Next(None) => break,
            Step::Next(Some(batch)) => batch?,
        };
        rows += batch.len();
        emit(&BatchLine {
            batch: batches,
            rows: batch.rows(),
        })?;
        batches += 1;
    }

    if let Some(metadata) = stream.metadata() {
        emit(&metadata)?;
    }
    tracing::info!(batches, rows, "query finished");
    Ok(())
}
