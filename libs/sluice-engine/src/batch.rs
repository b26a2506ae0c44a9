//! Batching pipeline: row source → normalize → fixed-size batches.
//!
//! A producer task owns the row source. Before reading the rows of the
//! next batch it reserves a slot in a capacity-1 channel, so it never
//! runs more than one batch ahead of the caller. Dropping the
//! [`BatchStream`] cancels the producer, which then closes the source.

use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};

use futures::Stream;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use sluice_api::{ColumnDescriptor, NormalizedRow, RawRow, ResultMetadata, RowSource};

use crate::error::EngineError;
use crate::infer::{SchemaSource, infer_schema};
use crate::normalize::normalize;

/// Upper bound for the up-front buffer allocation; large batch sizes grow on demand.
const INITIAL_BUFFER_ROWS: usize = 4096;

type BatchResult = Result<Batch, EngineError>;

/// Normalized rows delivered to the caller as one unit, in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Batch(Vec<NormalizedRow>);

impl Batch {
    pub fn rows(&self) -> &[NormalizedRow] {
        &self.0
    }

    pub fn into_rows(self) -> Vec<NormalizedRow> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Write-once result metadata shared between producer and caller.
#[derive(Debug, Default)]
struct MetadataSlot {
    columns: OnceLock<Vec<ColumnDescriptor>>,
    row_count: OnceLock<u64>,
}

impl MetadataSlot {
    fn publish_columns(&self, columns: Vec<ColumnDescriptor>) {
        // First writer wins; the schema is never recomputed mid-stream.
        let _ = self.columns.set(columns);
    }

    fn publish_row_count(&self, count: u64) {
        let _ = self.row_count.set(count);
    }

    fn has_columns(&self) -> bool {
        self.columns.get().is_some()
    }
}

/// Lazy sequence of batches for one query execution.
///
/// Yields `Ok(batch)` items in row-arrival order. A failing row source
/// yields a single `Err` and then ends; already delivered batches stay valid.
#[derive(Debug)]
pub struct BatchStream {
    rx: mpsc::Receiver<BatchResult>,
    slot: Arc<MetadataSlot>,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl BatchStream {
    /// Next batch, `None` once the result is exhausted (or after an error).
    pub async fn next_batch(&mut self) -> Option<BatchResult> {
        self.rx.recv().await
    }

    /// Result schema. Available before the first batch is delivered.
    pub fn columns(&self) -> Option<&[ColumnDescriptor]> {
        self.slot.columns.get().map(Vec::as_slice)
    }

    /// Total rows: the source's precomputed count, or the number of rows
    /// seen once the source is drained. Unset after a mid-stream failure.
    pub fn expected_row_count(&self) -> Option<u64> {
        self.slot.row_count.get().copied()
    }

    /// Schema and row count together, once both are known.
    pub fn metadata(&self) -> Option<ResultMetadata> {
        Some(ResultMetadata {
            columns: self.columns()?.to_vec(),
            expected_row_count: self.expected_row_count()?,
        })
    }

    /// Stop consuming and wait until the row source has been closed.
    pub async fn close(mut self) {
        self.token.cancel();
        self.rx.close();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "batch producer task failed");
            }
        }
    }
}

impl Drop for BatchStream {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl Stream for BatchStream {
    type Item = BatchResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Start draining `source` into batches of `batch_size` rows.
///
/// Must be called from within a Tokio runtime.
pub fn run(source: Box<dyn RowSource>, batch_size: usize) -> Result<BatchStream, EngineError> {
    if batch_size == 0 {
        return Err(EngineError::InvalidBatchSize);
    }

    let (tx, rx) = mpsc::channel(1);
    let slot = Arc::new(MetadataSlot::default());
    let token = CancellationToken::new();

    let task = tokio::spawn(drive(
        source,
        batch_size,
        tx,
        Arc::clone(&slot),
        token.clone(),
    ));

    Ok(BatchStream {
        rx,
        slot,
        token,
        task: Some(task),
    })
}

enum Outcome {
    Drained { rows: u64, batches: u64 },
    Failed { rows: u64 },
    /// Caller dropped the receiving side.
    Abandoned { rows: u64 },
    Cancelled,
}

async fn drive(
    mut source: Box<dyn RowSource>,
    batch_size: usize,
    tx: mpsc::Sender<BatchResult>,
    slot: Arc<MetadataSlot>,
    token: CancellationToken,
) {
    let outcome = tokio::select! {
        biased;
        _ = token.cancelled() => Outcome::Cancelled,
        outcome = pump(source.as_mut(), batch_size, &tx, &slot) => outcome,
    };

    match outcome {
        Outcome::Drained { rows, batches } => {
            tracing::info!(rows, batches, "row source drained");
        }
        Outcome::Failed { rows } => {
            tracing::warn!(rows, "query aborted by row source error");
        }
        Outcome::Abandoned { rows } => {
            tracing::debug!(rows, "batch stream dropped by caller");
        }
        Outcome::Cancelled => {
            tracing::debug!("batch stream cancelled by caller");
        }
    }

    source.close().await;
}

async fn pump(
    source: &mut dyn RowSource,
    batch_size: usize,
    tx: &mpsc::Sender<BatchResult>,
    slot: &MetadataSlot,
) -> Outcome {
    if let Some(declared) = source.columns() {
        slot.publish_columns(infer_schema(SchemaSource::Metadata(declared)));
    }
    let preset_count = source.row_count_hint();
    if let Some(count) = preset_count {
        slot.publish_row_count(count);
    }

    let mut rows: u64 = 0;
    let mut batches: u64 = 0;

    loop {
        // Wait until the caller has taken the previous batch.
        let Ok(permit) = tx.reserve().await else {
            return Outcome::Abandoned { rows };
        };

        let mut buffer = Vec::with_capacity(batch_size.min(INITIAL_BUFFER_ROWS));
        let exhausted = loop {
            match source.next_row().await {
                Ok(Some(row)) => {
                    if rows == 0 && !slot.has_columns() {
                        slot.publish_columns(first_row_schema(&*source, &row));
                    }
                    rows += 1;
                    buffer.push(normalize(row));
                    if buffer.len() == batch_size {
                        break false;
                    }
                }
                Ok(None) => break true,
                Err(e) => {
                    tracing::warn!(rows, discarded = buffer.len(), error = %e, "row source failed");
                    permit.send(Err(EngineError::from(e)));
                    return Outcome::Failed { rows };
                }
            }
        };

        if exhausted {
            // Empty result without metadata.
            slot.publish_columns(Vec::new());
            if preset_count.is_none() {
                slot.publish_row_count(rows);
            }
            if !buffer.is_empty() {
                batches += 1;
                tracing::debug!(batch = batches, len = buffer.len(), "final batch emitted");
                permit.send(Ok(Batch(buffer)));
            }
            return Outcome::Drained { rows, batches };
        }

        batches += 1;
        tracing::debug!(batch = batches, rows, "batch emitted");
        permit.send(Ok(Batch(buffer)));
    }
}

/// Schema once the first row is in: late-arriving metadata wins over sampling.
fn first_row_schema(source: &dyn RowSource, row: &RawRow) -> Vec<ColumnDescriptor> {
    match source.columns() {
        Some(declared) => infer_schema(SchemaSource::Metadata(declared)),
        None => infer_schema(SchemaSource::Sample(Some(row))),
    }
}
