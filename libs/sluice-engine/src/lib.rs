pub mod batch;
pub mod config;
pub mod error;
pub mod infer;
pub mod normalize;
pub mod query;
pub mod type_map;

pub use batch::{Batch, BatchStream, run};
pub use error::EngineError;
pub use query::{ConnectionStatus, DEFAULT_BATCH_SIZE, execute, is_query_file, test_connection};
