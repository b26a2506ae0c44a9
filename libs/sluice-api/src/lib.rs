pub mod config;
pub mod error;
pub mod schema;
pub mod source;
pub mod value;

pub use config::{ConfigParam, ConfigValues, ParamType, ParamValue};
pub use error::{ErrorKind, SourceError};
pub use schema::{ColumnDescriptor, Confidence, DeclaredColumn, LogicalType, ResultMetadata};
pub use source::{Connection, ConnectionResolver, RowSource};
pub use value::{ColumnName, NativeValue, NormalizedRow, RawRow, ScalarValue, WrappedNumber};
