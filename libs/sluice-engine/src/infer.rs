//! Result schema from declared metadata or a sampled row.

use sluice_api::{ColumnDescriptor, DeclaredColumn, RawRow};

use crate::type_map::{descriptor_for_tag, descriptor_for_value};

/// What the schema is inferred from.
#[derive(Debug, Clone, Copy)]
pub enum SchemaSource<'a> {
    /// Declared (name, type tag) pairs from the store. Preferred.
    Metadata(&'a [DeclaredColumn]),
    /// First row of the result, `None` for an empty result.
    Sample(Option<&'a RawRow>),
}

pub fn infer_schema(source: SchemaSource<'_>) -> Vec<ColumnDescriptor> {
    match source {
        SchemaSource::Metadata(columns) => from_metadata(columns),
        SchemaSource::Sample(Some(row)) => from_sample(row),
        SchemaSource::Sample(None) => Vec::new(),
    }
}

fn from_metadata(columns: &[DeclaredColumn]) -> Vec<ColumnDescriptor> {
    columns
        .iter()
        .map(|c| descriptor_for_tag(&c.name, c.type_tag.as_deref()))
        .collect()
}

fn from_sample(row: &RawRow) -> Vec<ColumnDescriptor> {
    row.iter()
        .map(|(name, value)| descriptor_for_value(name, value))
        .collect()
}
