//! Incremental decoding of a streamed JSON array of `PartialResultSet`s.
//!
//! The response body arrives in arbitrary byte chunks. `ArrayReader`
//! hands out complete array elements as soon as they are buffered;
//! `RowAssembler` merges chunked values and cuts the flat value list
//! into rows.

use std::collections::VecDeque;

use serde::de::DeserializeOwned;
use serde_json::Value;

use sluice_api::{ColumnName, DeclaredColumn, RawRow, SourceError};

use crate::decode::decode_value;
use crate::wire::{PartialResultSet, SpannerType};

/// Consumed prefix size above which the buffer is compacted.
const COMPACT_THRESHOLD: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArrayState {
    Start,
    Elements,
    Done,
}

/// Result of asking the reader for the next element.
#[derive(Debug)]
pub(crate) enum Frame<T> {
    Item(T),
    /// Buffer holds no complete element; push more bytes.
    NeedMore,
    /// Closing `]` seen.
    End,
}

#[derive(Debug)]
pub(crate) struct ArrayReader {
    buf: Vec<u8>,
    pos: usize,
    state: ArrayState,
}

impl ArrayReader {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            pos: 0,
            state: ArrayState::Start,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        if self.pos == self.buf.len() {
            self.buf.clear();
            self.pos = 0;
        } else if self.pos > COMPACT_THRESHOLD {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
        self.buf.extend_from_slice(chunk);
    }

    pub fn is_done(&self) -> bool {
        self.state == ArrayState::Done
    }

    pub fn next<T: DeserializeOwned>(&mut self) -> Result<Frame<T>, SourceError> {
        loop {
            self.skip_whitespace();
            let Some(&byte) = self.buf.get(self.pos) else {
                return Ok(if self.is_done() { Frame::End } else { Frame::NeedMore });
            };
            match self.state {
                ArrayState::Start => {
                    if byte != b'[' {
                        return Err(SourceError::protocol(format!(
                            "expected JSON array, found {:?}",
                            char::from(byte)
                        )));
                    }
                    self.pos += 1;
                    self.state = ArrayState::Elements;
                }
                ArrayState::Elements => match byte {
                    b',' => self.pos += 1,
                    b']' => {
                        self.pos += 1;
                        self.state = ArrayState::Done;
                        return Ok(Frame::End);
                    }
                    _ => {
                        let mut iter =
                            serde_json::Deserializer::from_slice(&self.buf[self.pos..])
                                .into_iter::<T>();
                        return match iter.next() {
                            Some(Ok(item)) => {
                                self.pos += iter.byte_offset();
                                Ok(Frame::Item(item))
                            }
                            Some(Err(e)) if e.is_eof() => Ok(Frame::NeedMore),
                            Some(Err(e)) => Err(SourceError::from(e)),
                            None => Ok(Frame::NeedMore),
                        };
                    }
                },
                ArrayState::Done => return Ok(Frame::End),
            }
        }
    }

    fn skip_whitespace(&mut self) {
        while self
            .buf
            .get(self.pos)
            .is_some_and(|b| b.is_ascii_whitespace())
        {
            self.pos += 1;
        }
    }
}

/// Turns partial result sets into rows.
#[derive(Debug)]
pub(crate) struct RowAssembler {
    fields: Vec<(ColumnName, SpannerType)>,
    pending: VecDeque<Value>,
    /// Incomplete trailing value waiting for its continuation.
    chunk: Option<Value>,
}

impl RowAssembler {
    pub fn new(fields: Vec<(ColumnName, SpannerType)>) -> Self {
        Self {
            fields,
            pending: VecDeque::new(),
            chunk: None,
        }
    }

    pub fn declared_columns(&self) -> Vec<DeclaredColumn> {
        self.fields
            .iter()
            .map(|(name, ty)| DeclaredColumn::new(name.clone(), ty.code.clone()))
            .collect()
    }

    pub fn push(&mut self, prs: PartialResultSet) -> Result<(), SourceError> {
        let mut values: VecDeque<Value> = prs.values.into();
        if let Some(partial) = self.chunk.take() {
            match values.pop_front() {
                Some(next) => values.push_front(merge_chunk(partial, next)?),
                None => {
                    self.chunk = Some(partial);
                    return Ok(());
                }
            }
        }
        if prs.chunked_value {
            self.chunk = values.pop_back();
        }
        self.pending.extend(values);
        Ok(())
    }

    /// Next complete row, if enough values are buffered.
    pub fn next_row(&mut self) -> Result<Option<RawRow>, SourceError> {
        if self.fields.is_empty() || self.pending.len() < self.fields.len() {
            return Ok(None);
        }
        let mut row = RawRow::with_capacity(self.fields.len());
        for (name, ty) in &self.fields {
            let raw = self.pending.pop_front().unwrap_or(Value::Null);
            let value = decode_value(raw, ty).map_err(|e| e.with_context(format!("column '{name}'")))?;
            row.insert(name.clone(), value);
        }
        Ok(Some(row))
    }

    /// Values or a chunk left over that do not form a full row.
    pub fn has_leftover(&self) -> bool {
        !self.pending.is_empty() || self.chunk.is_some()
    }
}

/// Join a chunked value with its continuation.
///
/// Strings concatenate. Lists concatenate, merging the boundary elements
/// recursively when both are strings or both are lists.
fn merge_chunk(head: Value, tail: Value) -> Result<Value, SourceError> {
    match (head, tail) {
        (Value::String(mut a), Value::String(b)) => {
            a.push_str(&b);
            Ok(Value::String(a))
        }
        (Value::Array(mut a), Value::Array(b)) => {
            let mut rest = b.into_iter();
            match (a.pop(), rest.next()) {
                (Some(last), Some(first)) if is_chunkable_pair(&last, &first) => {
                    a.push(merge_chunk(last, first)?);
                }
                (last, first) => {
                    a.extend(last);
                    a.extend(first);
                }
            }
            a.extend(rest);
            Ok(Value::Array(a))
        }
        (head, tail) => Err(SourceError::protocol(format!(
            "cannot merge chunked value {head} with {tail}"
        ))),
    }
}

fn is_chunkable_pair(a: &Value, b: &Value) -> bool {
    matches!(
        (a, b),
        (Value::String(_), Value::String(_)) | (Value::Array(_), Value::Array(_))
    )
}
