//! Cursor value types
//!
//! Cursor fields hold datetimes, numbers, or plain strings. They are parsed
//! into [`CursorValue`] so every variant shares one total order.

use crate::error::{Error, Result};
use crate::partition::{parse_datetime_value, StreamSlice};
use crate::types::{JsonObject, JsonValue};
use chrono::{DateTime, SecondsFormat, Utc};
use std::cmp::Ordering;

/// A comparable cursor value
#[derive(Debug, Clone)]
pub enum CursorValue {
    Integer(i64),
    Float(f64),
    DateTime(DateTime<Utc>),
    String(String),
}

impl CursorValue {
    fn rank(&self) -> u8 {
        match self {
            CursorValue::Integer(_) | CursorValue::Float(_) => 0,
            CursorValue::DateTime(_) => 1,
            CursorValue::String(_) => 2,
        }
    }
}

impl Ord for CursorValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (CursorValue::Integer(a), CursorValue::Integer(b)) => a.cmp(b),
            (CursorValue::Integer(a), CursorValue::Float(b)) => (*a as f64).total_cmp(b),
            (CursorValue::Float(a), CursorValue::Integer(b)) => a.total_cmp(&(*b as f64)),
            (CursorValue::Float(a), CursorValue::Float(b)) => a.total_cmp(b),
            (CursorValue::DateTime(a), CursorValue::DateTime(b)) => a.cmp(b),
            (CursorValue::String(a), CursorValue::String(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for CursorValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for CursorValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for CursorValue {}

/// How raw cursor values are interpreted and written back
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ValueKind {
    /// Numbers compare numerically, strings lexicographically
    #[default]
    Ordinal,
    /// Values are datetimes (strings or epoch seconds), persisted with `format`
    Datetime { format: String },
}

impl ValueKind {
    /// Datetime values written as RFC 3339
    pub fn datetime() -> Self {
        Self::Datetime {
            format: "%Y-%m-%dT%H:%M:%S%.fZ".to_string(),
        }
    }

    /// Datetime values written with a custom strftime format
    pub fn datetime_with_format(format: impl Into<String>) -> Self {
        Self::Datetime {
            format: format.into(),
        }
    }

    /// Parse a raw value
    pub fn parse(&self, value: &JsonValue) -> Option<CursorValue> {
        match self {
            ValueKind::Ordinal => match value {
                JsonValue::Number(n) => n
                    .as_i64()
                    .map(CursorValue::Integer)
                    .or_else(|| n.as_f64().map(CursorValue::Float)),
                JsonValue::String(s) => Some(CursorValue::String(s.clone())),
                _ => None,
            },
            ValueKind::Datetime { .. } => parse_datetime_value(value).map(CursorValue::DateTime),
        }
    }

    /// Write a value back to JSON
    pub fn to_json(&self, value: &CursorValue) -> JsonValue {
        match value {
            CursorValue::Integer(i) => JsonValue::from(*i),
            CursorValue::Float(f) => JsonValue::from(*f),
            CursorValue::String(s) => JsonValue::String(s.clone()),
            CursorValue::DateTime(dt) => match self {
                ValueKind::Datetime { format } => JsonValue::String(dt.format(format).to_string()),
                ValueKind::Ordinal => {
                    JsonValue::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
                }
            },
        }
    }
}

/// Where a cursor reads its values from
#[derive(Debug, Clone)]
pub struct CursorField {
    /// Record field holding the cursor value
    pub name: String,
    /// Slice keys holding the window start and end, if slices are windowed
    pub boundary: Option<(String, String)>,
    /// Value interpretation
    pub kind: ValueKind,
}

impl CursorField {
    /// Cursor on a record field, without slice boundaries
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            boundary: None,
            kind: ValueKind::Ordinal,
        }
    }

    /// Set the slice keys of the window boundaries
    #[must_use]
    pub fn with_boundary(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.boundary = Some((start.into(), end.into()));
        self
    }

    /// Set the value kind
    #[must_use]
    pub fn with_kind(mut self, kind: ValueKind) -> Self {
        self.kind = kind;
        self
    }

    /// Cursor value of a record
    pub fn value_of(&self, record: &JsonObject) -> Option<CursorValue> {
        record.get(&self.name).and_then(|v| self.kind.parse(v))
    }

    /// Lower bound of a slice's window
    pub fn slice_start(&self, slice: &StreamSlice) -> Option<CursorValue> {
        let (start, _) = self.boundary.as_ref()?;
        slice.cursor_value(start).and_then(|v| self.kind.parse(v))
    }

    /// Upper bound of a slice's window.
    ///
    /// Fails when the cursor is windowed but the slice has no end value.
    pub fn slice_end(&self, slice: &StreamSlice) -> Result<Option<CursorValue>> {
        let Some((_, end)) = &self.boundary else {
            return Ok(None);
        };
        let raw = slice.cursor_value(end).ok_or_else(|| {
            Error::system(format!("Slice {slice} has no '{end}' boundary"))
        })?;
        self.kind
            .parse(raw)
            .map(Some)
            .ok_or_else(|| Error::system(format!("Slice boundary {raw} is not a cursor value")))
    }

    /// Compare two records, treating a missing value as the smallest
    pub fn is_greater_than_or_equal(&self, a: &JsonObject, b: &JsonObject) -> bool {
        match (self.value_of(a), self.value_of(b)) {
            (Some(a), Some(b)) => a >= b,
            (Some(_), None) | (None, None) => true,
            (None, Some(_)) => false,
        }
    }

    /// Move the window start of `slice` up to the most recent record's value
    pub fn narrow(&self, slice: &StreamSlice, most_recent: Option<&JsonObject>) -> StreamSlice {
        let (Some((start, _)), Some(value)) = (&self.boundary, most_recent.and_then(|r| self.value_of(r)))
        else {
            return slice.clone();
        };
        if self.slice_start(slice).is_some_and(|current| value <= current) {
            return slice.clone();
        }

        let mut narrowed = slice.clone();
        narrowed
            .cursor_slice
            .insert(start.clone(), self.kind.to_json(&value));
        narrowed
    }
}

/// Three-way watermark max, ignoring missing candidates
pub(crate) fn max_watermark(
    current: Option<CursorValue>,
    slice_end: Option<CursorValue>,
    most_recent: Option<CursorValue>,
) -> Option<CursorValue> {
    [current, slice_end, most_recent].into_iter().flatten().max()
}

/// Tracks the "initialize exactly once" contract shared by every cursor
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct InitGuard {
    initialized: bool,
}

impl InitGuard {
    pub(crate) fn begin(&mut self, stream: &str) -> Result<()> {
        if self.initialized {
            return Err(Error::system(format!(
                "Cursor for stream '{stream}' was already initialized"
            )));
        }
        self.initialized = true;
        Ok(())
    }

    pub(crate) fn ensure(&self, stream: &str, operation: &str) -> Result<()> {
        if !self.initialized {
            return Err(Error::system(format!(
                "Cursor for stream '{stream}' used ({operation}) before set_initial_state"
            )));
        }
        Ok(())
    }
}
