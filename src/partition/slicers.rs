//! Slice sources
//!
//! Each slicer turns a stream's configuration (and, for incremental syncs,
//! its resume state) into a lazy sequence of [`StreamSlice`]s.

use super::types::StreamSlice;
use crate::error::{Error, Result};
use crate::types::{JsonValue, SyncMode};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::sync::Arc;

/// Lazy slice sequence
pub type SliceIter = Box<dyn Iterator<Item = StreamSlice> + Send>;

/// Trait for slice sources
pub trait SliceSource: Send + Sync {
    /// Produce the slices to read, restarting from `resume_state` when the
    /// sync is incremental.
    fn slices(&self, sync_mode: SyncMode, resume_state: Option<&JsonValue>) -> Result<SliceIter>;
}

// ============================================================================
// Single Slice
// ============================================================================

/// One empty slice: the whole stream is a single partition
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleSlice;

impl SliceSource for SingleSlice {
    fn slices(&self, _sync_mode: SyncMode, _resume_state: Option<&JsonValue>) -> Result<SliceIter> {
        Ok(Box::new(std::iter::once(StreamSlice::new())))
    }
}

// ============================================================================
// List Slicer
// ============================================================================

/// List-based slicer
///
/// Creates one partition per value of a static list.
#[derive(Debug, Clone)]
pub struct ListSlicer {
    /// List of partition values
    values: Vec<String>,
    /// Field name for partition
    partition_field: String,
}

impl ListSlicer {
    /// Create a new list slicer
    pub fn new(values: Vec<String>, partition_field: impl Into<String>) -> Self {
        Self {
            values,
            partition_field: partition_field.into(),
        }
    }

    /// Get the partition field name
    pub fn partition_field(&self) -> &str {
        &self.partition_field
    }
}

impl SliceSource for ListSlicer {
    fn slices(&self, _sync_mode: SyncMode, _resume_state: Option<&JsonValue>) -> Result<SliceIter> {
        let field = self.partition_field.clone();
        let values = self.values.clone();
        Ok(Box::new(values.into_iter().map(move |v| {
            StreamSlice::new().with_partition(field.clone(), v)
        })))
    }
}

// ============================================================================
// Datetime Slicer
// ============================================================================

/// Datetime-based slicer
///
/// Cuts `[start, end)` into `step`-sized windows. Incremental syncs restart at
/// the persisted watermark minus the lookback window, never before `start`.
#[derive(Debug, Clone)]
pub struct DatetimeSlicer {
    /// Start datetime
    start: DateTime<Utc>,
    /// End datetime, `None` means "now" at generation time
    end: Option<DateTime<Utc>>,
    /// Step duration
    step: Duration,
    /// Format string for datetime output
    format: String,
    /// Slice key for the window start
    start_param: String,
    /// Slice key for the window end
    end_param: String,
    /// Cursor field the resume watermark is stored under
    cursor_field: String,
    /// How far before the watermark to restart
    lookback: Duration,
}

impl DatetimeSlicer {
    /// Create a new datetime slicer
    pub fn new(
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
        step: Duration,
        cursor_field: impl Into<String>,
    ) -> Self {
        Self {
            start,
            end,
            step,
            format: "%Y-%m-%dT%H:%M:%SZ".to_string(),
            start_param: "start".to_string(),
            end_param: "end".to_string(),
            cursor_field: cursor_field.into(),
            lookback: Duration::zero(),
        }
    }

    /// Create from string values
    pub fn from_strings(start: &str, end: &str, step: &str, cursor_field: &str) -> Result<Self> {
        let start_dt = parse_datetime(start)?;
        let end_dt = if end == "now" || end.is_empty() {
            None
        } else {
            Some(parse_datetime(end)?)
        };
        let step_dur = parse_duration(step)?;

        Ok(Self::new(start_dt, end_dt, step_dur, cursor_field))
    }

    /// Set the output format
    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    /// Set the slice keys for the window boundaries
    #[must_use]
    pub fn with_params(mut self, start_param: impl Into<String>, end_param: impl Into<String>) -> Self {
        self.start_param = start_param.into();
        self.end_param = end_param.into();
        self
    }

    /// Set the lookback window
    #[must_use]
    pub fn with_lookback(mut self, lookback: Duration) -> Self {
        self.lookback = lookback;
        self
    }

    /// Slice keys holding the window boundaries
    pub fn boundary_fields(&self) -> (&str, &str) {
        (&self.start_param, &self.end_param)
    }

    /// Output format of the boundaries
    pub fn format(&self) -> &str {
        &self.format
    }

    /// Where an incremental sync restarts
    fn resume_start(&self, resume_state: Option<&JsonValue>) -> Result<DateTime<Utc>> {
        let Some(watermark) = resume_state.and_then(|s| watermark_from_state(s, &self.cursor_field))
        else {
            return Ok(self.start);
        };

        let watermark = parse_datetime_value(watermark).ok_or_else(|| {
            Error::config(format!(
                "Resume state value {watermark} for '{}' is not a datetime",
                self.cursor_field
            ))
        })?;

        let restart = watermark.checked_sub_signed(self.lookback).ok_or_else(|| {
            Error::config(format!(
                "Lookback of {} from {watermark} is out of the datetime range",
                self.lookback
            ))
        })?;
        Ok(std::cmp::max(self.start, restart))
    }
}

impl SliceSource for DatetimeSlicer {
    fn slices(&self, sync_mode: SyncMode, resume_state: Option<&JsonValue>) -> Result<SliceIter> {
        if self.step <= Duration::zero() {
            return Err(Error::invalid_value("step", "must be a positive duration"));
        }

        let start = match sync_mode {
            SyncMode::FullRefresh => self.start,
            SyncMode::Incremental => self.resume_start(resume_state)?,
        };
        let end = self.end.unwrap_or_else(Utc::now);

        Ok(Box::new(DatetimeWindows {
            current: start,
            end,
            step: self.step,
            format: self.format.clone(),
            start_param: self.start_param.clone(),
            end_param: self.end_param.clone(),
        }))
    }
}

/// Lazy iterator over datetime windows
struct DatetimeWindows {
    current: DateTime<Utc>,
    end: DateTime<Utc>,
    step: Duration,
    format: String,
    start_param: String,
    end_param: String,
}

impl Iterator for DatetimeWindows {
    type Item = StreamSlice;

    fn next(&mut self) -> Option<StreamSlice> {
        if self.current >= self.end {
            return None;
        }

        // Past the datetime range means this is the last window
        let next = self.current.checked_add_signed(self.step).unwrap_or(self.end);
        let window_end = std::cmp::min(next, self.end);
        let slice = StreamSlice::new()
            .with_cursor(
                self.start_param.clone(),
                self.current.format(&self.format).to_string(),
            )
            .with_cursor(
                self.end_param.clone(),
                window_end.format(&self.format).to_string(),
            );

        self.current = next;
        Some(slice)
    }
}

// ============================================================================
// Product Slicer
// ============================================================================

/// Combines an entity slicer with a window slicer: every outer slice is read
/// once per inner window.
#[derive(Clone)]
pub struct ProductSlicer {
    outer: Arc<dyn SliceSource>,
    inner: Arc<dyn SliceSource>,
}

impl ProductSlicer {
    /// Create a product of two slicers
    pub fn new(outer: Arc<dyn SliceSource>, inner: Arc<dyn SliceSource>) -> Self {
        Self { outer, inner }
    }
}

impl SliceSource for ProductSlicer {
    fn slices(&self, sync_mode: SyncMode, resume_state: Option<&JsonValue>) -> Result<SliceIter> {
        let outer: Vec<StreamSlice> = self.outer.slices(sync_mode, resume_state)?.collect();
        let inner: Vec<StreamSlice> = self.inner.slices(sync_mode, resume_state)?.collect();

        Ok(Box::new(outer.into_iter().flat_map(move |o| {
            inner
                .clone()
                .into_iter()
                .map(move |i| StreamSlice {
                    partition: o.partition.clone().into_iter().chain(i.partition).collect(),
                    cursor_slice: o
                        .cursor_slice
                        .clone()
                        .into_iter()
                        .chain(i.cursor_slice)
                        .collect(),
                })
        })))
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Find the watermark stored for `cursor_field`, either at the top level or in
/// the global section of a per-partition state.
pub(crate) fn watermark_from_state<'a>(state: &'a JsonValue, cursor_field: &str) -> Option<&'a JsonValue> {
    state
        .get(cursor_field)
        .or_else(|| state.get("state").and_then(|global| global.get(cursor_field)))
        .filter(|v| !v.is_null())
}

/// Parse a JSON value holding a datetime string or epoch seconds
pub fn parse_datetime_value(value: &JsonValue) -> Option<DateTime<Utc>> {
    match value {
        JsonValue::String(s) => parse_datetime(s).ok(),
        JsonValue::Number(n) => n
            .as_i64()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .or_else(|| {
                n.as_f64()
                    .and_then(|f| DateTime::from_timestamp_millis((f * 1000.0) as i64))
            }),
        _ => None,
    }
}

/// Parse a datetime string into UTC DateTime
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    // Try RFC 3339 first
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Try common formats
    let formats = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d",
        "%Y/%m/%d",
    ];

    for fmt in formats {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(DateTime::from_naive_utc_and_offset(ndt, Utc));
        }
        if let Ok(nd) = NaiveDate::parse_from_str(s, fmt) {
            let ndt = nd.and_time(NaiveTime::MIN);
            return Ok(DateTime::from_naive_utc_and_offset(ndt, Utc));
        }
    }

    Err(Error::config(format!("Invalid datetime format: {s}")))
}

/// Parse a duration string like "1d", "2h", "30m"
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();

    let (num_str, suffix) = if let Some(stripped) = s.strip_suffix('d') {
        (stripped, 'd')
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, 'h')
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, 'm')
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, 's')
    } else if let Some(stripped) = s.strip_suffix('w') {
        (stripped, 'w')
    } else {
        // Assume days if no suffix
        (s, 'd')
    };

    let num: i64 = num_str
        .parse()
        .map_err(|_| Error::config(format!("Invalid duration number: {num_str}")))?;

    let duration = match suffix {
        'w' => Duration::try_weeks(num),
        'd' => Duration::try_days(num),
        'h' => Duration::try_hours(num),
        'm' => Duration::try_minutes(num),
        's' => Duration::try_seconds(num),
        _ => return Err(Error::config(format!("Invalid duration suffix: {suffix}"))),
    };

    duration.ok_or_else(|| Error::config(format!("Duration out of range: {s}")))
}
