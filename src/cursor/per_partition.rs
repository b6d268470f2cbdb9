//! Per-partition cursor
//!
//! Keeps one watermark per partition key, up to a fixed number of keys. When
//! the limit is hit the partition closed longest ago is evicted and its
//! watermark folds into a global low watermark.
//!
//! Records from a partition that is no longer tracked are judged by an
//! approximation: if the slice starts strictly after the first evicted
//! watermark the partition is treated as new; otherwise its records are
//! compared against the global low watermark. This can re-emit records that
//! an evicted partition had already synced.
//!
//! Emission decisions use the watermarks loaded at sync start. Closing slices
//! during the sync only changes the persisted state.

use super::types::{max_watermark, CursorField, CursorValue, InitGuard};
use super::StreamCursor;
use crate::error::{Error, Result};
use crate::partition::{Record, StreamSlice};
use crate::types::{JsonObject, JsonValue};
use serde_json::{json, Map};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// One tracked partition
#[derive(Debug, Clone)]
struct PartitionEntry {
    partition: BTreeMap<String, JsonValue>,
    watermark: Option<CursorValue>,
    seq: u64,
}

/// Partition watermarks in close order, bounded by `capacity`
#[derive(Debug, Clone)]
struct BoundedStateMap {
    capacity: usize,
    entries: HashMap<String, PartitionEntry>,
    /// close sequence -> partition key, oldest first
    order: BTreeMap<u64, String>,
    /// multiset of live watermarks
    live: BTreeMap<CursorValue, usize>,
    next_seq: u64,
}

impl BoundedStateMap {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: BTreeMap::new(),
            live: BTreeMap::new(),
            next_seq: 0,
        }
    }

    fn get(&self, key: &str) -> Option<&PartitionEntry> {
        self.entries.get(key)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn lowest(&self) -> Option<&CursorValue> {
        self.live.keys().next()
    }

    /// Store a watermark as the most recently closed entry, returning whatever
    /// had to be evicted to stay within capacity.
    fn upsert(
        &mut self,
        key: String,
        partition: BTreeMap<String, JsonValue>,
        watermark: Option<CursorValue>,
    ) -> Vec<PartitionEntry> {
        if let Some(previous) = self.entries.remove(&key) {
            self.order.remove(&previous.seq);
            self.untrack(previous.watermark.as_ref());
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.track(watermark.as_ref());
        self.order.insert(seq, key.clone());
        self.entries.insert(
            key,
            PartitionEntry {
                partition,
                watermark,
                seq,
            },
        );

        let mut evicted = Vec::new();
        while self.entries.len() > self.capacity {
            let Some((_, oldest)) = self.order.pop_first() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&oldest) {
                self.untrack(entry.watermark.as_ref());
                evicted.push(entry);
            }
        }
        evicted
    }

    fn watermarks(&self) -> HashMap<String, Option<CursorValue>> {
        self.entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.watermark.clone()))
            .collect()
    }

    fn oldest_first(&self) -> impl Iterator<Item = &PartitionEntry> {
        self.order.values().filter_map(|key| self.entries.get(key))
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.live.clear();
    }

    fn track(&mut self, watermark: Option<&CursorValue>) {
        if let Some(value) = watermark {
            *self.live.entry(value.clone()).or_insert(0) += 1;
        }
    }

    fn untrack(&mut self, watermark: Option<&CursorValue>) {
        let Some(value) = watermark else {
            return;
        };
        if let Some(count) = self.live.get_mut(value) {
            *count -= 1;
            if *count == 0 {
                self.live.remove(value);
            }
        }
    }
}

/// Watermarks as loaded from state, fixed for the rest of the sync
#[derive(Debug, Clone, Default)]
struct SyncBoundary {
    states: HashMap<String, Option<CursorValue>>,
    evicted_boundary: Option<CursorValue>,
    low: Option<CursorValue>,
}

impl SyncBoundary {
    fn should_be_synced(&self, field: &CursorField, slice: &StreamSlice, value: &CursorValue) -> bool {
        if let Some(watermark) = self.states.get(&slice.partition_key()) {
            return watermark.as_ref().map_or(true, |w| value > w);
        }
        let Some(boundary) = &self.evicted_boundary else {
            return true;
        };
        if field.slice_start(slice).is_some_and(|start| start > *boundary) {
            return true;
        }
        self.low.as_ref().map_or(true, |low| value > low)
    }
}

/// Bounded per-partition watermarks with a global fallback
#[derive(Debug, Clone)]
pub struct PerPartitionCursor {
    stream: String,
    field: CursorField,
    states: BoundedStateMap,
    /// watermark of the first partition ever evicted
    evicted_boundary: Option<CursorValue>,
    /// lowest watermark among evicted partitions
    evicted_low: Option<CursorValue>,
    sync_boundary: SyncBoundary,
    guard: InitGuard,
}

impl PerPartitionCursor {
    pub fn new(stream: impl Into<String>, field: CursorField, max_states: usize) -> Self {
        Self {
            stream: stream.into(),
            field,
            states: BoundedStateMap::new(max_states),
            evicted_boundary: None,
            evicted_low: None,
            sync_boundary: SyncBoundary::default(),
            guard: InitGuard::default(),
        }
    }

    pub fn field(&self) -> &CursorField {
        &self.field
    }

    /// Number of partitions currently tracked
    pub fn tracked_partitions(&self) -> usize {
        self.states.len()
    }

    /// Watermark for a partition, if it is still tracked
    pub fn partition_watermark(&self, slice: &StreamSlice) -> Option<&CursorValue> {
        self.states
            .get(&slice.partition_key())
            .and_then(|entry| entry.watermark.as_ref())
    }

    /// Lowest watermark across tracked and evicted partitions
    pub fn global_low(&self) -> Option<&CursorValue> {
        match (self.evicted_low.as_ref(), self.states.lowest()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn store(&mut self, key: String, partition: BTreeMap<String, JsonValue>, watermark: Option<CursorValue>) {
        for entry in self.states.upsert(key, partition, watermark) {
            warn!(
                stream = %self.stream,
                partition = ?entry.partition,
                "Partition state limit reached, evicting oldest closed partition"
            );
            let Some(watermark) = entry.watermark else {
                continue;
            };
            if self.evicted_boundary.is_none() {
                self.evicted_boundary = Some(watermark.clone());
            }
            self.evicted_low = match self.evicted_low.take() {
                Some(low) => Some(low.min(watermark)),
                None => Some(watermark),
            };
        }
    }

    fn parse_state_value(&self, raw: &JsonValue) -> Result<CursorValue> {
        self.field.kind.parse(raw).ok_or_else(|| {
            Error::config(format!(
                "State value {raw} for '{}' of stream '{}' is not a cursor value",
                self.field.name, self.stream
            ))
        })
    }
}

impl StreamCursor for PerPartitionCursor {
    fn set_initial_state(&mut self, state: Option<&JsonValue>) -> Result<()> {
        self.guard.begin(&self.stream)?;
        let Some(state) = state else {
            return Ok(());
        };

        if let Some(states) = state.get("states").and_then(JsonValue::as_array) {
            for item in states {
                let partition: BTreeMap<String, JsonValue> = match item.get("partition") {
                    Some(JsonValue::Object(map)) => {
                        map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
                    }
                    _ => {
                        return Err(Error::config(format!(
                            "Partition state for stream '{}' has no 'partition' object",
                            self.stream
                        )))
                    }
                };
                let watermark = item
                    .get("cursor")
                    .and_then(|c| c.get(&self.field.name))
                    .map(|raw| self.parse_state_value(raw))
                    .transpose()?;
                let key = StreamSlice {
                    partition: partition.clone(),
                    ..StreamSlice::default()
                }
                .partition_key();
                self.store(key, partition, watermark);
            }
        }

        // The global value only matters once something has been evicted
        if let Some(boundary) = state.get("evicted_boundary") {
            self.evicted_boundary = Some(self.parse_state_value(boundary)?);
            if let Some(raw) = state.get("state").and_then(|s| s.get(&self.field.name)) {
                let low = self.parse_state_value(raw)?;
                self.evicted_low = Some(match self.evicted_low.take() {
                    Some(current) => current.min(low),
                    None => low,
                });
            }
        }

        self.sync_boundary = SyncBoundary {
            states: self.states.watermarks(),
            evicted_boundary: self.evicted_boundary.clone(),
            low: self.global_low().cloned(),
        };
        debug!(
            stream = %self.stream,
            partitions = self.states.len(),
            "Loaded per-partition state"
        );
        Ok(())
    }

    fn should_be_synced(&self, record: &Record) -> bool {
        let Some(value) = self.field.value_of(record.data()) else {
            return true;
        };
        self.sync_boundary
            .should_be_synced(&self.field, record.partition().slice(), &value)
    }

    fn is_greater_than_or_equal(&self, a: &JsonObject, b: &JsonObject) -> bool {
        self.field.is_greater_than_or_equal(a, b)
    }

    fn close_slice(&mut self, slice: &StreamSlice, most_recent: Option<&JsonObject>) -> Result<()> {
        self.guard.ensure(&self.stream, "close_slice")?;

        let key = slice.partition_key();
        let current = self.states.get(&key).and_then(|e| e.watermark.clone());
        let upper = self.field.slice_end(slice)?;
        let recent = most_recent.and_then(|r| self.field.value_of(r));
        let watermark = max_watermark(current, upper, recent);

        debug!(stream = %self.stream, partition = %key, watermark = ?watermark, "Closed partition slice");
        self.store(key, slice.partition.clone(), watermark);
        Ok(())
    }

    fn get_stream_state(&self) -> JsonValue {
        let kind = &self.field.kind;
        let states: Vec<JsonValue> = self
            .states
            .oldest_first()
            .map(|entry| {
                let mut cursor = Map::new();
                if let Some(watermark) = &entry.watermark {
                    cursor.insert(self.field.name.clone(), kind.to_json(watermark));
                }
                json!({ "partition": entry.partition, "cursor": cursor })
            })
            .collect();

        let mut state = Map::new();
        state.insert("states".to_string(), JsonValue::Array(states));
        if let Some(low) = self.global_low() {
            state.insert(
                "state".to_string(),
                json!({ self.field.name.clone(): kind.to_json(low) }),
            );
        }
        if let Some(boundary) = &self.evicted_boundary {
            state.insert("evicted_boundary".to_string(), kind.to_json(boundary));
        }
        JsonValue::Object(state)
    }

    fn reduce_slice_range(&self, slice: &StreamSlice, most_recent: Option<&JsonObject>) -> StreamSlice {
        self.field.narrow(slice, most_recent)
    }

    fn reset(&mut self) {
        self.states.clear();
        self.evicted_boundary = None;
        self.evicted_low = None;
        self.sync_boundary = SyncBoundary::default();
    }
}
