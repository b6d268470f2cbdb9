//! Tests for engine module

use super::*;
use crate::config::ConcurrencyConfig;
use crate::error::ErrorKind;
use crate::partition::{ListSlicer, Stream, StreamPartitionGenerator};
use crate::testing::{object, FixtureStream};
use crate::types::StreamStatus;
use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

/// Three partitions "a", "b", "c", each with records `updated` 1..=3 scaled
/// by the partition's position.
fn events_stream() -> Arc<dyn Stream> {
    Arc::new(
        FixtureStream::new("events", |slice| {
            let base = match slice.get("group").and_then(|v| v.as_str()) {
                Some("a") => 0,
                Some("b") => 10,
                _ => 20,
            };
            (1..=3)
                .map(|i| Ok(object(json!({"id": base + i, "updated": base + i}))))
                .collect()
        })
        .with_cursor_field("updated"),
    )
}

fn events_definition() -> StreamDefinition {
    let slicer = ListSlicer::new(vec!["a".into(), "b".into(), "c".into()], "group");
    let generator = StreamPartitionGenerator::new(events_stream(), Arc::new(slicer));
    StreamDefinition::new(Arc::new(generator), Cursor::simple("events", "updated"))
}

fn engine() -> SyncEngine {
    let config = CoreConfig {
        concurrency: ConcurrencyConfig::new(2),
        ..CoreConfig::default()
    };
    SyncEngine::new(config).unwrap()
}

fn ids(records: &[Record]) -> Vec<i64> {
    let mut ids: Vec<i64> = records
        .iter()
        .filter_map(|r| r.get("id").and_then(JsonValue::as_i64))
        .collect();
    ids.sort_unstable();
    ids
}

#[test]
fn test_rejects_invalid_config() {
    let config = CoreConfig {
        concurrency: ConcurrencyConfig::new(0),
        ..CoreConfig::default()
    };
    let err = SyncEngine::new(config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn test_definition_named_after_generator() {
    let definition = events_definition();
    assert_eq!(definition.name, "events");
    assert_eq!(definition.cursor.cursor_field(), Some("updated"));
}

#[test]
fn test_per_partition_cursor_uses_configured_limit() {
    let mut config = CoreConfig::default();
    config.cursor.max_partition_states = 3;
    let engine = SyncEngine::new(config).unwrap();

    let cursor = engine.per_partition_cursor("events", crate::cursor::CursorField::new("updated"));
    assert!(matches!(cursor, Cursor::PerPartition(_)));
    assert_eq!(cursor.cursor_field(), Some("updated"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_refresh_reads_everything() {
    let engine = engine();
    let mut read = engine
        .read_stream(events_definition(), SyncMode::FullRefresh, Some(json!({"updated": 100})))
        .await
        .unwrap();

    let (records, error) = read.read_all().await;
    assert!(error.is_none());
    assert_eq!(ids(&records), vec![1, 2, 3, 11, 12, 13, 21, 22, 23]);
    assert_eq!(read.stats().records_emitted, 9);
    assert_eq!(read.stats().partitions_closed, 3);
    assert_eq!(read.get_stream_state(), json!({"updated": 23}));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_incremental_skips_records_at_or_below_state() {
    let engine = engine();
    let mut read = engine
        .read_stream(events_definition(), SyncMode::Incremental, Some(json!({"updated": 12})))
        .await
        .unwrap();

    let (records, error) = read.read_all().await;
    assert!(error.is_none());
    assert_eq!(ids(&records), vec![13, 21, 22, 23]);
    assert_eq!(read.stats().records_skipped, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unknown_state_field_is_rejected() {
    let engine = engine();
    let err = engine
        .read_stream(events_definition(), SyncMode::Incremental, Some(json!({"created": 1})))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_state_manager_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");

    let engine = engine().with_state_manager(StateManager::new(&path));
    let mut read = engine
        .read_stream(events_definition(), SyncMode::Incremental, None)
        .await
        .unwrap();
    let (records, error) = read.read_all().await;
    assert!(error.is_none());
    assert_eq!(records.len(), 9);
    engine.save_state().await.unwrap();

    // A second run resumes from the persisted watermark
    let engine = engine_with_state(&path);
    let mut read = engine
        .read_stream(events_definition(), SyncMode::Incremental, None)
        .await
        .unwrap();
    let (records, error) = read.read_all().await;
    assert!(error.is_none());
    assert!(records.is_empty());
    assert_eq!(read.stats().records_skipped, 9);
}

fn engine_with_state(path: &std::path::Path) -> SyncEngine {
    engine().with_state_manager(StateManager::from_file(path).unwrap())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_messages_follow_stream_lifecycle() {
    let messages = Arc::new(InMemoryMessageRepository::new());
    let engine = engine().with_message_repository(messages.clone());
    let mut read = engine
        .read_stream(events_definition(), SyncMode::FullRefresh, None)
        .await
        .unwrap();
    let _ = read.read_all().await;

    let drained = messages.drain();
    let statuses: Vec<StreamStatus> = drained
        .iter()
        .filter_map(|m| match m {
            Message::StreamStatus { status, .. } => Some(*status),
            _ => None,
        })
        .collect();
    assert_eq!(
        statuses,
        vec![StreamStatus::Started, StreamStatus::Running, StreamStatus::Complete]
    );
    assert_eq!(drained.iter().filter(|m| m.is_state()).count(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_into_stream_yields_records() {
    let engine = engine();
    let read = engine
        .read_stream(events_definition(), SyncMode::FullRefresh, None)
        .await
        .unwrap();

    let records: Vec<Record> = read
        .into_stream()
        .map(|item| item.unwrap())
        .collect()
        .await;
    assert_eq!(records.len(), 9);
}
