//! Tests for decoder module

use super::*;
use crate::error::Error;
use serde_json::json;

// ============================================================================
// JSON Decoder Tests
// ============================================================================

#[test]
fn test_json_decoder_array() {
    let decoder = JsonDecoder::new();
    let body = br#"[{"id": 1}, {"id": 2}, {"id": 3}]"#;

    let records = decoder.decode(body).unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0]["id"], 1);
    assert_eq!(records[2]["id"], 3);
}

#[test]
fn test_json_decoder_object() {
    let decoder = JsonDecoder::new();
    let records = decoder.decode(br#"{"id": 7, "name": "only"}"#).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["name"], "only");
}

#[test]
fn test_json_decoder_with_path() {
    let decoder = JsonDecoder::with_path("$.data.items");
    let body = br#"{"data": {"items": [{"id": 1}, {"id": 2}]}, "has_more": false}"#;

    let records = decoder.decode(body).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1]["id"], 2);
}

#[test]
fn test_json_decoder_missing_path_is_empty() {
    let decoder = JsonDecoder::with_path("results");
    assert!(decoder.decode(br#"{"data": []}"#).unwrap().is_empty());
    assert!(decoder.decode(b"  ").unwrap().is_empty());
}

#[test]
fn test_json_decoder_rejects_scalars() {
    let decoder = JsonDecoder::new();
    assert!(matches!(decoder.decode(b"[1, 2]"), Err(Error::Decode { .. })));
    assert!(matches!(decoder.decode(b"{not json"), Err(Error::Decode { .. })));
}

#[test]
fn test_json_decoder_raw() {
    let decoder = JsonDecoder::with_path("ignored");
    let raw = decoder.decode_raw(br#"{"state": "JobComplete"}"#).unwrap();
    assert_eq!(raw, json!({"state": "JobComplete"}));
}

// ============================================================================
// JSONL Decoder Tests
// ============================================================================

#[test]
fn test_jsonl_decoder() {
    let decoder = JsonlDecoder::new();
    let body = b"{\"id\": 1}\n\n{\"id\": 2}\n";

    let records = decoder.decode(body).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(decoder.decode_raw(body).unwrap(), json!([{"id": 1}, {"id": 2}]));
}

#[test]
fn test_jsonl_decoder_reports_line() {
    let err = JsonlDecoder::new().decode(b"{\"id\": 1}\nnope").unwrap_err();
    assert!(err.to_string().contains("line 2"));
}

#[test]
fn test_decoder_for_format() {
    let decoder = decoder_for(DecoderFormat::Json, Some("rows"));
    assert_eq!(decoder.decode(br#"{"rows": [{"a": 1}]}"#).unwrap().len(), 1);

    let decoder = decoder_for(DecoderFormat::Jsonl, None);
    assert_eq!(decoder.decode(b"{\"a\": 1}").unwrap().len(), 1);
}

// ============================================================================
// Path Tests
// ============================================================================

#[test]
fn test_extract_path() {
    let value = json!({"data": {"jobs": [{"id": "a"}, {"id": "b"}]}, "state": "done"});

    assert_eq!(extract_path(&value, "state"), Some(json!("done")));
    assert_eq!(extract_path(&value, "$.data.jobs[0].id"), Some(json!("a")));
    assert_eq!(extract_path(&value, "data.jobs[-1].id"), Some(json!("b")));
    assert_eq!(extract_path(&value, "data.jobs[*]").unwrap().as_array().unwrap().len(), 2);
    assert_eq!(extract_path(&value, "data.jobs[5]"), None);
    assert_eq!(extract_path(&value, "data.jobs[-3]"), None);
    assert_eq!(extract_path(&value, "missing.path"), None);
    assert_eq!(extract_path(&value, "$"), Some(value.clone()));
}
