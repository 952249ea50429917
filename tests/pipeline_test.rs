//! End-to-end tests of the batch executor over NDJSON files

use deid::adapters::ndjson::{NdjsonReader, NdjsonWriter};
use deid::core::pipeline::{
    BatchExecutor, FailurePolicy, ItemTransform, PipelineOptions, PipelineOutcome,
};
use deid::deid::{DeidConfiguration, DeidEngine};
use deid::domain::{DeidError, PipelineError, RecordFamily};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::watch;

const RULES: &str = r#"
[parameters]
date_shift_key = "pipeline-date-key"
pseudonymize_identifiers = false

[[rules]]
path = "Patient.name"
method = "redact"

[[rules]]
type = "date"
method = "dateShift"
"#;

fn write_patients(path: &Path, count: usize) {
    let lines: Vec<String> = (0..count)
        .map(|i| {
            json!({
                "resourceType": "Patient",
                "id": format!("pat-{i:04}"),
                "name": [{"family": format!("Family{i}")}],
                "birthDate": "1980-06-15"
            })
            .to_string()
        })
        .collect();
    std::fs::write(path, lines.join("\n") + "\n").unwrap();
}

fn read_lines(path: &Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

fn engine_transform() -> ItemTransform<Value, Value> {
    let engine = Arc::new(DeidEngine::new(DeidConfiguration::from_toml_str(RULES).unwrap()).unwrap());
    Arc::new(move |value: Value| {
        engine
            .deidentify_json(value, RecordFamily::Path)
            .map(|(output, _)| output)
    })
}

fn options(keep_order: bool) -> PipelineOptions {
    PipelineOptions {
        batch_size: 16,
        concurrency: 4,
        keep_order,
        on_item_error: FailurePolicy::Abort,
    }
}

#[tokio::test]
async fn test_ndjson_run_preserves_order() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("input.ndjson");
    let output = dir.path().join("out/output.ndjson");
    write_patients(&input, 250);

    let reader = NdjsonReader::open(&input).await.unwrap();
    let mut writer = NdjsonWriter::create(&output).await.unwrap();
    let (_tx, rx) = watch::channel(false);

    let summary = BatchExecutor::new(options(true), engine_transform())
        .run(reader, &mut writer, rx)
        .await
        .unwrap();

    assert_eq!(summary.outcome, PipelineOutcome::Completed);
    assert_eq!(summary.consumed, 250);
    assert_eq!(summary.batches, 16);
    assert_eq!(writer.written(), 250);

    let records = read_lines(&output);
    assert_eq!(records.len(), 250);
    for (i, record) in records.iter().enumerate() {
        assert_eq!(record["id"], format!("pat-{i:04}"));
        assert!(record.get("name").is_none());
    }
    // One scope per resource id, so dates are shifted independently
    assert!(records.iter().all(|r| r["birthDate"].as_str().map(str::len) == Some(10)));
}

#[tokio::test]
async fn test_unordered_run_writes_every_record() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("input.ndjson");
    let output = dir.path().join("output.ndjson");
    write_patients(&input, 97);

    let reader = NdjsonReader::open(&input).await.unwrap();
    let mut writer = NdjsonWriter::create(&output).await.unwrap();
    let (_tx, rx) = watch::channel(false);

    let summary = BatchExecutor::new(options(false), engine_transform())
        .run(reader, &mut writer, rx)
        .await
        .unwrap();
    assert_eq!(summary.consumed, 97);

    let ids: HashSet<String> = read_lines(&output)
        .iter()
        .map(|r| r["id"].as_str().unwrap().to_string())
        .collect();
    let expected: HashSet<String> = (0..97).map(|i| format!("pat-{i:04}")).collect();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn test_skip_policy_drops_bad_records() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("input.ndjson");
    let output = dir.path().join("output.ndjson");
    std::fs::write(
        &input,
        "{\"resourceType\":\"Patient\",\"id\":\"a\"}\n\n[1, 2]\n{\"resourceType\":\"Patient\",\"id\":\"b\"}\n",
    )
    .unwrap();

    let reader = NdjsonReader::open(&input).await.unwrap();
    let mut writer = NdjsonWriter::create(&output).await.unwrap();
    let (_tx, rx) = watch::channel(false);
    let options = PipelineOptions {
        on_item_error: FailurePolicy::Skip,
        ..options(true)
    };

    let summary = BatchExecutor::new(options, engine_transform())
        .run(reader, &mut writer, rx)
        .await
        .unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.consumed, 2);
    let ids: Vec<Value> = read_lines(&output).iter().map(|r| r["id"].clone()).collect();
    assert_eq!(ids, vec![json!("a"), json!("b")]);
}

#[tokio::test]
async fn test_abort_policy_fails_run() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("input.ndjson");
    std::fs::write(&input, "[1, 2]\n").unwrap();

    let reader = NdjsonReader::open(&input).await.unwrap();
    let mut writer = NdjsonWriter::create(dir.path().join("output.ndjson")).await.unwrap();
    let (_tx, rx) = watch::channel(false);

    let err = BatchExecutor::new(options(true), engine_transform())
        .run(reader, &mut writer, rx)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Item { index: 0, .. }));
}

#[tokio::test]
async fn test_malformed_line_is_reader_error() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("input.ndjson");
    std::fs::write(&input, "{\"resourceType\":\"Patient\"}\n{not json\n").unwrap();

    let reader = NdjsonReader::open(&input).await.unwrap();
    let mut writer = NdjsonWriter::create(dir.path().join("output.ndjson")).await.unwrap();
    let (_tx, rx) = watch::channel(false);

    let err = BatchExecutor::new(options(true), engine_transform())
        .run(reader, &mut writer, rx)
        .await
        .unwrap_err();
    match err {
        PipelineError::Reader(message) => assert!(message.contains("line 2")),
        other => panic!("expected reader error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_cancelled_run_writes_nothing_partial() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("input.ndjson");
    let output = dir.path().join("output.ndjson");
    write_patients(&input, 40);

    let reader = NdjsonReader::open(&input).await.unwrap();
    let mut writer = NdjsonWriter::create(&output).await.unwrap();
    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();

    let summary = BatchExecutor::new(options(true), engine_transform())
        .run(reader, &mut writer, rx)
        .await
        .unwrap();

    assert!(summary.is_cancelled());
    // Whatever was committed is a whole number of leading batches
    let records = read_lines(&output);
    assert_eq!(records.len() as u64, summary.consumed);
    for (i, record) in records.iter().enumerate() {
        assert_eq!(record["id"], format!("pat-{i:04}"));
    }
}

#[tokio::test]
async fn test_transform_errors_carry_item_index() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("input.ndjson");
    write_patients(&input, 30);

    let reader = NdjsonReader::open(&input).await.unwrap();
    let mut writer = NdjsonWriter::create(dir.path().join("output.ndjson")).await.unwrap();
    let (_tx, rx) = watch::channel(false);
    let transform: ItemTransform<Value, Value> = Arc::new(|value: Value| {
        if value["id"] == "pat-0021" {
            return Err(DeidError::Serialization("rejected".to_string()));
        }
        Ok(value)
    });

    let err = BatchExecutor::new(options(true), transform)
        .run(reader, &mut writer, rx)
        .await
        .unwrap_err();
    match err {
        PipelineError::Item { index, message } => {
            assert_eq!(index, 21);
            assert!(message.contains("rejected"));
        }
        other => panic!("expected item error, got {other:?}"),
    }
}
