//! Tests for async job module

use super::*;
use crate::config::AsyncJobSettings;
use crate::decode::DecoderFormat;
use crate::error::{Error, ErrorKind, Result};
use crate::http::{HttpClient, HttpClientConfig};
use crate::concurrent::ConcurrentReader;
use crate::config::ConcurrencyConfig;
use crate::cursor::{Cursor, StreamCursor};
use crate::engine::InMemoryMessageRepository;
use crate::partition::{ListSlicer, PartitionGenerator, StreamSlice};
use crate::types::{JsonObject, SyncMode};
use async_trait::async_trait;
use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Scripted repository
// ============================================================================

/// Status every poll reports for a day, per attempt (the last entry repeats).
/// Starting a job for a day missing from the script fails with a timeout.
type Script = HashMap<&'static str, Vec<AsyncJobStatus>>;

#[derive(Default)]
struct ScriptedRepository {
    script: Script,
    attempts: Mutex<HashMap<String, usize>>,
    started: Mutex<Vec<String>>,
    started_at: Mutex<Vec<tokio::time::Instant>>,
    aborted: Mutex<Vec<String>>,
    max_polled_at_once: AtomicUsize,
    next_id: AtomicUsize,
}

impl ScriptedRepository {
    fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            ..Default::default()
        })
    }

    fn day(slice: &StreamSlice) -> String {
        slice
            .get("day")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }

    fn scripted_status(&self, job: &AsyncJob) -> AsyncJobStatus {
        let day = Self::day(job.slice());
        let attempt = self.attempts.lock().unwrap()[&day];
        let statuses = &self.script[day.as_str()];
        statuses[(attempt - 1).min(statuses.len() - 1)]
    }
}

#[async_trait]
impl AsyncJobRepository for ScriptedRepository {
    async fn start(&self, slice: StreamSlice) -> Result<AsyncJob> {
        let day = Self::day(&slice);
        *self.attempts.lock().unwrap().entry(day.clone()).or_default() += 1;
        self.started_at.lock().unwrap().push(tokio::time::Instant::now());
        if !self.script.contains_key(day.as_str()) {
            return Err(Error::Timeout { timeout_ms: 10 });
        }
        self.started.lock().unwrap().push(day);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(AsyncJob::new(format!("job-{id}"), slice))
    }

    async fn update_jobs_status(&self, jobs: &mut [AsyncJob]) -> Result<()> {
        self.max_polled_at_once
            .fetch_max(jobs.len(), Ordering::SeqCst);
        for job in jobs.iter_mut() {
            let status = self.scripted_status(job);
            job.update_status(status);
        }
        Ok(())
    }

    async fn fetch_records(&self, job: &AsyncJob) -> Result<Vec<JsonObject>> {
        if job.status() != AsyncJobStatus::Completed {
            return Err(Error::JobNotCompleted {
                job_id: job.api_job_id().to_string(),
                status: job.status().to_string(),
            });
        }
        let record = json!({"day": Self::day(job.slice()), "job": job.api_job_id()});
        Ok(vec![record.as_object().cloned().unwrap()])
    }

    async fn abort(&self, job: &AsyncJob) -> Result<()> {
        self.aborted
            .lock()
            .unwrap()
            .push(job.api_job_id().to_string());
        Ok(())
    }
}

fn day_slices(days: &[&str]) -> Vec<StreamSlice> {
    days.iter()
        .map(|day| StreamSlice::new().with_partition("day", *day))
        .collect()
}

fn settings() -> AsyncJobSettings {
    AsyncJobSettings::default()
        .with_poll_interval(5)
        .with_job_timeout(60)
        .with_max_attempts(2)
}

fn completed_days(items: &[Result<AsyncJob>]) -> Vec<String> {
    items
        .iter()
        .filter_map(|item| item.as_ref().ok())
        .map(|job| ScriptedRepository::day(job.slice()))
        .collect()
}

// ============================================================================
// Job type tests
// ============================================================================

#[test]
fn test_terminal_status_is_sticky() {
    let mut job = AsyncJob::new("j1", StreamSlice::new());
    assert_eq!(job.status(), AsyncJobStatus::Created);

    job.update_status(AsyncJobStatus::Running);
    job.update_status(AsyncJobStatus::Failed);
    job.update_status(AsyncJobStatus::Completed);
    assert_eq!(job.status(), AsyncJobStatus::Failed);
    assert_eq!(job.status().to_string(), "failed");
}

#[test]
fn test_config_status_of() {
    let config = AsyncJobConfig::new().with_status("data.state", "DONE", vec!["ERROR", "CANCELLED"]);

    assert_eq!(config.status_of(&json!({"data": {"state": "DONE"}})), AsyncJobStatus::Completed);
    assert_eq!(config.status_of(&json!({"data": {"state": "ERROR"}})), AsyncJobStatus::Failed);
    assert_eq!(config.status_of(&json!({"data": {"state": "QUEUED"}})), AsyncJobStatus::Running);
    assert_eq!(config.status_of(&json!({})), AsyncJobStatus::Running);
}

// ============================================================================
// Orchestrator tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_failed_job_reported_after_siblings() {
    use AsyncJobStatus::{Completed, Failed};
    let repository = ScriptedRepository::new(HashMap::from([
        ("1", vec![Completed]),
        ("2", vec![Failed]),
        ("3", vec![Completed]),
    ]));
    let orchestrator = AsyncJobOrchestrator::new("exports", repository.clone(), settings());

    let items: Vec<Result<AsyncJob>> = orchestrator
        .create_and_get_completed_jobs(day_slices(&["1", "2", "3"]))
        .collect()
        .await;

    assert_eq!(items.len(), 3);
    assert_eq!(completed_days(&items), vec!["1", "3"]);

    let Some(Err(Error::PartialFailure { stream, failures })) = items.into_iter().last() else {
        panic!("expected a partial failure as the last item");
    };
    assert_eq!(stream, "exports");
    assert_eq!(failures.len(), 1);
    assert!(matches!(
        &failures[0],
        Error::AsyncJobFailed { slice, status, .. } if slice.contains("\"2\"") && status == "failed"
    ));
    assert_eq!(failures[0].kind(), ErrorKind::PartialFailure);

    // Day 2 used both attempts
    let started = repository.started.lock().unwrap().clone();
    assert_eq!(started.iter().filter(|d| *d == "2").count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_job_retried_then_completes() {
    use AsyncJobStatus::{Completed, Failed};
    let repository = ScriptedRepository::new(HashMap::from([
        ("1", vec![Failed, Completed]),
        ("2", vec![Completed]),
    ]));
    let orchestrator = AsyncJobOrchestrator::new("exports", repository, settings());

    let items: Vec<Result<AsyncJob>> = orchestrator
        .create_and_get_completed_jobs(day_slices(&["1", "2"]))
        .collect()
        .await;

    assert!(items.iter().all(Result::is_ok));
    assert_eq!(completed_days(&items), vec!["2", "1"]);
}

#[tokio::test(start_paused = true)]
async fn test_running_job_times_out() {
    use AsyncJobStatus::{Completed, Running};
    let repository = ScriptedRepository::new(HashMap::from([
        ("slow", vec![Running]),
        ("fast", vec![Completed]),
    ]));
    let settings = settings().with_job_timeout(30).with_max_attempts(1);
    let orchestrator = AsyncJobOrchestrator::new("exports", repository.clone(), settings);

    let started = tokio::time::Instant::now();
    let items: Vec<Result<AsyncJob>> = orchestrator
        .create_and_get_completed_jobs(day_slices(&["slow", "fast"]))
        .collect()
        .await;

    assert_eq!(completed_days(&items), vec!["fast"]);
    let Some(Err(Error::PartialFailure { failures, .. })) = items.last() else {
        panic!("expected a partial failure");
    };
    assert!(matches!(&failures[0], Error::AsyncJobFailed { status, .. } if status == "timed_out"));
    assert_eq!(*repository.aborted.lock().unwrap(), vec!["job-1".to_string()]);
    assert!(started.elapsed() >= std::time::Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_job_limit() {
    let days = ["a", "b", "c", "d", "e"];
    let repository = ScriptedRepository::new(
        days.iter()
            .map(|day| (*day, vec![AsyncJobStatus::Completed]))
            .collect(),
    );
    let settings = settings().with_max_concurrent_jobs(2);
    let orchestrator = AsyncJobOrchestrator::new("exports", repository.clone(), settings);

    let items: Vec<Result<AsyncJob>> = orchestrator
        .create_and_get_completed_jobs(day_slices(&days))
        .collect()
        .await;

    assert_eq!(completed_days(&items), vec!["a", "b", "c", "d", "e"]);
    assert_eq!(repository.max_polled_at_once.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_no_slices_yields_nothing() {
    let repository = ScriptedRepository::new(HashMap::new());
    let orchestrator = AsyncJobOrchestrator::new("exports", repository, settings());

    let items: Vec<Result<AsyncJob>> = orchestrator
        .create_and_get_completed_jobs(Vec::new())
        .collect()
        .await;
    assert!(items.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_starts_wait_before_resubmitting() {
    let repository = ScriptedRepository::new(HashMap::new());
    let settings = settings().with_max_attempts(3);
    let orchestrator = AsyncJobOrchestrator::new("exports", repository.clone(), settings);

    let items: Vec<Result<AsyncJob>> = orchestrator
        .create_and_get_completed_jobs(day_slices(&["unavailable"]))
        .collect()
        .await;

    let [Err(Error::PartialFailure { failures, .. })] = items.as_slice() else {
        panic!("expected a single partial failure");
    };
    assert_eq!(failures[0].kind(), ErrorKind::Transient);

    let started_at = repository.started_at.lock().unwrap().clone();
    assert_eq!(started_at.len(), 3);
    for pair in started_at.windows(2) {
        assert!(pair[1] - pair[0] >= std::time::Duration::from_secs(5));
    }
}

#[tokio::test(start_paused = true)]
async fn test_generator_read_by_several_workers() {
    use AsyncJobStatus::{Completed, Failed};
    let script = || {
        HashMap::from([
            ("1", vec![Completed]),
            ("2", vec![Failed]),
            ("3", vec![Completed]),
            ("4", vec![Completed]),
        ])
    };
    let days: Vec<String> = ["1", "2", "3", "4"].iter().map(ToString::to_string).collect();
    let generator = |repository: Arc<ScriptedRepository>| {
        let orchestrator = AsyncJobOrchestrator::new("exports", repository, settings());
        let slicer = Arc::new(ListSlicer::new(days.clone(), "day"));
        AsyncJobPartitionGenerator::new("exports", slicer, orchestrator)
            .generate(SyncMode::Incremental, None)
            .unwrap()
    };
    let reader = ConcurrentReader::new(ConcurrencyConfig::new(3)).unwrap();

    let mut cursor = Cursor::simple("exports", "day");
    cursor.set_initial_state(None).unwrap();
    let mut consumer = reader.read(
        "exports",
        generator(ScriptedRepository::new(script())),
        cursor,
        Arc::new(InMemoryMessageRepository::new()),
        None,
    );
    let mut days_read = Vec::new();
    let mut failure = None;
    while let Some(item) = consumer.next().await {
        match item {
            Ok(record) => days_read.push(record.get("day").unwrap().as_str().unwrap().to_string()),
            Err(e) => failure = Some(e),
        }
    }
    days_read.sort();
    assert_eq!(days_read, vec!["1", "3", "4"]);
    let Some(Error::PartialFailure { failures, .. }) = failure else {
        panic!("expected the failed day to be reported");
    };
    assert_eq!(failures.len(), 1);
    assert!(matches!(&failures[0], Error::AsyncJobFailed { slice, .. } if slice.contains("\"2\"")));

    // Resuming from the exported state skips every day already read
    let state = consumer.get_stream_state();
    assert_eq!(state, json!({"day": "4"}));
    let mut cursor = Cursor::simple("exports", "day");
    cursor.set_initial_state(Some(&state)).unwrap();
    let mut resumed = reader.read(
        "exports",
        generator(ScriptedRepository::new(script())),
        cursor,
        Arc::new(InMemoryMessageRepository::new()),
        None,
    );
    let mut emitted = 0;
    while let Some(item) = resumed.next().await {
        if item.is_ok() {
            emitted += 1;
        }
    }
    assert_eq!(emitted, 0);
    assert_eq!(resumed.stats().records_skipped, 3);
}

#[tokio::test]
async fn test_fetch_before_completion_is_system_error() {
    let repository = ScriptedRepository::new(HashMap::new());
    let job = AsyncJob::new("j1", StreamSlice::new());

    let err = repository.fetch_records(&job).await.unwrap_err();
    assert!(matches!(err, Error::JobNotCompleted { .. }));
    assert_eq!(err.kind(), ErrorKind::System);
}

#[tokio::test(start_paused = true)]
async fn test_generator_yields_job_partitions() {
    let repository = ScriptedRepository::new(HashMap::from([
        ("1", vec![AsyncJobStatus::Completed]),
        ("2", vec![AsyncJobStatus::Completed]),
    ]));
    let orchestrator = AsyncJobOrchestrator::new("exports", repository, settings());
    let slicer = Arc::new(ListSlicer::new(vec!["1".into(), "2".into()], "day"));
    let generator = AsyncJobPartitionGenerator::new("exports", slicer, orchestrator);

    let partitions: Vec<_> = generator
        .generate(SyncMode::FullRefresh, None)
        .unwrap()
        .collect()
        .await;
    assert_eq!(partitions.len(), 2);

    let partition = partitions[0].as_ref().unwrap();
    assert_eq!(partition.stream_name(), "exports");
    let records: Vec<_> = partition.read().collect().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].as_ref().unwrap()["day"], "1");
}

// ============================================================================
// HTTP repository tests
// ============================================================================

fn http_repository(server: &MockServer) -> HttpJobRepository {
    let client = HttpClient::with_config(
        HttpClientConfig::builder()
            .base_url(server.uri())
            .max_retries(0)
            .build(),
    )
    .unwrap();
    let job_config = AsyncJobConfig::new()
        .with_create(
            "POST",
            "/reports",
            Some(json!({"day": "{{ slice.day }}", "kind": "{{ config.kind }}"})),
        )
        .with_job_id_path("report.id")
        .with_poll("/reports/{{ job_id }}")
        .with_status("status", "done", vec!["error"])
        .with_download("/reports/{{ job_id }}/rows", DecoderFormat::Jsonl, None)
        .with_abort("/reports/{{ job_id }}");
    HttpJobRepository::new(Arc::new(client), job_config).with_config(json!({"kind": "usage"}))
}

#[tokio::test]
async fn test_http_repository_protocol() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/reports"))
        .and(body_json(json!({"day": "2024-01-01", "kind": "usage"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"report": {"id": 42}})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/reports/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "pending"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/reports/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "done"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/reports/42/rows"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"n\": 1}\n{\"n\": 2}\n"))
        .mount(&server)
        .await;

    let repository = http_repository(&server);
    let slice = StreamSlice::new().with_partition("day", "2024-01-01");

    let job = repository.start(slice.clone()).await.unwrap();
    assert_eq!(job.api_job_id(), "42");
    assert_eq!(job.slice(), &slice);

    let mut jobs = vec![job];
    repository.update_jobs_status(&mut jobs).await.unwrap();
    assert_eq!(jobs[0].status(), AsyncJobStatus::Running);
    assert!(matches!(
        repository.fetch_records(&jobs[0]).await,
        Err(Error::JobNotCompleted { .. })
    ));

    repository.update_jobs_status(&mut jobs).await.unwrap();
    assert_eq!(jobs[0].status(), AsyncJobStatus::Completed);

    let records = repository.fetch_records(&jobs[0]).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1]["n"], 2);
}

#[tokio::test]
async fn test_http_repository_missing_job_id() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/reports"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accepted": true})))
        .mount(&server)
        .await;

    let repository = http_repository(&server);
    let slice = StreamSlice::new().with_partition("day", "2024-01-01");
    let err = repository.start(slice).await.unwrap_err();

    assert!(err.to_string().contains("report.id"));
    assert_eq!(err.kind(), ErrorKind::System);
}

#[tokio::test]
async fn test_http_repository_failed_status_and_abort() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/reports/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "error"})))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/reports/7"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let repository = http_repository(&server);
    let mut jobs = vec![AsyncJob::new("7", StreamSlice::new().with_partition("day", "d"))];
    repository.update_jobs_status(&mut jobs).await.unwrap();
    assert_eq!(jobs[0].status(), AsyncJobStatus::Failed);

    repository.abort(&jobs[0]).await.unwrap();
}

#[tokio::test]
async fn test_http_repository_malformed_download_names_job() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/reports/9/rows"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"n\": 1}\nnot json\n"))
        .mount(&server)
        .await;

    let repository = http_repository(&server);
    let mut job = AsyncJob::new("9", StreamSlice::new().with_partition("day", "d"));
    job.update_status(AsyncJobStatus::Completed);

    let err = repository.fetch_records(&job).await.unwrap_err();
    assert!(err.to_string().starts_with("Results of job '9'"));
    assert_eq!(err.kind(), ErrorKind::System);
}
