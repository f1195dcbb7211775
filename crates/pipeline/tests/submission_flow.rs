//! End-to-end orchestrator tests against a scripted API double.

use async_trait::async_trait;
use gen_pipeline::api::{OutputStatus, ProcessingApi, StartProcessing, StatusReport, UploadSlot};
use gen_pipeline::candidate::UploadCandidate;
use gen_pipeline::config::{ApiEnv, PipelineConfig};
use gen_pipeline::error::PipelineError;
use gen_pipeline::submit::{Orchestrator, Phase, SubmitOptions};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

enum PollStep {
    Report(StatusReport),
    Fail(u16),
}

#[derive(Default)]
struct MockApi {
    calls: Mutex<Vec<String>>,
    /// Step name that should fail with a 500, if any.
    fail_on: Option<&'static str>,
    /// Consumed front to back; when empty, polls report "processing".
    poll_script: Mutex<VecDeque<PollStep>>,
    request_ids: Vec<String>,
    last_start: Mutex<Option<StartProcessing>>,
    create_delay: Option<Duration>,
}

impl MockApi {
    fn new() -> Self {
        Self {
            request_ids: vec!["r1".to_string(), "r2".to_string()],
            ..Default::default()
        }
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_fail(&self, step: &str) -> Result<(), PipelineError> {
        if self.fail_on == Some(step) {
            return Err(PipelineError::Http {
                status: 500,
                detail: format!("{step} exploded"),
            });
        }
        Ok(())
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn poll_count(&self) -> usize {
        self.calls().iter().filter(|c| *c == "poll").count()
    }

    fn script_polls(&self, steps: Vec<PollStep>) {
        *self.poll_script.lock().unwrap() = steps.into();
    }
}

fn report(status: &str, urls: Vec<&str>) -> StatusReport {
    StatusReport {
        status: status.to_string(),
        outputs: urls
            .into_iter()
            .map(|url| OutputStatus {
                status: "done".to_string(),
                url: Some(url.to_string()),
            })
            .collect(),
    }
}

#[async_trait]
impl ProcessingApi for MockApi {
    async fn create_group(&self, user_id: &str) -> Result<String, PipelineError> {
        self.record(format!("create_group:{user_id}"));
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        self.check_fail("create_group")?;
        Ok("179".to_string())
    }

    async fn generate_upload_url(
        &self,
        _user_id: &str,
        filename: &str,
    ) -> Result<UploadSlot, PipelineError> {
        self.record(format!("upload_url:{filename}"));
        self.check_fail("generate_upload_url")?;
        Ok(UploadSlot {
            upload_url: format!("https://blob.example.test/{filename}"),
            blob_path: format!("blobs/{filename}"),
        })
    }

    async fn upload_blob(
        &self,
        slot: &UploadSlot,
        _candidate: &UploadCandidate,
    ) -> Result<(), PipelineError> {
        self.record(format!("upload:{}", slot.blob_path));
        self.check_fail("upload_blob")
    }

    async fn complete_uploads(
        &self,
        _user_id: &str,
        group_id: &str,
        blob_paths: &[String],
    ) -> Result<(), PipelineError> {
        self.record(format!("complete:{group_id}:{}", blob_paths.len()));
        self.check_fail("complete_uploads")
    }

    async fn start_processing(
        &self,
        group_id: &str,
        request: &StartProcessing,
    ) -> Result<Vec<String>, PipelineError> {
        self.record(format!("start:{group_id}"));
        self.check_fail("start_processing")?;
        *self.last_start.lock().unwrap() = Some(request.clone());
        Ok(self.request_ids.clone())
    }

    async fn poll_status(&self, _request_ids: &[String]) -> Result<StatusReport, PipelineError> {
        self.record("poll".to_string());
        // Yield so cancellation tests get a chance to fire the handle.
        tokio::time::sleep(Duration::from_millis(1)).await;
        match self.poll_script.lock().unwrap().pop_front() {
            Some(PollStep::Report(r)) => Ok(r),
            Some(PollStep::Fail(status)) => Err(PipelineError::Http {
                status,
                detail: "poll failed".to_string(),
            }),
            None => Ok(report("processing", vec![])),
        }
    }
}

fn config() -> PipelineConfig {
    PipelineConfig::new(
        ApiEnv::Dev,
        "https://api.example.test".to_string(),
        "token".to_string(),
        "user-1".to_string(),
    )
    .with_poll_interval(Duration::from_secs(0))
}

fn candidates(n: usize) -> Vec<UploadCandidate> {
    (0..n)
        .map(|i| UploadCandidate {
            bytes: vec![0u8; 16],
            filename: format!("img-{i}.png"),
            mime_type: "image/png".to_string(),
        })
        .collect()
}

fn options() -> SubmitOptions {
    SubmitOptions {
        prompt: "two friends on a beach".to_string(),
        heights: vec![150.0, 160.0, 140.0],
    }
}

#[tokio::test]
async fn happy_path_runs_every_step_in_order() {
    let api = MockApi::new();
    api.script_polls(vec![
        PollStep::Report(report("processing", vec![])),
        PollStep::Report(report("processing", vec![])),
        PollStep::Report(report("processing", vec![])),
        PollStep::Report(report("done", vec!["A", "B"])),
    ]);
    let orch = Orchestrator::new(api, config());

    let outcome = orch.submit(candidates(2), options()).await.unwrap();

    assert_eq!(outcome.group_id, "179");
    assert_eq!(outcome.request_ids, vec!["r1", "r2"]);
    assert_eq!(outcome.output_urls, vec!["A", "B"]);

    let state = orch.state();
    assert_eq!(state.phase, Phase::Done);
    assert_eq!(state.progress, "Processing complete!");
    // One timing per workflow step.
    let steps: Vec<&str> = state.timings.iter().map(|t| t.step.as_str()).collect();
    assert_eq!(
        steps,
        vec![
            "Create group",
            "Generate upload URLs",
            "Upload images",
            "Finalize uploads",
            "Start processing",
            "Pipeline Processing",
        ]
    );
}

#[tokio::test]
async fn happy_path_call_sequence_and_counts() {
    let api = MockApi::new();
    api.script_polls(vec![PollStep::Report(report("done", vec!["A"]))]);
    let orch = Orchestrator::new(api, config());

    orch.submit(candidates(2), options()).await.unwrap();

    assert_eq!(
        orch.api().calls(),
        vec![
            "create_group:user-1",
            "upload_url:img-0.png",
            "upload_url:img-1.png",
            "upload:blobs/img-0.png",
            "upload:blobs/img-1.png",
            "complete:179:2",
            "start:179",
            "poll",
        ]
    );
}

#[tokio::test]
async fn heights_are_normalized_and_truncated() {
    let api = MockApi::new();
    api.script_polls(vec![PollStep::Report(report("done", vec!["A"]))]);
    let orch = Orchestrator::new(api, config());

    orch.submit(candidates(2), options()).await.unwrap();

    let start = orch.api().last_start.lock().unwrap().clone().unwrap();
    assert_eq!(start.prompt, "two friends on a beach");
    assert_eq!(start.mode, "default");
    assert_eq!(start.generations, 1);
    // Three raw heights, two candidates: truncated then mapped to 0.4..1.0.
    assert_eq!(start.height_index_list, vec![0.7, 1.0]);
}

#[tokio::test]
async fn too_few_candidates_is_rejected_before_any_call() {
    let api = MockApi::new();
    let orch = Orchestrator::new(api, config());

    let err = orch.submit(candidates(1), options()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));
    assert!(orch.api().calls().is_empty());
    assert_eq!(orch.state().phase, Phase::Failed);
}

#[tokio::test]
async fn step_failure_aborts_without_polling() {
    let mut api = MockApi::new();
    api.fail_on = Some("generate_upload_url");
    let orch = Orchestrator::new(api, config());

    let err = orch.submit(candidates(2), options()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Http { status: 500, .. }));
    assert_eq!(orch.api().poll_count(), 0);

    let state = orch.state();
    assert_eq!(state.phase, Phase::Failed);
    assert_eq!(state.progress, "Something went wrong. Please retry.");
    assert!(state.error.unwrap().contains("500"));
    // The completed step's timing survives the failure.
    assert_eq!(state.timings.len(), 1);
    assert_eq!(state.timings[0].step, "Create group");
}

#[tokio::test]
async fn empty_request_id_list_is_an_application_error() {
    let mut api = MockApi::new();
    api.request_ids = vec![];
    let orch = Orchestrator::new(api, config());

    let err = orch.submit(candidates(2), options()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Application(_)));
    assert_eq!(orch.api().poll_count(), 0);
}

#[tokio::test]
async fn poll_failures_are_retried_until_done() {
    let api = MockApi::new();
    api.script_polls(vec![
        PollStep::Fail(502),
        PollStep::Fail(503),
        PollStep::Report(report("done", vec!["A"])),
    ]);
    let orch = Orchestrator::new(api, config());

    let outcome = orch.submit(candidates(2), options()).await.unwrap();
    assert_eq!(outcome.output_urls, vec!["A"]);
    assert_eq!(orch.api().poll_count(), 3);
}

#[tokio::test]
async fn server_error_status_ends_polling() {
    let api = MockApi::new();
    api.script_polls(vec![
        PollStep::Report(report("processing", vec![])),
        PollStep::Report(report("error", vec![])),
    ]);
    let orch = Orchestrator::new(api, config());

    let err = orch.submit(candidates(2), options()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Application(_)));
    assert_eq!(orch.api().poll_count(), 2);

    let state = orch.state();
    assert_eq!(state.phase, Phase::Failed);
    assert_eq!(state.progress, "Error during processing. Try again.");
}

#[tokio::test]
async fn overlapping_submission_is_rejected() {
    let mut api = MockApi::new();
    api.create_delay = Some(Duration::from_millis(50));
    api.script_polls(vec![PollStep::Report(report("done", vec!["A"]))]);
    let orch = Orchestrator::new(api, config());

    let (first, second) = tokio::join!(
        orch.submit(candidates(2), options()),
        orch.submit(candidates(2), options()),
    );

    let results = [first, second];
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(PipelineError::Busy)))
            .count(),
        1
    );
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        orch.api()
            .calls()
            .iter()
            .filter(|c| c.starts_with("create_group"))
            .count(),
        1
    );
}

#[tokio::test]
async fn cancelling_stops_an_endless_poll() {
    // Empty script: every poll reports "processing" forever.
    let orch = Arc::new(Orchestrator::new(MockApi::new(), config()));

    let submitting = {
        let orch = Arc::clone(&orch);
        tokio::spawn(async move { orch.submit(candidates(2), options()).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    orch.cancel_polling();

    let err = submitting.await.unwrap().unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled));
    assert_eq!(orch.state().phase, Phase::Failed);
}
