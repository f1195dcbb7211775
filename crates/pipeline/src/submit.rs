//! Job submission orchestration
//!
//! Drives the multi-step remote workflow: create group, generate per-file
//! upload URLs, direct uploads, finalize, start processing, poll. Every
//! step is timed independently and the state record is updated after each
//! transition so a presentation layer can render progress live.
use crate::api::{ProcessingApi, StartProcessing, UploadSlot};
use crate::candidate::UploadCandidate;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::height::normalize_heights;
use crate::poll::{self, PollHandle};
use futures::future::try_join_all;
use log::info;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Workflow phase of the current submission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Idle,
    CreatingGroup,
    RequestingUploadUrls,
    Uploading,
    Finalizing,
    Starting,
    Polling,
    Done,
    Failed,
}

/// Wall-clock duration of one completed workflow step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepTiming {
    pub step: String,
    /// Seconds, rounded to two decimals.
    pub elapsed_secs: f64,
}

/// Observable record of one submission attempt. Reset at the start of every
/// attempt; once the phase reaches Done or Failed it is no longer mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionState {
    pub attempt_id: String,
    pub phase: Phase,
    pub progress: String,
    pub error: Option<String>,
    pub output_urls: Vec<String>,
    pub timings: Vec<StepTiming>,
    pub started_at: i64,
}

impl SubmissionState {
    fn fresh() -> Self {
        Self {
            attempt_id: uuid::Uuid::new_v4().to_string(),
            phase: Phase::Idle,
            progress: String::new(),
            error: None,
            output_urls: Vec::new(),
            timings: Vec::new(),
            started_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, Phase::Done | Phase::Failed)
    }
}

impl Default for SubmissionState {
    fn default() -> Self {
        Self::fresh()
    }
}

/// Caller-supplied inputs for one submission.
#[derive(Debug, Clone)]
pub struct SubmitOptions {
    pub prompt: String,
    /// Raw height inputs, one per UI slot; truncated to the candidate count.
    pub heights: Vec<f64>,
}

/// Everything a successful submission produced.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub group_id: String,
    pub request_ids: Vec<String>,
    pub output_urls: Vec<String>,
    pub timings: Vec<StepTiming>,
}

/// Orchestrator for the submission workflow. Holds the observable state of
/// the current attempt and a single-flight guard: a second `submit` while
/// one is running is rejected, and a new attempt cancels any stale poller
/// left over from the previous one.
pub struct Orchestrator<A: ProcessingApi> {
    api: A,
    config: PipelineConfig,
    state: Arc<Mutex<SubmissionState>>,
    in_flight: AtomicBool,
    poller: Mutex<Option<PollHandle>>,
}

impl<A: ProcessingApi> Orchestrator<A> {
    pub fn new(api: A, config: PipelineConfig) -> Self {
        Self {
            api,
            config,
            state: Arc::new(Mutex::new(SubmissionState::fresh())),
            in_flight: AtomicBool::new(false),
            poller: Mutex::new(None),
        }
    }

    /// Snapshot of the current attempt's state.
    pub fn state(&self) -> SubmissionState {
        self.state.lock().clone()
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Stop the active poller, if any; used on teardown.
    pub fn cancel_polling(&self) {
        if let Some(handle) = self.poller.lock().take() {
            handle.cancel();
        }
    }

    /// Run the full workflow for one ordered set of candidates.
    pub async fn submit(
        &self,
        candidates: Vec<UploadCandidate>,
        options: SubmitOptions,
    ) -> Result<SubmitOutcome, PipelineError> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Err(PipelineError::Busy);
        }
        self.cancel_polling();
        *self.state.lock() = SubmissionState::fresh();

        let result = self.run(candidates, options).await;
        if let Err(err) = &result {
            self.fail(err);
        }
        self.in_flight.store(false, Ordering::SeqCst);
        result
    }

    async fn run(
        &self,
        candidates: Vec<UploadCandidate>,
        options: SubmitOptions,
    ) -> Result<SubmitOutcome, PipelineError> {
        if candidates.len() < self.config.min_candidates {
            return Err(PipelineError::Validation(format!(
                "need at least {} images, got {}",
                self.config.min_candidates,
                candidates.len()
            )));
        }

        self.set_progress(Phase::CreatingGroup, "Creating group...");
        let started = Instant::now();
        let group_id = self.api.create_group(&self.config.user_id).await?;
        self.record_step("Create group", started);
        self.set_progress(Phase::RequestingUploadUrls, format!("Group created: {group_id}"));

        // One request per candidate, fanned out; any failure fails the
        // whole submission.
        let started = Instant::now();
        let slots: Vec<UploadSlot> = try_join_all(
            candidates
                .iter()
                .map(|c| self.api.generate_upload_url(&self.config.user_id, &c.filename)),
        )
        .await?;
        self.record_step("Generate upload URLs", started);

        // Direct uploads, paired positionally with the slots above.
        self.set_progress(Phase::Uploading, "Uploading images...");
        let started = Instant::now();
        try_join_all(
            slots
                .iter()
                .zip(candidates.iter())
                .map(|(slot, candidate)| self.api.upload_blob(slot, candidate)),
        )
        .await?;
        self.record_step("Upload images", started);

        self.set_progress(Phase::Finalizing, "Finalizing uploads...");
        let started = Instant::now();
        let blob_paths: Vec<String> = slots.iter().map(|s| s.blob_path.clone()).collect();
        self.api
            .complete_uploads(&self.config.user_id, &group_id, &blob_paths)
            .await?;
        self.record_step("Finalize uploads", started);

        self.set_progress(Phase::Starting, "Starting processing...");
        let started = Instant::now();
        let request = StartProcessing {
            prompt: options.prompt.clone(),
            mode: self.config.mode.clone(),
            generations: self.config.generations,
            height_index_list: normalize_heights(
                &options.heights,
                candidates.len(),
                self.config.height_range,
            ),
        };
        let request_ids = self.api.start_processing(&group_id, &request).await?;
        if request_ids.is_empty() {
            return Err(PipelineError::Application(
                "no request ids returned from processing API".to_string(),
            ));
        }
        self.record_step("Start processing", started);

        self.set_progress(Phase::Polling, "Processing images (may take a few minutes)...");
        let started = Instant::now();
        let (handle, cancel_rx) = PollHandle::new();
        *self.poller.lock() = Some(handle);
        let output_urls = poll::poll_until_terminal(
            &self.api,
            &request_ids,
            self.config.poll_interval(),
            cancel_rx,
        )
        .await?;
        self.record_step("Pipeline Processing", started);
        self.poller.lock().take();

        let timings = {
            let mut state = self.state.lock();
            state.phase = Phase::Done;
            state.progress = "Processing complete!".to_string();
            state.output_urls = output_urls.clone();
            state.timings.clone()
        };

        Ok(SubmitOutcome {
            group_id,
            request_ids,
            output_urls,
            timings,
        })
    }

    fn set_progress(&self, phase: Phase, message: impl Into<String>) {
        let message = message.into();
        info!("{message}");
        let mut state = self.state.lock();
        state.phase = phase;
        state.progress = message;
    }

    fn record_step(&self, step: &str, started: Instant) {
        let elapsed_secs = (started.elapsed().as_secs_f64() * 100.0).round() / 100.0;
        info!("step '{step}' finished in {elapsed_secs:.2}s");
        self.state.lock().timings.push(StepTiming {
            step: step.to_string(),
            elapsed_secs,
        });
    }

    /// Timings collected up to the failure point are preserved for display.
    fn fail(&self, err: &PipelineError) {
        let mut state = self.state.lock();
        // A server-side failure during processing gets its own message.
        let during_processing =
            state.phase == Phase::Polling && matches!(err, PipelineError::Application(_));
        state.progress = if during_processing {
            "Error during processing. Try again."
        } else {
            "Something went wrong. Please retry."
        }
        .to_string();
        state.phase = Phase::Failed;
        state.error = Some(err.to_string());
    }
}
