//! Status polling
//!
//! Repeatedly queries job status until the server reports a terminal state.
//! Failures during a poll attempt (transport, HTTP, malformed body) are
//! transient: logged and retried after the fixed delay, indefinitely. Only
//! an explicit server-reported `error` status ends polling unsuccessfully.
use crate::api::{ProcessingApi, StatusReport};
use crate::error::PipelineError;
use log::{info, warn};
use std::time::Duration;
use tokio::sync::watch;

pub const STATUS_DONE: &str = "done";
pub const STATUS_ERROR: &str = "error";

/// Cancellation handle for one polling run. Firing it makes the poller
/// return `PipelineError::Cancelled` at the next opportunity.
#[derive(Debug)]
pub struct PollHandle {
    cancel: watch::Sender<bool>,
}

impl PollHandle {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (cancel, rx) = watch::channel(false);
        (Self { cancel }, rx)
    }

    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }
}

/// URLs of individually finished outputs, order preserved from the server
/// response. Errored or URL-less entries are dropped.
pub fn finished_urls(report: &StatusReport) -> Vec<String> {
    report
        .outputs
        .iter()
        .filter(|o| o.status == STATUS_DONE)
        .filter_map(|o| o.url.as_deref())
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect()
}

/// Poll until the server reports `done` or `error`, or the handle fires.
pub async fn poll_until_terminal<A: ProcessingApi + ?Sized>(
    api: &A,
    request_ids: &[String],
    interval: Duration,
    mut cancelled: watch::Receiver<bool>,
) -> Result<Vec<String>, PipelineError> {
    loop {
        if *cancelled.borrow() {
            return Err(PipelineError::Cancelled);
        }

        match api.poll_status(request_ids).await {
            Ok(report) if report.status == STATUS_DONE => {
                let urls = finished_urls(&report);
                info!("processing finished with {} output(s)", urls.len());
                return Ok(urls);
            }
            Ok(report) if report.status == STATUS_ERROR => {
                return Err(PipelineError::Application(
                    "processing failed server-side".to_string(),
                ));
            }
            Ok(report) => info!("still processing (status: {})", report.status),
            Err(err) => warn!("poll attempt failed, retrying in {interval:?}: {err}"),
        }

        // Wait out the delay, bailing as soon as the handle fires.
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = cancelled.changed() => match changed {
                Ok(()) if *cancelled.borrow() => return Err(PipelineError::Cancelled),
                Ok(()) => {}
                // Sender gone; no cancellation can arrive any more.
                Err(_) => tokio::time::sleep(interval).await,
            },
        }
    }
}
