//! Client pipeline for the remote image-generation service
//!
//! Provides candidate resolution, the multi-step job submission workflow
//! (create group, upload, finalize, start, poll) and the dashboard API
//! consumed by the admin console.

pub mod api;
pub mod candidate;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod height;
pub mod poll;
pub mod submit;

pub use api::{ApiClient, Ident, OutputStatus, ProcessingApi, StartProcessing, StatusReport, UploadSlot};
pub use candidate::{PrefillOutcome, UploadCandidate};
pub use config::{ApiEnv, PipelineConfig};
pub use dashboard::{FeedbackEntry, FeedbackMap, GroupImage, GroupSummary, SearchField};
pub use error::PipelineError;
pub use poll::PollHandle;
pub use submit::{Orchestrator, Phase, StepTiming, SubmissionState, SubmitOptions, SubmitOutcome};
