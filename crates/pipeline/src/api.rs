//! HTTP client for the generation service API
//!
//! Thin typed wrapper over reqwest. Every call except the raw direct upload
//! carries the configured bearer token; non-2xx responses are turned into
//! classified errors carrying the server's detail text.
use crate::candidate::UploadCandidate;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Server identifiers arrive as JSON numbers or strings depending on the
/// endpoint; both forms normalize to a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Ident {
    Num(i64),
    Str(String),
}

impl std::fmt::Display for Ident {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s}"),
        }
    }
}

/// Server-issued single-use upload target, paired positionally with one
/// candidate.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadSlot {
    pub upload_url: String,
    pub blob_path: String,
}

/// Per-request output as reported by the status endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputStatus {
    pub status: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// Overall poll response: an aggregate status plus, when done, the
/// per-request outputs.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusReport {
    pub status: String,
    #[serde(default)]
    pub outputs: Vec<OutputStatus>,
}

/// Body of the start-processing call.
#[derive(Debug, Clone, Serialize)]
pub struct StartProcessing {
    pub prompt: String,
    pub mode: String,
    pub generations: u32,
    pub height_index_list: Vec<f64>,
}

/// Job-submission surface of the remote service. The orchestrator and the
/// poller depend on this trait so tests can drive them against a scripted
/// double.
#[async_trait]
pub trait ProcessingApi: Send + Sync {
    /// Allocate a new job group, returning its server-assigned id.
    async fn create_group(&self, user_id: &str) -> Result<String, PipelineError>;

    /// Request one pre-signed upload target for a filename.
    async fn generate_upload_url(
        &self,
        user_id: &str,
        filename: &str,
    ) -> Result<UploadSlot, PipelineError>;

    /// Write file bytes straight to storage through a pre-signed URL.
    async fn upload_blob(
        &self,
        slot: &UploadSlot,
        candidate: &UploadCandidate,
    ) -> Result<(), PipelineError>;

    /// Mark a set of blob paths complete server-side.
    async fn complete_uploads(
        &self,
        user_id: &str,
        group_id: &str,
        blob_paths: &[String],
    ) -> Result<(), PipelineError>;

    /// Launch a generation job, returning the ordered request ids.
    async fn start_processing(
        &self,
        group_id: &str,
        request: &StartProcessing,
    ) -> Result<Vec<String>, PipelineError>;

    /// Query progress for a set of request ids.
    async fn poll_status(&self, request_ids: &[String]) -> Result<StatusReport, PipelineError>;
}

#[derive(Debug, Deserialize)]
struct CreateGroupResponse {
    #[serde(rename = "groupId")]
    group_id: Ident,
}

#[derive(Debug, Deserialize)]
struct StartProcessingResponse {
    #[serde(default)]
    request_ids: Vec<Ident>,
}

/// reqwest-backed client for the generation service.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: String,
    token: String,
}

impl ApiClient {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: config.api_base.trim_end_matches('/').to_string(),
            token: config.auth_token.clone(),
        }
    }

    /// Underlying HTTP client, reused for prefill URL fetches.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base, endpoint.trim_start_matches('/'))
    }

    pub(crate) fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.bearer_auth(&self.token)
    }

    /// Classify a non-2xx response: status code plus the server's body text
    /// when it has any, the canonical status reason otherwise.
    pub(crate) async fn check(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, PipelineError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let detail = match response.text().await {
            Ok(body) if !body.trim().is_empty() => body,
            _ => status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string(),
        };
        Err(PipelineError::Http {
            status: status.as_u16(),
            detail,
        })
    }

    pub(crate) async fn read_json<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, PipelineError> {
        response
            .json::<T>()
            .await
            .map_err(|e| PipelineError::Application(format!("malformed response body: {e}")))
    }
}

#[async_trait]
impl ProcessingApi for ApiClient {
    async fn create_group(&self, user_id: &str) -> Result<String, PipelineError> {
        let response = self
            .authorized(self.http.post(self.url("v2/group/create")))
            .query(&[("user_id", user_id)])
            .send()
            .await?;
        let body: CreateGroupResponse = Self::read_json(Self::check(response).await?).await?;
        Ok(body.group_id.to_string())
    }

    async fn generate_upload_url(
        &self,
        user_id: &str,
        filename: &str,
    ) -> Result<UploadSlot, PipelineError> {
        let response = self
            .authorized(self.http.post(self.url("v2/uploads/generate-upload-urls")))
            .json(&serde_json::json!({
                "user_id": user_id,
                "filename": filename,
            }))
            .send()
            .await?;
        Self::read_json(Self::check(response).await?).await
    }

    async fn upload_blob(
        &self,
        slot: &UploadSlot,
        candidate: &UploadCandidate,
    ) -> Result<(), PipelineError> {
        // Pre-signed URL; deliberately unauthenticated.
        let response = self
            .http
            .put(&slot.upload_url)
            .header("x-ms-blob-type", "BlockBlob")
            .header(reqwest::header::CONTENT_TYPE, &candidate.mime_type)
            .body(candidate.bytes.clone())
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn complete_uploads(
        &self,
        user_id: &str,
        group_id: &str,
        blob_paths: &[String],
    ) -> Result<(), PipelineError> {
        let response = self
            .authorized(self.http.post(self.url("v2/uploads/uploads-complete")))
            .json(&serde_json::json!({
                "blob_paths": blob_paths,
                "user_id": user_id,
                "group_id": group_id,
            }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn start_processing(
        &self,
        group_id: &str,
        request: &StartProcessing,
    ) -> Result<Vec<String>, PipelineError> {
        let response = self
            .authorized(
                self.http
                    .post(self.url(&format!("v2/process/groups/{group_id}"))),
            )
            .json(request)
            .send()
            .await?;
        let body: StartProcessingResponse = Self::read_json(Self::check(response).await?).await?;
        Ok(body.request_ids.into_iter().map(|id| id.to_string()).collect())
    }

    async fn poll_status(&self, request_ids: &[String]) -> Result<StatusReport, PipelineError> {
        let query: Vec<(&str, &str)> = request_ids
            .iter()
            .map(|id| ("request_ids", id.as_str()))
            .collect();
        let response = self
            .authorized(self.http.get(self.url("process/status")))
            .query(&query)
            .send()
            .await?;
        Self::read_json(Self::check(response).await?).await
    }
}
