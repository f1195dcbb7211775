//! Upload candidate resolution
//!
//! Builds the ordered list of file blobs consumed by the submission
//! orchestrator, from local paths, a directory, or prefill URLs handed over
//! by a referring view.
use crate::error::PipelineError;
use log::error;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Filename used when a prefill URL has no usable last path segment.
pub const PREFILL_FALLBACK_FILENAME: &str = "prefill-image";

/// A single file intended for upload as part of a group's inputs.
#[derive(Debug, Clone)]
pub struct UploadCandidate {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub mime_type: String,
}

impl UploadCandidate {
    /// Load a candidate from a local file.
    pub fn from_path(path: &Path) -> Result<Self, PipelineError> {
        let bytes = std::fs::read(path)?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(PREFILL_FALLBACK_FILENAME)
            .to_string();
        Ok(Self {
            bytes,
            filename,
            mime_type: mime_for_extension(path),
        })
    }
}

fn mime_for_extension(path: &Path) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
    .to_string()
}

fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg" | "webp"))
        .unwrap_or(false)
}

/// Load candidates from explicit paths, preserving argument order.
pub fn from_paths(paths: &[PathBuf]) -> Result<Vec<UploadCandidate>, PipelineError> {
    paths.iter().map(|p| UploadCandidate::from_path(p)).collect()
}

/// Load every image directly inside a directory, ordered by filename.
pub fn from_directory(dir: &Path) -> Result<Vec<UploadCandidate>, PipelineError> {
    let mut paths: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file() && is_image_path(e.path()))
        .map(|e| e.path().to_path_buf())
        .collect();
    paths.sort();
    from_paths(&paths)
}

/// Result of resolving prefill URLs. Failed slots are dropped rather than
/// padded; `skipped` lets callers surface a partial-failure warning.
#[derive(Debug)]
pub struct PrefillOutcome {
    pub candidates: Vec<UploadCandidate>,
    pub skipped: usize,
}

/// Fetch prefill URLs handed over by a referring view. Empty URLs are
/// skipped outright; each remaining fetch is attempted independently, and a
/// failure drops that slot without aborting the rest. Candidate order
/// matches the input URL order.
pub async fn from_prefill_urls(client: &reqwest::Client, urls: &[String]) -> PrefillOutcome {
    let fetches = urls
        .iter()
        .filter(|u| !u.trim().is_empty())
        .map(|url| async move {
            match fetch_prefill(client, url).await {
                Ok(candidate) => Some(candidate),
                Err(err) => {
                    error!("prefill fetch failed for {url}: {err}");
                    None
                }
            }
        });
    let results = futures::future::join_all(fetches).await;
    let attempted = results.len();
    let candidates: Vec<UploadCandidate> = results.into_iter().flatten().collect();
    PrefillOutcome {
        skipped: attempted - candidates.len(),
        candidates,
    }
}

async fn fetch_prefill(client: &reqwest::Client, url: &str) -> Result<UploadCandidate, PipelineError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(PipelineError::Http {
            status: status.as_u16(),
            detail: status.canonical_reason().unwrap_or("request failed").to_string(),
        });
    }
    let mime_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    let filename = filename_from_url(url);
    let bytes = response.bytes().await?.to_vec();
    Ok(UploadCandidate {
        bytes,
        filename,
        mime_type,
    })
}

/// Last path segment of the URL with any query string stripped.
fn filename_from_url(url: &str) -> String {
    let without_query = url.split('?').next().unwrap_or(url);
    let after_scheme = without_query
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(without_query);
    let segment = match after_scheme.trim_end_matches('/').split_once('/') {
        Some((_, path)) => path.rsplit('/').next().unwrap_or(""),
        None => "",
    };
    if segment.is_empty() {
        PREFILL_FALLBACK_FILENAME.to_string()
    } else {
        segment.to_string()
    }
}
