//! Dashboard API
//!
//! Read-and-manage surface of the admin console: recent groups with their
//! input and output images, collected user feedback, and the per-group
//! reprocess and delete actions.
use crate::api::{ApiClient, Ident};
use crate::error::PipelineError;
use serde::Deserialize;
use std::collections::HashMap;

/// One image attached to a group, input or output.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupImage {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub enhanced_prompt: Option<String>,
}

/// One job group as listed by the dashboard.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupSummary {
    pub group_id: Ident,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub input_count: u32,
    #[serde(default)]
    pub output_count: u32,
    #[serde(default)]
    pub input_images: Vec<GroupImage>,
    #[serde(default)]
    pub output_images: Vec<GroupImage>,
}

impl GroupSummary {
    /// Prompt shown for the group: the first output image that carries one.
    pub fn prompt(&self) -> Option<&str> {
        self.output_images
            .iter()
            .find_map(|img| img.prompt.as_deref())
    }

    pub fn enhanced_prompt(&self) -> Option<&str> {
        self.output_images
            .iter()
            .find_map(|img| img.enhanced_prompt.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct GroupsResponse {
    #[serde(default)]
    groups: Vec<GroupSummary>,
}

/// One feedback record left against a generated image.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackEntry {
    pub feedback_id: Ident,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub rating: Option<String>,
    #[serde(default)]
    pub stars: Option<u32>,
    #[serde(default)]
    pub text_feedback: Option<String>,
    #[serde(default)]
    pub generated_url: Option<String>,
}

/// Feedback keyed by group id, then generation id.
pub type FeedbackMap = HashMap<String, HashMap<String, Vec<FeedbackEntry>>>;

/// Which group field a dashboard search matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchField {
    Prompt,
    GroupId,
    UserEmail,
}

impl std::str::FromStr for SearchField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prompt" => Ok(Self::Prompt),
            "group_id" => Ok(Self::GroupId),
            "user_email" => Ok(Self::UserEmail),
            other => Err(format!(
                "unknown search field '{other}' (expected prompt, group_id or user_email)"
            )),
        }
    }
}

/// Client-side group filter. Prompt matching is case-insensitive against the
/// first output image's prompt; group id and email are literal substring
/// matches. An empty query keeps everything.
pub fn filter_groups(groups: Vec<GroupSummary>, query: &str, field: SearchField) -> Vec<GroupSummary> {
    if query.is_empty() {
        return groups;
    }
    groups
        .into_iter()
        .filter(|group| match field {
            SearchField::Prompt => group
                .prompt()
                .unwrap_or("")
                .to_lowercase()
                .contains(&query.to_lowercase()),
            SearchField::GroupId => group.group_id.to_string().contains(query),
            SearchField::UserEmail => group
                .user_email
                .as_deref()
                .unwrap_or("")
                .contains(query),
        })
        .collect()
}

impl ApiClient {
    /// Most recent groups, newest first, up to `limit`.
    pub async fn list_groups(&self, limit: u32) -> Result<Vec<GroupSummary>, PipelineError> {
        let response = self
            .authorized(self.http().get(self.url("dashboard/api/groups")))
            .query(&[("limit", limit)])
            .send()
            .await?;
        let body: GroupsResponse = Self::read_json(Self::check(response).await?).await?;
        Ok(body.groups)
    }

    pub async fn list_feedback(&self) -> Result<FeedbackMap, PipelineError> {
        let response = self
            .authorized(self.http().get(self.url("dashboard/api/feedback")))
            .send()
            .await?;
        Self::read_json(Self::check(response).await?).await
    }

    /// Re-run generation for an existing group.
    pub async fn reprocess_group(&self, group_id: &str) -> Result<(), PipelineError> {
        let response = self
            .authorized(
                self.http()
                    .post(self.url(&format!("dashboard/api/groups/{group_id}/reprocess"))),
            )
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    pub async fn delete_group(&self, group_id: &str) -> Result<(), PipelineError> {
        let response = self
            .authorized(
                self.http()
                    .delete(self.url(&format!("dashboard/api/groups/{group_id}"))),
            )
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
