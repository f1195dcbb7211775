//! Environment-selectable API configuration
//!
//! Dev, staging and prod each carry their own API base, bearer token and
//! default user id. The selected configuration is an explicit value handed
//! to the orchestrator at call time, never ambient state.
use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Target deployment of the generation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiEnv {
    Dev,
    Staging,
    Prod,
}

impl std::fmt::Display for ApiEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dev => write!(f, "dev"),
            Self::Staging => write!(f, "staging"),
            Self::Prod => write!(f, "prod"),
        }
    }
}

impl std::str::FromStr for ApiEnv {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" => Ok(Self::Dev),
            "staging" => Ok(Self::Staging),
            "prod" => Ok(Self::Prod),
            other => Err(format!("unknown environment '{other}' (expected dev, staging or prod)")),
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Selected environment
    pub env: ApiEnv,

    /// API base URL
    pub api_base: String,

    /// Bearer token sent on every call except the raw direct upload
    pub auth_token: String,

    /// Default user id for this environment
    pub user_id: String,

    /// Minimum number of upload candidates per submission
    pub min_candidates: usize,

    /// Seconds between poll attempts
    pub poll_interval_secs: u64,

    /// Raw height input range mapped onto the normalized 0.4..1.0 scale
    pub height_range: (f64, f64),

    /// Processing mode sent with start-processing
    pub mode: String,

    /// Generation count sent with start-processing
    pub generations: u32,
}

impl PipelineConfig {
    /// Create a config with default policy values.
    pub fn new(env: ApiEnv, api_base: String, auth_token: String, user_id: String) -> Self {
        Self {
            env,
            api_base,
            auth_token,
            user_id,
            min_candidates: 2,
            poll_interval_secs: 8,
            height_range: crate::height::DEFAULT_HEIGHT_RANGE,
            mode: "default".to_string(),
            generations: 1,
        }
    }

    /// Read the selected environment's settings from process environment
    /// variables (`GENCONSOLE_API_BASE_DEV` and friends).
    pub fn from_env(env: ApiEnv) -> Result<Self, PipelineError> {
        let suffix = match env {
            ApiEnv::Dev => "DEV",
            ApiEnv::Staging => "STAGING",
            ApiEnv::Prod => "PROD",
        };
        let read = |key: &str| {
            let name = format!("GENCONSOLE_{key}_{suffix}");
            std::env::var(&name)
                .map_err(|_| PipelineError::Validation(format!("missing environment variable {name}")))
        };
        Ok(Self::new(
            env,
            read("API_BASE")?,
            read("AUTH_TOKEN")?,
            read("USER_ID")?,
        ))
    }

    /// With minimum candidate count
    pub fn with_min_candidates(mut self, min: usize) -> Self {
        self.min_candidates = min;
        self
    }

    /// With poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_secs = interval.as_secs();
        self
    }

    /// With height input range
    pub fn with_height_range(mut self, min: f64, max: f64) -> Self {
        self.height_range = (min, max);
        self
    }

    /// With processing mode
    pub fn with_mode(mut self, mode: String) -> Self {
        self.mode = mode;
        self
    }

    /// With generation count
    pub fn with_generations(mut self, generations: u32) -> Self {
        self.generations = generations;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Save configuration to JSON
    pub fn save(&self, path: &Path) -> Result<(), PipelineError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| PipelineError::Application(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from JSON
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| PipelineError::Application(format!("failed to parse config: {e}")))
    }
}
