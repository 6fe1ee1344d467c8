//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from TOML by the
//! application crate and carries all sub-configs for stage endpoints, retry
//! policy, credentials, the catalog, analysis policy, and the batch runner.
//! Every section defaults sensibly so an empty file is valid.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub stages: StagesConfig,
    pub retry: RetryConfig,
    pub identity: IdentityConfig,
    pub catalog: CatalogConfig,
    pub analysis: AnalysisConfig,
    pub batch: BatchConfig,
}

impl Config {
    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        for (name, endpoint) in self.stages.iter() {
            if !endpoint.url.starts_with("http://") && !endpoint.url.starts_with("https://") {
                warnings.push(format!("stages.{name}.url '{}' is not an http(s) URL", endpoint.url));
            }
        }

        if self.retry.max_attempts > 10 {
            warnings.push(format!(
                "retry.max_attempts is {}; long retry chains delay failure reporting",
                self.retry.max_attempts
            ));
        }

        if self.identity.mode == IdentityMode::Static && self.identity.token.is_none() {
            warnings.push("identity.mode is 'static' but identity.token is not set".into());
        }

        if self.catalog.api_key.is_some() && self.catalog.base_url.is_empty() {
            warnings.push("catalog.api_key is set but catalog.base_url is empty".into());
        }

        if self.catalog.client_secret.is_some() && self.catalog.api_key.is_none() {
            warnings.push("catalog.client_secret is set without catalog.api_key".into());
        }

        if self.analysis.max_frames == 0 {
            warnings.push("analysis.max_frames is 0; oversized videos cannot be analysed".into());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// Address and timeout of one stage service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageEndpoint {
    pub url: String,
    /// Per-call timeout; falls back to the stage's default when unset.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl StageEndpoint {
    fn local(port: u16, path: &str) -> Self {
        Self {
            url: format!("http://localhost:{port}/{path}"),
            timeout_secs: None,
        }
    }
}

/// Endpoints for every remote stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StagesConfig {
    pub transcode: StageEndpoint,
    pub transcribe: StageEndpoint,
    pub sample_frames: StageEndpoint,
    pub enrich: StageEndpoint,
    pub store: StageEndpoint,
}

impl Default for StagesConfig {
    fn default() -> Self {
        Self {
            transcode: StageEndpoint::local(8081, "transcode"),
            transcribe: StageEndpoint::local(8082, "transcribe"),
            sample_frames: StageEndpoint::local(8083, "sample"),
            enrich: StageEndpoint::local(8084, "enrich"),
            store: StageEndpoint::local(8085, "store"),
        }
    }
}

impl StagesConfig {
    /// Iterate `(config key, endpoint)` pairs in pipeline order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &StageEndpoint)> {
        [
            ("transcode", &self.transcode),
            ("transcribe", &self.transcribe),
            ("sample_frames", &self.sample_frames),
            ("enrich", &self.enrich),
            ("store", &self.store),
        ]
        .into_iter()
    }
}

// ---------------------------------------------------------------------------
// Retry
// ---------------------------------------------------------------------------

/// Retry policy applied to every outbound call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
            retryable_statuses: vec![408, 429, 500, 502, 503, 504],
        }
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// How stage identity tokens are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IdentityMode {
    /// A fixed token from configuration.
    Static,
    /// Identity tokens minted by the instance metadata server.
    #[default]
    MetadataServer,
}

/// Identity token settings for stage calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub mode: IdentityMode,
    pub token: Option<String>,
    /// Audience claim requested from the metadata server.
    pub audience: Option<String>,
    pub metadata_url: String,
    /// Refresh this many seconds before the token's declared expiry.
    pub refresh_skew_secs: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            mode: IdentityMode::default(),
            token: None,
            audience: None,
            metadata_url: "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/identity".into(),
            refresh_skew_secs: 60,
        }
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Remote licensing catalog settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// When set, requests carry an OAuth client-credentials bearer token.
    pub client_secret: Option<String>,
    /// Token endpoint; defaults to `{base_url}/oauth2/token`.
    pub token_url: Option<String>,
    /// Container format a preview representation must match.
    pub required_format: String,
    pub page_size: u32,
    pub max_pages: u32,
    pub candidate_concurrency: usize,
    pub requests_per_second: u32,
    pub timeout_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.gettyimages.com".into(),
            api_key: None,
            client_secret: None,
            token_url: None,
            required_format: "mp4".into(),
            page_size: 10,
            max_pages: 5,
            candidate_concurrency: 4,
            requests_per_second: 4,
            timeout_secs: 10,
        }
    }
}

impl CatalogConfig {
    /// Whether enough is configured to talk to the catalog.
    pub fn is_enabled(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty()) && !self.base_url.is_empty()
    }

    /// Effective OAuth token endpoint.
    pub fn token_endpoint(&self) -> String {
        self.token_url.clone().unwrap_or_else(|| {
            format!("{}/oauth2/token", self.base_url.trim_end_matches('/'))
        })
    }
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// Policy for whole-media versus per-frame enrichment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Videos larger than this are analysed frame by frame.
    pub full_media_max_bytes: u64,
    /// Upper bound on frames analysed per asset.
    pub max_frames: usize,
    /// Concurrent per-frame enrich calls.
    pub frame_concurrency: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            full_media_max_bytes: 20 * 1024 * 1024,
            max_frames: 12,
            frame_concurrency: 4,
        }
    }
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// Settings for the object-store batch runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub bucket: Option<String>,
    pub prefix: String,
    /// Only objects with this extension are considered.
    pub extension: String,
    /// Objects sampled per invocation.
    pub count: usize,
    pub ledger_path: PathBuf,
    pub storage_base_url: String,
    /// Static storage token; otherwise one is requested from `metadata_token_url`.
    pub access_token: Option<String>,
    pub metadata_token_url: String,
    /// Origin label recorded in provenance for batch submissions.
    pub source_label: Option<String>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            prefix: String::new(),
            extension: "mp4".into(),
            count: 1,
            ledger_path: PathBuf::from("/data/processed.txt"),
            storage_base_url: "https://storage.googleapis.com".into(),
            access_token: None,
            metadata_token_url: "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token".into(),
            source_label: None,
        }
    }
}
