//! Authenticated HTTP invoker for remote stages.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cf_core::config::{StageEndpoint, StagesConfig};
use cf_core::{Error, Result};
use cf_pipeline::{StageInvoker, StageName};
use reqwest::StatusCode;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::auth::CredentialCache;
use crate::http;
use crate::retry::RetryPolicy;

/// Default per-call timeout when a stage endpoint does not set one.
pub fn default_timeout(stage: StageName) -> Duration {
    match stage {
        StageName::TranscodeVideo | StageName::Transcribe => Duration::from_secs(900),
        StageName::SampleFrames => Duration::from_secs(300),
        StageName::Enrich => Duration::from_secs(180),
        StageName::Store | StageName::Acquire => Duration::from_secs(30),
    }
}

/// Calls stage services over HTTP with a bearer identity token.
///
/// Each attempt fetches a token from the shared [`CredentialCache`], so a
/// token that expires mid-retry is refreshed transparently. Token failures
/// surface as [`Error::Auth`]; everything the stage itself reports becomes
/// [`Error::Stage`].
pub struct HttpStageInvoker {
    client: reqwest::Client,
    stages: StagesConfig,
    credentials: Arc<CredentialCache>,
    retry: RetryPolicy,
}

impl HttpStageInvoker {
    pub fn new(
        stages: StagesConfig,
        credentials: Arc<CredentialCache>,
        retry: RetryPolicy,
    ) -> Result<Self> {
        // Per-request timeouts are applied per stage; this is only the ceiling.
        let client = http::build_client(default_timeout(StageName::TranscodeVideo))?;
        Ok(Self {
            client,
            stages,
            credentials,
            retry,
        })
    }

    fn endpoint(&self, stage: StageName) -> Result<&StageEndpoint> {
        match stage {
            StageName::TranscodeVideo => Ok(&self.stages.transcode),
            StageName::Transcribe => Ok(&self.stages.transcribe),
            StageName::SampleFrames => Ok(&self.stages.sample_frames),
            StageName::Enrich => Ok(&self.stages.enrich),
            StageName::Store => Ok(&self.stages.store),
            StageName::Acquire => Err(Error::Internal(
                "Acquire runs in-process and has no remote endpoint".into(),
            )),
        }
    }

    fn timeout(stage: StageName, endpoint: &StageEndpoint) -> Duration {
        endpoint
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| default_timeout(stage))
    }

    async fn attempt(
        &self,
        stage: StageName,
        endpoint: &StageEndpoint,
        payload: &Value,
        attempt: u32,
    ) -> Result<Map<String, Value>> {
        let token = self.credentials.token().await?;
        debug!(%stage, attempt, url = %endpoint.url, "Invoking stage");

        let resp = self
            .client
            .post(&endpoint.url)
            .bearer_auth(token)
            .timeout(Self::timeout(stage, endpoint))
            .json(payload)
            .send()
            .await
            .map_err(|e| http::transport(stage.as_str(), e))?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            self.credentials.invalidate();
        }
        if !status.is_success() {
            let body = http::body_text(resp).await;
            return Err(Error::stage(stage, Some(status.as_u16()), body));
        }

        let value: Value = resp.json().await.map_err(|e| {
            Error::stage(stage, Some(status.as_u16()), format!("invalid JSON response: {e}"))
        })?;
        match value {
            Value::Object(map) => Ok(map),
            other => Err(Error::stage(
                stage,
                Some(status.as_u16()),
                format!("expected a JSON object, got {other}"),
            )),
        }
    }
}

#[async_trait]
impl StageInvoker for HttpStageInvoker {
    async fn invoke(&self, stage: StageName, payload: &Value) -> Result<Map<String, Value>> {
        let endpoint = self.endpoint(stage)?;
        let started = Instant::now();

        let result = self
            .retry
            .run(stage.as_str(), |attempt| {
                self.attempt(stage, endpoint, payload, attempt)
            })
            .await;

        match result {
            Ok(body) => {
                info!(
                    %stage,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Stage call succeeded"
                );
                Ok(body)
            }
            // Retries exhausted on the network: report it as the stage's failure.
            Err(Error::Transport(detail)) => Err(Error::stage(stage, None, detail)),
            Err(err) => Err(err),
        }
    }
}
