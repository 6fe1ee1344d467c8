//! Shared test harness for integration tests.
//!
//! Provides [`StageHarness`], which starts one wiremock server standing in for
//! every stage service and the catalog, plus a [`Config`] pointing at it.

#![allow(dead_code)]

use clipforge::config::{Config, IdentityMode, StageEndpoint, StagesConfig};
use clipforge::Orchestrator;
use serde_json::Value;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const STAGE_TOKEN: &str = "stage-token";

/// Mock stage services and catalog on a random port.
pub struct StageHarness {
    pub server: MockServer,
    pub config: Config,
}

impl StageHarness {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let base = server.uri();
        let endpoint = |name: &str| StageEndpoint {
            url: format!("{base}/{name}"),
            timeout_secs: Some(5),
        };

        let mut config = Config::default();
        config.stages = StagesConfig {
            transcode: endpoint("transcode"),
            transcribe: endpoint("transcribe"),
            sample_frames: endpoint("sample"),
            enrich: endpoint("enrich"),
            store: endpoint("store"),
        };
        config.identity.mode = IdentityMode::Static;
        config.identity.token = Some(STAGE_TOKEN.into());
        config.retry.max_attempts = 3;
        config.retry.base_delay_ms = 1;
        config.retry.max_delay_ms = 5;
        config.catalog.base_url = base.clone();
        config.catalog.api_key = Some("test-key".into());
        config.catalog.requests_per_second = 100;

        Self { server, config }
    }

    /// Answer `POST /{name}` with `body`, expecting exactly one call.
    pub async fn stage(&self, name: &str, body: Value) {
        Mock::given(method("POST"))
            .and(path(format!("/{name}")))
            .and(header("authorization", format!("Bearer {STAGE_TOKEN}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(1)
            .named(name)
            .mount(&self.server)
            .await;
    }

    /// Answer `POST /{name}` with `status` on every call.
    pub async fn failing_stage(&self, name: &str, status: u16) {
        Mock::given(method("POST"))
            .and(path(format!("/{name}")))
            .respond_with(ResponseTemplate::new(status).set_body_string("stage exploded"))
            .named(name)
            .mount(&self.server)
            .await;
    }

    /// Fail the test if `POST /{name}` is ever called.
    pub async fn stage_never_called(&self, name: &str) {
        Mock::given(method("POST"))
            .and(path(format!("/{name}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(0)
            .named(name)
            .mount(&self.server)
            .await;
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::from_config(&self.config).expect("failed to build orchestrator")
    }

    /// Bodies received by `POST /{name}`, in arrival order.
    pub async fn payloads(&self, name: &str) -> Vec<Value> {
        let target = format!("/{name}");
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path() == target)
            .map(|r| serde_json::from_slice(&r.body).expect("stage payload is JSON"))
            .collect()
    }
}
