//! Entry point for one request: normalize, execute, report.

use std::sync::Arc;

use cf_core::config::Config;
use cf_core::Result;
use cf_pipeline::{AccumulatedRecord, PipelineExecutor, PipelineOutcome, ProgressSender, RunContext};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

use crate::auth::CredentialCache;
use crate::catalog::{CatalogResolver, HttpCatalog};
use crate::invoker::HttpStageInvoker;
use crate::normalize::normalize_value;
use crate::retry::RetryPolicy;

/// Stage name reported when a request cannot be normalized.
pub const NORMALIZE_STAGE: &str = "Normalize";

/// The single report returned for every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "pipeline_status", rename_all = "snake_case")]
pub enum CompletionReport {
    Complete {
        timestamp: DateTime<Utc>,
        stored_record_reference: String,
    },
    Failed {
        failing_stage: String,
        diagnostic: String,
    },
}

impl CompletionReport {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete { .. })
    }
}

/// Report plus the record accumulated before the run ended.
///
/// `record` is `None` only when normalization failed.
#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub report: CompletionReport,
    pub record: Option<AccumulatedRecord>,
}

/// Wires the executor to its collaborators and runs requests through it.
pub struct Orchestrator {
    executor: PipelineExecutor,
    ctx: RunContext,
    resolver: Option<Arc<CatalogResolver>>,
}

impl Orchestrator {
    pub fn new(ctx: RunContext) -> Self {
        Self {
            executor: PipelineExecutor::new(),
            ctx,
            resolver: None,
        }
    }

    /// Attach a catalog resolver as the run's acquirer.
    pub fn with_resolver(mut self, resolver: Arc<CatalogResolver>) -> Self {
        self.ctx = self.ctx.with_acquirer(resolver.clone());
        self.resolver = Some(resolver);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.ctx = self.ctx.with_cancellation(token);
        self
    }

    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.ctx = self.ctx.with_progress(progress);
        self
    }

    /// Build the HTTP-backed orchestrator described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let retry = RetryPolicy::from_config(&config.retry);
        let identity = Arc::new(CredentialCache::for_identity(&config.identity, retry.clone())?);
        let invoker = HttpStageInvoker::new(config.stages.clone(), identity, retry.clone())?;
        let ctx = RunContext::new(Arc::new(invoker)).with_analysis(config.analysis.clone());
        let orchestrator = Self::new(ctx);

        if !config.catalog.is_enabled() {
            info!("Catalog not configured; catalog requests will fail at Acquire");
            return Ok(orchestrator);
        }
        let api = Arc::new(HttpCatalog::from_config(&config.catalog, retry)?);
        let resolver = Arc::new(CatalogResolver::new(api, &config.catalog));
        Ok(orchestrator.with_resolver(resolver))
    }

    /// The catalog resolver, when a catalog is configured.
    pub fn resolver(&self) -> Option<&Arc<CatalogResolver>> {
        self.resolver.as_ref()
    }

    /// Run one raw request to completion.
    pub async fn run(&self, request: &Value) -> RunOutcome {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("run", %run_id);
        self.run_inner(run_id, request).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid, request: &Value) -> RunOutcome {
        let descriptor = match normalize_value(request) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!(error = %e, "Rejected request");
                return RunOutcome {
                    run_id,
                    report: CompletionReport::Failed {
                        failing_stage: NORMALIZE_STAGE.to_string(),
                        diagnostic: e.diagnostic(),
                    },
                    record: None,
                };
            }
        };

        info!(
            asset_id = %descriptor.asset_id,
            source = %descriptor.source,
            asset_type = %descriptor.asset_type,
            locator = %descriptor.locator.display_ref(),
            "Request normalized"
        );

        match self.executor.execute(descriptor, &self.ctx).await {
            PipelineOutcome::Complete {
                record,
                stored_reference,
            } => {
                info!(
                    asset_id = %record.descriptor.asset_id,
                    reference = %stored_reference,
                    "Pipeline complete"
                );
                RunOutcome {
                    run_id,
                    report: CompletionReport::Complete {
                        timestamp: Utc::now(),
                        stored_record_reference: stored_reference,
                    },
                    record: Some(record),
                }
            }
            PipelineOutcome::Failed {
                record,
                failing_stage,
                error: err,
            } => {
                error!(
                    asset_id = %record.descriptor.asset_id,
                    stage = %failing_stage,
                    kind = err.kind(),
                    "Pipeline failed: {err}"
                );
                RunOutcome {
                    run_id,
                    report: CompletionReport::Failed {
                        failing_stage: failing_stage.to_string(),
                        diagnostic: err.diagnostic(),
                    },
                    record: Some(record),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use cf_pipeline::{StageInvoker, StageName};
    use serde_json::{json, Map};

    /// Answers every stage with a canned body.
    struct Scripted;

    #[async_trait]
    impl StageInvoker for Scripted {
        async fn invoke(&self, stage: StageName, _payload: &Value) -> Result<Map<String, Value>> {
            let body = match stage {
                StageName::TranscodeVideo => json!({"audio_status": "no_audio_present"}),
                StageName::SampleFrames => json!({"frame_paths": ["f/1.jpg"]}),
                StageName::Enrich => json!({"summary": "quiet street"}),
                StageName::Store => json!({"document_path": "media/clip1"}),
                _ => json!({}),
            };
            match body {
                Value::Object(map) => Ok(map),
                _ => unreachable!(),
            }
        }
    }

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(RunContext::new(Arc::new(Scripted)))
    }

    #[tokio::test]
    async fn unrecognized_request_fails_at_normalize() {
        let outcome = orchestrator().run(&json!({"title": "nothing usable"})).await;
        assert!(outcome.record.is_none());
        assert_matches!(outcome.report, CompletionReport::Failed { failing_stage, diagnostic } => {
            assert_eq!(failing_stage, "Normalize");
            assert!(diagnostic.starts_with("invalid_input"));
        });
    }

    #[tokio::test]
    async fn object_store_video_completes() {
        let outcome = orchestrator()
            .run(&json!({"source": "object-store", "locator": "raw/clip1.mp4"}))
            .await;
        assert_matches!(&outcome.report, CompletionReport::Complete { stored_record_reference, .. } => {
            assert_eq!(stored_record_reference, "media/clip1");
        });
        let record = outcome.record.unwrap();
        assert!(record.transcript.is_empty());
    }

    #[tokio::test]
    async fn catalog_request_without_catalog_fails_at_acquire() {
        let outcome = orchestrator().run(&json!({"catalog_id": "X1"})).await;
        assert_matches!(outcome.report, CompletionReport::Failed { failing_stage, diagnostic } => {
            assert_eq!(failing_stage, "Acquire");
            assert!(diagnostic.starts_with("config_error"));
        });
    }

    #[tokio::test]
    async fn cancelled_run_reports_first_stage() {
        let token = CancellationToken::new();
        token.cancel();
        let outcome = orchestrator()
            .with_cancellation(token)
            .run(&json!({"locator": "raw/clip1.mp4"}))
            .await;
        assert_matches!(outcome.report, CompletionReport::Failed { failing_stage, .. } => {
            assert_eq!(failing_stage, "Acquire");
        });
    }

    #[test]
    fn report_wire_shape() {
        let complete = CompletionReport::Complete {
            timestamp: "2024-05-01T12:00:00Z".parse().unwrap(),
            stored_record_reference: "media/clip1".into(),
        };
        let value = serde_json::to_value(&complete).unwrap();
        assert_eq!(value["pipeline_status"], "complete");
        assert_eq!(value["stored_record_reference"], "media/clip1");
        assert!(value["timestamp"].as_str().unwrap().starts_with("2024-05-01T12:00:00"));

        let failed = CompletionReport::Failed {
            failing_stage: "Acquire".into(),
            diagnostic: "no_usable_resource: No usable resource: X123".into(),
        };
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({
                "pipeline_status": "failed",
                "failing_stage": "Acquire",
                "diagnostic": "no_usable_resource: No usable resource: X123"
            })
        );
    }
}
