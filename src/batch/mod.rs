//! Batch ingest from an object-store prefix.
//!
//! Lists media under `batch.prefix`, drops anything already in the processed
//! ledger, samples up to `batch.count` of what remains at random, and runs
//! each sampled object through the [`Orchestrator`] one at a time. Every
//! attempted object is recorded in the ledger, whatever its outcome, so a
//! failing object is not resubmitted on the next invocation.

mod ledger;
mod object_store;

pub use ledger::ProcessedLedger;
pub use object_store::{GcsLister, ObjectLister, StoredObject};

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use cf_core::config::BatchConfig;
use rand::seq::SliceRandom;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use crate::orchestrator::{CompletionReport, Orchestrator};

/// Outcome of one sampled object.
#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub object: String,
    pub report: CompletionReport,
}

/// What one batch invocation did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub listed: usize,
    pub remaining: usize,
    pub items: Vec<BatchItem>,
}

impl BatchSummary {
    pub fn completed(&self) -> usize {
        self.items.iter().filter(|i| i.report.is_complete()).count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.completed()
    }
}

pub struct BatchRunner {
    lister: Arc<dyn ObjectLister>,
    config: BatchConfig,
}

impl BatchRunner {
    pub fn new(lister: Arc<dyn ObjectLister>, config: BatchConfig) -> Self {
        Self { lister, config }
    }

    fn is_candidate(&self, object: &StoredObject, ledger: &ProcessedLedger) -> bool {
        let suffix = format!(".{}", self.config.extension.trim_start_matches('.'));
        object.name.len() > suffix.len()
            && object.name.to_ascii_lowercase().ends_with(&suffix.to_ascii_lowercase())
            && !ledger.contains(&object.name)
    }

    fn request_for(&self, bucket: &str, object: &StoredObject) -> Value {
        let mut request = json!({
            "bucket": bucket,
            "file_name": object.name,
        });
        if let Some(label) = &self.config.source_label {
            request["source"] = Value::String(label.clone());
        }
        if let Some(size) = object.size {
            request["size_bytes"] = Value::from(size);
        }
        request
    }

    /// Run one batch through `orchestrator`.
    pub async fn run(&self, orchestrator: &Orchestrator) -> Result<BatchSummary> {
        let Some(bucket) = self.config.bucket.as_deref().filter(|b| !b.is_empty()) else {
            bail!("batch.bucket is not configured");
        };

        let mut ledger = ProcessedLedger::load(&self.config.ledger_path)?;
        let objects = self
            .lister
            .list(bucket, &self.config.prefix)
            .await
            .with_context(|| format!("Failed to list gs://{bucket}/{}", self.config.prefix))?;

        let remaining: Vec<StoredObject> = objects
            .iter()
            .filter(|o| self.is_candidate(o, &ledger))
            .cloned()
            .collect();
        let mut summary = BatchSummary {
            listed: objects.len(),
            remaining: remaining.len(),
            items: Vec::new(),
        };

        if remaining.is_empty() {
            info!(bucket, prefix = %self.config.prefix, "No unprocessed files left");
            return Ok(summary);
        }

        let selected: Vec<StoredObject> = remaining
            .choose_multiple(&mut rand::thread_rng(), self.config.count)
            .cloned()
            .collect();
        info!(
            listed = summary.listed,
            remaining = summary.remaining,
            selected = selected.len(),
            "Starting batch"
        );

        for object in selected {
            info!(object = %object.name, "Processing");
            let outcome = orchestrator.run(&self.request_for(bucket, &object)).await;
            ledger.insert(object.name.clone());
            ledger.save()?;
            summary.items.push(BatchItem {
                object: object.name,
                report: outcome.report,
            });
        }

        info!(
            completed = summary.completed(),
            failed = summary.failed(),
            "Batch finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cf_core::Result as CoreResult;
    use cf_pipeline::{RunContext, StageInvoker, StageName};
    use parking_lot::Mutex;
    use serde_json::Map;
    use std::path::Path;
    use tempfile::TempDir;

    struct FixedListing(Vec<StoredObject>);

    #[async_trait]
    impl ObjectLister for FixedListing {
        async fn list(&self, _bucket: &str, _prefix: &str) -> CoreResult<Vec<StoredObject>> {
            Ok(self.0.clone())
        }
    }

    /// Records the descriptor of every Store call.
    #[derive(Default)]
    struct Recording {
        stored: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl StageInvoker for Recording {
        async fn invoke(&self, stage: StageName, payload: &Value) -> CoreResult<Map<String, Value>> {
            let mut body = Map::new();
            match stage {
                StageName::TranscodeVideo => {
                    body.insert("audio_status".into(), "extracted".into());
                }
                StageName::Store => {
                    self.stored.lock().push(payload["descriptor"].clone());
                    body.insert("document_path".into(), "media/x".into());
                }
                _ => {}
            }
            Ok(body)
        }
    }

    fn object(name: &str) -> StoredObject {
        StoredObject {
            name: name.into(),
            size: Some(1_000),
        }
    }

    fn config(ledger: &Path, count: usize) -> BatchConfig {
        BatchConfig {
            bucket: Some("media".into()),
            prefix: "uploads/".into(),
            count,
            ledger_path: ledger.to_path_buf(),
            source_label: Some("newsflare".into()),
            ..BatchConfig::default()
        }
    }

    #[tokio::test]
    async fn processes_sample_and_records_ledger() {
        let dir = TempDir::new().unwrap();
        let ledger_path = dir.path().join("processed.txt");
        std::fs::write(&ledger_path, "uploads/done.mp4\n").unwrap();

        let listing = FixedListing(vec![
            object("uploads/done.mp4"),
            object("uploads/a.mp4"),
            object("uploads/b.MP4"),
            object("uploads/c.mp4"),
            object("uploads/notes.txt"),
            object("uploads/"),
        ]);
        let invoker = Arc::new(Recording::default());
        let orchestrator = Orchestrator::new(RunContext::new(invoker.clone()));
        let runner = BatchRunner::new(Arc::new(listing), config(&ledger_path, 2));

        let summary = runner.run(&orchestrator).await.unwrap();
        assert_eq!(summary.listed, 6);
        assert_eq!(summary.remaining, 3);
        assert_eq!(summary.items.len(), 2);
        assert_eq!(summary.completed(), 2);

        let ledger = ProcessedLedger::load(&ledger_path).unwrap();
        assert_eq!(ledger.len(), 3);
        for item in &summary.items {
            assert!(ledger.contains(&item.object));
        }

        let stored = invoker.stored.lock();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0]["provenance"]["source_label"], "newsflare");
        assert_eq!(stored[0]["locator"]["bucket"], "media");
    }

    #[tokio::test]
    async fn nothing_left_is_success() {
        let dir = TempDir::new().unwrap();
        let ledger_path = dir.path().join("processed.txt");
        std::fs::write(&ledger_path, "uploads/a.mp4\n").unwrap();

        let orchestrator = Orchestrator::new(RunContext::new(Arc::new(Recording::default())));
        let runner = BatchRunner::new(
            Arc::new(FixedListing(vec![object("uploads/a.mp4")])),
            config(&ledger_path, 5),
        );
        let summary = runner.run(&orchestrator).await.unwrap();
        assert_eq!(summary.remaining, 0);
        assert!(summary.items.is_empty());
    }

    #[tokio::test]
    async fn failed_objects_are_still_recorded() {
        struct Failing;

        #[async_trait]
        impl StageInvoker for Failing {
            async fn invoke(&self, stage: StageName, _: &Value) -> CoreResult<Map<String, Value>> {
                Err(cf_core::Error::stage(stage, Some(500), "boom"))
            }
        }

        let dir = TempDir::new().unwrap();
        let ledger_path = dir.path().join("processed.txt");
        let orchestrator = Orchestrator::new(RunContext::new(Arc::new(Failing)));
        let runner = BatchRunner::new(
            Arc::new(FixedListing(vec![object("uploads/a.mp4")])),
            config(&ledger_path, 1),
        );

        let summary = runner.run(&orchestrator).await.unwrap();
        assert_eq!(summary.failed(), 1);
        assert!(ProcessedLedger::load(&ledger_path)
            .unwrap()
            .contains("uploads/a.mp4"));
    }

    #[tokio::test]
    async fn missing_bucket_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir.path().join("p.txt"), 1);
        config.bucket = None;
        let orchestrator = Orchestrator::new(RunContext::new(Arc::new(Recording::default())));
        let runner = BatchRunner::new(Arc::new(FixedListing(vec![])), config);
        assert!(runner.run(&orchestrator).await.is_err());
    }
}
