//! Persistence stage.

use async_trait::async_trait;
use cf_core::{Error, Result};
use serde_json::Value;

use crate::context::RunContext;
use crate::record::AccumulatedRecord;
use crate::stage::{Stage, StageName, StageOutput};

/// Persist the accumulated record and capture the stored document reference.
#[derive(Debug, Default)]
pub struct StoreStage;

#[async_trait]
impl Stage for StoreStage {
    fn name(&self) -> StageName {
        StageName::Store
    }

    async fn execute(&self, record: &AccumulatedRecord, ctx: &RunContext) -> Result<StageOutput> {
        let payload = record.to_payload()?;
        let body = ctx.invoker.invoke(self.name(), &payload).await?;

        match body.get("document_path").and_then(Value::as_str) {
            Some(path) if !path.is_empty() => {
                tracing::info!(asset_id = %record.descriptor.asset_id, document_path = path, "Record stored");
            }
            _ => {
                return Err(Error::stage(
                    self.name(),
                    None,
                    "store response carries no document_path",
                ))
            }
        }

        Ok(StageOutput::partial(body))
    }
}
