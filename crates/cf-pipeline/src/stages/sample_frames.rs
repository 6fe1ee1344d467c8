//! Frame sampling stage.

use async_trait::async_trait;
use cf_core::Result;
use serde_json::Value;

use crate::context::RunContext;
use crate::record::AccumulatedRecord;
use crate::stage::{Stage, StageName, StageOutput};

/// Extract representative still frames from the video.
#[derive(Debug, Default)]
pub struct SampleFramesStage;

#[async_trait]
impl Stage for SampleFramesStage {
    fn name(&self) -> StageName {
        StageName::SampleFrames
    }

    async fn execute(&self, record: &AccumulatedRecord, ctx: &RunContext) -> Result<StageOutput> {
        let payload = record.to_payload()?;
        let body = ctx.invoker.invoke(self.name(), &payload).await?;

        let count = body
            .get("frame_paths")
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        tracing::debug!(asset_id = %record.descriptor.asset_id, frames = count, "Frames sampled");
        let note = (count == 0).then(|| "no frames sampled".to_string());

        Ok(StageOutput::Partial { body, note })
    }

    fn weight(&self) -> f32 {
        2.0
    }
}
