//! Video transcode stage.

use async_trait::async_trait;
use cf_core::Result;

use crate::context::RunContext;
use crate::record::AccumulatedRecord;
use crate::stage::{AudioOutcome, Stage, StageName, StageOutput};

/// Normalize the source video and report whether audio could be extracted.
#[derive(Debug, Default)]
pub struct TranscodeStage;

#[async_trait]
impl Stage for TranscodeStage {
    fn name(&self) -> StageName {
        StageName::TranscodeVideo
    }

    async fn execute(&self, record: &AccumulatedRecord, ctx: &RunContext) -> Result<StageOutput> {
        let payload = record.to_payload()?;
        let body = ctx.invoker.invoke(self.name(), &payload).await?;

        let note = match AudioOutcome::from_technical(&body) {
            Some(AudioOutcome::NoAudioPresent) => Some("no audio present".to_string()),
            Some(AudioOutcome::AudioExtractionFailed) => Some("audio extraction failed".to_string()),
            Some(AudioOutcome::AudioExtracted) | None => None,
        };

        Ok(StageOutput::Partial { body, note })
    }

    fn weight(&self) -> f32 {
        3.0
    }
}
