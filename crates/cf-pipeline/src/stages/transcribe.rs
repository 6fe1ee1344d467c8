//! Speech transcription stage.

use async_trait::async_trait;
use cf_core::Result;
use serde_json::Value;

use crate::context::RunContext;
use crate::record::AccumulatedRecord;
use crate::stage::{Stage, StageName, StageOutput};

/// Transcribe the extracted audio track.
///
/// An empty transcript is a soft condition, not a failure.
#[derive(Debug, Default)]
pub struct TranscribeStage;

#[async_trait]
impl Stage for TranscribeStage {
    fn name(&self) -> StageName {
        StageName::Transcribe
    }

    async fn execute(&self, record: &AccumulatedRecord, ctx: &RunContext) -> Result<StageOutput> {
        let payload = record.to_payload()?;
        let body = ctx.invoker.invoke(self.name(), &payload).await?;

        let empty = body
            .get("transcript")
            .and_then(Value::as_str)
            .map_or(true, |t| t.trim().is_empty());
        let note = empty.then(|| "empty transcript".to_string());

        Ok(StageOutput::Partial { body, note })
    }

    fn weight(&self) -> f32 {
        3.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::fakes::{object_store_record, FakeInvoker};
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn empty_transcript_is_soft() {
        let invoker = FakeInvoker::default().respond(StageName::Transcribe, json!({"transcript": ""}));
        let ctx = RunContext::new(Arc::new(invoker));
        let output = TranscribeStage
            .execute(&object_store_record(), &ctx)
            .await
            .unwrap();
        assert_matches!(output, StageOutput::Partial { note: Some(note), .. } => {
            assert_eq!(note, "empty transcript");
        });
    }

    #[tokio::test]
    async fn transcript_passes_through() {
        let invoker = FakeInvoker::default()
            .respond(StageName::Transcribe, json!({"transcript": "welcome aboard"}));
        let ctx = RunContext::new(Arc::new(invoker));
        let output = TranscribeStage
            .execute(&object_store_record(), &ctx)
            .await
            .unwrap();
        assert_matches!(output, StageOutput::Partial { body, note: None } => {
            assert_eq!(body["transcript"], "welcome aboard");
        });
    }
}
