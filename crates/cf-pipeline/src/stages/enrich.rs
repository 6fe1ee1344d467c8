//! Enrichment stage.
//!
//! Small media is analysed in a single call. Videos whose known size exceeds
//! `analysis.full_media_max_bytes` are analysed frame by frame instead: up to
//! `max_frames` sampled frames, `frame_concurrency` calls in flight, with every
//! frame's outcome kept in the result.

use async_trait::async_trait;
use cf_core::{AssetType, Error, Result};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::context::RunContext;
use crate::record::AccumulatedRecord;
use crate::stage::{Stage, StageName, StageOutput};

/// How the enrich collaborator is asked to look at the media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    FullMedia,
    SampledFrames,
}

impl AnalysisMode {
    fn as_str(&self) -> &'static str {
        match self {
            Self::FullMedia => "full_media",
            Self::SampledFrames => "sampled_frames",
        }
    }
}

/// Generate descriptive analysis for the asset.
#[derive(Debug, Default)]
pub struct EnrichStage;

impl EnrichStage {
    /// Pick the analysis mode for `record` under the run's policy.
    pub fn mode(record: &AccumulatedRecord, ctx: &RunContext) -> AnalysisMode {
        let oversized = record
            .media_size()
            .is_some_and(|size| size > ctx.analysis.full_media_max_bytes);
        if record.media_type() == AssetType::Video
            && oversized
            && ctx.analysis.max_frames > 0
            && !record.frame_paths().is_empty()
        {
            AnalysisMode::SampledFrames
        } else {
            AnalysisMode::FullMedia
        }
    }

    async fn full_media(&self, record: &AccumulatedRecord, ctx: &RunContext) -> Result<StageOutput> {
        let payload = with_fields(
            record.to_payload()?,
            [("analysis_mode", json!(AnalysisMode::FullMedia.as_str()))],
        );
        let mut body = ctx.invoker.invoke(self.name(), &payload).await?;
        body.entry("analysis_mode")
            .or_insert_with(|| json!(AnalysisMode::FullMedia.as_str()));
        Ok(StageOutput::partial(body))
    }

    async fn sampled_frames(
        &self,
        record: &AccumulatedRecord,
        ctx: &RunContext,
    ) -> Result<StageOutput> {
        let base = record.to_payload()?;
        let frames: Vec<String> = record
            .frame_paths()
            .into_iter()
            .take(ctx.analysis.max_frames)
            .collect();
        let invoker = &ctx.invoker;

        tracing::info!(
            asset_id = %record.descriptor.asset_id,
            frames = frames.len(),
            concurrency = ctx.analysis.frame_concurrency,
            "Analysing oversized media frame by frame"
        );

        let outcomes: Vec<(String, Result<Map<String, Value>>)> = stream::iter(frames)
            .map(|frame| {
                let payload = with_fields(
                    base.clone(),
                    [
                        ("analysis_mode", json!(AnalysisMode::SampledFrames.as_str())),
                        ("frame_path", json!(frame)),
                    ],
                );
                async move {
                    let result = invoker.invoke(StageName::Enrich, &payload).await;
                    (frame, result)
                }
            })
            .buffered(ctx.analysis.frame_concurrency.max(1))
            .collect()
            .await;

        let total = outcomes.len();
        let mut first_error: Option<Error> = None;
        let mut failed = 0usize;
        let mut entries = Vec::with_capacity(total);

        for (frame, result) in outcomes {
            match result {
                Ok(analysis) => entries.push(json!({
                    "frame_path": frame,
                    "status": "ok",
                    "analysis": analysis,
                })),
                Err(e) => {
                    tracing::warn!(frame_path = %frame, error = %e, "Frame analysis failed");
                    failed += 1;
                    entries.push(json!({
                        "frame_path": frame,
                        "status": "error",
                        "error": e.diagnostic(),
                    }));
                    first_error.get_or_insert(e);
                }
            }
        }

        if failed == total {
            if let Some(e) = first_error {
                return Err(e);
            }
        }

        let mut body = Map::new();
        body.insert("analysis_mode".into(), json!(AnalysisMode::SampledFrames.as_str()));
        body.insert("frames_analysed".into(), json!(total - failed));
        body.insert("frames_failed".into(), json!(failed));
        body.insert("frames".into(), Value::Array(entries));

        let note = (failed > 0).then(|| format!("{failed} of {total} frame analyses failed"));
        Ok(StageOutput::Partial { body, note })
    }
}

#[async_trait]
impl Stage for EnrichStage {
    fn name(&self) -> StageName {
        StageName::Enrich
    }

    async fn execute(&self, record: &AccumulatedRecord, ctx: &RunContext) -> Result<StageOutput> {
        match Self::mode(record, ctx) {
            AnalysisMode::FullMedia => self.full_media(record, ctx).await,
            AnalysisMode::SampledFrames => self.sampled_frames(record, ctx).await,
        }
    }

    fn weight(&self) -> f32 {
        2.0
    }
}

/// Add top-level fields to an object payload.
fn with_fields<const N: usize>(mut payload: Value, fields: [(&str, Value); N]) -> Value {
    if let Value::Object(map) = &mut payload {
        for (key, value) in fields {
            map.insert(key.to_string(), value);
        }
    }
    payload
}
