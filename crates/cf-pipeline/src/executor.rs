//! Pipeline executor: runs the fixed stage sequence for one asset with
//! conditional gates, progress reporting, and cancellation between stages.

use cf_core::{AssetDescriptor, AssetType, Error};

use crate::context::RunContext;
use crate::record::AccumulatedRecord;
use crate::stage::{AudioOutcome, Gate, SkipReason, Stage, StageName, StageStatus};
use crate::stages::{
    AcquireStage, EnrichStage, SampleFramesStage, StoreStage, TranscodeStage, TranscribeStage,
};

/// Result of one pipeline run.
///
/// Both variants carry the record accumulated so far.
#[derive(Debug)]
pub enum PipelineOutcome {
    Complete {
        record: AccumulatedRecord,
        stored_reference: String,
    },
    Failed {
        record: AccumulatedRecord,
        failing_stage: StageName,
        error: Error,
    },
}

impl PipelineOutcome {
    pub fn record(&self) -> &AccumulatedRecord {
        match self {
            Self::Complete { record, .. } | Self::Failed { record, .. } => record,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete { .. })
    }
}

/// Runs `Acquire → TranscodeVideo → Transcribe → SampleFrames → Enrich → Store`.
///
/// Stages run strictly one at a time; no stage runs twice, and nothing after a
/// hard failure is ever called.
pub struct PipelineExecutor {
    stages: Vec<Box<dyn Stage>>,
}

impl Default for PipelineExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineExecutor {
    pub fn new() -> Self {
        Self {
            stages: vec![
                Box::new(AcquireStage),
                Box::new(TranscodeStage),
                Box::new(TranscribeStage),
                Box::new(SampleFramesStage),
                Box::new(EnrichStage),
                Box::new(StoreStage),
            ],
        }
    }

    #[cfg(test)]
    fn with_stages(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    fn total_weight(&self) -> f32 {
        self.stages.iter().map(|s| s.weight()).sum()
    }

    /// Decide whether `stage` applies to the record in its current state.
    pub fn gate(stage: StageName, record: &AccumulatedRecord) -> Gate {
        match stage {
            StageName::Acquire | StageName::Enrich | StageName::Store => Gate::Run,
            StageName::TranscodeVideo | StageName::SampleFrames => {
                if record.is_reference_based() {
                    Gate::Run
                } else {
                    Gate::Skip(SkipReason::InlinePayload)
                }
            }
            StageName::Transcribe => match record.media_type() {
                AssetType::Audio => Gate::Run,
                AssetType::Video => match record.audio_outcome() {
                    Some(AudioOutcome::AudioExtracted) => Gate::Run,
                    Some(AudioOutcome::NoAudioPresent) => Gate::Skip(SkipReason::NoAudioPresent),
                    Some(AudioOutcome::AudioExtractionFailed) => {
                        Gate::Skip(SkipReason::AudioExtractionFailed)
                    }
                    None => Gate::Skip(SkipReason::TranscodeNotRun),
                },
                AssetType::Image | AssetType::Unknown => Gate::Skip(SkipReason::NotTranscribable),
            },
        }
    }

    /// Drive `descriptor` through every stage.
    pub async fn execute(&self, descriptor: AssetDescriptor, ctx: &RunContext) -> PipelineOutcome {
        let mut record = AccumulatedRecord::new(descriptor);
        let asset_id = record.descriptor.asset_id.clone();
        let total_weight = self.total_weight();
        let mut completed_weight: f32 = 0.0;

        for stage in &self.stages {
            let name = stage.name();

            // Check cancellation between stages.
            if ctx.cancellation.is_cancelled() {
                tracing::info!(asset_id = %asset_id, stage = %name, "Pipeline cancelled");
                let error = Error::Cancelled;
                record.status.insert(
                    name,
                    StageStatus::Failed {
                        diagnostic: error.diagnostic(),
                    },
                );
                return PipelineOutcome::Failed {
                    record,
                    failing_stage: name,
                    error,
                };
            }

            match Self::gate(name, &record) {
                Gate::Skip(reason) => {
                    tracing::info!(asset_id = %asset_id, stage = %name, %reason, "Skipping stage");
                    record.status.insert(name, StageStatus::Skipped { reason });
                }
                Gate::Run => {
                    tracing::info!(asset_id = %asset_id, stage = %name, "Starting stage");
                    match stage.execute(&record, ctx).await {
                        Ok(output) => {
                            let note = record.apply(name, output);
                            if let Some(note) = &note {
                                tracing::info!(asset_id = %asset_id, stage = %name, note = %note, "Stage completed with note");
                            }
                            record.status.insert(name, StageStatus::Completed { note });
                        }
                        Err(error) => {
                            tracing::error!(
                                asset_id = %asset_id,
                                stage = %name,
                                kind = error.kind(),
                                "Stage failed: {error}"
                            );
                            record.status.insert(
                                name,
                                StageStatus::Failed {
                                    diagnostic: error.diagnostic(),
                                },
                            );
                            return PipelineOutcome::Failed {
                                record,
                                failing_stage: name,
                                error,
                            };
                        }
                    }
                }
            }

            completed_weight += stage.weight();
            let pct = if total_weight > 0.0 {
                (completed_weight / total_weight) * 100.0
            } else {
                100.0
            };
            ctx.progress.send(pct, name.as_str());
            tracing::debug!("[{:.0}%] Finished: {}", pct, name);
        }

        let stored_reference = record.stored_reference().map(str::to_owned);
        match stored_reference {
            Some(stored_reference) => PipelineOutcome::Complete {
                record,
                stored_reference,
            },
            None => {
                let error = Error::stage(StageName::Store, None, "no stored record reference");
                record.status.insert(
                    StageName::Store,
                    StageStatus::Failed {
                        diagnostic: error.diagnostic(),
                    },
                );
                PipelineOutcome::Failed {
                    record,
                    failing_stage: StageName::Store,
                    error,
                }
            }
        }
    }
}
