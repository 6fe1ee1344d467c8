//! The [`Stage`] trait and the vocabulary the executor uses to reason about
//! stages: names, outcomes, skip reasons, and per-stage status.

use std::fmt;

use async_trait::async_trait;
use cf_core::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::RunContext;
use crate::record::{AccumulatedRecord, Acquisition};

// ---------------------------------------------------------------------------
// StageName
// ---------------------------------------------------------------------------

/// The fixed set of pipeline stages, declared in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StageName {
    Acquire,
    TranscodeVideo,
    Transcribe,
    SampleFrames,
    Enrich,
    Store,
}

impl StageName {
    /// Every stage in execution order.
    pub const ALL: [StageName; 6] = [
        StageName::Acquire,
        StageName::TranscodeVideo,
        StageName::Transcribe,
        StageName::SampleFrames,
        StageName::Enrich,
        StageName::Store,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Acquire => "Acquire",
            Self::TranscodeVideo => "TranscodeVideo",
            Self::Transcribe => "Transcribe",
            Self::SampleFrames => "SampleFrames",
            Self::Enrich => "Enrich",
            Self::Store => "Store",
        }
    }

    /// Whether this stage is served by a remote collaborator.
    ///
    /// `Acquire` runs in-process (possibly calling the catalog resolver).
    pub fn is_remote(&self) -> bool {
        !matches!(self, Self::Acquire)
    }

    /// Processing-heavy stages get the long per-call timeout.
    pub fn is_heavy(&self) -> bool {
        matches!(self, Self::TranscodeVideo | Self::Transcribe)
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// AudioOutcome
// ---------------------------------------------------------------------------

/// What the transcode stage reported about the asset's audio track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioOutcome {
    #[serde(rename = "extracted")]
    AudioExtracted,
    NoAudioPresent,
    AudioExtractionFailed,
}

impl AudioOutcome {
    /// Field of the transcode result carrying the outcome.
    pub const FIELD: &'static str = "audio_status";

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "extracted" | "audio_extracted" => Some(Self::AudioExtracted),
            "no_audio_present" | "no_audio" => Some(Self::NoAudioPresent),
            "audio_extraction_failed" | "failed" => Some(Self::AudioExtractionFailed),
            _ => None,
        }
    }

    /// Read the outcome from a transcode result subtree.
    ///
    /// A missing or unrecognized value counts as a failed extraction.
    pub fn from_technical(technical: &Map<String, Value>) -> Option<Self> {
        if technical.is_empty() {
            return None;
        }
        let parsed = technical
            .get(Self::FIELD)
            .and_then(Value::as_str)
            .and_then(Self::parse);
        if parsed.is_none() {
            tracing::warn!(
                value = ?technical.get(Self::FIELD),
                "Transcode result has no recognizable audio_status; treating as extraction failure"
            );
        }
        Some(parsed.unwrap_or(Self::AudioExtractionFailed))
    }
}

// ---------------------------------------------------------------------------
// Gates and status
// ---------------------------------------------------------------------------

/// Why a stage was bypassed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Inline payloads are assumed pre-normalized.
    InlinePayload,
    NoAudioPresent,
    AudioExtractionFailed,
    /// A video whose transcode stage never produced an audio outcome.
    TranscodeNotRun,
    /// Images and unknown assets have nothing to transcribe.
    NotTranscribable,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InlinePayload => "inline payload",
            Self::NoAudioPresent => "no audio present",
            Self::AudioExtractionFailed => "audio extraction failed",
            Self::TranscodeNotRun => "transcode did not run",
            Self::NotTranscribable => "asset type has no speech track",
        };
        f.write_str(s)
    }
}

/// Decision of the executor's gating logic for one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Run,
    Skip(SkipReason),
}

/// Per-stage annotation kept in the accumulated record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StageStatus {
    /// Ran to completion; `note` marks a soft condition (e.g. empty transcript).
    Completed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    Skipped {
        reason: SkipReason,
    },
    Failed {
        diagnostic: String,
    },
}

// ---------------------------------------------------------------------------
// Stage trait
// ---------------------------------------------------------------------------

/// What a stage hands back to the executor.
///
/// Stages never mutate the record; the executor applies their output to the
/// subtree the stage owns.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutput {
    /// Result of the acquisition stage.
    Acquired {
        acquisition: Acquisition,
        provenance: Map<String, Value>,
    },
    /// Partial record from a remote stage.
    Partial {
        body: Map<String, Value>,
        note: Option<String>,
    },
}

impl StageOutput {
    /// A partial result with no soft-condition note.
    pub fn partial(body: Map<String, Value>) -> Self {
        Self::Partial { body, note: None }
    }
}

/// A single step of the ingest pipeline.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Which stage this is.
    fn name(&self) -> StageName;

    /// Perform the stage against a read-only view of the record.
    async fn execute(&self, record: &AccumulatedRecord, ctx: &RunContext) -> Result<StageOutput>;

    /// Relative weight of this stage for progress reporting.
    fn weight(&self) -> f32 {
        1.0
    }
}
