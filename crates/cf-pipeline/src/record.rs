//! The accumulated record: the descriptor plus one typed subtree per stage.
//!
//! Each remote stage owns exactly one subtree and its partial results are
//! deep-merged into that subtree only, so a stage can never clobber data
//! captured by another.

use std::collections::BTreeMap;

use cf_core::{AcquisitionSource, AssetDescriptor, AssetType, Error, Locator, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::merge::merge_into;
use crate::stage::{AudioOutcome, StageName, StageOutput, StageStatus};

/// How the media was reached during the `Acquire` stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acquisition {
    pub source: AcquisitionSource,
    /// Retrievable reference; absent for inline payloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_id: Option<String>,
    /// Media family the catalog declares for the asset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<AssetType>,
}

impl Acquisition {
    pub fn inline() -> Self {
        Self {
            source: AcquisitionSource::Inline,
            url: None,
            catalog_id: None,
            media_type: None,
        }
    }
}

/// The growing result of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccumulatedRecord {
    pub descriptor: AssetDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acquisition: Option<Acquisition>,
    /// Owned by `TranscodeVideo`.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub technical: Map<String, Value>,
    /// Owned by `Transcribe`.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub transcript: Map<String, Value>,
    /// Owned by `SampleFrames`.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub frames: Map<String, Value>,
    /// Owned by `Enrich`.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub analysis: Map<String, Value>,
    /// Owned by `Store`.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub paths: Map<String, Value>,
    #[serde(default)]
    pub status: BTreeMap<StageName, StageStatus>,
}

impl AccumulatedRecord {
    pub fn new(descriptor: AssetDescriptor) -> Self {
        Self {
            descriptor,
            acquisition: None,
            technical: Map::new(),
            transcript: Map::new(),
            frames: Map::new(),
            analysis: Map::new(),
            paths: Map::new(),
            status: BTreeMap::new(),
        }
    }

    /// The subtree a remote stage is authoritative for.
    fn subtree_mut(&mut self, stage: StageName) -> Option<&mut Map<String, Value>> {
        match stage {
            StageName::Acquire => None,
            StageName::TranscodeVideo => Some(&mut self.technical),
            StageName::Transcribe => Some(&mut self.transcript),
            StageName::SampleFrames => Some(&mut self.frames),
            StageName::Enrich => Some(&mut self.analysis),
            StageName::Store => Some(&mut self.paths),
        }
    }

    /// Deep-merge a stage's partial result into the subtree it owns.
    pub fn merge_stage(&mut self, stage: StageName, body: Map<String, Value>) {
        match self.subtree_mut(stage) {
            Some(subtree) => merge_into(subtree, body),
            None => tracing::debug!(%stage, "Stage owns no record subtree; partial result ignored"),
        }
    }

    /// Merge extra provenance into the descriptor.
    pub fn merge_provenance(&mut self, provenance: Map<String, Value>) {
        merge_into(&mut self.descriptor.provenance, provenance);
    }

    /// Apply a stage's output, returning the soft-condition note if any.
    pub fn apply(&mut self, stage: StageName, output: StageOutput) -> Option<String> {
        match output {
            StageOutput::Acquired {
                acquisition,
                provenance,
            } => {
                self.merge_provenance(provenance);
                self.acquisition = Some(acquisition);
                None
            }
            StageOutput::Partial { body, note } => {
                self.merge_stage(stage, body);
                note
            }
        }
    }

    /// Whether the media is reachable by reference (object store or URL)
    /// rather than carried inline.
    pub fn is_reference_based(&self) -> bool {
        match &self.acquisition {
            Some(acquisition) => {
                acquisition.source != AcquisitionSource::Inline && acquisition.url.is_some()
            }
            None => matches!(
                self.descriptor.locator,
                Locator::ObjectStore { .. } | Locator::Url { .. }
            ),
        }
    }

    /// The media family the gates work from.
    ///
    /// The descriptor's type when known; otherwise the family the catalog
    /// declared at acquisition. The descriptor itself is never rewritten.
    pub fn media_type(&self) -> AssetType {
        if self.descriptor.asset_type.is_known() {
            return self.descriptor.asset_type;
        }
        self.acquisition
            .as_ref()
            .and_then(|a| a.media_type)
            .unwrap_or(AssetType::Unknown)
    }

    /// Audio outcome reported by the transcode stage, if it ran.
    pub fn audio_outcome(&self) -> Option<AudioOutcome> {
        AudioOutcome::from_technical(&self.technical)
    }

    /// Frame references produced by `SampleFrames`.
    pub fn frame_paths(&self) -> Vec<String> {
        self.frames
            .get("frame_paths")
            .and_then(Value::as_array)
            .map(|paths| {
                paths
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Best known media size: the transcoded output, else the source.
    pub fn media_size(&self) -> Option<u64> {
        self.technical
            .get("size_bytes")
            .and_then(Value::as_u64)
            .or_else(|| self.descriptor.size_bytes())
    }

    /// Reference to the persisted document, once `Store` has run.
    pub fn stored_reference(&self) -> Option<&str> {
        self.paths
            .get("document_path")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// The record as sent to each stage.
    pub fn to_payload(&self) -> Result<Value> {
        serde_json::to_value(self)
            .map_err(|e| Error::Internal(format!("serializing accumulated record: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_core::{AssetType, SourceKind};
    use serde_json::json;

    fn video_record() -> AccumulatedRecord {
        AccumulatedRecord::new(AssetDescriptor {
            asset_id: "clip1".into(),
            source: SourceKind::ObjectStore,
            asset_type: AssetType::Video,
            locator: Locator::ObjectStore {
                bucket: Some("media".into()),
                path: "raw/clip1.mp4".into(),
            },
            provenance: Map::new(),
        })
    }

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn partial_results_land_in_owned_subtree() {
        let mut record = video_record();
        record.merge_stage(
            StageName::TranscodeVideo,
            obj(json!({"audio_status": "extracted", "output_path": "t/clip1.mp4"})),
        );
        record.merge_stage(StageName::Transcribe, obj(json!({"transcript": "hello"})));

        assert_eq!(record.technical["output_path"], "t/clip1.mp4");
        assert_eq!(record.transcript["transcript"], "hello");
        assert!(record.frames.is_empty());
        assert_eq!(record.audio_outcome(), Some(AudioOutcome::AudioExtracted));
    }

    #[test]
    fn stage_cannot_touch_other_subtrees() {
        let mut record = video_record();
        record.merge_stage(StageName::TranscodeVideo, obj(json!({"audio_status": "extracted"})));
        record.merge_stage(StageName::Enrich, obj(json!({"technical": {"audio_status": "gone"}})));

        assert_eq!(record.technical["audio_status"], "extracted");
        assert_eq!(record.analysis["technical"]["audio_status"], "gone");
    }

    #[test]
    fn reapplying_a_stage_result_is_idempotent() {
        let body = obj(json!({"frame_paths": ["f/1.jpg", "f/2.jpg"]}));
        let mut once = video_record();
        once.merge_stage(StageName::SampleFrames, body.clone());
        let mut twice = once.clone();
        twice.merge_stage(StageName::SampleFrames, body);
        assert_eq!(once, twice);
        assert_eq!(once.frame_paths(), vec!["f/1.jpg", "f/2.jpg"]);
    }

    #[test]
    fn acquisition_never_rewrites_descriptor_type() {
        let mut record = video_record();
        record.descriptor.asset_type = AssetType::Unknown;
        record.apply(
            StageName::Acquire,
            StageOutput::Acquired {
                acquisition: Acquisition {
                    source: AcquisitionSource::Licensed,
                    url: Some("https://dl.test/X1.mp4".into()),
                    catalog_id: Some("X1".into()),
                    media_type: Some(AssetType::Video),
                },
                provenance: obj(json!({"catalog_metadata": {"title": "Dunes"}})),
            },
        );
        assert_eq!(record.descriptor.asset_type, AssetType::Unknown);
        assert_eq!(record.descriptor.provenance["catalog_metadata"]["title"], "Dunes");
        assert_eq!(record.media_type(), AssetType::Video);
    }

    #[test]
    fn known_descriptor_type_wins_over_catalog_family() {
        let mut record = video_record();
        record.acquisition = Some(Acquisition {
            source: AcquisitionSource::Preview,
            url: Some("https://cdn.test/X1.jpg".into()),
            catalog_id: Some("X1".into()),
            media_type: Some(AssetType::Image),
        });
        assert_eq!(record.media_type(), AssetType::Video);
    }

    #[test]
    fn reference_based_follows_acquisition() {
        let mut record = video_record();
        assert!(record.is_reference_based());
        record.acquisition = Some(Acquisition::inline());
        assert!(!record.is_reference_based());
        record.acquisition = Some(Acquisition {
            source: AcquisitionSource::Preview,
            url: Some("https://cdn.test/X1.mp4".into()),
            catalog_id: Some("X1".into()),
            media_type: None,
        });
        assert!(record.is_reference_based());
    }

    #[test]
    fn media_size_prefers_transcoded_output() {
        let mut record = video_record();
        record
            .descriptor
            .provenance
            .insert("size_bytes".into(), json!(10));
        assert_eq!(record.media_size(), Some(10));
        record.merge_stage(StageName::TranscodeVideo, obj(json!({"size_bytes": 99})));
        assert_eq!(record.media_size(), Some(99));
    }

    #[test]
    fn empty_subtrees_are_not_serialized() {
        let record = video_record();
        let payload = record.to_payload().unwrap();
        assert!(payload.get("transcript").is_none());
        assert!(payload.get("technical").is_none());
        assert_eq!(payload["descriptor"]["asset_id"], "clip1");
    }

    #[test]
    fn stored_reference_requires_non_empty_path() {
        let mut record = video_record();
        assert_eq!(record.stored_reference(), None);
        record.merge_stage(StageName::Store, obj(json!({"document_path": ""})));
        assert_eq!(record.stored_reference(), None);
        record.merge_stage(StageName::Store, obj(json!({"document_path": "media/clip1"})));
        assert_eq!(record.stored_reference(), Some("media/clip1"));
    }
}
