//! # cf-pipeline
//!
//! The stage graph that drives one asset through ingest.
//!
//! This crate provides:
//!
//! - **[`Stage`]** trait -- one step of the fixed stage sequence, returning a
//!   [`StageOutput`] the executor applies to the record.
//! - **[`AccumulatedRecord`]** -- the descriptor plus a typed subtree per
//!   stage, grown with the deep [`merge`] rules.
//! - **[`RunContext`]** -- invoker, acquirer, analysis policy, cancellation and
//!   progress shared by every stage of a run.
//! - **Built-in stages** ([`stages`]) -- acquire, transcode, transcribe,
//!   sample frames, enrich, store.
//! - **[`PipelineExecutor`]** -- runs the stages in order, applies the
//!   conditional gates, and stops at the first hard failure.

pub mod context;
pub mod executor;
pub mod invoke;
pub mod merge;
pub mod record;
pub mod stage;
pub mod stages;

// Re-export key types at the crate root.
pub use context::{ProgressSender, RunContext};
pub use executor::{PipelineExecutor, PipelineOutcome};
pub use invoke::{AssetAcquirer, StageInvoker};
pub use merge::merge;
pub use record::{AccumulatedRecord, Acquisition};
pub use stage::{AudioOutcome, Gate, SkipReason, Stage, StageName, StageOutput, StageStatus};
