//! Built-in pipeline stages.
//!
//! `Acquire` runs in-process; every other stage forwards the accumulated
//! record to its remote collaborator through the run's
//! [`StageInvoker`](crate::invoke::StageInvoker) and inspects the reply.

mod acquire;
mod enrich;
mod sample_frames;
mod store;
mod transcode;
mod transcribe;

pub use acquire::AcquireStage;
pub use enrich::{AnalysisMode, EnrichStage};
pub use sample_frames::SampleFramesStage;
pub use store::StoreStage;
pub use transcode::TranscodeStage;
pub use transcribe::TranscribeStage;

#[cfg(test)]
pub(crate) mod fakes;
