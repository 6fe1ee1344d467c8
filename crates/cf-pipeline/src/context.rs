//! Execution context shared by all stages in a pipeline run.

use std::sync::Arc;

use cf_core::config::AnalysisConfig;
use tokio_util::sync::CancellationToken;

use crate::invoke::{AssetAcquirer, StageInvoker};

/// Sender for reporting progress from the executor.
///
/// Wraps a callback that receives a progress percentage (0.0 -- 100.0) and
/// the name of the stage that just finished.
pub struct ProgressSender {
    callback: Box<dyn Fn(f32, &str) + Send + Sync>,
}

impl ProgressSender {
    pub fn new(callback: impl Fn(f32, &str) + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }

    /// A sender that discards all progress reports.
    pub fn noop() -> Self {
        Self {
            callback: Box::new(|_, _| {}),
        }
    }

    pub fn send(&self, progress: f32, stage: &str) {
        (self.callback)(progress, stage);
    }
}

impl std::fmt::Debug for ProgressSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSender").finish_non_exhaustive()
    }
}

/// Context passed to every stage during execution.
#[derive(Clone)]
pub struct RunContext {
    /// Calls remote stages.
    pub invoker: Arc<dyn StageInvoker>,
    /// Resolves catalog identifiers; `None` when no catalog is configured.
    pub acquirer: Option<Arc<dyn AssetAcquirer>>,
    /// Full-media versus per-frame enrichment policy.
    pub analysis: AnalysisConfig,
    /// Checked between stages; when cancelled the executor stops early.
    pub cancellation: CancellationToken,
    pub progress: Arc<ProgressSender>,
}

impl RunContext {
    pub fn new(invoker: Arc<dyn StageInvoker>) -> Self {
        Self {
            invoker,
            acquirer: None,
            analysis: AnalysisConfig::default(),
            cancellation: CancellationToken::new(),
            progress: Arc::new(ProgressSender::noop()),
        }
    }

    /// Builder: attach a catalog acquirer.
    pub fn with_acquirer(mut self, acquirer: Arc<dyn AssetAcquirer>) -> Self {
        self.acquirer = Some(acquirer);
        self
    }

    /// Builder: set the analysis policy.
    pub fn with_analysis(mut self, analysis: AnalysisConfig) -> Self {
        self.analysis = analysis;
        self
    }

    /// Builder: attach a cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Builder: attach a progress sender.
    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = Arc::new(progress);
        self
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("has_acquirer", &self.acquirer.is_some())
            .field("analysis", &self.analysis)
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish_non_exhaustive()
    }
}
