//! Seams between the executor and the outside world.
//!
//! The executor never talks HTTP itself; it calls stages through a
//! [`StageInvoker`] and resolves catalog identifiers through an
//! [`AssetAcquirer`]. The application crate supplies the real implementations.

use async_trait::async_trait;
use cf_core::{ResolvedResource, Result};
use serde_json::{Map, Value};

use crate::stage::StageName;

/// Issues one call to a remote stage.
#[async_trait]
pub trait StageInvoker: Send + Sync {
    /// Send `payload` to `stage` and return its partial result.
    ///
    /// Implementations retry transient failures and report everything else as
    /// [`cf_core::Error::Stage`] (or [`cf_core::Error::Auth`] when no identity
    /// token could be obtained).
    async fn invoke(&self, stage: StageName, payload: &Value) -> Result<Map<String, Value>>;
}

/// Resolves a catalog identifier to a retrievable media URL.
#[async_trait]
pub trait AssetAcquirer: Send + Sync {
    async fn resolve(&self, catalog_id: &str) -> Result<ResolvedResource>;
}
