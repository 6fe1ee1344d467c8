//! Clipforge - media ingest orchestrator
//!
//! Normalizes a request describing one asset, acquires the media (licensed
//! catalog download, preview fallback, object store, URL, or inline bytes),
//! drives it through the remote stage services, and reports one outcome.

pub mod auth;
pub mod batch;
pub mod catalog;
pub mod config;
pub mod http;
pub mod invoker;
pub mod normalize;
pub mod orchestrator;
pub mod retry;

pub use orchestrator::{CompletionReport, Orchestrator, RunOutcome};
