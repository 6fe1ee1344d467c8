//! cf-core: shared types, errors, and configuration.
//!
//! This crate is the foundational dependency for the other cf-* crates,
//! providing the unified error taxonomy, the media-domain enums, the canonical
//! [`AssetDescriptor`], and the application configuration types.

pub mod config;
pub mod error;
pub mod media;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use media::*;
