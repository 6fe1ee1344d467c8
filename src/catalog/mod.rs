//! Remote licensing catalog: HTTP client, wire types, and the
//! licensed-then-preview resolver.

mod client;
mod resolver;
mod types;

pub use client::{CatalogApi, HttpCatalog};
pub use resolver::{CandidateOutcome, CandidateReport, CandidateSearch, CatalogResolver};
pub use types::{CatalogAsset, CatalogPage, PreviewRepresentation};
