//! Licensed-first, preview-fallback resolution of catalog identifiers.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use cf_core::config::CatalogConfig;
use cf_core::{AcquisitionSource, Error, ResolvedResource, Result};
use cf_pipeline::AssetAcquirer;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::client::CatalogApi;
use super::types::CatalogAsset;

/// What happened to one search candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateOutcome {
    Resolved(AcquisitionSource),
    /// Already handed out earlier in this process.
    SkippedConsumed,
    Failed(String),
    /// Listed on the winning page after the selected candidate; never licensed.
    NotAttempted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateReport {
    pub catalog_id: String,
    pub page: u32,
    pub outcome: CandidateOutcome,
}

/// Result of a successful paginated search.
#[derive(Debug, Clone)]
pub struct CandidateSearch {
    pub resource: ResolvedResource,
    /// Every listed candidate on the pages examined, in page order.
    pub candidates: Vec<CandidateReport>,
}

/// Resolves catalog identifiers to retrievable media URLs.
///
/// Identifiers whose licensed download was refused are remembered, so the
/// licensed path is never attempted twice for the same identifier. Resolved
/// identifiers are remembered as consumed and skipped by later searches.
/// The winner of a search is held so that running it does not license it a
/// second time.
pub struct CatalogResolver {
    api: Arc<dyn CatalogApi>,
    required_format: String,
    max_pages: u32,
    candidate_concurrency: usize,
    consumed: Mutex<HashSet<String>>,
    rejected: Mutex<HashSet<String>>,
    held: Mutex<HashMap<String, ResolvedResource>>,
}

impl CatalogResolver {
    pub fn new(api: Arc<dyn CatalogApi>, config: &CatalogConfig) -> Self {
        Self {
            api,
            required_format: config.required_format.clone(),
            max_pages: config.max_pages,
            candidate_concurrency: config.candidate_concurrency.max(1),
            consumed: Mutex::new(HashSet::new()),
            rejected: Mutex::new(HashSet::new()),
            held: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_consumed(&self, catalog_id: &str) -> bool {
        self.consumed.lock().contains(catalog_id)
    }

    fn mark_consumed(&self, catalog_id: &str) {
        self.consumed.lock().insert(catalog_id.to_string());
    }

    /// Resolve one identifier and mark it consumed.
    ///
    /// A resource held from an earlier search is handed out once without
    /// contacting the catalog again.
    pub async fn resolve(&self, catalog_id: &str) -> Result<ResolvedResource> {
        let held = self.held.lock().remove(catalog_id);
        if let Some(resource) = held {
            debug!(catalog_id, source = %resource.source, "Using resource held from search");
            return Ok(resource);
        }
        let resource = self.resolve_candidate(catalog_id, None).await?;
        self.mark_consumed(catalog_id);
        Ok(resource)
    }

    /// Licensed first, then preview.
    ///
    /// `prefetched` is the asset lookup already made for this identifier, if
    /// any; otherwise the asset is fetched here when needed.
    async fn resolve_candidate(
        &self,
        catalog_id: &str,
        mut prefetched: Option<Result<CatalogAsset>>,
    ) -> Result<ResolvedResource> {
        let already_rejected = self.rejected.lock().contains(catalog_id);
        if already_rejected {
            debug!(catalog_id, "Licensed download previously refused; using preview");
        } else {
            match self.api.license(catalog_id).await {
                Ok(url) => {
                    let lookup = match prefetched.take() {
                        Some(lookup) => lookup,
                        None => self.api.asset(catalog_id).await,
                    };
                    // Metadata is provenance only; a licensed URL is usable without it.
                    let asset = match lookup {
                        Ok(asset) => Some(asset),
                        Err(e) => {
                            warn!(catalog_id, error = %e, "Could not fetch catalog metadata");
                            None
                        }
                    };
                    info!(catalog_id, "Licensed download granted");
                    return Ok(resource(catalog_id, url, AcquisitionSource::Licensed, asset.as_ref()));
                }
                Err(Error::LicensingUnavailable { reason, .. }) => {
                    info!(catalog_id, %reason, "Licensed download refused; falling back to preview");
                    self.rejected.lock().insert(catalog_id.to_string());
                }
                Err(e) => return Err(e),
            }
        }

        let asset = match prefetched {
            Some(lookup) => lookup?,
            None => self.api.asset(catalog_id).await?,
        };
        match asset.preview_in(&self.required_format) {
            Some(preview) => {
                info!(catalog_id, rendition = %preview.name, "Using preview representation");
                let url = preview.uri.clone();
                Ok(resource(catalog_id, url, AcquisitionSource::Preview, Some(&asset)))
            }
            None => Err(Error::NoUsableResource(format!(
                "{catalog_id}: licensed download refused and no {} preview",
                self.required_format
            ))),
        }
    }

    /// Search pages in order for the first candidate that resolves.
    ///
    /// Asset lookups for a page run with bounded concurrency; licensing runs
    /// one candidate at a time in page order and stops at the first usable
    /// resource, so no entitlement is spent on a candidate that is not used.
    /// Consumed identifiers are skipped. The winner is marked consumed and
    /// held for the next [`resolve`](Self::resolve) of its identifier.
    pub async fn search_candidate(&self, phrase: &str) -> Result<CandidateSearch> {
        let mut candidates = Vec::new();

        for page in 1..=self.max_pages {
            let listing = self.api.search(phrase, page).await?;
            if listing.assets.is_empty() {
                debug!(phrase, page, "Search exhausted");
                break;
            }

            let mut fresh = Vec::new();
            for asset in listing.assets {
                if self.is_consumed(&asset.id) {
                    candidates.push(CandidateReport {
                        catalog_id: asset.id,
                        page,
                        outcome: CandidateOutcome::SkippedConsumed,
                    });
                } else {
                    fresh.push(asset.id);
                }
            }

            let lookups: Vec<(String, Result<CatalogAsset>)> = stream::iter(fresh)
                .map(|id| async move {
                    let lookup = self.api.asset(&id).await;
                    (id, lookup)
                })
                .buffered(self.candidate_concurrency)
                .collect()
                .await;

            let mut lookups = lookups.into_iter();
            while let Some((id, lookup)) = lookups.next() {
                match self.resolve_candidate(&id, Some(lookup)).await {
                    Ok(resource) => {
                        self.mark_consumed(&id);
                        self.held.lock().insert(id.clone(), resource.clone());
                        candidates.push(CandidateReport {
                            catalog_id: id,
                            page,
                            outcome: CandidateOutcome::Resolved(resource.source),
                        });
                        candidates.extend(lookups.map(|(catalog_id, _)| CandidateReport {
                            catalog_id,
                            page,
                            outcome: CandidateOutcome::NotAttempted,
                        }));
                        return Ok(CandidateSearch {
                            resource,
                            candidates,
                        });
                    }
                    Err(e) => {
                        debug!(catalog_id = %id, error = %e, "Candidate unusable");
                        candidates.push(CandidateReport {
                            catalog_id: id,
                            page,
                            outcome: CandidateOutcome::Failed(e.diagnostic()),
                        });
                    }
                }
            }
        }

        Err(Error::NoUsableResource(format!(
            "no usable candidate for '{phrase}' among {} examined",
            candidates.len()
        )))
    }
}

fn resource(
    catalog_id: &str,
    url: String,
    source: AcquisitionSource,
    asset: Option<&CatalogAsset>,
) -> ResolvedResource {
    ResolvedResource {
        catalog_id: catalog_id.to_string(),
        url,
        source,
        asset_type: asset.and_then(|a| a.media_type),
        metadata: asset.map(CatalogAsset::metadata).unwrap_or_default(),
    }
}

#[async_trait]
impl AssetAcquirer for CatalogResolver {
    async fn resolve(&self, catalog_id: &str) -> Result<ResolvedResource> {
        CatalogResolver::resolve(self, catalog_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::types::{CatalogPage, PreviewRepresentation};
    use assert_matches::assert_matches;
    use cf_core::AssetType;
    use serde_json::Map;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeCatalog {
        licensed: HashMap<String, String>,
        previews: HashMap<String, Vec<PreviewRepresentation>>,
        pages: Vec<Vec<&'static str>>,
        license_calls: AtomicUsize,
        search_calls: AtomicUsize,
    }

    impl FakeCatalog {
        fn preview(mut self, id: &str, uri: &str) -> Self {
            self.previews.entry(id.into()).or_default().push(PreviewRepresentation {
                name: "comp".into(),
                uri: uri.into(),
                format: None,
            });
            self
        }

        fn licensed(mut self, id: &str, uri: &str) -> Self {
            self.licensed.insert(id.into(), uri.into());
            self
        }
    }

    #[async_trait]
    impl CatalogApi for FakeCatalog {
        async fn license(&self, catalog_id: &str) -> Result<String> {
            self.license_calls.fetch_add(1, Ordering::SeqCst);
            self.licensed
                .get(catalog_id)
                .cloned()
                .ok_or_else(|| Error::licensing(catalog_id, "no entitlement"))
        }

        async fn asset(&self, catalog_id: &str) -> Result<CatalogAsset> {
            Ok(CatalogAsset {
                id: catalog_id.into(),
                title: Some(format!("Asset {catalog_id}")),
                asset_family: None,
                display_sizes: self.previews.get(catalog_id).cloned().unwrap_or_default(),
                media_type: Some(AssetType::Video),
                extra: Map::new(),
            })
        }

        async fn search(&self, _phrase: &str, page: u32) -> Result<CatalogPage> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            let ids = self.pages.get(page as usize - 1).cloned().unwrap_or_default();
            let mut assets = Vec::new();
            for id in ids {
                assets.push(self.asset(id).await?);
            }
            Ok(CatalogPage {
                page,
                result_count: None,
                assets,
            })
        }
    }

    fn resolver(api: Arc<FakeCatalog>) -> CatalogResolver {
        CatalogResolver::new(api, &CatalogConfig::default())
    }

    #[tokio::test]
    async fn licensed_acquisition_preferred() {
        let api = Arc::new(
            FakeCatalog::default()
                .licensed("X1", "https://dl.test/X1.mp4")
                .preview("X1", "https://cdn.test/X1.mp4"),
        );
        let resource = resolver(api).resolve("X1").await.unwrap();
        assert_eq!(resource.source, AcquisitionSource::Licensed);
        assert_eq!(resource.url, "https://dl.test/X1.mp4");
        assert_eq!(resource.metadata["title"], "Asset X1");
    }

    #[tokio::test]
    async fn refusal_falls_back_to_preview_and_is_remembered() {
        let api = Arc::new(FakeCatalog::default().preview("X1", "https://cdn.test/X1.mp4"));
        let resolver = resolver(api.clone());

        let first = resolver.resolve("X1").await.unwrap();
        assert_eq!(first.source, AcquisitionSource::Preview);
        assert_eq!(first.url, "https://cdn.test/X1.mp4");

        let second = resolver.resolve("X1").await.unwrap();
        assert_eq!(second.source, AcquisitionSource::Preview);
        assert_eq!(api.license_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refusal_without_preview_is_no_usable_resource() {
        let api = Arc::new(FakeCatalog::default().preview("X123", "https://cdn.test/X123.jpg"));
        let err = resolver(api).resolve("X123").await.unwrap_err();
        assert_matches!(err, Error::NoUsableResource(msg) => {
            assert!(msg.contains("X123"));
        });
    }

    #[tokio::test]
    async fn search_skips_consumed_and_walks_pages_in_order() {
        let mut catalog = FakeCatalog::default()
            .preview("B", "https://cdn.test/B.mp4")
            .preview("C", "https://cdn.test/C.mp4");
        catalog.pages = vec![vec!["A"], vec!["B", "C"]];
        let resolver = resolver(Arc::new(catalog));

        let found = resolver.search_candidate("harbour").await.unwrap();
        assert_eq!(found.resource.catalog_id, "B");
        assert_eq!(found.candidates[0].catalog_id, "A");
        assert_matches!(found.candidates[0].outcome, CandidateOutcome::Failed(_));
        assert!(resolver.is_consumed("B"));

        let next = resolver.search_candidate("harbour").await.unwrap();
        assert_eq!(next.resource.catalog_id, "C");
        assert!(next
            .candidates
            .iter()
            .any(|c| c.catalog_id == "B" && c.outcome == CandidateOutcome::SkippedConsumed));
    }

    #[tokio::test]
    async fn search_licenses_only_the_selected_candidate() {
        let mut catalog = FakeCatalog::default()
            .licensed("A", "https://dl.test/A.mp4")
            .licensed("B", "https://dl.test/B.mp4")
            .licensed("C", "https://dl.test/C.mp4");
        catalog.pages = vec![vec!["A", "B", "C"]];
        let api = Arc::new(catalog);
        let resolver = resolver(api.clone());

        let found = resolver.search_candidate("harbour").await.unwrap();
        assert_eq!(found.resource.catalog_id, "A");
        let outcomes: Vec<_> = found
            .candidates
            .iter()
            .map(|c| (c.catalog_id.as_str(), c.outcome.clone()))
            .collect();
        assert_eq!(
            outcomes,
            vec![
                ("A", CandidateOutcome::Resolved(AcquisitionSource::Licensed)),
                ("B", CandidateOutcome::NotAttempted),
                ("C", CandidateOutcome::NotAttempted),
            ]
        );
        assert_eq!(api.license_calls.load(Ordering::SeqCst), 1);
        assert!(!resolver.is_consumed("B"));
        assert!(!resolver.is_consumed("C"));
    }

    #[tokio::test]
    async fn search_winner_is_not_licensed_twice() {
        let mut catalog = FakeCatalog::default().licensed("A", "https://dl.test/A.mp4");
        catalog.pages = vec![vec!["A"]];
        let api = Arc::new(catalog);
        let resolver = resolver(api.clone());

        let found = resolver.search_candidate("harbour").await.unwrap();
        let again = resolver.resolve("A").await.unwrap();
        assert_eq!(again, found.resource);
        assert_eq!(api.license_calls.load(Ordering::SeqCst), 1);

        // The held grant is handed out once.
        resolver.resolve("A").await.unwrap();
        assert_eq!(api.license_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausted_search_is_no_usable_resource() {
        let mut catalog = FakeCatalog::default();
        catalog.pages = vec![vec!["A"], vec!["B"]];
        let api = Arc::new(catalog);
        let resolver = resolver(api.clone());

        let err = resolver.search_candidate("harbour").await.unwrap_err();
        assert_matches!(err, Error::NoUsableResource(_));
        // Two pages with results, then an empty page ends the walk.
        assert_eq!(api.search_calls.load(Ordering::SeqCst), 3);
    }
}
