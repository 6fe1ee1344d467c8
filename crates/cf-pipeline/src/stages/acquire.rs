//! Acquisition stage.

use async_trait::async_trait;
use cf_core::{AcquisitionSource, Error, Locator, Result};
use serde_json::{Map, Value};

use crate::context::RunContext;
use crate::record::{AccumulatedRecord, Acquisition};
use crate::stage::{Stage, StageName, StageOutput};

/// Turn the descriptor's locator into a retrievable reference.
///
/// Catalog identifiers go through the run's acquirer (licensed first, preview
/// fallback); every other locator is already retrievable.
#[derive(Debug, Default)]
pub struct AcquireStage;

#[async_trait]
impl Stage for AcquireStage {
    fn name(&self) -> StageName {
        StageName::Acquire
    }

    async fn execute(&self, record: &AccumulatedRecord, ctx: &RunContext) -> Result<StageOutput> {
        let (acquisition, provenance) = match &record.descriptor.locator {
            Locator::Catalog { catalog_id } => {
                let acquirer = ctx.acquirer.as_ref().ok_or_else(|| {
                    Error::Config("catalog request received but no catalog is configured".into())
                })?;
                let resolved = acquirer.resolve(catalog_id).await?;
                tracing::info!(
                    catalog_id = %resolved.catalog_id,
                    source = %resolved.source,
                    "Catalog asset resolved"
                );
                let mut provenance = Map::new();
                if !resolved.metadata.is_empty() {
                    provenance.insert("catalog_metadata".into(), Value::Object(resolved.metadata));
                }
                let acquisition = Acquisition {
                    source: resolved.source,
                    url: Some(resolved.url),
                    catalog_id: Some(resolved.catalog_id),
                    media_type: resolved.asset_type,
                };
                (acquisition, provenance)
            }
            Locator::ObjectStore { bucket, path } => {
                let url = match bucket {
                    Some(bucket) => format!("gs://{bucket}/{path}"),
                    None => path.clone(),
                };
                let acquisition = Acquisition {
                    source: AcquisitionSource::ObjectStore,
                    url: Some(url),
                    catalog_id: None,
                    media_type: None,
                };
                (acquisition, Map::new())
            }
            Locator::Url { url } => {
                let acquisition = Acquisition {
                    source: AcquisitionSource::ExternalUrl,
                    url: Some(url.clone()),
                    catalog_id: None,
                    media_type: None,
                };
                (acquisition, Map::new())
            }
            Locator::Inline { .. } => (Acquisition::inline(), Map::new()),
        };

        Ok(StageOutput::Acquired {
            acquisition,
            provenance,
        })
    }
}
