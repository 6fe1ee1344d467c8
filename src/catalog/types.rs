//! Catalog wire types.

use cf_core::AssetType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One asset as described by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogAsset {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_family: Option<String>,
    /// Preview representations (the catalog's `display_sizes`).
    #[serde(default)]
    pub display_sizes: Vec<PreviewRepresentation>,
    /// Media family implied by the collection the asset was listed under.
    #[serde(skip)]
    pub media_type: Option<AssetType>,
    /// Every other field the catalog returned.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CatalogAsset {
    /// Metadata worth keeping as provenance: everything but preview URIs.
    pub fn metadata(&self) -> Map<String, Value> {
        let mut metadata = self.extra.clone();
        metadata.insert("id".into(), Value::String(self.id.clone()));
        if let Some(title) = &self.title {
            metadata.insert("title".into(), Value::String(title.clone()));
        }
        if let Some(family) = &self.asset_family {
            metadata.insert("asset_family".into(), Value::String(family.clone()));
        }
        metadata
    }

    /// First preview representation in `format`, if any.
    pub fn preview_in(&self, format: &str) -> Option<&PreviewRepresentation> {
        self.display_sizes.iter().find(|p| p.matches_format(format))
    }
}

/// A downloadable preview rendition of an asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewRepresentation {
    #[serde(default)]
    pub name: String,
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl PreviewRepresentation {
    /// Whether this rendition is in the container `format` (e.g. `mp4`).
    ///
    /// Checks the declared format, then the URI's extension (query string
    /// ignored), then the rendition name.
    pub fn matches_format(&self, format: &str) -> bool {
        if let Some(declared) = &self.format {
            return declared.eq_ignore_ascii_case(format);
        }
        let path = self.uri.split(['?', '#']).next().unwrap_or_default();
        let file = path.rsplit('/').next().unwrap_or_default();
        if let Some((_, ext)) = file.rsplit_once('.') {
            if ext.eq_ignore_ascii_case(format) {
                return true;
            }
        }
        self.name.to_ascii_lowercase().contains(&format.to_ascii_lowercase())
    }
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogPage {
    pub page: u32,
    pub result_count: Option<u64>,
    pub assets: Vec<CatalogAsset>,
}

/// Response body of video lookups and video searches.
///
/// Only the `/videos` endpoints are called, so only the `videos` collection
/// is read.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct AssetListing {
    #[serde(default)]
    pub result_count: Option<u64>,
    #[serde(default)]
    pub videos: Vec<CatalogAsset>,
}

impl AssetListing {
    /// Listed assets, tagged as video.
    pub fn into_assets(self) -> Vec<CatalogAsset> {
        self.videos
            .into_iter()
            .map(|mut asset| {
                asset.media_type = Some(AssetType::Video);
                asset
            })
            .collect()
    }
}

/// Response body of a licensed download request.
#[derive(Debug, Deserialize)]
pub(crate) struct DownloadGrant {
    pub uri: String,
}
