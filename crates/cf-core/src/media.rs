//! Media-domain enums and the canonical asset descriptor.
//!
//! Enums serialize in lowercase (kebab-case for multi-word source kinds) and
//! implement `Display` manually for consistent string representation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// SourceKind
// ---------------------------------------------------------------------------

/// Where an asset came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// A remote licensing catalog, addressed by catalog identifier.
    Catalog,
    /// A path inside an object-store bucket.
    ObjectStore,
    /// Media bytes carried inline in the request.
    InlinePayload,
    /// A plain external URL.
    ExternalUrl,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Catalog => write!(f, "catalog"),
            Self::ObjectStore => write!(f, "object-store"),
            Self::InlinePayload => write!(f, "inline-payload"),
            Self::ExternalUrl => write!(f, "external-url"),
        }
    }
}

impl FromStr for SourceKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "catalog" => Ok(Self::Catalog),
            "object-store" | "objectstore" | "gcs" | "bucket" => Ok(Self::ObjectStore),
            "inline-payload" | "inline" => Ok(Self::InlinePayload),
            "external-url" | "url" => Ok(Self::ExternalUrl),
            other => Err(crate::Error::invalid(format!("unknown source kind '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// AssetType
// ---------------------------------------------------------------------------

/// Broad media family of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    Video,
    Image,
    Audio,
    #[default]
    Unknown,
}

impl AssetType {
    /// Classify by filename extension (case-insensitive, without the dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "mp4" | "mov" | "mkv" | "webm" | "avi" | "m4v" | "mxf" | "mpg" | "mpeg" | "ts" => {
                Some(Self::Video)
            }
            "jpg" | "jpeg" | "png" | "gif" | "webp" | "tif" | "tiff" | "bmp" | "heic" => {
                Some(Self::Image)
            }
            "mp3" | "wav" | "flac" | "aac" | "m4a" | "ogg" | "opus" => Some(Self::Audio),
            _ => None,
        }
    }

    /// Classify by MIME type (`video/mp4` → video).
    pub fn from_mime(mime: &str) -> Option<Self> {
        let family = mime.split('/').next()?.trim().to_ascii_lowercase();
        match family.as_str() {
            "video" => Some(Self::Video),
            "image" => Some(Self::Image),
            "audio" => Some(Self::Audio),
            _ => None,
        }
    }

    /// Whether this is a definite type (not [`AssetType::Unknown`]).
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Image => write!(f, "image"),
            Self::Audio => write!(f, "audio"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl FromStr for AssetType {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "video" | "film" | "footage" => Ok(Self::Video),
            "image" | "photo" | "photography" | "illustration" => Ok(Self::Image),
            "audio" | "sound" | "music" => Ok(Self::Audio),
            "unknown" => Ok(Self::Unknown),
            other => Err(crate::Error::invalid(format!("unknown asset type '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Locator
// ---------------------------------------------------------------------------

/// How the media itself can be reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Locator {
    /// Identifier in the remote catalog; resolved to a URL during acquisition.
    Catalog { catalog_id: String },
    /// Object path, optionally qualified by bucket.
    ObjectStore {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bucket: Option<String>,
        path: String,
    },
    /// Media bytes carried in the request.
    Inline {
        #[serde(rename = "media_bytes", with = "base64_bytes")]
        bytes: Vec<u8>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content_type: Option<String>,
    },
    /// Directly retrievable URL.
    Url { url: String },
}

impl Locator {
    /// Human-readable reference for logs (never includes inline bytes).
    pub fn display_ref(&self) -> String {
        match self {
            Self::Catalog { catalog_id } => format!("catalog:{catalog_id}"),
            Self::ObjectStore {
                bucket: Some(bucket),
                path,
            } => format!("{bucket}/{path}"),
            Self::ObjectStore { bucket: None, path } => path.clone(),
            Self::Inline { bytes, .. } => format!("inline:{} bytes", bytes.len()),
            Self::Url { url } => url.clone(),
        }
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// AssetDescriptor
// ---------------------------------------------------------------------------

/// Canonical description of one asset, produced by input normalization.
///
/// `asset_id` and `asset_type` never change once derived; later stages add
/// to `provenance` only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetDescriptor {
    pub asset_id: String,
    pub source: SourceKind,
    pub asset_type: AssetType,
    pub locator: Locator,
    /// Opaque provenance bag (origin labels, upstream metadata, known size).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub provenance: Map<String, Value>,
}

impl AssetDescriptor {
    /// Known size of the media in bytes, if provenance carries one.
    pub fn size_bytes(&self) -> Option<u64> {
        if let Locator::Inline { bytes, .. } = &self.locator {
            return Some(bytes.len() as u64);
        }
        self.provenance.get("size_bytes").and_then(Value::as_u64)
    }
}

// ---------------------------------------------------------------------------
// Acquisition
// ---------------------------------------------------------------------------

/// How the media for a run was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionSource {
    /// Licensed catalog download.
    Licensed,
    /// Degraded catalog preview representation.
    Preview,
    ObjectStore,
    ExternalUrl,
    Inline,
}

impl fmt::Display for AcquisitionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Licensed => write!(f, "licensed"),
            Self::Preview => write!(f, "preview"),
            Self::ObjectStore => write!(f, "object_store"),
            Self::ExternalUrl => write!(f, "external_url"),
            Self::Inline => write!(f, "inline"),
        }
    }
}

/// A catalog identifier resolved to a retrievable media URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedResource {
    pub catalog_id: String,
    pub url: String,
    pub source: AcquisitionSource,
    /// Media family declared by the catalog, when it declares one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_type: Option<AssetType>,
    /// Catalog metadata for the asset, kept as provenance.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}
