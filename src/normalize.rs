//! Input normalization: heterogeneous raw requests to an [`AssetDescriptor`].
//!
//! Accepted shapes:
//!
//! | Shape        | Fields                                                          |
//! |--------------|-----------------------------------------------------------------|
//! | catalog      | `catalog_id`                                                    |
//! | object-store | `locator` (+ `source`), or `bucket` with `file_name` / `name`   |
//! | inline       | `media_bytes` (base64) with optional `media_type`/`content_type` |
//! | external URL | `url`, or an `http(s)` `locator`                                |
//!
//! A `source` that is not a recognized kind (`"getty"`, `"newsflare"`) is kept
//! as an origin label in provenance and the kind is inferred from the fields.

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use cf_core::{AssetDescriptor, AssetType, Error, Locator, Result, SourceKind};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// A request as received, before any interpretation.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct RawRequest {
    #[serde(deserialize_with = "string_or_number")]
    pub catalog_id: Option<String>,
    pub source: Option<String>,
    pub locator: Option<String>,
    pub bucket: Option<String>,
    pub file_name: Option<String>,
    /// Object name, as carried by storage upload events.
    pub name: Option<String>,
    pub media_bytes: Option<String>,
    pub media_type: Option<String>,
    #[serde(alias = "contentType")]
    pub content_type: Option<String>,
    pub asset_type: Option<String>,
    pub asset_id: Option<String>,
    pub url: Option<String>,
    #[serde(alias = "getty_metadata", alias = "catalog_metadata")]
    pub metadata: Option<Map<String, Value>>,
    /// Storage events carry the size as a decimal string.
    #[serde(alias = "size", deserialize_with = "u64_or_string")]
    pub size_bytes: Option<u64>,
}

/// Normalize a JSON request.
pub fn normalize_value(value: &Value) -> Result<AssetDescriptor> {
    if !value.is_object() {
        return Err(Error::invalid("request must be a JSON object"));
    }
    let raw: RawRequest = serde_json::from_value(value.clone())
        .map_err(|e| Error::invalid(format!("malformed request: {e}")))?;
    normalize(raw)
}

/// Derive the canonical descriptor for one request.
///
/// Deterministic: the same request always yields the same `asset_id`.
pub fn normalize(raw: RawRequest) -> Result<AssetDescriptor> {
    let declared = raw
        .source
        .as_deref()
        .and_then(|s| s.parse::<SourceKind>().ok());
    let source = match declared {
        Some(kind) => kind,
        None => infer_kind(&raw)?,
    };

    let (locator, file_name) = match source {
        SourceKind::Catalog => {
            let catalog_id = non_empty(&raw.catalog_id)
                .ok_or_else(|| Error::invalid("catalog source requires catalog_id"))?;
            (
                Locator::Catalog {
                    catalog_id: catalog_id.to_string(),
                },
                None,
            )
        }
        SourceKind::ObjectStore => {
            let (bucket, path) = object_path(&raw)?;
            let file = last_segment(&path).to_string();
            (Locator::ObjectStore { bucket, path }, Some(file))
        }
        SourceKind::InlinePayload => {
            let encoded = non_empty(&raw.media_bytes)
                .ok_or_else(|| Error::invalid("inline payload requires media_bytes"))?;
            let bytes = decode_bytes(encoded)?;
            let content_type = non_empty(&raw.content_type)
                .or_else(|| non_empty(&raw.media_type).filter(|m| m.contains('/')))
                .map(str::to_string);
            let file = non_empty(&raw.file_name)
                .or_else(|| non_empty(&raw.name))
                .map(str::to_string);
            (Locator::Inline { bytes, content_type }, file)
        }
        SourceKind::ExternalUrl => {
            let url = non_empty(&raw.url)
                .or_else(|| non_empty(&raw.locator))
                .ok_or_else(|| Error::invalid("external-url source requires url"))?;
            if !is_http(url) {
                return Err(Error::invalid(format!("'{url}' is not an http(s) URL")));
            }
            let path = url.split(['?', '#']).next().unwrap_or_default();
            let after_host = path.splitn(4, '/').nth(3).unwrap_or_default();
            let file = Some(last_segment(after_host).to_string()).filter(|f| !f.is_empty());
            (Locator::Url { url: url.to_string() }, file)
        }
    };

    let asset_type = asset_type(&raw, file_name.as_deref())?;
    let asset_id = asset_id(&raw, &locator, file_name.as_deref());

    let mut provenance = Map::new();
    if declared.is_none() {
        if let Some(label) = non_empty(&raw.source) {
            provenance.insert("source_label".into(), Value::String(label.to_string()));
        }
    }
    if let Some(metadata) = raw.metadata.filter(|m| !m.is_empty()) {
        provenance.insert("metadata".into(), Value::Object(metadata));
    }
    if let Some(size) = raw.size_bytes {
        provenance.insert("size_bytes".into(), Value::from(size));
    }
    if let Some(media_type) = non_empty(&raw.media_type) {
        provenance.insert("media_type".into(), Value::String(media_type.to_string()));
    }
    if !matches!(locator, Locator::Inline { .. }) {
        if let Some(content_type) = non_empty(&raw.content_type) {
            provenance.insert("content_type".into(), Value::String(content_type.to_string()));
        }
    }

    Ok(AssetDescriptor {
        asset_id,
        source,
        asset_type,
        locator,
        provenance,
    })
}

fn infer_kind(raw: &RawRequest) -> Result<SourceKind> {
    if non_empty(&raw.catalog_id).is_some() {
        return Ok(SourceKind::Catalog);
    }
    if non_empty(&raw.media_bytes).is_some() {
        return Ok(SourceKind::InlinePayload);
    }
    if non_empty(&raw.url).is_some() {
        return Ok(SourceKind::ExternalUrl);
    }
    if let Some(locator) = non_empty(&raw.locator) {
        return Ok(if is_http(locator) {
            SourceKind::ExternalUrl
        } else {
            SourceKind::ObjectStore
        });
    }
    if non_empty(&raw.bucket).is_some()
        && (non_empty(&raw.file_name).is_some() || non_empty(&raw.name).is_some())
    {
        return Ok(SourceKind::ObjectStore);
    }
    Err(Error::invalid(
        "request matches no known shape (expected catalog_id, locator, bucket with name, media_bytes, or url)",
    ))
}

/// Bucket and object path; `gs://bucket/path` locators carry both.
fn object_path(raw: &RawRequest) -> Result<(Option<String>, String)> {
    let explicit_bucket = non_empty(&raw.bucket).map(str::to_string);
    let located = non_empty(&raw.locator)
        .or_else(|| non_empty(&raw.file_name))
        .or_else(|| non_empty(&raw.name))
        .ok_or_else(|| Error::invalid("object-store source requires locator or bucket with name"))?;

    let (bucket, path) = match located.strip_prefix("gs://") {
        Some(rest) => {
            let (bucket, path) = rest
                .split_once('/')
                .ok_or_else(|| Error::invalid(format!("'{located}' has no object path")))?;
            (explicit_bucket.or_else(|| Some(bucket.to_string())), path)
        }
        None => (explicit_bucket, located),
    };

    let path = path.trim_start_matches('/');
    if path.is_empty() || path.ends_with('/') {
        return Err(Error::invalid(format!("'{located}' does not name an object")));
    }
    Ok((bucket, path.to_string()))
}

fn asset_type(raw: &RawRequest, file_name: Option<&str>) -> Result<AssetType> {
    if let Some(explicit) = non_empty(&raw.asset_type) {
        return explicit.parse();
    }
    if let Some(t) = file_name.and_then(extension).and_then(AssetType::from_extension) {
        return Ok(t);
    }
    if let Some(media_type) = non_empty(&raw.media_type) {
        if let Some(t) = media_type
            .parse::<AssetType>()
            .ok()
            .filter(AssetType::is_known)
            .or_else(|| AssetType::from_mime(media_type))
        {
            return Ok(t);
        }
    }
    Ok(non_empty(&raw.content_type)
        .and_then(AssetType::from_mime)
        .unwrap_or_default())
}

fn asset_id(raw: &RawRequest, locator: &Locator, file_name: Option<&str>) -> String {
    if let Some(id) = non_empty(&raw.asset_id).map(sanitize).filter(|s| !s.is_empty()) {
        return id;
    }
    let derived = match locator {
        Locator::Catalog { catalog_id } => sanitize(catalog_id),
        _ => file_name.map(stem).map(sanitize).unwrap_or_default(),
    };
    if !derived.is_empty() {
        return derived;
    }
    match locator {
        Locator::Inline { bytes, .. } => format!("inline-{}", short_digest(bytes)),
        Locator::Url { url } => format!("url-{}", short_digest(url.as_bytes())),
        other => format!("asset-{}", short_digest(other.display_ref().as_bytes())),
    }
}

fn decode_bytes(encoded: &str) -> Result<Vec<u8>> {
    let trimmed = encoded.trim();
    STANDARD
        .decode(trimmed)
        .or_else(|_| URL_SAFE.decode(trimmed))
        .map_err(|e| Error::invalid(format!("media_bytes is not valid base64: {e}")))
}

fn short_digest(bytes: &[u8]) -> String {
    let digest = hex::encode(Sha256::digest(bytes));
    digest[..16].to_string()
}

/// Keep `[A-Za-z0-9._-]`, replace everything else with `-`.
fn sanitize(s: &str) -> String {
    let mapped: String = s
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();
    mapped.trim_matches(|c| c == '-' || c == '.').to_string()
}

fn last_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn stem(file: &str) -> &str {
    match file.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file,
    }
}

fn extension(file: &str) -> Option<&str> {
    file.rsplit_once('.').map(|(_, ext)| ext).filter(|e| !e.is_empty())
}

fn is_http(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        None | Some(Value::Null) => None,
        Some(other) => {
            return Err(serde::de::Error::custom(format!(
                "expected a string or number, got {other}"
            )))
        }
    })
}

fn u64_or_string<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<u64>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn object_store_locator_infers_video() {
        let d = normalize_value(&json!({"source": "object-store", "locator": "raw/clip1.mp4"}))
            .unwrap();
        assert_eq!(d.asset_id, "clip1");
        assert_eq!(d.source, SourceKind::ObjectStore);
        assert_eq!(d.asset_type, AssetType::Video);
        assert_eq!(
            d.locator,
            Locator::ObjectStore {
                bucket: None,
                path: "raw/clip1.mp4".into()
            }
        );
        assert!(d.provenance.is_empty());
    }

    #[test]
    fn gs_uri_carries_bucket() {
        let d = normalize_value(&json!({"locator": "gs://media-raw/in/harbour.MOV"})).unwrap();
        assert_eq!(d.asset_id, "harbour");
        assert_eq!(d.asset_type, AssetType::Video);
        assert_matches!(d.locator, Locator::ObjectStore { bucket: Some(b), path } => {
            assert_eq!(b, "media-raw");
            assert_eq!(path, "in/harbour.MOV");
        });
    }

    #[test]
    fn storage_event_shape() {
        let d = normalize_value(&json!({
            "bucket": "uploads",
            "name": "2024/interview take 2.wav",
            "size": "48000",
            "contentType": "audio/wav"
        }))
        .unwrap();
        assert_eq!(d.source, SourceKind::ObjectStore);
        assert_eq!(d.asset_type, AssetType::Audio);
        assert_eq!(d.asset_id, "interview-take-2");
        assert_eq!(d.size_bytes(), Some(48_000));
    }

    #[test]
    fn catalog_id_without_type_is_unknown() {
        let d = normalize_value(&json!({"catalog_id": "X123"})).unwrap();
        assert_eq!(d.source, SourceKind::Catalog);
        assert_eq!(d.asset_id, "X123");
        assert_eq!(d.asset_type, AssetType::Unknown);
    }

    #[test]
    fn numeric_catalog_id_is_accepted() {
        let d = normalize_value(&json!({"catalog_id": 1_234_567, "asset_type": "video"})).unwrap();
        assert_eq!(d.asset_id, "1234567");
        assert_eq!(d.asset_type, AssetType::Video);
    }

    #[test]
    fn inline_payload_with_origin_label() {
        let d = normalize_value(&json!({
            "source": "getty",
            "media_type": "video",
            "media_bytes": STANDARD.encode(b"not really an mp4"),
            "getty_metadata": {"title": "Harbour at dawn"}
        }))
        .unwrap();
        assert_eq!(d.source, SourceKind::InlinePayload);
        assert_eq!(d.asset_type, AssetType::Video);
        assert!(d.asset_id.starts_with("inline-"));
        assert_eq!(d.provenance["source_label"], "getty");
        assert_eq!(d.provenance["metadata"]["title"], "Harbour at dawn");
        assert_eq!(d.size_bytes(), Some(17));
    }

    #[test]
    fn inline_payload_accepts_url_safe_base64() {
        let encoded = URL_SAFE.encode([0xfb, 0xff, 0xfe]);
        let d = normalize_value(&json!({"media_bytes": encoded, "content_type": "image/png"}))
            .unwrap();
        assert_eq!(d.asset_type, AssetType::Image);
        assert_matches!(d.locator, Locator::Inline { bytes, content_type } => {
            assert_eq!(bytes, vec![0xfb, 0xff, 0xfe]);
            assert_eq!(content_type.as_deref(), Some("image/png"));
        });
    }

    #[test]
    fn invalid_base64_is_rejected() {
        let err = normalize_value(&json!({"media_bytes": "%%%"})).unwrap_err();
        assert_matches!(err, Error::InvalidInput(_));
    }

    #[test]
    fn url_id_is_stem_or_digest() {
        let d = normalize_value(&json!({"url": "https://cdn.test/v/clip9.webm?sig=abc"})).unwrap();
        assert_eq!(d.asset_id, "clip9");
        assert_eq!(d.asset_type, AssetType::Video);

        let a = normalize_value(&json!({"url": "https://cdn.test/"})).unwrap();
        let b = normalize_value(&json!({"url": "https://cdn.test/"})).unwrap();
        assert!(a.asset_id.starts_with("url-"));
        assert_eq!(a.asset_id, b.asset_id);
        assert_eq!(a.asset_type, AssetType::Unknown);
    }

    #[test]
    fn explicit_type_wins_over_extension() {
        let d = normalize_value(&json!({"locator": "raw/still.mp4", "asset_type": "image"}))
            .unwrap();
        assert_eq!(d.asset_type, AssetType::Image);
    }

    #[test]
    fn explicit_asset_id_is_sanitized() {
        let d = normalize_value(&json!({"locator": "raw/a.mp4", "asset_id": "job 42/a"})).unwrap();
        assert_eq!(d.asset_id, "job-42-a");
    }

    #[test]
    fn resubmission_yields_same_descriptor() {
        let request = json!({"bucket": "b", "file_name": "x/y/z.mp3"});
        assert_eq!(
            normalize_value(&request).unwrap(),
            normalize_value(&request).unwrap()
        );
    }

    #[test]
    fn unrecognized_shapes_are_invalid_input() {
        for request in [
            json!({}),
            json!({"title": "no locator"}),
            json!({"bucket": "only-bucket"}),
            json!({"source": "catalog"}),
            json!({"source": "url", "url": "ftp://host/file.mp4"}),
            json!({"locator": "raw/"}),
            json!(["not", "an", "object"]),
            json!({"asset_type": "hologram", "locator": "raw/a.mp4"}),
        ] {
            assert_matches!(normalize_value(&request), Err(Error::InvalidInput(_)), "{request}");
        }
    }
}
