//! Object listing for the batch runner.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cf_core::config::BatchConfig;
use cf_core::{Error, Result};
use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::auth::{CredentialCache, MetadataAccessToken, StaticToken, TokenSource};
use crate::http;
use crate::retry::RetryPolicy;

const SERVICE: &str = "object-store";

/// One object in a bucket listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoredObject {
    pub name: String,
    #[serde(default, deserialize_with = "size_string")]
    pub size: Option<u64>,
}

/// Lists objects under a prefix.
#[async_trait]
pub trait ObjectLister: Send + Sync {
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<StoredObject>>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListPage {
    #[serde(default)]
    items: Vec<StoredObject>,
    next_page_token: Option<String>,
}

/// [`ObjectLister`] over the storage JSON API.
pub struct GcsLister {
    client: reqwest::Client,
    base_url: String,
    credentials: Arc<CredentialCache>,
    retry: RetryPolicy,
}

impl GcsLister {
    pub fn new(base_url: &str, credentials: Arc<CredentialCache>, retry: RetryPolicy) -> Result<Self> {
        Ok(Self {
            client: http::build_client(Duration::from_secs(30))?,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            retry,
        })
    }

    /// Static token when configured, metadata-server access tokens otherwise.
    pub fn from_config(config: &BatchConfig, retry: RetryPolicy) -> Result<Self> {
        let source: Arc<dyn TokenSource> = match config.access_token.as_deref() {
            Some(token) if !token.is_empty() => Arc::new(StaticToken::new(token)),
            _ => Arc::new(MetadataAccessToken::new(&config.metadata_token_url)?),
        };
        let credentials = Arc::new(CredentialCache::new(
            source,
            Duration::from_secs(60),
            retry.clone(),
        ));
        Self::new(&config.storage_base_url, credentials, retry)
    }

    async fn page(&self, bucket: &str, prefix: &str, token: Option<&str>) -> Result<ListPage> {
        let bearer = self.credentials.token().await?;
        let mut query = vec![("prefix", prefix), ("fields", "items(name,size),nextPageToken")];
        if let Some(token) = token {
            query.push(("pageToken", token));
        }

        let resp = self
            .client
            .get(format!("{}/storage/v1/b/{bucket}/o", self.base_url))
            .bearer_auth(bearer)
            .query(&query)
            .send()
            .await
            .map_err(|e| http::transport(SERVICE, e))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.credentials.invalidate();
        }
        if !status.is_success() {
            let body = http::body_text(resp).await;
            return Err(Error::upstream(SERVICE, status.as_u16(), body));
        }
        resp.json()
            .await
            .map_err(|e| Error::upstream(SERVICE, status.as_u16(), format!("invalid listing: {e}")))
    }
}

#[async_trait]
impl ObjectLister for GcsLister {
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<StoredObject>> {
        let mut objects = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let page = self
                .retry
                .run_with(
                    SERVICE,
                    |_| self.page(bucket, prefix, token.as_deref()),
                    |e| self.retry.is_retryable(e) || e.status() == Some(401),
                )
                .await?;
            debug!(bucket, prefix, items = page.items.len(), "Listed page");
            objects.extend(page.items);

            match page.next_page_token {
                Some(next) if !next.is_empty() => token = Some(next),
                _ => break,
            }
        }
        Ok(objects)
    }
}

fn size_string<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<u64>, D::Error> {
    Ok(match Option::<serde_json::Value>::deserialize(d)? {
        Some(serde_json::Value::String(s)) => s.parse().ok(),
        Some(serde_json::Value::Number(n)) => n.as_u64(),
        _ => None,
    })
}
