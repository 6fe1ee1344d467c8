//! HTTP client for the licensing catalog.
//!
//! Features:
//! - Token-bucket rate limiting via [`governor`].
//! - `Api-Key` header on every request; an OAuth bearer token on top when a
//!   client secret is configured.
//! - Bounded retry of transport errors, transient statuses, and credential
//!   rejections (the cached token is dropped before the next attempt).
//! - A refused licensed download (402/403) is reported as
//!   [`Error::LicensingUnavailable`] and never retried.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cf_core::config::CatalogConfig;
use cf_core::{Error, Result};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Method, StatusCode};
use tracing::debug;

use super::types::{AssetListing, CatalogAsset, CatalogPage, DownloadGrant};
use crate::auth::{ClientCredentials, CredentialCache};
use crate::http;
use crate::retry::RetryPolicy;

const SERVICE: &str = "catalog";

/// Operations the resolver needs from a catalog.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// Request a licensed download URL for `catalog_id`.
    ///
    /// A deterministic refusal is [`Error::LicensingUnavailable`].
    async fn license(&self, catalog_id: &str) -> Result<String>;

    /// Fetch the asset's metadata and preview representations.
    async fn asset(&self, catalog_id: &str) -> Result<CatalogAsset>;

    /// One page (1-based) of phrase search results.
    async fn search(&self, phrase: &str, page: u32) -> Result<CatalogPage>;
}

/// [`CatalogApi`] over the catalog's REST interface.
pub struct HttpCatalog {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    page_size: u32,
    credentials: Option<Arc<CredentialCache>>,
    retry: RetryPolicy,
    rate_limiter: DefaultDirectRateLimiter,
}

impl HttpCatalog {
    pub fn from_config(config: &CatalogConfig, retry: RetryPolicy) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::Config("catalog.api_key is not set".into()))?;
        let per_second = NonZeroU32::new(config.requests_per_second)
            .ok_or_else(|| Error::Config("catalog.requests_per_second must be > 0".into()))?;

        let credentials = match &config.client_secret {
            Some(secret) if !secret.is_empty() => {
                let source = ClientCredentials::new(&config.token_endpoint(), &api_key, secret)?;
                Some(Arc::new(CredentialCache::new(
                    Arc::new(source),
                    Duration::from_secs(60),
                    retry.clone(),
                )))
            }
            _ => None,
        };

        Ok(Self {
            client: http::build_client(Duration::from_secs(config.timeout_secs))?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            page_size: config.page_size.max(1),
            credentials,
            retry,
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }

    /// One rate-limited request; any status is returned to the caller.
    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<reqwest::Response> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{path}", self.base_url);
        let mut request = self
            .client
            .request(method, &url)
            .header("Api-Key", &self.api_key)
            .header("Accept", "application/json")
            .query(query);
        if let Some(credentials) = &self.credentials {
            request = request.bearer_auth(credentials.token().await?);
        }

        debug!(%url, "Catalog request");
        let resp = request
            .send()
            .await
            .map_err(|e| http::transport(SERVICE, e))?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            if let Some(credentials) = &self.credentials {
                credentials.invalidate();
            }
            let body = http::body_text(resp).await;
            return Err(Error::Auth(format!("catalog rejected credentials: {body}")));
        }
        Ok(resp)
    }

    /// Map a non-success response onto [`Error::Upstream`].
    async fn expect_success(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = http::body_text(resp).await;
        Err(Error::upstream(SERVICE, status.as_u16(), body))
    }

    async fn listing(resp: reqwest::Response) -> Result<AssetListing> {
        Self::expect_success(resp)
            .await?
            .json()
            .await
            .map_err(|e| Error::upstream(SERVICE, 200, format!("malformed listing: {e}")))
    }

    /// Retry transient failures and credential rejections.
    async fn with_retry<T, F, Fut>(&self, label: &str, op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        self.retry
            .run_with(label, op, |e| {
                self.retry.is_retryable(e) || matches!(e, Error::Auth(_))
            })
            .await
    }
}

impl std::fmt::Debug for HttpCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCatalog")
            .field("base_url", &self.base_url)
            .field("page_size", &self.page_size)
            .field("oauth", &self.credentials.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CatalogApi for HttpCatalog {
    async fn license(&self, catalog_id: &str) -> Result<String> {
        let path = format!("/v3/downloads/videos/{catalog_id}");
        self.with_retry("catalog license", |_| async {
            let resp = self
                .send(Method::POST, &path, &[("auto_download", "false".to_string())])
                .await?;
            let status = resp.status();
            if status == StatusCode::PAYMENT_REQUIRED || status == StatusCode::FORBIDDEN {
                let reason = http::body_text(resp).await;
                return Err(Error::licensing(catalog_id, reason));
            }
            let grant: DownloadGrant = Self::expect_success(resp)
                .await?
                .json()
                .await
                .map_err(|e| Error::upstream(SERVICE, status.as_u16(), format!("malformed download grant: {e}")))?;
            Ok(grant.uri)
        })
        .await
    }

    async fn asset(&self, catalog_id: &str) -> Result<CatalogAsset> {
        let path = format!("/v3/videos/{catalog_id}");
        let listing = self
            .with_retry("catalog asset", |_| async {
                let resp = self
                    .send(
                        Method::GET,
                        &path,
                        &[("fields", "detail_set,display_set".to_string())],
                    )
                    .await?;
                Self::listing(resp).await
            })
            .await?;

        listing
            .into_assets()
            .into_iter()
            .next()
            .ok_or_else(|| Error::NoUsableResource(format!("{catalog_id}: not found in catalog")))
    }

    async fn search(&self, phrase: &str, page: u32) -> Result<CatalogPage> {
        let query = [
            ("phrase", phrase.to_string()),
            ("page", page.to_string()),
            ("page_size", self.page_size.to_string()),
            ("fields", "detail_set,display_set".to_string()),
        ];
        let listing = self
            .with_retry("catalog search", |_| async {
                let resp = self.send(Method::GET, "/v3/search/videos", &query).await?;
                Self::listing(resp).await
            })
            .await?;

        Ok(CatalogPage {
            page,
            result_count: listing.result_count,
            assets: listing.into_assets(),
        })
    }
}
