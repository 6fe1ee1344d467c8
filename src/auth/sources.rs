//! Concrete [`TokenSource`] implementations.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use cf_core::{Error, Result};
use serde::Deserialize;
use serde_json::Value;

use super::{AccessToken, TokenSource, DEFAULT_TOKEN_LIFETIME};
use crate::http;

const METADATA_TIMEOUT: Duration = Duration::from_secs(5);
const OAUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Response shape shared by the metadata token endpoint and OAuth servers.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

async fn check(name: &str, resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = http::body_text(resp).await;
    Err(Error::Auth(format!("{name} returned {status}: {body}")))
}

fn auth_transport(name: &str, err: reqwest::Error) -> Error {
    Error::Auth(http::transport(name, err).to_string())
}

// ---------------------------------------------------------------------------
// Static
// ---------------------------------------------------------------------------

/// A fixed token from configuration; never expires.
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(&self) -> Result<AccessToken> {
        if self.token.is_empty() {
            return Err(Error::Auth("static token is empty".into()));
        }
        Ok(AccessToken::new(self.token.clone(), None))
    }
}

// ---------------------------------------------------------------------------
// Metadata server
// ---------------------------------------------------------------------------

/// Identity tokens from the instance metadata server.
///
/// The token is a JWT; its lifetime is read from the `exp` claim.
pub struct MetadataIdentity {
    client: reqwest::Client,
    url: String,
    audience: Option<String>,
}

impl MetadataIdentity {
    pub fn new(url: &str, audience: Option<String>) -> Result<Self> {
        Ok(Self {
            client: http::build_client(METADATA_TIMEOUT)?,
            url: url.to_string(),
            audience,
        })
    }
}

#[async_trait]
impl TokenSource for MetadataIdentity {
    fn name(&self) -> &str {
        "metadata-identity"
    }

    async fn fetch(&self) -> Result<AccessToken> {
        let mut request = self
            .client
            .get(&self.url)
            .header("Metadata-Flavor", "Google")
            .query(&[("format", "full")]);
        if let Some(audience) = &self.audience {
            request = request.query(&[("audience", audience.as_str())]);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| auth_transport(self.name(), e))?;
        let jwt = check(self.name(), resp)
            .await?
            .text()
            .await
            .map_err(|e| auth_transport(self.name(), e))?;
        let jwt = jwt.trim();
        if jwt.is_empty() {
            return Err(Error::Auth("metadata server returned an empty identity token".into()));
        }

        let lifetime = jwt_lifetime(jwt, chrono::Utc::now().timestamp()).unwrap_or_else(|| {
            tracing::debug!("Identity token has no readable exp claim; assuming one hour");
            DEFAULT_TOKEN_LIFETIME
        });
        Ok(AccessToken::new(jwt, Some(lifetime)))
    }
}

/// Remaining lifetime of a JWT relative to `now` (unix seconds).
fn jwt_lifetime(jwt: &str, now: i64) -> Option<Duration> {
    let claims = jwt.split('.').nth(1)?;
    let decoded = URL_SAFE_NO_PAD.decode(claims.trim_end_matches('=')).ok()?;
    let claims: Value = serde_json::from_slice(&decoded).ok()?;
    let exp = claims.get("exp")?.as_i64()?;
    Some(Duration::from_secs(exp.saturating_sub(now).max(0) as u64))
}

/// OAuth access tokens from the instance metadata server (storage listing).
pub struct MetadataAccessToken {
    client: reqwest::Client,
    url: String,
}

impl MetadataAccessToken {
    pub fn new(url: &str) -> Result<Self> {
        Ok(Self {
            client: http::build_client(METADATA_TIMEOUT)?,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl TokenSource for MetadataAccessToken {
    fn name(&self) -> &str {
        "metadata-access-token"
    }

    async fn fetch(&self) -> Result<AccessToken> {
        let resp = self
            .client
            .get(&self.url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| auth_transport(self.name(), e))?;
        let token: TokenResponse = check(self.name(), resp)
            .await?
            .json()
            .await
            .map_err(|e| Error::Auth(format!("{}: malformed token response: {e}", self.name())))?;
        let lifetime = token
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TOKEN_LIFETIME);
        Ok(AccessToken::new(token.access_token, Some(lifetime)))
    }
}

// ---------------------------------------------------------------------------
// OAuth client credentials
// ---------------------------------------------------------------------------

/// OAuth2 client-credentials grant (catalog API).
pub struct ClientCredentials {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl ClientCredentials {
    pub fn new(token_url: &str, client_id: &str, client_secret: &str) -> Result<Self> {
        Ok(Self {
            client: http::build_client(OAUTH_TIMEOUT)?,
            token_url: token_url.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        })
    }
}

#[async_trait]
impl TokenSource for ClientCredentials {
    fn name(&self) -> &str {
        "client-credentials"
    }

    async fn fetch(&self) -> Result<AccessToken> {
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        let resp = self
            .client
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| auth_transport(self.name(), e))?;
        let token: TokenResponse = check(self.name(), resp)
            .await?
            .json()
            .await
            .map_err(|e| Error::Auth(format!("{}: malformed token response: {e}", self.name())))?;
        let lifetime = token
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TOKEN_LIFETIME);
        Ok(AccessToken::new(token.access_token, Some(lifetime)))
    }
}
