//! Credential cache shared by every outbound call.
//!
//! A [`CredentialCache`] owns at most one [`AccessToken`] from a single
//! [`TokenSource`]. Readers take the cached token while it is fresh; once it
//! is within `skew` of expiry the first caller refreshes it and every
//! concurrent caller waits for that one refresh instead of starting its own.
//! Callers that waited on a refresh which failed get that failure back.

mod sources;

pub use sources::{ClientCredentials, MetadataAccessToken, MetadataIdentity, StaticToken};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cf_core::config::{IdentityConfig, IdentityMode};
use cf_core::{Error, Result};
use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::retry::RetryPolicy;

/// Lifetime assumed when a source does not declare one.
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// A bearer credential with an optional expiry.
#[derive(Clone)]
pub struct AccessToken {
    secret: String,
    expires_at: Option<Instant>,
}

impl AccessToken {
    /// A token valid for `lifetime` from now; `None` never expires.
    pub fn new(secret: impl Into<String>, lifetime: Option<Duration>) -> Self {
        Self {
            secret: secret.into(),
            expires_at: lifetime.map(|l| Instant::now() + l),
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    /// Whether the token stays valid for at least `skew` more.
    pub fn is_fresh(&self, skew: Duration) -> bool {
        match self.expires_at {
            Some(at) => Instant::now() + skew < at,
            None => true,
        }
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Something that can mint a fresh [`AccessToken`].
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Acquire a new token. Failures are [`Error::Auth`].
    async fn fetch(&self) -> Result<AccessToken>;
}

/// Lazily refreshed, single-flight token cache.
pub struct CredentialCache {
    source: Arc<dyn TokenSource>,
    current: RwLock<Option<AccessToken>>,
    /// Single-flight guard holding the last refresh failure, if any.
    refresh: tokio::sync::Mutex<Option<String>>,
    /// Completed refresh attempts, successful or not.
    refreshes: AtomicU64,
    skew: Duration,
    retry: RetryPolicy,
}

impl CredentialCache {
    pub fn new(source: Arc<dyn TokenSource>, skew: Duration, retry: RetryPolicy) -> Self {
        Self {
            source,
            current: RwLock::new(None),
            refresh: tokio::sync::Mutex::new(None),
            refreshes: AtomicU64::new(0),
            skew,
            retry,
        }
    }

    /// Build the stage identity cache described by `[identity]`.
    pub fn for_identity(config: &IdentityConfig, retry: RetryPolicy) -> Result<Self> {
        let source: Arc<dyn TokenSource> = match config.mode {
            IdentityMode::Static => {
                let token = config.token.clone().ok_or_else(|| {
                    Error::Config("identity.mode is 'static' but identity.token is not set".into())
                })?;
                Arc::new(StaticToken::new(token))
            }
            IdentityMode::MetadataServer => Arc::new(MetadataIdentity::new(
                &config.metadata_url,
                config.audience.clone(),
            )?),
        };
        Ok(Self::new(
            source,
            Duration::from_secs(config.refresh_skew_secs),
            retry,
        ))
    }

    fn cached(&self) -> Option<String> {
        self.current
            .read()
            .as_ref()
            .filter(|t| t.is_fresh(self.skew))
            .map(|t| t.secret.clone())
    }

    /// Return a valid bearer secret, refreshing if needed.
    pub async fn token(&self) -> Result<String> {
        if let Some(secret) = self.cached() {
            return Ok(secret);
        }

        let observed = self.refreshes.load(Ordering::Acquire);
        let mut last_failure = self.refresh.lock().await;
        // Another caller may have refreshed while we waited.
        if let Some(secret) = self.cached() {
            return Ok(secret);
        }
        if self.refreshes.load(Ordering::Acquire) != observed {
            if let Some(reason) = last_failure.as_ref() {
                return Err(Error::Auth(reason.clone()));
            }
        }

        debug!(source = self.source.name(), "Refreshing credential");
        let result = self
            .retry
            .run_with(
                self.source.name(),
                |_| self.source.fetch(),
                |e| matches!(e, Error::Auth(_) | Error::Transport(_)),
            )
            .await;
        self.refreshes.fetch_add(1, Ordering::Release);
        let token = match result {
            Ok(token) => {
                *last_failure = None;
                token
            }
            Err(e) => {
                warn!(source = self.source.name(), error = %e, "Credential refresh failed");
                *last_failure = Some(format!("{} refresh failed: {e}", self.source.name()));
                return Err(e);
            }
        };
        info!(
            source = self.source.name(),
            expires_in_secs = ?token
                .expires_at
                .map(|at| at.saturating_duration_since(Instant::now()).as_secs()),
            "Credential refreshed"
        );

        let secret = token.secret.clone();
        *self.current.write() = Some(token);
        Ok(secret)
    }

    /// Drop the cached token so the next call refreshes.
    pub fn invalidate(&self) {
        *self.current.write() = None;
    }
}

impl std::fmt::Debug for CredentialCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCache")
            .field("source", &self.source.name())
            .field("skew", &self.skew)
            .finish_non_exhaustive()
    }
}
