//! Unified error type for the clipforge orchestrator.
//!
//! Every component funnels its failures into [`Error`]. The variants mirror the
//! failure taxonomy the executor reasons about: some are surfaced immediately,
//! some are retried, and one ([`Error::LicensingUnavailable`]) is an expected
//! branch that the resolver absorbs.

use std::fmt;

/// Unified error type covering all failure modes in clipforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request did not match any recognized input shape.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A credential could not be acquired or refreshed.
    #[error("Auth error: {0}")]
    Auth(String),

    /// The catalog deterministically refused a licensed download.
    #[error("Licensing unavailable for {catalog_id}: {reason}")]
    LicensingUnavailable {
        /// Catalog identifier that was refused.
        catalog_id: String,
        /// Reason reported by the catalog.
        reason: String,
    },

    /// Every acquisition candidate was exhausted.
    #[error("No usable resource: {0}")]
    NoUsableResource(String),

    /// A downstream stage failed (after retries, where applicable).
    #[error("Stage error [{stage}]{}: {body}", .status.map(|s| format!(" status {s}")).unwrap_or_default())]
    Stage {
        /// Name of the stage that failed.
        stage: String,
        /// HTTP status returned by the stage, if a response was received.
        status: Option<u16>,
        /// Response body or transport diagnostic.
        body: String,
    },

    /// A non-stage upstream service (catalog, object store) returned an error status.
    #[error("Upstream error [{service}] status {status}: {body}")]
    Upstream {
        /// Name of the upstream service.
        service: String,
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// A network-level failure (connect, reset, timeout).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Configuration is missing or invalid.
    #[error("Config error: {0}")]
    Config(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The run was cancelled between stages.
    #[error("Cancelled")]
    Cancelled,

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable code for this error class.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "invalid_input",
            Error::Auth(_) => "auth_error",
            Error::LicensingUnavailable { .. } => "licensing_unavailable",
            Error::NoUsableResource(_) => "no_usable_resource",
            Error::Stage { .. } => "stage_error",
            Error::Upstream { .. } => "upstream_error",
            Error::Transport(_) => "transient_transport_error",
            Error::Config(_) => "config_error",
            Error::Io { .. } => "io_error",
            Error::Cancelled => "cancelled",
            Error::Internal(_) => "internal_error",
        }
    }

    /// Whether a retry could plausibly succeed.
    ///
    /// Transport failures always qualify; status-bearing errors qualify when
    /// their status is in `retryable_statuses`.
    pub fn is_retryable(&self, retryable_statuses: &[u16]) -> bool {
        match self {
            Error::Transport(_) => true,
            Error::Stage { status, .. } => status.is_some_and(|s| retryable_statuses.contains(&s)),
            Error::Upstream { status, .. } => retryable_statuses.contains(status),
            _ => false,
        }
    }

    /// One-line diagnostic carrying both the error class and its cause.
    pub fn diagnostic(&self) -> String {
        format!("{}: {self}", self.kind())
    }

    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Stage { status, .. } => *status,
            Error::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Convenience constructor for [`Error::Stage`].
    pub fn stage(stage: impl fmt::Display, status: Option<u16>, body: impl Into<String>) -> Self {
        Error::Stage {
            stage: stage.to_string(),
            status,
            body: body.into(),
        }
    }

    /// Convenience constructor for [`Error::Upstream`].
    pub fn upstream(service: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Error::Upstream {
            service: service.into(),
            status,
            body: body.into(),
        }
    }

    /// Convenience constructor for [`Error::LicensingUnavailable`].
    pub fn licensing(catalog_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::LicensingUnavailable {
            catalog_id: catalog_id.into(),
            reason: reason.into(),
        }
    }

    /// Convenience constructor for [`Error::InvalidInput`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidInput(message.into())
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
