//! Configuration loading.
//!
//! The types live in [`cf_core::config`]; this module finds, parses, and
//! validates the TOML file.

pub use cf_core::config::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    tracing::debug!("Loaded config from {:?}", path);
    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./clipforge.toml",
        "./config.toml",
        "~/.config/clipforge/config.toml",
        "/etc/clipforge/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    tracing::debug!("No config file found; using defaults");
    let config = Config::default();
    validate_config(&config)?;
    Ok(config)
}

/// Reject configurations that cannot work; log the merely suspicious.
pub fn validate_config(config: &Config) -> Result<()> {
    if config.retry.max_attempts == 0 {
        anyhow::bail!("retry.max_attempts must be at least 1");
    }

    if config.retry.base_delay_ms > config.retry.max_delay_ms {
        anyhow::bail!(
            "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
            config.retry.base_delay_ms,
            config.retry.max_delay_ms
        );
    }

    for (name, endpoint) in config.stages.iter() {
        if endpoint.url.trim().is_empty() {
            anyhow::bail!("stages.{name}.url is empty");
        }
        if endpoint.timeout_secs == Some(0) {
            anyhow::bail!("stages.{name}.timeout_secs cannot be 0");
        }
    }

    if config.catalog.requests_per_second == 0 {
        anyhow::bail!("catalog.requests_per_second cannot be 0");
    }

    if config.analysis.frame_concurrency == 0 {
        anyhow::bail!("analysis.frame_concurrency cannot be 0");
    }

    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }

    Ok(())
}
