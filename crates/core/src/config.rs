//! Startup configuration.
//!
//! `Settings::load` runs once when a front end starts. A missing credential
//! is fatal there, so nothing downstream ever needs to look at the
//! environment again.

use std::time::Duration;

use crate::provider::Provider;

/// Gap between two sampled frames, in seconds.
pub const ANALYSIS_INTERVAL_SECS: f64 = 5.0;

/// Shortest sampling interval accepted from an override.
pub const MIN_INTERVAL_SECS: f64 = 0.1;

/// Lossy encoding quality for captured frames (0.0..=1.0).
pub const FRAME_JPEG_QUALITY: f32 = 0.7;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(
        "Missing API key for {provider_name}: set the {env_var} (or API_KEY) environment variable"
    )]
    MissingApiKey {
        provider_name: String,
        env_var: String,
    },

    #[error("Sampling interval must be at least {min} seconds, got {0}", min = MIN_INTERVAL_SECS)]
    InvalidInterval(f64),

    #[error("Request timeout must be greater than zero")]
    InvalidTimeout,
}

/// Values a front end may override on top of the defaults.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub model: Option<String>,
    pub interval: Option<f64>,
    pub request_timeout: Option<Duration>,
}

#[derive(Clone)]
pub struct Settings {
    pub provider: Provider,
    pub api_key: String,
    pub model: String,
    pub interval: f64,
    pub request_timeout: Duration,
    pub jpeg_quality: f32,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("provider", &self.provider)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("interval", &self.interval)
            .field("request_timeout", &self.request_timeout)
            .field("jpeg_quality", &self.jpeg_quality)
            .finish()
    }
}

impl Settings {
    /// Validate and assemble settings. `lookup` reads environment variables;
    /// binaries pass `|k| std::env::var(k).ok()`.
    pub fn load<F>(
        provider: Provider,
        overrides: SettingsOverrides,
        lookup: F,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = provider.config();

        let api_key =
            provider
                .resolve_api_key(lookup)
                .ok_or_else(|| ConfigError::MissingApiKey {
                    provider_name: provider.name().to_string(),
                    env_var: config.env_var.to_string(),
                })?;

        let interval = overrides.interval.unwrap_or(ANALYSIS_INTERVAL_SECS);
        if !interval.is_finite() || interval < MIN_INTERVAL_SECS {
            return Err(ConfigError::InvalidInterval(interval));
        }

        let request_timeout = overrides.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        if request_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout);
        }

        let model = overrides
            .model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| config.model.to_string());

        Ok(Self {
            provider,
            api_key,
            model,
            interval,
            request_timeout,
            jpeg_quality: FRAME_JPEG_QUALITY,
        })
    }

    /// Shorthand for loading from the process environment.
    pub fn from_env(provider: Provider, overrides: SettingsOverrides) -> Result<Self, ConfigError> {
        Self::load(provider, overrides, |k| std::env::var(k).ok())
    }
}
