use std::time::Duration;

use tracing::info;

/// Connection settings for the hosted store and its object storage.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Project base URL, e.g. `https://xyz.supabase.co`.
    pub base_url: String,
    /// Public (anonymous) API key. Sent on every request.
    pub anon_key: String,
    /// Storage bucket holding livery images.
    pub image_bucket: String,
    pub request_timeout: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{key} is invalid: {value}")]
    Invalid { key: &'static str, value: String },
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            image_bucket: "livery-images".into(),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = required("AEROHUB_SUPABASE_URL")?;
        let anon_key = required("AEROHUB_SUPABASE_ANON_KEY")?;

        let mut config = Self::new(base_url, anon_key);
        if let Ok(bucket) = std::env::var("AEROHUB_IMAGE_BUCKET") {
            config.image_bucket = bucket;
        }
        if let Ok(raw) = std::env::var("AEROHUB_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = raw.parse().map_err(|_| ConfigError::Invalid {
                key: "AEROHUB_REQUEST_TIMEOUT_SECS",
                value: raw.clone(),
            })?;
            config.request_timeout = Duration::from_secs(secs);
        }

        info!(
            "Gateway configured for {} (bucket '{}', timeout {:?})",
            config.base_url, config.image_bucket, config.request_timeout
        );
        Ok(config)
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}
