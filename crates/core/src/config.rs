use crate::error::{AppError, Result};
use crate::settings::Settings;
use dotenvy::dotenv;
use std::env;
use std::time::Duration;
use url::Url;

pub const DEFAULT_SERVICE_URL: &str = "http://localhost:8000";
/// Fixed delay between two status queries for the same job.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1500);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Clone, Debug)]
pub struct Config {
    /// Base address every relative service reference is resolved against.
    pub service_url: Url,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_with(&Settings::default())
    }

    /// Like [`Config::load`], but falls back to the persisted service URL
    /// when the environment does not name one.
    pub fn load_with(settings: &Settings) -> Result<Self> {
        // Load .env file if it exists, ignore if it doesn't
        let _ = dotenv();

        let service_url = env::var("STORYFACE_SERVICE_URL")
            .ok()
            .or_else(|| settings.service_url.clone())
            .unwrap_or_else(|| DEFAULT_SERVICE_URL.to_string());

        let mut builder = Config::builder().with_service_url(service_url);

        if let Ok(ms) = env::var("STORYFACE_POLL_INTERVAL_MS") {
            let ms: u64 = ms.parse().map_err(|_| {
                AppError::config("STORYFACE_POLL_INTERVAL_MS must be a number of milliseconds")
            })?;
            builder = builder.with_poll_interval(Duration::from_millis(ms));
        }

        if let Ok(secs) = env::var("STORYFACE_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                AppError::config("STORYFACE_REQUEST_TIMEOUT_SECS must be a number of seconds")
            })?;
            builder = builder.with_request_timeout(Duration::from_secs(secs));
        }

        builder.build()
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigBuilder {
    service_url: Option<String>,
    poll_interval: Option<Duration>,
    request_timeout: Option<Duration>,
}

impl ConfigBuilder {
    pub fn with_service_url(mut self, url: impl Into<String>) -> Self {
        self.service_url = Some(url.into());
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<Config> {
        let raw = self
            .service_url
            .unwrap_or_else(|| DEFAULT_SERVICE_URL.to_string());
        let service_url = Url::parse(raw.trim())
            .map_err(|e| AppError::config(format!("Invalid service URL '{}': {}", raw, e)))?;

        if !matches!(service_url.scheme(), "http" | "https") {
            return Err(AppError::config(format!(
                "Service URL must use http or https, got '{}'",
                service_url.scheme()
            )));
        }

        let poll_interval = self.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL);
        if poll_interval.is_zero() {
            return Err(AppError::config("Poll interval must be greater than zero"));
        }

        Ok(Config {
            service_url,
            poll_interval,
            request_timeout: self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
        })
    }
}
