//! Configuration for the pipeline's collaborators.
//!
//! Every external service gets its own section so each injected client owns
//! its settings (endpoint, credentials, timeouts). All sections deserialize
//! with defaults, so a partial YAML/JSON document is enough.

use crate::backend::backoff::{BackoffConfig, PollSchedule};
use crate::error::{Result, TripError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which text-generation API to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextProvider {
    /// Any OpenAI-compatible chat completions API (Groq by default).
    #[default]
    OpenAi,
    /// Ollama's native `/api/generate`.
    Ollama,
}

/// Settings for the text-generation client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TextGenConfig {
    pub provider: TextProvider,
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    /// Temperature (0.0 = deterministic, 1.0 = creative).
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Transport retries on 429/5xx before the call counts as failed.
    pub max_retries: u32,
}

impl Default for TextGenConfig {
    fn default() -> Self {
        Self {
            provider: TextProvider::OpenAi,
            base_url: "https://api.groq.com/openai".to_string(),
            api_key: None,
            model: "llama-3.1-8b-instant".to_string(),
            temperature: 0.7,
            max_tokens: 2048,
            timeout_secs: 60,
            max_retries: 2,
        }
    }
}

impl TextGenConfig {
    pub fn with_provider(mut self, provider: TextProvider) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temp: f64) -> Self {
        self.temperature = temp;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Transport backoff for the completion call.
    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            max_retries: self.max_retries,
            attempt_timeout: Some(self.timeout()),
            ..BackoffConfig::standard()
        }
    }
}

/// Settings for the geocoding client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocodingConfig {
    pub base_url: String,
    /// Nominatim rejects requests without an identifying User-Agent.
    pub user_agent: String,
    /// Per-lookup timeout.
    pub timeout_secs: u64,
    /// Share resolved coordinates across requests.
    pub cache: bool,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://nominatim.openstreetmap.org".to_string(),
            user_agent: concat!("trip-pipeline/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 10,
            cache: true,
        }
    }
}

impl GeocodingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Settings for the image-generation client and its job lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Set to `false` to skip the image job entirely.
    pub enabled: bool,
    pub base_url: String,
    /// Stable Horde accepts `0000000000` as the anonymous key.
    pub api_key: String,
    pub client_agent: String,
    pub samples: u32,
    pub steps: u32,
    pub nsfw: bool,
    pub censor_nsfw: bool,
    pub trusted_workers: bool,

    pub max_submission_retries: u32,
    pub max_poll_attempts: u32,
    pub initial_poll_interval_secs: u64,
    pub max_poll_interval_secs: u64,
    /// Aggregate wall-clock budget for the whole job. Defaults to
    /// `max_poll_attempts * max_poll_interval_secs`.
    pub total_budget_secs: Option<u64>,
    /// Used when a rate-limit response carries no `Retry-After`.
    pub default_retry_after_secs: u64,
    /// Ceiling on rate-limit waits while polling (they don't consume attempts).
    pub max_rate_limit_waits: u32,
    /// Timeout for each individual submit/check call.
    pub request_timeout_secs: u64,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://stablehorde.net/api/v2".to_string(),
            api_key: "0000000000".to_string(),
            client_agent: concat!("trip-pipeline:", env!("CARGO_PKG_VERSION"), ":unknown")
                .to_string(),
            samples: 1,
            steps: 30,
            nsfw: false,
            censor_nsfw: true,
            trusted_workers: true,
            max_submission_retries: 3,
            max_poll_attempts: 20,
            initial_poll_interval_secs: 10,
            max_poll_interval_secs: 120,
            total_budget_secs: None,
            default_retry_after_secs: 5,
            max_rate_limit_waits: 10,
            request_timeout_secs: 30,
        }
    }
}

impl ImageConfig {
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = key.into();
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn poll_schedule(&self) -> PollSchedule {
        PollSchedule::new(
            Duration::from_secs(self.initial_poll_interval_secs),
            Duration::from_secs(self.max_poll_interval_secs),
        )
    }

    pub fn total_budget(&self) -> Duration {
        let secs = self.total_budget_secs.unwrap_or_else(|| {
            u64::from(self.max_poll_attempts).saturating_mul(self.max_poll_interval_secs)
        });
        Duration::from_secs(secs)
    }

    pub fn default_retry_after(&self) -> Duration {
        Duration::from_secs(self.default_retry_after_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Top-level configuration for a [`PipelineCoordinator`](crate::PipelineCoordinator).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TripConfig {
    /// Number of itinerary days requested from the model.
    pub days: u32,
    pub text: TextGenConfig,
    pub geocoding: GeocodingConfig,
    pub image: ImageConfig,
}

impl Default for TripConfig {
    fn default() -> Self {
        Self {
            days: 3,
            text: TextGenConfig::default(),
            geocoding: GeocodingConfig::default(),
            image: ImageConfig::default(),
        }
    }
}

impl TripConfig {
    /// Defaults overlaid with `TRIP_*` environment variables.
    ///
    /// Recognized: `TRIP_TEXT_API_KEY`, `TRIP_TEXT_BASE_URL`, `TRIP_TEXT_MODEL`,
    /// `TRIP_IMAGE_API_KEY`, `TRIP_GEOCODER_URL`.
    pub fn from_env() -> Self {
        Self::default().overlay_env(|key| std::env::var(key).ok())
    }

    fn overlay_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(key) = lookup("TRIP_TEXT_API_KEY") {
            self.text.api_key = Some(key);
        }
        if let Some(url) = lookup("TRIP_TEXT_BASE_URL") {
            self.text.base_url = url;
        }
        if let Some(model) = lookup("TRIP_TEXT_MODEL") {
            self.text.model = model;
        }
        if let Some(key) = lookup("TRIP_IMAGE_API_KEY") {
            self.image.api_key = key;
        }
        if let Some(url) = lookup("TRIP_GEOCODER_URL") {
            self.geocoding.base_url = url;
        }
        self
    }

    /// Parse a YAML document. Missing keys fall back to defaults.
    #[cfg(feature = "yaml")]
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| TripError::InvalidConfig(format!("YAML config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make a bounded loop degenerate.
    pub fn validate(&self) -> Result<()> {
        if self.days == 0 {
            return Err(TripError::InvalidConfig("days must be at least 1".into()));
        }
        if self.image.max_poll_attempts == 0 {
            return Err(TripError::InvalidConfig(
                "image.max_poll_attempts must be at least 1".into(),
            ));
        }
        if self.image.initial_poll_interval_secs == 0 || self.image.max_poll_interval_secs == 0 {
            return Err(TripError::InvalidConfig(
                "image poll intervals must be non-zero".into(),
            ));
        }
        if self.image.initial_poll_interval_secs > self.image.max_poll_interval_secs {
            return Err(TripError::InvalidConfig(format!(
                "image.initial_poll_interval_secs ({}) exceeds max_poll_interval_secs ({})",
                self.image.initial_poll_interval_secs, self.image.max_poll_interval_secs
            )));
        }
        if self.geocoding.timeout_secs == 0
            || self.text.timeout_secs == 0
            || self.image.request_timeout_secs == 0
        {
            return Err(TripError::InvalidConfig("timeouts must be non-zero".into()));
        }
        Ok(())
    }
}
