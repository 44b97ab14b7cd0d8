use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::analytics::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_FLUSH_INTERVAL_MS, DEFAULT_MAX_BATCH_RETRIES,
    DEFAULT_MAX_QUEUE_SIZE, DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_SESSION_TIMEOUT_MS,
};
use crate::analytics::error::{invalid_config, AnalyticsResult};
use crate::analytics::event::ValidationLimits;
use crate::analytics::tracker::TrackerSettings;
use crate::analytics::transport::HttpTransportConfig;

/// Options recognised by the analytics pipeline.
///
/// Accepts camelCase keys (`maxQueueSize`) as well as snake_case aliases when deserialized.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalyticsConfig {
    pub endpoint: Option<String>,
    #[serde(alias = "measurement_id")]
    pub measurement_id: Option<String>,
    #[serde(alias = "api_secret")]
    pub api_secret: Option<String>,
    #[serde(alias = "max_queue_size")]
    pub max_queue_size: usize,
    #[serde(alias = "batch_size")]
    pub batch_size: usize,
    #[serde(alias = "flush_interval_ms")]
    pub flush_interval_ms: u64,
    #[serde(alias = "request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(alias = "session_timeout_ms")]
    pub session_timeout_ms: u64,
    #[serde(alias = "max_batch_retries")]
    pub max_batch_retries: u32,
    #[serde(alias = "flush_on_full_batch")]
    pub flush_on_full_batch: bool,
    pub debug: bool,
    pub validation: ValidationLimits,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            measurement_id: None,
            api_secret: None,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            session_timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
            max_batch_retries: DEFAULT_MAX_BATCH_RETRIES,
            flush_on_full_batch: true,
            debug: false,
            validation: ValidationLimits::default(),
        }
    }
}

impl AnalyticsConfig {
    pub fn new(
        endpoint: impl Into<String>,
        measurement_id: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            measurement_id: Some(measurement_id.into()),
            api_secret: Some(api_secret.into()),
            ..Default::default()
        }
    }

    pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = max_queue_size;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval_ms = duration_to_millis(interval);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = duration_to_millis(timeout);
        self
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout_ms = duration_to_millis(timeout);
        self
    }

    pub fn with_max_batch_retries(mut self, retries: u32) -> Self {
        self.max_batch_retries = retries;
        self
    }

    pub fn with_flush_on_full_batch(mut self, enabled: bool) -> Self {
        self.flush_on_full_batch = enabled;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_validation_limits(mut self, limits: ValidationLimits) -> Self {
        self.validation = limits;
        self
    }

    pub fn from_json(raw: &str) -> AnalyticsResult<Self> {
        serde_json::from_str(raw)
            .map_err(|err| invalid_config(format!("invalid analytics configuration: {err}")))
    }

    /// Reads `TELEMETRY_*` environment variables on top of the defaults.
    pub fn from_env() -> AnalyticsResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> AnalyticsResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self {
            endpoint: lookup("TELEMETRY_ENDPOINT"),
            measurement_id: lookup("TELEMETRY_MEASUREMENT_ID"),
            api_secret: lookup("TELEMETRY_API_SECRET"),
            ..Default::default()
        };
        if let Some(value) = lookup("TELEMETRY_MAX_QUEUE_SIZE") {
            config.max_queue_size = parse_env("TELEMETRY_MAX_QUEUE_SIZE", &value)?;
        }
        if let Some(value) = lookup("TELEMETRY_BATCH_SIZE") {
            config.batch_size = parse_env("TELEMETRY_BATCH_SIZE", &value)?;
        }
        if let Some(value) = lookup("TELEMETRY_FLUSH_INTERVAL_MS") {
            config.flush_interval_ms = parse_env("TELEMETRY_FLUSH_INTERVAL_MS", &value)?;
        }
        if let Some(value) = lookup("TELEMETRY_DEBUG") {
            config.debug = matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        Ok(config)
    }

    /// Checks endpoint, credentials and sizes; returns the transport configuration on success.
    pub fn validate(&self) -> AnalyticsResult<HttpTransportConfig> {
        let endpoint = required(&self.endpoint, "endpoint")?;
        let endpoint = Url::parse(endpoint)
            .map_err(|err| invalid_config(format!("endpoint `{endpoint}` is not a valid URL: {err}")))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(invalid_config(format!(
                "endpoint must use http or https, got `{}`",
                endpoint.scheme()
            )));
        }
        let measurement_id = required(&self.measurement_id, "measurement_id")?;
        let api_secret = required(&self.api_secret, "api_secret")?;

        if self.batch_size == 0 {
            return Err(invalid_config("batch_size must be at least 1"));
        }
        if self.max_queue_size < self.batch_size {
            return Err(invalid_config(format!(
                "max_queue_size ({}) must not be smaller than batch_size ({})",
                self.max_queue_size, self.batch_size
            )));
        }
        if self.flush_interval_ms == 0 {
            return Err(invalid_config("flush_interval_ms must be greater than zero"));
        }
        if self.request_timeout_ms == 0 {
            return Err(invalid_config("request_timeout_ms must be greater than zero"));
        }
        if self.session_timeout_ms == 0 {
            return Err(invalid_config("session_timeout_ms must be greater than zero"));
        }

        Ok(HttpTransportConfig::new(endpoint, measurement_id, api_secret)
            .with_timeout(self.request_timeout()))
    }

    pub fn tracker_settings(&self) -> TrackerSettings {
        TrackerSettings {
            max_queue_size: self.max_queue_size,
            batch_size: self.batch_size,
            max_batch_retries: self.max_batch_retries,
            flush_on_full_batch: self.flush_on_full_batch,
            limits: self.validation.clone(),
        }
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> AnalyticsResult<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(invalid_config(format!("`{name}` is required"))),
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> AnalyticsResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid_config(format!("{key} must be a non-negative integer, got `{value}`")))
}

fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
