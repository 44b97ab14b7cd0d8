use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Serialize;
use url::Url;

use crate::analytics::constants::DEFAULT_REQUEST_TIMEOUT_MS;
use crate::analytics::error::{internal_error, invalid_config, network_error, AnalyticsResult};
use crate::analytics::event::{Event, EventParams};
use crate::logger::Logger;
use crate::platform::runtime::with_timeout;

/// A slice of queued events delivered in one transport call. All events share one client and
/// session.
#[derive(Clone, Debug, PartialEq)]
pub struct EventBatch {
    pub client_id: String,
    pub session_id: String,
    pub events: Vec<Event>,
}

impl EventBatch {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Delivers a batch and reports whether the server accepted it.
///
/// Implementations never panic or return errors past this boundary and perform at most one
/// network round-trip per call. Retrying is the tracker's business.
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait EventTransport: Send + Sync {
    async fn send(&self, batch: &EventBatch) -> bool;
}

/// Endpoint and credentials for [`HttpTransport`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpTransportConfig {
    endpoint: Url,
    measurement_id: String,
    api_secret: String,
    timeout: Duration,
}

impl HttpTransportConfig {
    pub fn new(
        endpoint: Url,
        measurement_id: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            endpoint,
            measurement_id: measurement_id.into(),
            api_secret: api_secret.into(),
            timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn measurement_id(&self) -> &str {
        &self.measurement_id
    }

    pub(crate) fn api_secret(&self) -> &str {
        &self.api_secret
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Posts batches as JSON to the configured collection endpoint.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
    config: HttpTransportConfig,
    logger: Logger,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig, logger: Logger) -> AnalyticsResult<Self> {
        if config.measurement_id().trim().is_empty() {
            return Err(invalid_config("measurement_id must not be empty"));
        }
        if config.api_secret().trim().is_empty() {
            return Err(invalid_config("api_secret must not be empty"));
        }
        let client = build_http_client(config.timeout())?;
        Ok(Self {
            client,
            config,
            logger,
        })
    }

    pub fn config(&self) -> &HttpTransportConfig {
        &self.config
    }

    async fn try_send(&self, batch: &EventBatch) -> AnalyticsResult<()> {
        let payload = BatchPayload::from_batch(batch);
        let response = self
            .client
            .post(self.config.endpoint().clone())
            .query(&[
                ("measurement_id", self.config.measurement_id()),
                ("api_secret", self.config.api_secret()),
            ])
            .json(&payload)
            .send()
            .await
            .map_err(|err| network_error(format!("failed to send analytics batch: {err}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unavailable response body>".to_string());
        let message = match status {
            StatusCode::BAD_REQUEST => {
                format!("collection endpoint rejected the batch (400). Response: {body}")
            }
            _ => format!("collection request failed with status {status}. Response: {body}"),
        };
        Err(network_error(message))
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl EventTransport for HttpTransport {
    async fn send(&self, batch: &EventBatch) -> bool {
        if batch.is_empty() {
            return true;
        }
        match with_timeout(self.try_send(batch), self.config.timeout()).await {
            Ok(Ok(())) => {
                self.logger
                    .debug(format!("delivered batch of {} events", batch.len()));
                true
            }
            Ok(Err(err)) => {
                log::debug!("analytics transport send failed: {err}");
                self.logger.debug(format!("batch delivery failed: {err}"));
                false
            }
            Err(timeout) => {
                log::debug!("analytics transport send timed out: {timeout}");
                self.logger.debug(format!("batch delivery failed: {timeout}"));
                false
            }
        }
    }
}

// underscore in the variable to prevent #warn unused_variable for wasm targets.
fn build_http_client(_timeout: Duration) -> AnalyticsResult<Client> {
    #[cfg(not(target_arch = "wasm32"))]
    let client = Client::builder()
        .timeout(_timeout)
        .build()
        .map_err(|err| internal_error(format!("failed to build HTTP client: {err}")))?;

    #[cfg(target_arch = "wasm32")]
    let client = Client::builder()
        .build()
        .map_err(|err| internal_error(format!("failed to build HTTP client: {err}")))?;

    Ok(client)
}

/// Wire shape: `{ client_id, session_id, events: [{ name, params, timestamp }] }`.
#[derive(Serialize)]
pub(crate) struct BatchPayload<'a> {
    client_id: &'a str,
    session_id: &'a str,
    events: Vec<PayloadEvent<'a>>,
}

#[derive(Serialize)]
struct PayloadEvent<'a> {
    name: &'a str,
    params: &'a EventParams,
    timestamp: i64,
}

impl<'a> BatchPayload<'a> {
    pub(crate) fn from_batch(batch: &'a EventBatch) -> Self {
        Self {
            client_id: &batch.client_id,
            session_id: &batch.session_id,
            events: batch
                .events
                .iter()
                .map(|event| PayloadEvent {
                    name: &event.name,
                    params: &event.params,
                    timestamp: event.timestamp_ms,
                })
                .collect(),
        }
    }
}
