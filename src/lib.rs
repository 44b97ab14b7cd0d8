//! Client-side telemetry pipeline.
//!
//! Application code talks to [`analytics::Analytics`]: initialise it once with an
//! [`analytics::AnalyticsConfig`], then record events. Events are enriched with a persistent client
//! identifier and an inactivity-bounded session, buffered in a bounded queue, and delivered in
//! batches over HTTP. Delivery failures never surface as errors; the queue keeps the events and a
//! later flush retries them.
//!
//! ```no_run
//! use telemetry_pipeline::analytics::{params, Analytics, AnalyticsConfig};
//!
//! # async fn run() {
//! let config = AnalyticsConfig::new("https://collect.example.com/batch", "G-XXXX", "secret");
//! let analytics = Analytics::new(config);
//! if analytics.init().await {
//!     analytics
//!         .track_event("settings_opened", params([("tab", "general")]))
//!         .await;
//!     analytics.flush().await;
//! }
//! # }
//! ```

pub mod analytics;
pub mod logger;
pub mod platform;

#[cfg(all(test, not(target_arch = "wasm32")))]
pub mod test_support;
