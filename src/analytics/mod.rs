mod api;
mod config;
mod constants;
pub mod error;
mod event;
mod identity;
mod payloads;
mod session;
mod tracker;
mod transport;

pub use api::{Analytics, AnalyticsBuilder, PipelineState, PipelineStatus};
pub use config::AnalyticsConfig;
pub use constants::{CLIENT_ID_KEY, LOGGER_NAME, SESSION_KEY};
pub use event::{
    is_identifier, params, Event, EventParams, IdentityContext, ParamValue, ValidationLimits,
};
pub use identity::IdentityStore;
pub use payloads::{ErrorReport, PageView, PromptAction, PromptActionKind, SearchQuery};
pub use session::{Session, SessionManager};
pub use tracker::{EventTracker, FlushOutcome, FlushTimer, QueueStatus, TrackerSettings};
pub use transport::{EventBatch, EventTransport, HttpTransport, HttpTransportConfig};
