use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use serde::Serialize;

use crate::analytics::config::AnalyticsConfig;
use crate::analytics::constants::LOGGER_NAME;
use crate::analytics::error::{internal_error, AnalyticsResult};
use crate::analytics::event::{EventParams, IdentityContext};
use crate::analytics::identity::IdentityStore;
use crate::analytics::payloads::{EventPayload, ErrorReport, PageView, PromptAction, SearchQuery};
use crate::analytics::session::SessionManager;
use crate::analytics::tracker::{EventTracker, FlushOutcome, FlushTimer, QueueStatus};
use crate::analytics::transport::{EventTransport, HttpTransport};
use crate::logger::{LogLevel, Logger};
use crate::platform::clock::{ClockHandle, SystemClock};
use crate::platform::runtime;
use crate::platform::storage::{default_store, KeyValueStoreHandle};

const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum PipelineState {
    Uninitialized = 0,
    Initializing = 1,
    Ready = 2,
    Failed = 3,
}

impl PipelineState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PipelineState::Uninitialized,
            1 => PipelineState::Initializing,
            2 => PipelineState::Ready,
            _ => PipelineState::Failed,
        }
    }
}

/// Read-only snapshot of the whole pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStatus {
    pub state: PipelineState,
    pub initialized: bool,
    pub environment_valid: bool,
    pub queue_size: usize,
    pub max_queue_size: usize,
    pub is_processing: bool,
    pub batch_size: usize,
    pub dropped_events: u64,
    pub abandoned_events: u64,
    pub client_id: Option<String>,
    pub session_id: Option<String>,
    pub debug: bool,
}

/// Entry point for application code.
///
/// Construct one per process with [`Analytics::builder`] and pass clones to call sites; clones
/// share the same pipeline. Every operation reports success as a `bool` or a status value and
/// never panics or returns an error to the caller.
#[derive(Clone)]
pub struct Analytics {
    inner: Arc<AnalyticsInner>,
}

impl fmt::Debug for Analytics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analytics")
            .field("state", &self.state())
            .finish()
    }
}

struct AnalyticsInner {
    config: AnalyticsConfig,
    state: AtomicU8,
    environment_valid: AtomicBool,
    collection_enabled: AtomicBool,
    debug: AtomicBool,
    logger: Logger,
    clock: ClockHandle,
    identity: IdentityStore,
    sessions: SessionManager,
    transport_override: Option<Arc<dyn EventTransport>>,
    tracker: OnceLock<EventTracker>,
    flush_timer: Mutex<Option<FlushTimer>>,
    default_event_params: Mutex<EventParams>,
}

pub struct AnalyticsBuilder {
    config: AnalyticsConfig,
    store: Option<KeyValueStoreHandle>,
    transport: Option<Arc<dyn EventTransport>>,
    clock: Option<ClockHandle>,
    logger: Option<Logger>,
}

impl AnalyticsBuilder {
    /// Persistence for the client id and session. Defaults to [`default_store`].
    pub fn with_store(mut self, store: KeyValueStoreHandle) -> Self {
        self.store = Some(store);
        self
    }

    /// Replaces the HTTP transport built from the configuration.
    pub fn with_transport(mut self, transport: Arc<dyn EventTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_clock(mut self, clock: ClockHandle) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn build(self) -> Analytics {
        let logger = self.logger.unwrap_or_else(|| Logger::new(LOGGER_NAME));
        let debug = self.config.debug;
        let _ = logger.set_log_level(if debug { LogLevel::Debug } else { LogLevel::Warn });

        let store = self.store.unwrap_or_else(default_store);
        let clock: ClockHandle = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let identity = IdentityStore::new(store.clone(), logger.clone());
        let sessions = SessionManager::new(
            store,
            clock.clone(),
            logger.clone(),
            self.config.session_timeout(),
        );

        Analytics {
            inner: Arc::new(AnalyticsInner {
                config: self.config,
                state: AtomicU8::new(PipelineState::Uninitialized as u8),
                environment_valid: AtomicBool::new(false),
                collection_enabled: AtomicBool::new(true),
                debug: AtomicBool::new(debug),
                logger,
                clock,
                identity,
                sessions,
                transport_override: self.transport,
                tracker: OnceLock::new(),
                flush_timer: Mutex::new(None),
                default_event_params: Mutex::new(EventParams::new()),
            }),
        }
    }
}

impl Analytics {
    pub fn builder(config: AnalyticsConfig) -> AnalyticsBuilder {
        AnalyticsBuilder {
            config,
            store: None,
            transport: None,
            clock: None,
            logger: None,
        }
    }

    pub fn new(config: AnalyticsConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.inner.config
    }

    pub fn logger(&self) -> &Logger {
        &self.inner.logger
    }

    pub fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.inner.state.load(Ordering::SeqCst))
    }

    /// Validates the configuration, mints the client id and session, and starts the periodic
    /// flush. Resolves `true` once the pipeline is ready.
    ///
    /// Calling again after success returns `true`; after failure, or while another `init` is
    /// still running, it returns `false`.
    pub async fn init(&self) -> bool {
        if let Err(current) = self.inner.state.compare_exchange(
            PipelineState::Uninitialized as u8,
            PipelineState::Initializing as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            return PipelineState::from_u8(current) == PipelineState::Ready;
        }

        match self.initialize().await {
            Ok(()) => {
                self.set_state(PipelineState::Ready);
                self.inner.logger.debug("analytics pipeline ready");
                true
            }
            Err(err) => {
                self.set_state(PipelineState::Failed);
                self.inner
                    .logger
                    .error(format!("analytics initialization failed: {err}"));
                false
            }
        }
    }

    async fn initialize(&self) -> AnalyticsResult<()> {
        let transport_config = self.inner.config.validate()?;
        self.inner.environment_valid.store(true, Ordering::SeqCst);

        let transport: Arc<dyn EventTransport> = match &self.inner.transport_override {
            Some(transport) => Arc::clone(transport),
            None => Arc::new(HttpTransport::new(
                transport_config,
                self.inner.logger.clone(),
            )?),
        };
        let tracker = EventTracker::new(
            self.inner.config.tracker_settings(),
            transport,
            self.inner.logger.clone(),
        );

        let client_id = self.inner.identity.get_or_create_client_id().await;
        let session_id = self.inner.sessions.get_or_create_session_id().await;
        self.inner
            .logger
            .debug(format!("identity ready: client {client_id}, session {session_id}"));

        let timer = tracker.spawn_periodic_flush(self.inner.config.flush_interval());
        self.inner
            .tracker
            .set(tracker)
            .map_err(|_| internal_error("event tracker already initialized"))?;
        *self.flush_timer() = Some(timer);
        Ok(())
    }

    /// Validates and queues an event enriched with the client id and current session.
    ///
    /// Returns `false` before the pipeline is ready, while collection is disabled, or when the
    /// event is rejected. Rejected events do not touch the session.
    pub async fn track_event(&self, name: &str, params: EventParams) -> bool {
        let Some(tracker) = self.ready_tracker() else {
            self.inner
                .logger
                .debug(format!("ignoring `{name}`: pipeline is not ready"));
            return false;
        };
        if !self.collection_enabled() {
            self.inner
                .logger
                .debug(format!("ignoring `{name}`: collection disabled"));
            return false;
        }

        let params = self.merge_default_event_params(params);
        if let Err(err) = tracker.validate(name, &params) {
            self.inner
                .logger
                .debug(format!("rejected event `{name}`: {}", err.message()));
            return false;
        }

        let identity = IdentityContext {
            client_id: self.inner.identity.get_or_create_client_id().await,
            session_id: self.inner.sessions.get_or_create_session_id().await,
        };
        tracker.track_event(name, params, &identity, self.inner.clock.now_millis())
    }

    pub async fn track_page_view(&self, view: PageView) -> bool {
        self.track_payload(view).await
    }

    pub async fn track_prompt_action(&self, action: PromptAction) -> bool {
        self.track_payload(action).await
    }

    pub async fn track_search(&self, query: SearchQuery) -> bool {
        self.track_payload(query).await
    }

    pub async fn track_error(&self, report: ErrorReport) -> bool {
        self.track_payload(report).await
    }

    async fn track_payload<P: EventPayload>(&self, payload: P) -> bool {
        let name = payload.event_name();
        let params = payload.into_params(self.inner.config.validation.max_param_value_length);
        self.track_event(name, params).await
    }

    /// Delivers the oldest batch now. See [`EventTracker::flush`].
    pub async fn flush(&self) -> bool {
        match self.ready_tracker() {
            Some(tracker) => tracker.flush().await,
            None => false,
        }
    }

    pub fn queue_status(&self) -> QueueStatus {
        match self.inner.tracker.get() {
            Some(tracker) => tracker.queue_status(),
            None => QueueStatus {
                queue_size: 0,
                max_queue_size: self.inner.config.max_queue_size,
                is_processing: false,
                batch_size: self.inner.config.batch_size,
                dropped_events: 0,
                abandoned_events: 0,
            },
        }
    }

    pub fn status(&self) -> PipelineStatus {
        let state = self.state();
        let queue = self.queue_status();
        PipelineStatus {
            state,
            initialized: state == PipelineState::Ready,
            environment_valid: self.inner.environment_valid.load(Ordering::SeqCst),
            queue_size: queue.queue_size,
            max_queue_size: queue.max_queue_size,
            is_processing: queue.is_processing,
            batch_size: queue.batch_size,
            dropped_events: queue.dropped_events,
            abandoned_events: queue.abandoned_events,
            client_id: self.inner.identity.cached_client_id(),
            session_id: self
                .inner
                .sessions
                .current_session()
                .map(|session| session.session_id),
            debug: self.is_debug_mode(),
        }
    }

    /// Toggles verbose diagnostics. Has no effect on what the pipeline does.
    pub fn set_debug_mode(&self, enabled: bool) {
        self.inner.debug.store(enabled, Ordering::SeqCst);
        let level = if enabled { LogLevel::Debug } else { LogLevel::Warn };
        let _ = self.inner.logger.set_log_level(level);
        self.inner
            .logger
            .debug(format!("debug mode {}", if enabled { "on" } else { "off" }));
    }

    pub fn is_debug_mode(&self) -> bool {
        self.inner.debug.load(Ordering::SeqCst)
    }

    /// Parameters merged into every event. Explicit event parameters win on conflict.
    pub fn set_default_event_parameters(&self, params: EventParams) {
        *self
            .inner
            .default_event_params
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = params;
    }

    /// When disabled, tracking calls return `false` and nothing is queued.
    pub fn set_collection_enabled(&self, enabled: bool) {
        self.inner
            .collection_enabled
            .store(enabled, Ordering::SeqCst);
    }

    pub fn collection_enabled(&self) -> bool {
        self.inner.collection_enabled.load(Ordering::SeqCst)
    }

    /// Stops the periodic flush and the full-batch background flush. Afterwards events are
    /// still queued, but only explicit [`Analytics::flush`] calls deliver them.
    ///
    /// With `flush_remaining`, waits for any batch already in flight, then keeps flushing until
    /// the queue is empty. Returns `false` only when a delivery fails.
    pub async fn shutdown(&self, flush_remaining: bool) -> bool {
        if let Some(timer) = self.flush_timer().take() {
            timer.cancel();
        }
        let Some(tracker) = self.ready_tracker() else {
            return !flush_remaining;
        };
        tracker.stop_background();
        if !flush_remaining {
            return true;
        }
        while tracker.queue_len() > 0 || tracker.is_processing() {
            match tracker.try_flush().await {
                FlushOutcome::Delivered => {}
                FlushOutcome::Busy => runtime::sleep(SHUTDOWN_POLL_INTERVAL).await,
                FlushOutcome::Failed => {
                    self.inner
                        .logger
                        .warn("shutdown flush failed; undelivered events stay queued");
                    return false;
                }
            }
        }
        true
    }

    fn ready_tracker(&self) -> Option<&EventTracker> {
        if self.state() != PipelineState::Ready {
            return None;
        }
        self.inner.tracker.get()
    }

    fn merge_default_event_params(&self, mut params: EventParams) -> EventParams {
        let defaults = self
            .inner
            .default_event_params
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for (key, value) in defaults {
            params.entry(key).or_insert(value);
        }
        params
    }

    fn set_state(&self, state: PipelineState) {
        self.inner.state.store(state as u8, Ordering::SeqCst);
    }

    fn flush_timer(&self) -> MutexGuard<'_, Option<FlushTimer>> {
        self.inner
            .flush_timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
