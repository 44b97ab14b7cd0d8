use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_channel::{Receiver, Sender};
use futures::future::{select, Either};
use serde::Serialize;

use crate::analytics::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_MAX_BATCH_RETRIES, DEFAULT_MAX_QUEUE_SIZE,
};
use crate::analytics::error::AnalyticsResult;
use crate::analytics::event::{
    validate_event_name, validate_params, Event, EventParams, IdentityContext, ValidationLimits,
};
use crate::analytics::transport::{EventBatch, EventTransport};
use crate::logger::{log_arg, Logger};
use crate::platform::runtime;

/// Queue and delivery policy for an [`EventTracker`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackerSettings {
    pub max_queue_size: usize,
    pub batch_size: usize,
    /// Failed deliveries an event may accumulate before it is abandoned instead of re-queued.
    pub max_batch_retries: u32,
    /// Start a background flush as soon as the queue holds a full batch.
    pub flush_on_full_batch: bool,
    pub limits: ValidationLimits,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            max_batch_retries: DEFAULT_MAX_BATCH_RETRIES,
            flush_on_full_batch: true,
            limits: ValidationLimits::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub queue_size: usize,
    pub max_queue_size: usize,
    pub is_processing: bool,
    pub batch_size: usize,
    /// Events evicted because the queue was full.
    pub dropped_events: u64,
    /// Events given up on after exhausting their delivery retries.
    pub abandoned_events: u64,
}

/// Result of one flush attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The batch was accepted, or the queue was empty.
    Delivered,
    /// The transport refused the batch; it is back at the head of the queue.
    Failed,
    /// Another batch was already in flight. Nothing was sent.
    Busy,
}

#[derive(Clone, Debug)]
struct QueuedEvent {
    event: Event,
    failed_attempts: u32,
}

/// Validates, queues and batches events, and hands batches to the transport.
///
/// The queue is bounded: overflow evicts the oldest entries. At most one batch is in flight; a
/// flush that finds another one running returns `false` immediately instead of waiting.
#[derive(Clone)]
pub struct EventTracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    settings: TrackerSettings,
    transport: Arc<dyn EventTransport>,
    logger: Logger,
    queue: Mutex<VecDeque<QueuedEvent>>,
    is_processing: AtomicBool,
    background_enabled: AtomicBool,
    flush_scheduled: AtomicBool,
    dropped: AtomicU64,
    abandoned: AtomicU64,
}

/// Clears the in-flight flag when the flush finishes or its future is dropped.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl EventTracker {
    pub fn new(settings: TrackerSettings, transport: Arc<dyn EventTransport>, logger: Logger) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                settings,
                transport,
                logger,
                queue: Mutex::new(VecDeque::new()),
                is_processing: AtomicBool::new(false),
                background_enabled: AtomicBool::new(true),
                flush_scheduled: AtomicBool::new(false),
                dropped: AtomicU64::new(0),
                abandoned: AtomicU64::new(0),
            }),
        }
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.inner.settings
    }

    /// Checks the event name and parameters against the identifier grammar and limits.
    pub fn validate(&self, name: &str, params: &EventParams) -> AnalyticsResult<()> {
        validate_event_name(name, &self.inner.settings.limits)?;
        validate_params(params, &self.inner.settings.limits)
    }

    /// Validates and enqueues an event. Returns `false` when the event is rejected.
    pub fn track_event(
        &self,
        name: &str,
        params: EventParams,
        identity: &IdentityContext,
        timestamp_ms: i64,
    ) -> bool {
        if let Err(err) = self.validate(name, &params) {
            self.inner
                .logger
                .debug(format!("rejected event `{name}`: {}", err.message()));
            return false;
        }

        let event = Event {
            name: name.to_string(),
            params,
            timestamp_ms,
            client_id: identity.client_id.clone(),
            session_id: identity.session_id.clone(),
        };
        let queue_size = self.enqueue(event);

        if self.inner.settings.flush_on_full_batch
            && queue_size >= self.inner.settings.batch_size
            && !self.is_processing()
        {
            self.schedule_flush();
        }
        true
    }

    /// Appends to the tail and evicts from the head until the capacity bound holds again.
    fn enqueue(&self, event: Event) -> usize {
        let name = event.name.clone();
        let mut queue = self.queue();
        queue.push_back(QueuedEvent {
            event,
            failed_attempts: 0,
        });

        let mut evicted = 0u64;
        while queue.len() > self.inner.settings.max_queue_size {
            queue.pop_front();
            evicted += 1;
        }
        let queue_size = queue.len();
        drop(queue);

        if evicted > 0 {
            self.inner.dropped.fetch_add(evicted, Ordering::SeqCst);
            self.inner.logger.debug(format!(
                "queue full; evicted {evicted} oldest event(s) to admit `{name}`"
            ));
        } else {
            self.inner.logger.debug_with([
                log_arg(format!("queued `{name}`")),
                log_arg(serde_json::json!({ "queueSize": queue_size })),
            ]);
        }
        queue_size
    }

    /// Sends the oldest batch. Returns `true` when it was delivered or there was nothing to send.
    ///
    /// A batch holds up to `batch_size` events from the head of the queue, but stops early where
    /// the client or session changes, so a flush right after a session rollover can remove fewer
    /// events than `batch_size` even when more are queued.
    ///
    /// On failure the batch goes back to the head of the queue in its original order. Events that
    /// have failed more than `max_batch_retries` times are abandoned instead.
    pub async fn flush(&self) -> bool {
        self.try_flush().await == FlushOutcome::Delivered
    }

    /// Like [`EventTracker::flush`], but tells a refused flush apart from a failed delivery.
    pub async fn try_flush(&self) -> FlushOutcome {
        if self
            .inner
            .is_processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            self.inner
                .logger
                .debug("flush skipped: another batch is in flight");
            return FlushOutcome::Busy;
        }
        let _processing = ProcessingGuard(&self.inner.is_processing);

        let Some((batch, failed_attempts)) = self.take_batch() else {
            return FlushOutcome::Delivered;
        };

        self.inner.logger.debug(format!(
            "flushing {} event(s) for session {}",
            batch.len(),
            batch.session_id
        ));
        if self.inner.transport.send(&batch).await {
            return FlushOutcome::Delivered;
        }

        self.restore(batch, failed_attempts);
        FlushOutcome::Failed
    }

    /// Takes the longest head run, up to `batch_size`, that shares the head's client and session.
    fn take_batch(&self) -> Option<(EventBatch, Vec<u32>)> {
        let mut queue = self.queue();
        let head = queue.front()?;
        let client_id = head.event.client_id.clone();
        let session_id = head.event.session_id.clone();

        let mut events = Vec::new();
        let mut failed_attempts = Vec::new();
        while events.len() < self.inner.settings.batch_size {
            let same_identity = queue.front().is_some_and(|entry| {
                entry.event.client_id == client_id && entry.event.session_id == session_id
            });
            if !same_identity {
                break;
            }
            if let Some(entry) = queue.pop_front() {
                events.push(entry.event);
                failed_attempts.push(entry.failed_attempts);
            }
        }

        Some((
            EventBatch {
                client_id,
                session_id,
                events,
            },
            failed_attempts,
        ))
    }

    fn restore(&self, batch: EventBatch, failed_attempts: Vec<u32>) {
        let max_retries = self.inner.settings.max_batch_retries;
        let mut queue = self.queue();

        let mut restored = 0usize;
        let mut abandoned = 0u64;
        for (event, attempts) in batch.events.into_iter().zip(failed_attempts).rev() {
            let attempts = attempts.saturating_add(1);
            if attempts > max_retries {
                abandoned += 1;
                continue;
            }
            queue.push_front(QueuedEvent {
                event,
                failed_attempts: attempts,
            });
            restored += 1;
        }

        // The restored batch keeps its place; overflow sheds the oldest entries queued behind it.
        let mut evicted = 0u64;
        while queue.len() > self.inner.settings.max_queue_size && queue.len() > restored {
            queue.remove(restored);
            evicted += 1;
        }
        drop(queue);

        if evicted > 0 {
            self.inner.dropped.fetch_add(evicted, Ordering::SeqCst);
        }
        if abandoned > 0 {
            self.inner.abandoned.fetch_add(abandoned, Ordering::SeqCst);
            self.inner.logger.debug(format!(
                "abandoned {abandoned} event(s) after {max_retries} retries"
            ));
        }
        self.inner.logger.debug(format!(
            "re-queued {restored} event(s) after failed delivery; evicted {evicted}"
        ));
    }

    /// Stops full-batch background flushes. Explicit [`EventTracker::flush`] calls still work.
    pub fn stop_background(&self) {
        self.inner.background_enabled.store(false, Ordering::SeqCst);
    }

    pub fn background_enabled(&self) -> bool {
        self.inner.background_enabled.load(Ordering::SeqCst)
    }

    /// Spawns one background task that drains full batches. A task already scheduled or running
    /// covers later calls.
    fn schedule_flush(&self) {
        if !self.background_enabled() {
            return;
        }
        if self
            .inner
            .flush_scheduled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let tracker = self.clone();
        runtime::spawn_detached(async move {
            let drained = tracker.drain_full_batches().await;
            tracker.inner.flush_scheduled.store(false, Ordering::SeqCst);
            // A batch may have filled up between the last check and clearing the flag.
            if drained && tracker.has_full_batch() {
                tracker.schedule_flush();
            }
        });
    }

    /// Flushes while a full batch is queued. Returns `false` if a flush did not deliver.
    async fn drain_full_batches(&self) -> bool {
        while self.has_full_batch() {
            if self.try_flush().await != FlushOutcome::Delivered {
                log::debug!("analytics full-batch flush did not deliver");
                return false;
            }
        }
        true
    }

    fn has_full_batch(&self) -> bool {
        self.background_enabled() && self.queue_len() >= self.inner.settings.batch_size
    }

    /// Starts the periodic flush loop. The loop ends when the returned timer is cancelled or
    /// dropped.
    pub fn spawn_periodic_flush(&self, interval: Duration) -> FlushTimer {
        let (stop_tx, stop_rx) = async_channel::bounded(1);
        let tracker = self.clone();
        runtime::spawn_detached(run_periodic_flush(tracker, interval, stop_rx));
        FlushTimer { stop: stop_tx }
    }

    pub fn queue_status(&self) -> QueueStatus {
        QueueStatus {
            queue_size: self.queue().len(),
            max_queue_size: self.inner.settings.max_queue_size,
            is_processing: self.is_processing(),
            batch_size: self.inner.settings.batch_size,
            dropped_events: self.inner.dropped.load(Ordering::SeqCst),
            abandoned_events: self.inner.abandoned.load(Ordering::SeqCst),
        }
    }

    pub fn queue_len(&self) -> usize {
        self.queue().len()
    }

    pub fn is_processing(&self) -> bool {
        self.inner.is_processing.load(Ordering::SeqCst)
    }

    /// Snapshot of the queued events, oldest first.
    pub fn queued_events(&self) -> Vec<Event> {
        self.queue().iter().map(|entry| entry.event.clone()).collect()
    }

    /// Drops everything queued and returns how many events were discarded.
    pub fn clear(&self) -> usize {
        let mut queue = self.queue();
        let cleared = queue.len();
        queue.clear();
        cleared
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<QueuedEvent>> {
        self.inner
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

async fn run_periodic_flush(tracker: EventTracker, interval: Duration, stop: Receiver<()>) {
    loop {
        let tick = Box::pin(runtime::sleep(interval));
        let stopped = Box::pin(stop.recv());
        match select(tick, stopped).await {
            Either::Left(_) => {
                if tracker.queue_len() > 0 && !tracker.flush().await {
                    log::debug!("analytics periodic flush did not deliver");
                }
            }
            Either::Right(_) => break,
        }
    }
    tracker.inner.logger.debug("periodic flush stopped");
}

/// Handle to the periodic flush loop.
#[derive(Debug)]
pub struct FlushTimer {
    stop: Sender<()>,
}

impl FlushTimer {
    pub fn cancel(&self) {
        self.stop.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.stop.is_closed()
    }
}

impl Drop for FlushTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::analytics::event::params;
    use crate::test_support::ScriptedTransport;

    fn identity() -> IdentityContext {
        IdentityContext {
            client_id: "client".into(),
            session_id: "session".into(),
        }
    }

    fn tracker_with(settings: TrackerSettings) -> (EventTracker, ScriptedTransport) {
        let transport = ScriptedTransport::default();
        let logger = Logger::new("@telemetry/tracker-test");
        logger.set_console_enabled(false);
        let tracker = EventTracker::new(settings, Arc::new(transport.clone()), logger);
        (tracker, transport)
    }

    fn settings(max_queue_size: usize, batch_size: usize) -> TrackerSettings {
        TrackerSettings {
            max_queue_size,
            batch_size,
            flush_on_full_batch: false,
            ..Default::default()
        }
    }

    fn track(tracker: &EventTracker, name: &str) -> bool {
        tracker.track_event(name, EventParams::new(), &identity(), 0)
    }

    fn queued_names(tracker: &EventTracker) -> Vec<String> {
        tracker
            .queued_events()
            .into_iter()
            .map(|event| event.name)
            .collect()
    }

    #[test]
    fn valid_events_grow_the_queue_by_one() {
        let (tracker, _) = tracker_with(settings(100, 10));
        for (index, name) in ["page_view", "_internal", "click2"].iter().enumerate() {
            assert!(track(&tracker, name));
            assert_eq!(tracker.queue_status().queue_size, index + 1);
        }
    }

    #[test]
    fn invalid_names_are_rejected_without_side_effects() {
        let (tracker, _) = tracker_with(settings(2, 1));
        assert!(track(&tracker, "a"));
        assert!(track(&tracker, "b"));
        for name in ["", "9lives", "has space", "tab\tname"] {
            assert!(!track(&tracker, name));
        }
        let status = tracker.queue_status();
        assert_eq!(status.queue_size, 2);
        assert_eq!(status.dropped_events, 0);
        assert_eq!(queued_names(&tracker), ["a", "b"]);
    }

    #[test]
    fn invalid_params_are_rejected() {
        let (tracker, _) = tracker_with(settings(10, 5));
        let accepted = tracker.track_event("ok", params([("bad key", 1)]), &identity(), 0);
        assert!(!accepted);
        assert_eq!(tracker.queue_len(), 0);
    }

    #[test]
    fn overflow_evicts_oldest_first() {
        let (tracker, _) = tracker_with(settings(5, 2));
        for index in 0..8 {
            assert!(track(&tracker, &format!("event_{index}")));
        }
        let status = tracker.queue_status();
        assert_eq!(status.queue_size, 5);
        assert_eq!(status.dropped_events, 3);
        assert_eq!(
            queued_names(&tracker),
            ["event_3", "event_4", "event_5", "event_6", "event_7"]
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn successful_flush_removes_one_batch() {
        let (tracker, transport) = tracker_with(settings(100, 3));
        for index in 0..5 {
            track(&tracker, &format!("event_{index}"));
        }

        assert!(tracker.flush().await);
        assert_eq!(tracker.queue_len(), 2);
        assert!(tracker.flush().await);
        assert_eq!(tracker.queue_len(), 0);
        assert_eq!(
            transport.sent_event_names(),
            ["event_0", "event_1", "event_2", "event_3", "event_4"]
        );
        assert!(!tracker.is_processing());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn flushing_an_empty_queue_skips_the_transport() {
        let (tracker, transport) = tracker_with(settings(10, 3));
        assert!(tracker.flush().await);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn failed_flush_restores_batch_in_order() {
        let (tracker, transport) = tracker_with(settings(10, 3));
        for index in 0..4 {
            track(&tracker, &format!("event_{index}"));
        }
        transport.fail_next(1);

        assert!(!tracker.flush().await);
        assert_eq!(
            queued_names(&tracker),
            ["event_0", "event_1", "event_2", "event_3"]
        );
        assert!(!tracker.is_processing());

        assert!(tracker.flush().await);
        assert_eq!(queued_names(&tracker), ["event_3"]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn restored_batch_outranks_newer_entries_when_full() {
        let (tracker, transport) = tracker_with(settings(4, 2));
        for index in 0..4 {
            track(&tracker, &format!("event_{index}"));
        }
        let release = transport.hold_next();
        transport.fail_next(1);

        let in_flight = tokio::spawn({
            let tracker = tracker.clone();
            async move { tracker.flush().await }
        });
        transport.wait_until_entered().await;

        // Two slots freed by the in-flight batch, then three more arrivals.
        for index in 4..7 {
            track(&tracker, &format!("event_{index}"));
        }
        assert_eq!(
            queued_names(&tracker),
            ["event_3", "event_4", "event_5", "event_6"]
        );

        release.send(()).await.unwrap();
        assert!(!in_flight.await.unwrap());

        assert_eq!(
            queued_names(&tracker),
            ["event_0", "event_1", "event_5", "event_6"]
        );
        assert_eq!(tracker.queue_status().dropped_events, 3);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn concurrent_flush_is_refused() {
        let (tracker, transport) = tracker_with(settings(10, 2));
        for index in 0..5 {
            track(&tracker, &format!("event_{index}"));
        }
        let release = transport.hold_next();

        let in_flight = tokio::spawn({
            let tracker = tracker.clone();
            async move { tracker.flush().await }
        });
        transport.wait_until_entered().await;

        assert!(tracker.queue_status().is_processing);
        let before = queued_names(&tracker);
        assert!(!tracker.flush().await);
        assert_eq!(queued_names(&tracker), before);
        assert_eq!(before.len(), 3);

        release.send(()).await.unwrap();
        assert!(in_flight.await.unwrap());
        assert!(!tracker.is_processing());
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn events_are_abandoned_after_retry_ceiling() {
        let (tracker, transport) = tracker_with(TrackerSettings {
            max_batch_retries: 2,
            ..settings(10, 5)
        });
        track(&tracker, "poisoned");
        transport.fail_next(3);

        assert!(!tracker.flush().await);
        assert!(!tracker.flush().await);
        assert_eq!(tracker.queue_len(), 1);
        assert!(!tracker.flush().await);

        let status = tracker.queue_status();
        assert_eq!(status.queue_size, 0);
        assert_eq!(status.abandoned_events, 1);
        assert_eq!(transport.sent().len(), 3);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn batches_never_mix_sessions() {
        let (tracker, transport) = tracker_with(settings(10, 5));
        let first = identity();
        let second = IdentityContext {
            session_id: "session-2".into(),
            ..identity()
        };
        tracker.track_event("a", EventParams::new(), &first, 0);
        tracker.track_event("b", EventParams::new(), &first, 1);
        tracker.track_event("c", EventParams::new(), &second, 2);

        assert!(tracker.flush().await);
        assert!(tracker.flush().await);

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].session_id, "session");
        assert_eq!(sent[0].len(), 2);
        assert_eq!(sent[1].session_id, "session-2");
        assert_eq!(sent[1].len(), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn session_boundary_shortens_a_batch() {
        let (tracker, transport) = tracker_with(settings(10, 3));
        let rolled = IdentityContext {
            session_id: "session-2".into(),
            ..identity()
        };
        tracker.track_event("before", EventParams::new(), &identity(), 0);
        for (offset, name) in ["after_1", "after_2", "after_3"].into_iter().enumerate() {
            tracker.track_event(name, EventParams::new(), &rolled, 1 + offset as i64);
        }

        assert!(tracker.flush().await);
        assert_eq!(tracker.queue_len(), 3);
        assert!(tracker.flush().await);
        assert_eq!(tracker.queue_len(), 0);

        let sizes: Vec<usize> = transport.sent().iter().map(EventBatch::len).collect();
        assert_eq!(sizes, [1, 3]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn busy_flush_is_reported_apart_from_failure() {
        let (tracker, transport) = tracker_with(settings(10, 5));
        track(&tracker, "held");
        let release = transport.hold_next();

        let background = tracker.clone();
        let in_flight = tokio::spawn(async move { background.try_flush().await });
        transport.wait_until_entered().await;

        assert_eq!(tracker.try_flush().await, FlushOutcome::Busy);
        release.send(()).await.unwrap();
        assert_eq!(in_flight.await.unwrap(), FlushOutcome::Delivered);

        track(&tracker, "rejected");
        transport.fail_next(1);
        assert_eq!(tracker.try_flush().await, FlushOutcome::Failed);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn burst_schedules_a_single_background_flush() {
        let (tracker, transport) = tracker_with(TrackerSettings {
            flush_on_full_batch: true,
            ..settings(10, 2)
        });
        for index in 0..5 {
            track(&tracker, &format!("event_{index}"));
        }

        for _ in 0..50 {
            if tracker.queue_len() < 2 && !tracker.is_processing() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        let sizes: Vec<usize> = transport.sent().iter().map(EventBatch::len).collect();
        assert_eq!(sizes, [2, 2]);
        assert_eq!(queued_names(&tracker), ["event_4"]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn stopped_background_leaves_full_batches_queued() {
        let (tracker, transport) = tracker_with(TrackerSettings {
            flush_on_full_batch: true,
            ..settings(10, 2)
        });
        tracker.stop_background();
        assert!(!tracker.background_enabled());
        track(&tracker, "a");
        track(&tracker, "b");
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(transport.sent().is_empty());
        assert_eq!(tracker.queue_len(), 2);
        assert!(tracker.flush().await);
        assert_eq!(transport.sent_event_names(), ["a", "b"]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn full_batch_triggers_background_flush() {
        let (tracker, transport) = tracker_with(TrackerSettings {
            flush_on_full_batch: true,
            ..settings(10, 2)
        });
        track(&tracker, "a");
        track(&tracker, "b");

        for _ in 0..50 {
            if tracker.queue_len() == 0 && !tracker.is_processing() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(tracker.queue_len(), 0);
        assert_eq!(transport.sent_event_names(), ["a", "b"]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn periodic_flush_runs_until_cancelled() {
        let (tracker, transport) = tracker_with(settings(10, 5));
        track(&tracker, "tick");
        let timer = tracker.spawn_periodic_flush(Duration::from_millis(10));

        for _ in 0..50 {
            if tracker.queue_len() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(transport.sent_event_names(), ["tick"]);

        timer.cancel();
        assert!(timer.is_cancelled());
        tokio::time::sleep(Duration::from_millis(20)).await;
        track(&tracker, "after_cancel");
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(tracker.queue_len(), 1);
    }

    #[test]
    fn clear_discards_queue() {
        let (tracker, _) = tracker_with(settings(10, 5));
        track(&tracker, "a");
        track(&tracker, "b");
        assert_eq!(tracker.clear(), 2);
        assert_eq!(tracker.queue_len(), 0);
    }
}
