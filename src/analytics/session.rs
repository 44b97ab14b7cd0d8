use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analytics::constants::SESSION_KEY;
use crate::logger::Logger;
use crate::platform::clock::ClockHandle;
use crate::platform::storage::KeyValueStoreHandle;

/// A window of related activity. Times are milliseconds since the UNIX epoch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub started_at: i64,
    pub last_activity_at: i64,
}

impl Session {
    fn start(now_ms: i64) -> Self {
        Self {
            session_id: generate_session_id(),
            started_at: now_ms,
            last_activity_at: now_ms,
        }
    }

    /// A session stays reusable while `now - last_activity_at < timeout`.
    pub fn is_active_at(&self, now_ms: i64, timeout: Duration) -> bool {
        let timeout_ms = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
        now_ms.saturating_sub(self.last_activity_at) < timeout_ms
    }
}

/// Derives the session identifier, rolling it over after a period of inactivity.
///
/// The in-memory session is authoritative once loaded; storage is consulted on cold start only.
/// Every read-modify-write runs under `turn`, so concurrent callers observe a single session.
pub struct SessionManager {
    store: KeyValueStoreHandle,
    clock: ClockHandle,
    logger: Logger,
    timeout: Duration,
    current: Mutex<Option<Session>>,
    turn: async_lock::Mutex<()>,
}

impl SessionManager {
    pub fn new(
        store: KeyValueStoreHandle,
        clock: ClockHandle,
        logger: Logger,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            logger,
            timeout,
            current: Mutex::new(None),
            turn: async_lock::Mutex::new(()),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the active session id, extending its inactivity window, or mints a new session
    /// when none exists or the previous one has expired.
    pub async fn get_or_create_session_id(&self) -> String {
        let _turn = self.turn.lock().await;
        let now = self.clock.now_millis();

        let existing = match self.current_session() {
            Some(session) => Some(session),
            None => self.load().await,
        };

        let session = match existing {
            Some(mut session) if session.is_active_at(now, self.timeout) => {
                session.last_activity_at = now;
                session
            }
            Some(expired) => {
                let session = Session::start(now);
                self.logger.debug(format!(
                    "session {} expired after inactivity; started {}",
                    expired.session_id, session.session_id
                ));
                session
            }
            None => {
                let session = Session::start(now);
                self.logger
                    .debug(format!("started session {}", session.session_id));
                session
            }
        };

        self.persist(&session).await;
        let session_id = session.session_id.clone();
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(session);
        session_id
    }

    /// Snapshot of the in-memory session. Does not count as activity.
    pub fn current_session(&self) -> Option<Session> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn load(&self) -> Option<Session> {
        match self.store.get(SESSION_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str::<Session>(&raw) {
                Ok(session) => Some(session),
                Err(err) => {
                    self.logger
                        .debug(format!("ignoring unreadable session record: {err}"));
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                self.logger
                    .warn(format!("session storage unavailable: {err}"));
                None
            }
        }
    }

    async fn persist(&self, session: &Session) {
        let encoded = match serde_json::to_string(session) {
            Ok(encoded) => encoded,
            Err(err) => {
                self.logger
                    .warn(format!("failed to encode session record: {err}"));
                return;
            }
        };
        if let Err(err) = self.store.set(SESSION_KEY, &encoded).await {
            self.logger.warn(format!(
                "failed to persist session {}: {err}; keeping it in memory",
                session.session_id
            ));
        }
    }
}

fn generate_session_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::platform::clock::{Clock, ManualClock};
    use crate::platform::storage::{KeyValueStore, MemoryStore};
    use std::sync::Arc;

    const THIRTY_MINUTES: Duration = Duration::from_secs(30 * 60);

    fn manager(store: &MemoryStore, clock: &Arc<ManualClock>) -> SessionManager {
        let logger = Logger::new("@telemetry/session-test");
        logger.set_console_enabled(false);
        SessionManager::new(
            Arc::new(store.clone()),
            clock.clone(),
            logger,
            THIRTY_MINUTES,
        )
    }

    #[tokio::test(flavor = "current_thread")]
    async fn reuses_session_within_timeout() {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let sessions = manager(&store, &clock);

        let first = sessions.get_or_create_session_id().await;
        clock.advance(Duration::from_secs(5 * 60));
        let second = sessions.get_or_create_session_id().await;

        assert_eq!(first, second);
        assert_eq!(first.len(), 32);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        let session = sessions.current_session().unwrap();
        assert_eq!(session.started_at, 1_700_000_000_000);
        assert_eq!(session.last_activity_at, 1_700_000_300_000);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn rolls_over_after_inactivity() {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let sessions = manager(&store, &clock);

        let first = sessions.get_or_create_session_id().await;
        clock.advance(Duration::from_secs(31 * 60));
        let second = sessions.get_or_create_session_id().await;

        assert_ne!(first, second);
        assert_eq!(
            sessions.current_session().unwrap().started_at,
            clock.now_millis()
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn activity_extends_the_window() {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(0));
        let sessions = manager(&store, &clock);

        let first = sessions.get_or_create_session_id().await;
        for _ in 0..4 {
            clock.advance(Duration::from_secs(20 * 60));
            assert_eq!(sessions.get_or_create_session_id().await, first);
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn expiry_boundary_is_exclusive() {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(0));
        let sessions = manager(&store, &clock);

        let first = sessions.get_or_create_session_id().await;
        clock.advance(THIRTY_MINUTES);
        assert_ne!(sessions.get_or_create_session_id().await, first);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn cold_start_resumes_persisted_session() {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(0));
        let first = manager(&store, &clock).get_or_create_session_id().await;

        clock.advance(Duration::from_secs(60));
        let resumed = manager(&store, &clock).get_or_create_session_id().await;
        assert_eq!(first, resumed);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn corrupt_record_starts_fresh_session() {
        let store = MemoryStore::new();
        store.set(SESSION_KEY, "{not json").await.unwrap();
        let clock = Arc::new(ManualClock::new(0));
        let sessions = manager(&store, &clock);

        let id = sessions.get_or_create_session_id().await;
        assert_eq!(id.len(), 32);
        let persisted: Session =
            serde_json::from_str(&store.get(SESSION_KEY).await.unwrap().unwrap()).unwrap();
        assert_eq!(persisted.session_id, id);
    }
}
