use std::sync::{Mutex, PoisonError};

use uuid::Uuid;

use crate::analytics::constants::CLIENT_ID_KEY;
use crate::logger::Logger;
use crate::platform::storage::KeyValueStoreHandle;

#[derive(Clone, Debug)]
struct ResolvedClientId {
    value: String,
    ephemeral: bool,
}

/// Owns the long-lived client identifier for this installation.
pub struct IdentityStore {
    store: KeyValueStoreHandle,
    logger: Logger,
    cached: Mutex<Option<ResolvedClientId>>,
    creation: async_lock::Mutex<()>,
}

impl IdentityStore {
    pub fn new(store: KeyValueStoreHandle, logger: Logger) -> Self {
        Self {
            store,
            logger,
            cached: Mutex::new(None),
            creation: async_lock::Mutex::new(()),
        }
    }

    /// Returns the persisted client id, creating and persisting one on first use.
    ///
    /// When storage cannot be read or written the id only lives as long as this process; the
    /// fallback is logged as a warning and tracking continues.
    pub async fn get_or_create_client_id(&self) -> String {
        if let Some(resolved) = self.cached() {
            return resolved.value;
        }

        let _creation = self.creation.lock().await;
        if let Some(resolved) = self.cached() {
            return resolved.value;
        }

        let resolved = self.resolve().await;
        *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = Some(resolved.clone());
        resolved.value
    }

    pub fn cached_client_id(&self) -> Option<String> {
        self.cached().map(|resolved| resolved.value)
    }

    /// Whether the current id is a process-lifetime fallback rather than a persisted value.
    pub fn is_ephemeral(&self) -> bool {
        self.cached().is_some_and(|resolved| resolved.ephemeral)
    }

    /// Forgets the client id in memory and in storage. The next call mints a new one.
    pub async fn reset(&self) {
        let _creation = self.creation.lock().await;
        self.cached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Err(err) = self.store.remove(CLIENT_ID_KEY).await {
            self.logger
                .warn(format!("failed to clear persisted client id: {err}"));
        }
    }

    fn cached(&self) -> Option<ResolvedClientId> {
        self.cached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn resolve(&self) -> ResolvedClientId {
        match self.store.get(CLIENT_ID_KEY).await {
            Ok(Some(existing)) if !existing.trim().is_empty() => {
                self.logger
                    .debug(format!("loaded persisted client id {existing}"));
                return ResolvedClientId {
                    value: existing,
                    ephemeral: false,
                };
            }
            Ok(_) => {}
            Err(err) => {
                let value = generate_client_id();
                self.logger.warn(format!(
                    "client id storage unavailable ({err}); using process-lifetime id {value}"
                ));
                return ResolvedClientId {
                    value,
                    ephemeral: true,
                };
            }
        }

        let value = generate_client_id();
        match self.store.set(CLIENT_ID_KEY, &value).await {
            Ok(()) => {
                self.logger.debug(format!("minted client id {value}"));
                ResolvedClientId {
                    value,
                    ephemeral: false,
                }
            }
            Err(err) => {
                self.logger.warn(format!(
                    "failed to persist client id ({err}); using process-lifetime id {value}"
                ));
                ResolvedClientId {
                    value,
                    ephemeral: true,
                }
            }
        }
    }
}

/// Random RFC 4122 version 4 UUID in hyphenated form.
pub(crate) fn generate_client_id() -> String {
    Uuid::new_v4().to_string()
}
