use std::collections::HashMap;
#[cfg(not(target_arch = "wasm32"))]
use std::fs;
#[cfg(not(target_arch = "wasm32"))]
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

#[cfg(not(target_arch = "wasm32"))]
use percent_encoding::{percent_encode, NON_ALPHANUMERIC};

use crate::analytics::error::AnalyticsResult;
#[cfg(any(not(target_arch = "wasm32"), feature = "wasm-web"))]
use crate::analytics::error::storage_error;

/// Key-value persistence used for the client identifier and the session record.
///
/// Implementations must be read-after-write consistent within one process.
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> AnalyticsResult<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> AnalyticsResult<()>;
    async fn remove(&self, key: &str) -> AnalyticsResult<()>;
}

pub type KeyValueStoreHandle = Arc<dyn KeyValueStore>;

/// Process-local store. Values vanish with the process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> AnalyticsResult<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> AnalyticsResult<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> AnalyticsResult<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// Stores each key in its own file under a base directory.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Clone, Debug)]
pub struct FileStore {
    base_dir: Arc<PathBuf>,
}

#[cfg(not(target_arch = "wasm32"))]
impl FileStore {
    pub fn new(base_dir: PathBuf) -> AnalyticsResult<Self> {
        fs::create_dir_all(&base_dir).map_err(|err| {
            storage_error(format!(
                "Failed to create telemetry storage directory '{}': {}",
                base_dir.display(),
                err
            ))
        })?;
        Ok(Self {
            base_dir: Arc::new(base_dir),
        })
    }

    /// Uses `TELEMETRY_STORAGE_DIR` when set, otherwise `./.telemetry`.
    pub fn from_env() -> AnalyticsResult<Self> {
        if let Ok(dir) = std::env::var("TELEMETRY_STORAGE_DIR") {
            return Self::new(PathBuf::from(dir));
        }

        let dir = std::env::current_dir()
            .map_err(|err| storage_error(format!("Failed to obtain working directory: {err}")))?
            .join(".telemetry");
        Self::new(dir)
    }

    fn file_for(&self, key: &str) -> PathBuf {
        let encoded = percent_encode(key.as_bytes(), NON_ALPHANUMERIC).to_string();
        self.base_dir.join(format!("{encoded}.json"))
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[async_trait::async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> AnalyticsResult<Option<String>> {
        let path = self.file_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path).map_err(|err| {
            storage_error(format!(
                "Failed to read telemetry storage '{}': {}",
                path.display(),
                err
            ))
        })?;
        Ok(Some(contents))
    }

    async fn set(&self, key: &str, value: &str) -> AnalyticsResult<()> {
        let path = self.file_for(key);
        fs::write(&path, value).map_err(|err| {
            storage_error(format!(
                "Failed to write telemetry storage '{}': {}",
                path.display(),
                err
            ))
        })
    }

    async fn remove(&self, key: &str) -> AnalyticsResult<()> {
        let path = self.file_for(key);
        if path.exists() {
            fs::remove_file(&path).map_err(|err| {
                storage_error(format!(
                    "Failed to delete telemetry storage '{}': {}",
                    path.display(),
                    err
                ))
            })?;
        }
        Ok(())
    }
}

/// Browser `localStorage` backed store.
#[cfg(all(feature = "wasm-web", target_arch = "wasm32"))]
#[derive(Clone, Debug, Default)]
pub struct LocalStorageStore;

#[cfg(all(feature = "wasm-web", target_arch = "wasm32"))]
impl LocalStorageStore {
    fn storage() -> AnalyticsResult<web_sys::Storage> {
        let window = web_sys::window().ok_or_else(|| storage_error("window is not available"))?;
        window
            .local_storage()
            .map_err(|err| storage_error(format!("localStorage access failed: {err:?}")))?
            .ok_or_else(|| storage_error("localStorage is not available"))
    }
}

#[cfg(all(feature = "wasm-web", target_arch = "wasm32"))]
#[async_trait::async_trait(?Send)]
impl KeyValueStore for LocalStorageStore {
    async fn get(&self, key: &str) -> AnalyticsResult<Option<String>> {
        Self::storage()?
            .get_item(key)
            .map_err(|err| storage_error(format!("localStorage read failed: {err:?}")))
    }

    async fn set(&self, key: &str, value: &str) -> AnalyticsResult<()> {
        Self::storage()?
            .set_item(key, value)
            .map_err(|err| storage_error(format!("localStorage write failed: {err:?}")))
    }

    async fn remove(&self, key: &str) -> AnalyticsResult<()> {
        Self::storage()?
            .remove_item(key)
            .map_err(|err| storage_error(format!("localStorage delete failed: {err:?}")))
    }
}

/// Picks the durable store for the current target, falling back to [`MemoryStore`].
pub fn default_store() -> KeyValueStoreHandle {
    #[cfg(all(feature = "wasm-web", target_arch = "wasm32"))]
    {
        return Arc::new(LocalStorageStore);
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        match FileStore::from_env() {
            Ok(store) => return Arc::new(store),
            Err(err) => log::warn!("falling back to in-memory telemetry storage: {err}"),
        }
    }

    #[allow(unreachable_code)]
    Arc::new(MemoryStore::new())
}
