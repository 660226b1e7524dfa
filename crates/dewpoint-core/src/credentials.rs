//! Credential gateway over the external key-value store.
//!
//! Each device address keys a small hash of fields: the signal strength
//! recorded at discovery, and the `channelId`/`writeKey` pair a companion
//! tool writes once the device has been claimed. Fields may change between
//! cycles at any time, so the gateway re-reads the store on every lookup.
//! A missing field is a valid, non-error result.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

/// Field holding the last-seen signal strength.
pub const FIELD_RSSI: &str = "rssi";
/// Field holding the telemetry channel identifier.
pub const FIELD_CHANNEL_ID: &str = "channelId";
/// Field holding the telemetry write key.
pub const FIELD_WRITE_KEY: &str = "writeKey";

/// The key-value store failed.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("store i/o: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file holds invalid data.
    #[error("store serialization: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Minimal hash-per-key store interface.
///
/// Keys are device addresses; last-write-wins, no transactions.
#[async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
    /// Set one field of the hash at `key`.
    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError>;

    /// Read all fields of the hash at `key`. Missing keys yield an empty map.
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;
}

/// Publish credentials for one device. Either field may be absent until the
/// device has been configured externally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Telemetry channel identifier.
    pub channel_id: Option<String>,
    /// Telemetry write key.
    pub write_key: Option<String>,
}

impl Credentials {
    /// Returns both fields when the device is fully configured.
    #[must_use]
    pub fn into_complete(self) -> Option<(String, String)> {
        match (self.channel_id, self.write_key) {
            (Some(channel_id), Some(write_key)) => Some((channel_id, write_key)),
            _ => None,
        }
    }

    /// Returns `true` when both fields are present.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.channel_id.is_some() && self.write_key.is_some()
    }
}

/// Resolves device addresses to publish credentials and records discovery
/// metadata.
pub struct CredentialGateway {
    store: Arc<dyn KeyValueStore>,
}

impl CredentialGateway {
    /// Wrap the external store.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Look up the credentials for `address`.
    ///
    /// Empty-string fields count as absent, matching what the companion
    /// form writes for unconfigured devices.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] only for store failures; absent fields are a
    /// normal result.
    pub async fn lookup(&self, address: &str) -> Result<Credentials, StoreError> {
        let fields = self.store.hash_get_all(address).await?;
        Ok(Credentials {
            channel_id: non_empty(fields.get(FIELD_CHANNEL_ID)),
            write_key: non_empty(fields.get(FIELD_WRITE_KEY)),
        })
    }

    /// Record the signal strength observed at discovery.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store write fails.
    pub async fn store_signal(&self, address: &str, rssi: i16) -> Result<(), StoreError> {
        self.store
            .hash_set(address, FIELD_RSSI, &rssi.to_string())
            .await
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.is_empty()).cloned()
}

/// In-memory store, used in tests and deployments without persistence.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, HashMap<String, String>>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        entries
            .entry(key.to_owned())
            .or_default()
            .insert(field.to_owned(), value.to_owned());
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let entries = self.entries.lock().await;
        Ok(entries.get(key).cloned().unwrap_or_default())
    }
}

/// JSON-file-backed store.
///
/// One flat file holding every device hash; small enough that rewriting the
/// whole file per update is fine. Concurrent writers go through the mutex.
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Use (or create on first write) the file at `path`.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<HashMap<String, HashMap<String, String>>, StoreError> {
        if self.path.exists() {
            let content = std::fs::read_to_string(&self.path)?;
            Ok(serde_json::from_str(&content)?)
        } else {
            Ok(HashMap::new())
        }
    }

    fn save(&self, entries: &HashMap<String, HashMap<String, String>>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load()?;
        entries
            .entry(key.to_owned())
            .or_default()
            .insert(field.to_owned(), value.to_owned());
        self.save(&entries)
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        Ok(self.load()?.get(key).cloned().unwrap_or_default())
    }
}
