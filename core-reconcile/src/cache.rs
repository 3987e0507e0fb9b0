//! # Metadata Cache
//!
//! Persists the OneDrive inventory between runs so repeated reconciliations
//! don't re-list a large camera roll. Only OneDrive is cached; Immich is
//! always fetched live because it is the side that changes between runs.
//!
//! Storage goes through [`CacheStore`]. [`FileCacheStore`] writes a temporary
//! sibling file and renames it over the target, so an interrupted save leaves
//! either the previous snapshot or the new one, never a mix of both.
//! [`MemoryCacheStore`] keeps the bytes in memory for tests and dry runs.

use async_trait::async_trait;
use bridge_traits::{FileSystemAccess, Inventory, InventoryOrigin};
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{ReconcileError, Result};

/// Snapshot layout version written by this build
pub const CACHE_FORMAT_VERSION: u32 = 1;

fn default_format_version() -> u32 {
    CACHE_FORMAT_VERSION
}

/// A persisted OneDrive inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    /// When the snapshot was written
    pub saved_at: DateTime<Utc>,
    pub inventory: Inventory,
}

impl CacheSnapshot {
    pub fn new(inventory: Inventory, saved_at: DateTime<Utc>) -> Self {
        Self {
            format_version: CACHE_FORMAT_VERSION,
            saved_at,
            inventory,
        }
    }

    /// Time elapsed since the inventory was fetched. Never negative.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.inventory.fetched_at()).max(Duration::zero())
    }

    fn from_bytes(data: &[u8]) -> Result<Self> {
        let snapshot: CacheSnapshot = serde_json::from_slice(data)
            .map_err(|e| ReconcileError::CacheCorrupt(e.to_string()))?;

        if snapshot.format_version > CACHE_FORMAT_VERSION {
            return Err(ReconcileError::CacheCorrupt(format!(
                "unsupported format version {} (this build reads up to {})",
                snapshot.format_version, CACHE_FORMAT_VERSION
            )));
        }

        if snapshot.inventory.origin() != InventoryOrigin::OneDrive {
            return Err(ReconcileError::CacheCorrupt(format!(
                "snapshot holds a {} inventory",
                snapshot.inventory.origin()
            )));
        }

        Ok(snapshot)
    }

    fn to_bytes(&self) -> Result<Bytes> {
        serde_json::to_vec_pretty(self)
            .map(Bytes::from)
            .map_err(|e| ReconcileError::CacheWrite(e.to_string()))
    }
}

/// Byte-level storage behind the metadata cache
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read the stored bytes, `None` when nothing has been saved
    async fn read(&self) -> Result<Option<Bytes>>;

    /// Replace the stored bytes. Either fully succeeds or leaves the
    /// previous contents untouched.
    async fn write_atomic(&self, data: Bytes) -> Result<()>;

    /// Remove any stored bytes
    async fn clear(&self) -> Result<()>;

    /// Human-readable location for log messages
    fn location(&self) -> String;
}

#[async_trait]
impl<T: CacheStore + ?Sized> CacheStore for Arc<T> {
    async fn read(&self) -> Result<Option<Bytes>> {
        (**self).read().await
    }

    async fn write_atomic(&self, data: Bytes) -> Result<()> {
        (**self).write_atomic(data).await
    }

    async fn clear(&self) -> Result<()> {
        (**self).clear().await
    }

    fn location(&self) -> String {
        (**self).location()
    }
}

/// Cache file on disk
pub struct FileCacheStore {
    fs: Arc<dyn FileSystemAccess>,
    path: PathBuf,
}

impl FileCacheStore {
    pub fn new(fs: Arc<dyn FileSystemAccess>, path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unique sibling used as the staging file for one save
    fn staging_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "cache".to_string());
        self.path
            .with_file_name(format!(".{}.{}.tmp", name, Uuid::new_v4().simple()))
    }

    async fn discard(&self, staging: &Path) {
        if let Err(e) = self.fs.remove_if_exists(staging).await {
            warn!(path = ?staging, error = %e, "Failed to remove cache staging file");
        }
    }
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn read(&self) -> Result<Option<Bytes>> {
        if !self.fs.exists(&self.path).await? {
            return Ok(None);
        }
        Ok(Some(self.fs.read_file(&self.path).await?))
    }

    async fn write_atomic(&self, data: Bytes) -> Result<()> {
        let staging = self.staging_path();

        if let Err(e) = self.fs.write_file(&staging, data).await {
            self.discard(&staging).await;
            return Err(ReconcileError::CacheWrite(e.to_string()));
        }

        if let Err(e) = self.fs.rename(&staging, &self.path).await {
            self.discard(&staging).await;
            return Err(ReconcileError::CacheWrite(e.to_string()));
        }

        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.fs.remove_if_exists(&self.path).await?;
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory cache store
#[derive(Default)]
pub struct MemoryCacheStore {
    data: Mutex<Option<Bytes>>,
    fail_writes: AtomicBool,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with raw bytes
    pub fn with_bytes(data: impl Into<Bytes>) -> Self {
        Self {
            data: Mutex::new(Some(data.into())),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make subsequent writes fail without touching the stored bytes
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn contents(&self) -> Option<Bytes> {
        self.data.lock().ok().and_then(|guard| guard.clone())
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn read(&self) -> Result<Option<Bytes>> {
        let guard = self
            .data
            .lock()
            .map_err(|_| ReconcileError::CacheCorrupt("memory store poisoned".to_string()))?;
        Ok(guard.clone())
    }

    async fn write_atomic(&self, data: Bytes) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ReconcileError::CacheWrite(
                "memory store rejects writes".to_string(),
            ));
        }
        let mut guard = self
            .data
            .lock()
            .map_err(|_| ReconcileError::CacheWrite("memory store poisoned".to_string()))?;
        *guard = Some(data);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut guard = self
            .data
            .lock()
            .map_err(|_| ReconcileError::CacheWrite("memory store poisoned".to_string()))?;
        *guard = None;
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

/// OneDrive inventory cache
///
/// Never expires on its own; whether to bypass it is the caller's decision.
pub struct MetadataCache<S: CacheStore> {
    store: S,
}

impl<S: CacheStore> MetadataCache<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Load the persisted snapshot
    ///
    /// Absent, unreadable or malformed data all yield `None`; the latter two
    /// are logged as warnings.
    #[instrument(skip(self), fields(location = %self.store.location()))]
    pub async fn load(&self) -> Option<CacheSnapshot> {
        let data = match self.store.read().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                debug!("No cached OneDrive inventory");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read OneDrive cache, ignoring it");
                return None;
            }
        };

        match CacheSnapshot::from_bytes(&data) {
            Ok(snapshot) => {
                info!(
                    records = snapshot.inventory.len(),
                    fetched_at = %snapshot.inventory.fetched_at(),
                    "Loaded OneDrive inventory from cache"
                );
                Some(snapshot)
            }
            Err(e) => {
                warn!(error = %e, "Ignoring unusable OneDrive cache");
                None
            }
        }
    }

    /// Persist a snapshot, replacing any previous one atomically
    #[instrument(skip(self, snapshot), fields(location = %self.store.location(), records = snapshot.inventory.len()))]
    pub async fn save(&self, snapshot: &CacheSnapshot) -> Result<()> {
        if snapshot.inventory.origin() != InventoryOrigin::OneDrive {
            return Err(ReconcileError::OriginMismatch {
                expected: InventoryOrigin::OneDrive,
                actual: snapshot.inventory.origin(),
            });
        }

        let data = snapshot.to_bytes()?;
        self.store.write_atomic(data).await?;
        debug!("Saved OneDrive inventory to cache");
        Ok(())
    }

    /// Remove the persisted snapshot
    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await
    }
}
