//! Persistent plugin repository.
//!
//! The runtime only needs keyed CRUD over [`PluginRecord`]s. Two stores are
//! provided: an in-memory map for tests and embedding, and a single JSON
//! file for standalone deployments. Both enforce `vendor/name` uniqueness
//! on [`create`](PluginRepository::create).

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::record::{PluginRecord, PluginStatus};
use crate::{PluginError, Result};

type Key = (String, String);

fn key(vendor: &str, name: &str) -> Key {
    (vendor.to_string(), name.to_string())
}

/// Keyed store of installed plugins.
#[async_trait]
pub trait PluginRepository: Send + Sync {
    /// Insert a new record. Fails with `AlreadyExists` on a duplicate key.
    async fn create(&self, record: PluginRecord) -> Result<()>;

    /// Look up a record by vendor and name.
    async fn find(&self, vendor: &str, name: &str) -> Result<Option<PluginRecord>>;

    /// Replace an existing record. Fails with `NotFound` if absent.
    async fn update(&self, record: &PluginRecord) -> Result<()>;

    /// Delete a record, returning whether it existed.
    async fn delete(&self, vendor: &str, name: &str) -> Result<bool>;

    /// All records ordered by vendor, then name.
    async fn list(&self) -> Result<Vec<PluginRecord>>;

    /// Records with a given status, ordered by vendor, then name.
    async fn find_by_status(&self, status: PluginStatus) -> Result<Vec<PluginRecord>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|r| r.status == status)
            .collect())
    }

    /// Check whether a record exists.
    async fn exists(&self, vendor: &str, name: &str) -> Result<bool> {
        Ok(self.find(vendor, name).await?.is_some())
    }
}

/// In-memory repository.
#[derive(Default)]
pub struct MemoryPluginRepository {
    records: RwLock<BTreeMap<Key, PluginRecord>>,
}

impl MemoryPluginRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PluginRepository for MemoryPluginRepository {
    async fn create(&self, record: PluginRecord) -> Result<()> {
        insert_unique(&mut *self.records.write().await, record)
    }

    async fn find(&self, vendor: &str, name: &str) -> Result<Option<PluginRecord>> {
        Ok(self.records.read().await.get(&key(vendor, name)).cloned())
    }

    async fn update(&self, record: &PluginRecord) -> Result<()> {
        replace_existing(&mut *self.records.write().await, record)
    }

    async fn delete(&self, vendor: &str, name: &str) -> Result<bool> {
        Ok(self
            .records
            .write()
            .await
            .remove(&key(vendor, name))
            .is_some())
    }

    async fn list(&self) -> Result<Vec<PluginRecord>> {
        Ok(self.records.read().await.values().cloned().collect())
    }
}

/// Repository persisted as one JSON array on disk.
///
/// Every mutation rewrites the file through a temporary sibling that is
/// fsynced and renamed into place. Writers are serialized in-process.
pub struct JsonPluginRepository {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonPluginRepository {
    /// Open (or lazily create) a repository file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<Key, PluginRecord>> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Ok(BTreeMap::new());
        }

        let content = tokio::fs::read_to_string(&self.path).await?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        let records: Vec<PluginRecord> = serde_json::from_str(&content).map_err(|e| {
            PluginError::Storage(format!("corrupt repository {}: {}", self.path.display(), e))
        })?;

        Ok(records
            .into_iter()
            .map(|r| (key(&r.vendor, &r.name), r))
            .collect())
    }

    async fn save(&self, records: &BTreeMap<Key, PluginRecord>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let records: Vec<&PluginRecord> = records.values().collect();
        let content = serde_json::to_string_pretty(&records)?;
        let tmp_path = self.path.with_extension("json.tmp");

        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp_path, &self.path).await?;

        // Persist the rename itself.
        #[cfg(unix)]
        {
            if let Err(e) = sync_parent_dir(&self.path).await {
                warn!(path = %self.path.display(), error = %e, "Failed to sync repository directory");
            }
        }

        debug!(path = %self.path.display(), count = records.len(), "Plugin repository saved");
        Ok(())
    }
}

#[async_trait]
impl PluginRepository for JsonPluginRepository {
    async fn create(&self, record: PluginRecord) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        insert_unique(&mut records, record)?;
        self.save(&records).await
    }

    async fn find(&self, vendor: &str, name: &str) -> Result<Option<PluginRecord>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(&key(vendor, name)))
    }

    async fn update(&self, record: &PluginRecord) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        replace_existing(&mut records, record)?;
        self.save(&records).await
    }

    async fn delete(&self, vendor: &str, name: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        let existed = records.remove(&key(vendor, name)).is_some();
        if existed {
            self.save(&records).await?;
        }
        Ok(existed)
    }

    async fn list(&self) -> Result<Vec<PluginRecord>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.into_values().collect())
    }
}

fn insert_unique(records: &mut BTreeMap<Key, PluginRecord>, record: PluginRecord) -> Result<()> {
    let k = key(&record.vendor, &record.name);
    if records.contains_key(&k) {
        return Err(PluginError::AlreadyExists(record.full_name()));
    }
    records.insert(k, record);
    Ok(())
}

#[cfg(unix)]
async fn sync_parent_dir(path: &Path) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    tokio::fs::File::open(parent).await?.sync_all().await
}

fn replace_existing(
    records: &mut BTreeMap<Key, PluginRecord>,
    record: &PluginRecord,
) -> Result<()> {
    match records.get_mut(&key(&record.vendor, &record.name)) {
        Some(existing) => {
            *existing = record.clone();
            Ok(())
        }
        None => Err(PluginError::NotFound(record.full_name())),
    }
}
