//! File based spec store
//!
//! Keeps one cloud spec per cluster under `.clusternet/clusters/<cluster>.json`.
//! The previous version of each file is kept as `<cluster>.json.backup`, and a
//! per-cluster lock file gives callers the exclusivity the provider expects.

use crate::error::{CloudError, Result};
use crate::naming;
use crate::provider::Checkpoint;
use crate::spec::CloudSpec;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

const STORE_VERSION: u32 = 1;
const STORE_DIR: &str = ".clusternet";
const CLUSTERS_DIR: &str = "clusters";
const LOCK_STALE_AFTER_HOURS: i64 = 1;

/// On-disk envelope around a cloud spec
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSpec {
    /// Store format version
    pub version: u32,

    pub cluster: String,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    pub spec: CloudSpec,
}

/// Spec store rooted at a project directory
pub struct SpecStore {
    root: PathBuf,
}

impl SpecStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn clusters_dir(&self) -> PathBuf {
        self.root.join(STORE_DIR).join(CLUSTERS_DIR)
    }

    fn spec_path(&self, cluster: &str) -> PathBuf {
        self.clusters_dir().join(format!("{}.json", cluster))
    }

    fn backup_path(&self, cluster: &str) -> PathBuf {
        self.clusters_dir().join(format!("{}.json.backup", cluster))
    }

    fn lock_path(&self, cluster: &str) -> PathBuf {
        self.clusters_dir().join(format!("{}.lock", cluster))
    }

    async fn ensure_dir(&self) -> Result<()> {
        let dir = self.clusters_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!("Created spec directory: {}", dir.display());
        }
        Ok(())
    }

    /// Load a cluster's spec, `None` if it was never saved
    pub async fn load(&self, cluster: &str) -> Result<Option<CloudSpec>> {
        naming::validate_cluster_name(cluster)?;

        let path = self.spec_path(cluster);
        if !path.exists() {
            tracing::debug!(cluster, "Spec file not found");
            return Ok(None);
        }

        let content = fs::read_to_string(&path).await?;
        let stored: StoredSpec = serde_json::from_str(&content)?;

        if stored.version > STORE_VERSION {
            return Err(CloudError::State(format!(
                "spec file version {} is newer than supported version {}",
                stored.version, STORE_VERSION
            )));
        }

        if stored.cluster != cluster {
            return Err(CloudError::State(format!(
                "spec file {} belongs to cluster {:?}",
                path.display(),
                stored.cluster
            )));
        }

        Ok(Some(stored.spec))
    }

    /// Save a cluster's spec, keeping the previous version as backup
    pub async fn save(&self, cluster: &str, spec: &CloudSpec) -> Result<()> {
        naming::validate_cluster_name(cluster)?;
        self.ensure_dir().await?;

        let path = self.spec_path(cluster);
        let backup = self.backup_path(cluster);

        if path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
        }

        let stored = StoredSpec {
            version: STORE_VERSION,
            cluster: cluster.to_string(),
            updated_at: Utc::now(),
            spec: spec.clone(),
        };
        let content = serde_json::to_string_pretty(&stored)?;
        fs::write(&path, content).await?;

        tracing::debug!(cluster, "Saved spec");
        Ok(())
    }

    /// Remove a cluster's spec and its backup
    pub async fn remove(&self, cluster: &str) -> Result<()> {
        naming::validate_cluster_name(cluster)?;

        for path in [self.spec_path(cluster), self.backup_path(cluster)] {
            if path.exists() {
                fs::remove_file(&path).await?;
            }
        }
        tracing::debug!(cluster, "Removed spec");
        Ok(())
    }

    /// Names of all clusters with a saved spec
    pub async fn list(&self) -> Result<Vec<String>> {
        let dir = self.clusters_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut clusters = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            if let Some(cluster) = file_name.to_str().and_then(|n| n.strip_suffix(".json")) {
                clusters.push(cluster.to_string());
            }
        }
        clusters.sort();
        Ok(clusters)
    }

    /// Checkpoint writing straight into this store
    pub fn checkpoint<'a>(&'a self, cluster: &str) -> StoreCheckpoint<'a> {
        StoreCheckpoint {
            store: self,
            cluster: cluster.to_string(),
        }
    }

    /// Acquire exclusive access to a cluster's spec
    ///
    /// The lock file is created with `create_new`, so two callers racing for
    /// the same cluster never both succeed. A lock older than
    /// `LOCK_STALE_AFTER_HOURS` is removed and taken over once.
    pub async fn acquire_lock(&self, cluster: &str) -> Result<SpecLock> {
        naming::validate_cluster_name(cluster)?;
        self.ensure_dir().await?;

        let lock_path = self.lock_path(cluster);
        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            acquired_at: Utc::now(),
        };
        let content = serde_json::to_string_pretty(&lock_info)?;

        if try_create_lock(&lock_path, &content).await? {
            tracing::debug!(cluster, "Acquired spec lock");
            return Ok(SpecLock {
                lock_path,
                released: false,
            });
        }

        let held = fs::read_to_string(&lock_path).await?;
        // A holder that has not finished writing yet leaves an unparsable file
        let holder = serde_json::from_str::<LockInfo>(&held).ok();
        match holder {
            Some(info)
                if Utc::now()
                    .signed_duration_since(info.acquired_at)
                    .num_hours()
                    >= LOCK_STALE_AFTER_HOURS =>
            {
                tracing::warn!(cluster, holder = %info.holder, "Removing stale lock");
                match fs::remove_file(&lock_path).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                if try_create_lock(&lock_path, &content).await? {
                    tracing::debug!(cluster, "Acquired spec lock");
                    return Ok(SpecLock {
                        lock_path,
                        released: false,
                    });
                }
                Err(CloudError::Lock(format!(
                    "cluster {} was locked by another caller while taking over a stale lock",
                    cluster
                )))
            }
            Some(info) => Err(CloudError::Lock(format!(
                "cluster {} is locked by {} since {}",
                cluster, info.holder, info.acquired_at
            ))),
            None => Err(CloudError::Lock(format!(
                "cluster {} is locked by another caller",
                cluster
            ))),
        }
    }
}

/// Create the lock file only if it does not exist yet, `false` when it does
async fn try_create_lock(path: &Path, content: &str) -> Result<bool> {
    let file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await;
    let mut file = match file {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    file.write_all(content.as_bytes()).await?;
    file.flush().await?;
    Ok(true)
}

/// Checkpoint persisting into a [`SpecStore`]
pub struct StoreCheckpoint<'a> {
    store: &'a SpecStore,
    cluster: String,
}

#[async_trait]
impl Checkpoint for StoreCheckpoint<'_> {
    async fn save(&self, spec: &CloudSpec) -> Result<()> {
        self.store.save(&self.cluster, spec).await
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for a cluster lock
pub struct SpecLock {
    lock_path: PathBuf,
    released: bool,
}

impl SpecLock {
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released spec lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for SpecLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}
