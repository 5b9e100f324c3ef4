//! Local state for managed resources
//!
//! Everything lives under `<root>/.influx-provider/`:
//!
//! - `state.json` holds the remote identifiers and last read attributes
//! - `state.json.backup` is the file as it was before the last save
//! - `lock.json` exists while a mutating command runs

use crate::error::{ProviderError, Result};
use chrono::{DateTime, TimeDelta, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".influx-provider";
const STATE_FILE: &str = "state.json";
const STATE_TMP: &str = "state.json.tmp";
const STATE_BACKUP: &str = "state.json.backup";
const LOCK_FILE: &str = "lock.json";
const LOCK_TTL_HOURS: i64 = 1;

/// Build the state key for a resource (`<type>.<name>`)
pub fn resource_key(resource_type: &str, name: &str) -> String {
    format!("{}.{}", resource_type, name)
}

/// Every resource this host manages, keyed by [`resource_key`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalState {
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    pub resources: BTreeMap<String, ResourceState>,
}

impl Default for GlobalState {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalState {
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            resources: BTreeMap::new(),
        }
    }

    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a ResourceState)> + 'a {
        self.resources
            .iter()
            .filter(move |(_, resource)| resource.resource_type == resource_type)
            .map(|(key, resource)| (key.as_str(), resource))
    }

    pub fn set_resource(&mut self, key: impl Into<String>, resource: ResourceState) {
        self.touch();
        self.resources.insert(key.into(), resource);
    }

    pub fn remove_resource(&mut self, key: &str) -> Option<ResourceState> {
        let removed = self.resources.remove(key)?;
        self.touch();
        Some(removed)
    }

    pub fn get_resource(&self, key: &str) -> Option<&ResourceState> {
        self.resources.get(key)
    }

    /// Like [`get_resource`](Self::get_resource), failing for unmanaged keys
    pub fn require(&self, key: &str) -> Result<&ResourceState> {
        self.get_resource(key)
            .ok_or_else(|| ProviderError::ResourceNotFound(key.to_string()))
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// One managed resource: its server-side id plus opaque typed attributes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceState {
    pub id: String,
    pub resource_type: String,
    pub status: ResourceStatus,
    #[serde(default)]
    pub attributes: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResourceState {
    pub fn new(id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            resource_type: resource_type.into(),
            status: ResourceStatus::Present,
            attributes: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(self, status: ResourceStatus) -> Self {
        Self { status, ..self }
    }

    pub fn with_attributes<T: Serialize>(mut self, attributes: &T) -> Result<Self> {
        self.attributes = serde_json::to_value(attributes)?;
        Ok(self)
    }

    /// Replace attributes and bump `updated_at`; `created_at` is kept
    pub fn set_attributes<T: Serialize>(&mut self, attributes: &T) -> Result<()> {
        self.attributes = serde_json::to_value(attributes)?;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn attributes<T: DeserializeOwned>(&self) -> Result<T> {
        T::deserialize(&self.attributes).map_err(|e| {
            ProviderError::StateError(format!(
                "attributes of {} {} are unreadable: {}",
                self.resource_type, self.id, e
            ))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Remote side matches the recorded attributes
    Present,
    /// An update stopped half-way
    Tainted,
    /// A delete stopped half-way; needs manual remediation
    PartiallyDeleted,
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Present => "present",
            Self::Tainted => "tainted",
            Self::PartiallyDeleted => "partially-deleted",
        })
    }
}

/// Reads and writes the state directory of one project root
pub struct StateManager {
    dir: PathBuf,
}

impl StateManager {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            dir: root.as_ref().join(STATE_DIR),
        }
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    /// Load the state file; a missing file is an empty state
    pub async fn load(&self) -> Result<GlobalState> {
        let path = self.state_path();
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("No state at {}, starting empty", path.display());
                return Ok(GlobalState::new());
            }
            Err(e) => return Err(e.into()),
        };

        let state: GlobalState = serde_json::from_slice(&raw).map_err(|e| {
            ProviderError::StateError(format!(
                "{} is not a valid state file: {}",
                path.display(),
                e
            ))
        })?;
        if state.version > STATE_VERSION {
            return Err(ProviderError::StateError(format!(
                "{} has version {}, this build reads up to {}",
                path.display(),
                state.version,
                STATE_VERSION
            )));
        }

        tracing::debug!(resources = state.resources.len(), "Loaded state");
        Ok(state)
    }

    /// Write through a temporary file, copying the previous state to the backup first
    pub async fn save(&self, state: &GlobalState) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;

        let path = self.state_path();
        let tmp = self.dir.join(STATE_TMP);
        fs::write(&tmp, serde_json::to_vec_pretty(state)?).await?;

        if fs::try_exists(&path).await? {
            fs::copy(&path, self.dir.join(STATE_BACKUP)).await?;
        }
        fs::rename(&tmp, &path).await?;

        tracing::debug!(resources = state.resources.len(), "Saved state");
        Ok(())
    }

    /// Take the state lock. A lock older than an hour is taken over.
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        fs::create_dir_all(&self.dir).await?;

        let path = self.dir.join(LOCK_FILE);
        let ours = serde_json::to_vec_pretty(&LockInfo::current())?;

        // second pass only after removing a stale lock
        for _ in 0..2 {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(mut file) => {
                    file.write_all(&ours).await?;
                    file.flush().await?;
                    tracing::debug!("Acquired {}", path.display());
                    return Ok(StateLock { path, held: true });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    let holder = LockInfo::read(&path).await?;
                    if !holder.is_stale() {
                        return Err(ProviderError::LockError(format!(
                            "state is locked by {} (pid {}) since {}",
                            holder.holder, holder.pid, holder.acquired_at
                        )));
                    }
                    tracing::warn!(
                        holder = %holder.holder,
                        since = %holder.acquired_at,
                        "Taking over stale state lock"
                    );
                    match fs::remove_file(&path).await {
                        Ok(()) => {}
                        Err(e) if e.kind() == ErrorKind::NotFound => {}
                        Err(e) => return Err(e.into()),
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ProviderError::LockError(format!(
            "{} was re-created while taking over a stale lock",
            path.display()
        )))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    #[serde(default)]
    pid: u32,
    acquired_at: DateTime<Utc>,
}

impl LockInfo {
    fn current() -> Self {
        let holder = ["HOSTNAME", "HOST"]
            .into_iter()
            .find_map(|var| std::env::var(var).ok())
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            holder,
            pid: std::process::id(),
            acquired_at: Utc::now(),
        }
    }

    /// An unreadable lock file counts as abandoned
    async fn read(path: &Path) -> Result<Self> {
        let raw = fs::read(path).await?;
        Ok(serde_json::from_slice(&raw).unwrap_or(Self {
            holder: "unknown".to_string(),
            pid: 0,
            acquired_at: DateTime::<Utc>::MIN_UTC,
        }))
    }

    fn is_stale(&self) -> bool {
        Utc::now() - self.acquired_at >= TimeDelta::hours(LOCK_TTL_HOURS)
    }
}

/// Held state lock; the lock file is removed on release or drop
pub struct StateLock {
    path: PathBuf,
    held: bool,
}

impl StateLock {
    pub async fn release(mut self) -> Result<()> {
        self.held = false;
        match fs::remove_file(&self.path).await {
            Ok(()) => {
                tracing::debug!("Released {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if self.held {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
