//! JSON-file-backed snapshot and audit-log storage.
//!
//! Snapshots load into an in-memory cache on first access and stay there;
//! writes go to disk and refresh the cache in the same call. The audit log
//! is append-only, one JSON object per line, per room.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ia_domain::persistence::{AuditLogEntry, RoomSnapshot, SnapshotStore};
use ia_domain::Result;
use parking_lot::RwLock;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

pub struct JsonSnapshotStore {
    dir: PathBuf,
    cache: RwLock<HashMap<String, RoomSnapshot>>,
}

impl JsonSnapshotStore {
    /// `dir` is created if missing; snapshots live at
    /// `dir/<interactionId>.snapshot.json`, audit logs at
    /// `dir/<interactionId>.log`.
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            cache: RwLock::new(HashMap::new()),
        })
    }

    fn snapshot_path(&self, interaction_id: &str) -> PathBuf {
        self.dir.join(format!("{}.snapshot.json", sanitize(interaction_id)))
    }

    fn log_path(&self, interaction_id: &str) -> PathBuf {
        self.dir.join(format!("{}.log", sanitize(interaction_id)))
    }
}

fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[async_trait::async_trait]
impl SnapshotStore for JsonSnapshotStore {
    async fn load_snapshot(&self, interaction_id: &str) -> Result<Option<RoomSnapshot>> {
        if let Some(cached) = self.cache.read().get(interaction_id).cloned() {
            return Ok(Some(cached));
        }

        let path = self.snapshot_path(interaction_id);
        if !path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&path).await?;
        let snapshot: RoomSnapshot = serde_json::from_slice(&bytes)?;
        self.cache.write().insert(interaction_id.to_owned(), snapshot.clone());
        debug!(interaction_id, "loaded room snapshot from disk");
        Ok(Some(snapshot))
    }

    async fn save_snapshot(&self, snapshot: &RoomSnapshot) -> Result<()> {
        let path = self.snapshot_path(&snapshot.interaction_id);
        let bytes = serde_json::to_vec_pretty(snapshot)?;

        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, &bytes).await?;
        fs::rename(&tmp_path, &path).await?;

        self.cache.write().insert(snapshot.interaction_id.clone(), snapshot.clone());
        Ok(())
    }

    async fn append_log(&self, entry: &AuditLogEntry) -> Result<()> {
        let path = self.log_path(&entry.interaction_id);
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let mut file = fs::OpenOptions::new().create(true).append(true).open(&path).await?;
        file.write_all(&line).await?;
        Ok(())
    }
}

/// Read back the audit log for a room, oldest first. Not part of the
/// `SnapshotStore` trait (no caller needs it on the hot path) but useful
/// for diagnostics and tests.
pub async fn read_log(dir: impl AsRef<Path>, interaction_id: &str) -> Result<Vec<AuditLogEntry>> {
    let path = dir.as_ref().join(format!("{}.log", sanitize(interaction_id)));
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = fs::read_to_string(&path).await?;
    let mut entries = Vec::new();
    for line in contents.lines().filter(|l| !l.trim().is_empty()) {
        match serde_json::from_str(line) {
            Ok(entry) => entries.push(entry),
            Err(err) => warn!(interaction_id, %err, "skipping malformed audit log line"),
        }
    }
    Ok(entries)
}
