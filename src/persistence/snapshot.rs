//! Snapshot persistence for the engagement table.
//!
//! The whole table is written as one JSON document using the
//! write-to-temp-then-rename pattern:
//! 1. Write to `<path>.tmp`
//! 2. fsync the temp file
//! 3. Rename to `<path>`
//! 4. fsync the parent directory
//!
//! Readers therefore always see either the old or the new snapshot, never a
//! partial write. The directory fsync matters: a rename that is not followed
//! by one may not survive a power loss even when the file contents did.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Engagement, EngagementId};

/// Current schema version. Increment on breaking layout changes.
pub const SCHEMA_VERSION: u32 = 1;

/// Errors from snapshot operations.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Schema version mismatch.
    #[error("schema version mismatch: expected {expected}, got {got}")]
    SchemaMismatch { expected: u32, got: u32 },
}

/// Result type for snapshot operations.
pub type Result<T> = std::result::Result<T, SnapshotError>;

/// The persisted form of the engagement table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedEngagements {
    /// Schema version for forward-compatible migrations.
    pub schema_version: u32,

    /// When this snapshot was taken.
    pub snapshot_at: DateTime<Utc>,

    /// Every engagement, keyed by id. Terminal records included; history is
    /// never garbage-collected here.
    pub engagements: HashMap<EngagementId, Engagement>,
}

impl PersistedEngagements {
    pub fn new(engagements: HashMap<EngagementId, Engagement>, snapshot_at: DateTime<Utc>) -> Self {
        PersistedEngagements {
            schema_version: SCHEMA_VERSION,
            snapshot_at,
            engagements,
        }
    }
}

/// Saves a snapshot atomically to disk.
pub fn save_snapshot_atomic(path: &Path, snapshot: &PersistedEngagements) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec_pretty(snapshot)?;

    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }

    std::fs::rename(&tmp_path, path)?;

    if let Some(parent) = path.parent() {
        fsync_dir(parent)?;
    }

    Ok(())
}

/// Loads a snapshot, checking the schema version.
pub fn load_snapshot(path: &Path) -> Result<PersistedEngagements> {
    let bytes = std::fs::read(path)?;
    let snapshot: PersistedEngagements = serde_json::from_slice(&bytes)?;

    if snapshot.schema_version != SCHEMA_VERSION {
        return Err(SnapshotError::SchemaMismatch {
            expected: SCHEMA_VERSION,
            got: snapshot.schema_version,
        });
    }

    Ok(snapshot)
}

/// Like `load_snapshot`, but a missing file is `Ok(None)` rather than an
/// error - the normal first-boot case.
pub fn try_load_snapshot(path: &Path) -> Result<Option<PersistedEngagements>> {
    match load_snapshot(path) {
        Ok(snapshot) => Ok(Some(snapshot)),
        Err(SnapshotError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Makes directory entries durable; required after a rename for crash safety.
fn fsync_dir(dir_path: &Path) -> io::Result<()> {
    let dir = File::open(dir_path)?;
    dir.sync_all()
}
