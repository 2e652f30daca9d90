//! Durable persistence for the engagement table.

pub mod snapshot;

pub use snapshot::{
    PersistedEngagements, SCHEMA_VERSION, SnapshotError, load_snapshot, save_snapshot_atomic,
    try_load_snapshot,
};
