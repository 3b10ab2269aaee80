//! Local persistence for mirrored catalog records.
//!
//! The store is a single SQLite file holding one `records` table. Every
//! operation opens its own connection and drops it before returning, so no
//! handle outlives a call. There is no internal locking: callers serialize
//! writes.

pub mod sqlite;

pub use sqlite::{DB_FILE_NAME, RecordCursor, RecordStore, StoreError};
