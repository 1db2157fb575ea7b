// ABOUTME: Persistent revision log backends for labtrail.
// ABOUTME: Provides the SQLite-backed store and an append-only JSONL log with repair.

pub mod jsonl;
pub mod sqlite;

pub use jsonl::{JsonlError, JsonlLog};
pub use sqlite::{SqliteLog, SqliteLogError};
