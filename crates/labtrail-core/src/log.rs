// ABOUTME: The read contract over revision histories plus an in-memory implementation.
// ABOUTME: Backends return per-resource record sequences ascending by revision number.

use std::collections::{BTreeMap, HashMap};
use std::error::Error;

use thiserror::Error;

use crate::record::RevisionRecord;

/// Errors surfaced by a revision log backend.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("revision log backend error: {0}")]
    Backend(#[source] Box<dyn Error + Send + Sync>),
}

impl LogError {
    /// Wrap a backend-specific error.
    pub fn backend<E>(err: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        LogError::Backend(Box::new(err))
    }
}

/// Read surface of an append-only revision store.
///
/// Implementations return each resource's records in ascending
/// revision-number order. Keeping session ids monotonic within a sequence
/// is the writer's responsibility; the resolver verifies it and reports a
/// violation as an integrity fault rather than trusting the store.
pub trait RevisionLog {
    /// All revisions of one resource, ascending by revision number.
    /// An id with no history yields an empty sequence, not an error.
    fn scan(&self, entity_type: &str, natural_id: u64) -> Result<Vec<RevisionRecord>, LogError>;

    /// Batched scan for bulk resolution. The default loops over [`scan`];
    /// backends with a cheaper bulk path override it. Ids with no history
    /// are absent from the map. Duplicate ids are scanned once.
    ///
    /// [`scan`]: RevisionLog::scan
    fn scan_many(
        &self,
        entity_type: &str,
        natural_ids: &[u64],
    ) -> Result<HashMap<u64, Vec<RevisionRecord>>, LogError> {
        let mut histories = HashMap::with_capacity(natural_ids.len());
        for &id in natural_ids {
            if histories.contains_key(&id) {
                continue;
            }
            let records = self.scan(entity_type, id)?;
            if !records.is_empty() {
                histories.insert(id, records);
            }
        }
        Ok(histories)
    }
}

/// A revision log held entirely in memory.
///
/// Serves as the fixture backend in tests and covers callers that already
/// hold a full history in process.
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    histories: BTreeMap<(String, u64), Vec<RevisionRecord>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one record under its (entity_type, natural_id). Records may
    /// arrive in any order; [`scan`] orders by revision number.
    ///
    /// [`scan`]: RevisionLog::scan
    pub fn append(&mut self, record: RevisionRecord) {
        self.histories
            .entry((record.entity_type.clone(), record.natural_id))
            .or_default()
            .push(record);
    }
}

impl RevisionLog for MemoryLog {
    fn scan(&self, entity_type: &str, natural_id: u64) -> Result<Vec<RevisionRecord>, LogError> {
        let mut records = self
            .histories
            .get(&(entity_type.to_string(), natural_id))
            .cloned()
            .unwrap_or_default();
        records.sort_by_key(|r| r.revision_number);
        Ok(records)
    }
}
