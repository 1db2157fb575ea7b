// ABOUTME: Point-in-time resolution: selecting the revision applicable at a session id.
// ABOUTME: Verifies log monotonicity on every scan and offers single and positional bulk resolution.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::log::{LogError, RevisionLog};
use crate::record::{Payload, RevisionAction, RevisionRecord};

/// Errors from historical resolution.
///
/// Absence is never an error: an unknown id, a session predating the first
/// revision, and a deleted resource are all normal [`ResolvedState`]
/// values. Integrity and decode faults surface immediately and are not
/// retried; re-querying a corrupt log cannot change the outcome.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Log(#[from] LogError),

    #[error(
        "revision log for {entity_type}/{natural_id} is not monotonic: revision \
         {revision_number} has session id {session_id}, not above the preceding {previous_session_id}"
    )]
    NonMonotonicLog {
        entity_type: String,
        natural_id: u64,
        revision_number: u32,
        session_id: u64,
        previous_session_id: u64,
    },

    #[error("revision {revision_number} of {entity_type}/{natural_id} is a {action} with no payload")]
    MissingPayload {
        entity_type: String,
        natural_id: u64,
        revision_number: u32,
        action: RevisionAction,
    },

    #[error("failed to decode {entity_type}/{natural_id} at revision {revision_number}: {source}")]
    Decode {
        entity_type: String,
        natural_id: u64,
        revision_number: u32,
        #[source]
        source: serde_json::Error,
    },
}

/// Metadata of the revision selected by a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevisionMeta {
    pub revision_number: u32,
    pub session_id: u64,
    pub action: RevisionAction,
    pub recorded_at: DateTime<Utc>,
}

impl RevisionMeta {
    fn of(record: &RevisionRecord) -> Self {
        Self {
            revision_number: record.revision_number,
            session_id: record.session_id,
            action: record.action,
            recorded_at: record.recorded_at,
        }
    }
}

/// The state of a resource as of one session id.
///
/// `Absent` covers both "id never existed" and "session predates the first
/// revision"; the two are indistinguishable by design. `Deleted` is a
/// tombstone that persists forward until a later re-insert.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedState<E> {
    Absent,
    Existing { entity: E, meta: RevisionMeta },
    Deleted { meta: RevisionMeta },
}

impl<E> ResolvedState<E> {
    /// The resolved entity, if the resource existed at the session.
    pub fn existing(&self) -> Option<&E> {
        match self {
            ResolvedState::Existing { entity, .. } => Some(entity),
            _ => None,
        }
    }

    /// Consume the state, yielding the entity if it existed.
    pub fn into_existing(self) -> Option<E> {
        match self {
            ResolvedState::Existing { entity, .. } => Some(entity),
            _ => None,
        }
    }

    /// Metadata of the selected revision; `None` when no record qualified.
    pub fn meta(&self) -> Option<RevisionMeta> {
        match self {
            ResolvedState::Absent => None,
            ResolvedState::Existing { meta, .. } | ResolvedState::Deleted { meta } => Some(*meta),
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, ResolvedState::Absent)
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, ResolvedState::Deleted { .. })
    }
}

/// Verify the per-resource ordering invariant: session ids strictly
/// increasing in revision order. Two records sharing a session id are a
/// fault, not a tie to break.
pub fn verify_monotonic(records: &[RevisionRecord]) -> Result<(), ResolveError> {
    for pair in records.windows(2) {
        if pair[1].session_id <= pair[0].session_id {
            return Err(ResolveError::NonMonotonicLog {
                entity_type: pair[1].entity_type.clone(),
                natural_id: pair[1].natural_id,
                revision_number: pair[1].revision_number,
                session_id: pair[1].session_id,
                previous_session_id: pair[0].session_id,
            });
        }
    }
    Ok(())
}

/// Select the record applicable at `session_id` from a verified,
/// revision-ascending sequence: the last record whose session id does not
/// exceed the target. Inclusive on an exact match; `None` when the
/// sequence is empty or starts after the target.
pub fn select_applicable(records: &[RevisionRecord], session_id: u64) -> Option<&RevisionRecord> {
    let cut = records.partition_point(|r| r.session_id <= session_id);
    if cut == 0 { None } else { Some(&records[cut - 1]) }
}

fn state_of(record: Option<RevisionRecord>) -> Result<ResolvedState<Payload>, ResolveError> {
    let Some(record) = record else {
        return Ok(ResolvedState::Absent);
    };

    let meta = RevisionMeta::of(&record);
    match record.action {
        RevisionAction::Delete => Ok(ResolvedState::Deleted { meta }),
        RevisionAction::Insert | RevisionAction::Update => match record.payload {
            Some(payload) => Ok(ResolvedState::Existing { entity: payload, meta }),
            None => Err(ResolveError::MissingPayload {
                entity_type: record.entity_type,
                natural_id: record.natural_id,
                revision_number: record.revision_number,
                action: record.action,
            }),
        },
    }
}

/// Resolves point-in-time lookups against a revision log.
///
/// Works at the payload level; typed decoding lives in the session views.
pub struct Resolver<'a, L> {
    log: &'a L,
}

impl<'a, L: RevisionLog> Resolver<'a, L> {
    pub fn new(log: &'a L) -> Self {
        Self { log }
    }

    /// Resolve one resource as of `session_id`.
    ///
    /// Scans the id's history, verifies the ordering invariant over the
    /// whole sequence (the scan has already materialized it), then binary
    /// searches for the last record at or before the target session.
    pub fn resolve_one(
        &self,
        entity_type: &str,
        natural_id: u64,
        session_id: u64,
    ) -> Result<ResolvedState<Payload>, ResolveError> {
        let records = self.log.scan(entity_type, natural_id)?;
        verify_monotonic(&records)?;
        state_of(select_applicable(&records, session_id).cloned())
    }

    /// Resolve several resources as of `session_id`.
    ///
    /// The result has the same length and order as the input, duplicates
    /// included; ids with no qualifying record map to `Absent` in place.
    pub fn resolve_many(
        &self,
        entity_type: &str,
        natural_ids: &[u64],
        session_id: u64,
    ) -> Result<Vec<ResolvedState<Payload>>, ResolveError> {
        let histories = self.log.scan_many(entity_type, natural_ids)?;
        for records in histories.values() {
            verify_monotonic(records)?;
        }

        natural_ids
            .iter()
            .map(|id| {
                let selected = histories
                    .get(id)
                    .and_then(|records| select_applicable(records, session_id))
                    .cloned();
                state_of(selected)
            })
            .collect()
    }
}
