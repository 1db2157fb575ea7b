// ABOUTME: Immutable session handles and typed per-entity-type views over the resolver.
// ABOUTME: Every lookup through one session observes the same session id.

use std::marker::PhantomData;

use serde_json::Value;

use crate::audit;
use crate::entity::Entity;
use crate::log::RevisionLog;
use crate::record::Payload;
use crate::resolve::{ResolveError, ResolvedState, Resolver};

/// A read-only handle over one point in the global change ordering.
///
/// Construction performs no I/O, and a session never changes afterwards:
/// every view derived from it resolves at the same session id, which is
/// what makes cross-entity joins snapshot-consistent. Sessions are `Copy`
/// and safe to share across threads whenever the log type is `Sync`.
///
/// Consistency level: **read-committed-at-call-time**. Each lookup
/// reflects the log contents visible at the moment of that call; if a
/// writer appends between two lookups, the later one can observe the new
/// record when its session id qualifies. Nothing is cached per session.
#[derive(Debug)]
pub struct Session<'a, L> {
    log: &'a L,
    session_id: u64,
}

impl<'a, L> Clone for Session<'a, L> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, L> Copy for Session<'a, L> {}

impl<'a, L: RevisionLog> Session<'a, L> {
    /// Bind a session id to a revision log. No I/O happens here.
    pub fn new(log: &'a L, session_id: u64) -> Self {
        Self { log, session_id }
    }

    /// The ordering value every lookup through this session observes.
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// A typed view over one entity type, bound to this session's id.
    pub fn view<E: Entity>(&self) -> EntityView<'a, L, E> {
        EntityView {
            log: self.log,
            session_id: self.session_id,
            _entity: PhantomData,
        }
    }
}

/// Typed lookups for one entity type as of one session id.
#[derive(Debug)]
pub struct EntityView<'a, L, E> {
    log: &'a L,
    session_id: u64,
    _entity: PhantomData<fn() -> E>,
}

impl<'a, L, E> Clone for EntityView<'a, L, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, L, E> Copy for EntityView<'a, L, E> {}

impl<'a, L: RevisionLog, E: Entity> EntityView<'a, L, E> {
    /// Resolve a single resource as of this view's session.
    pub fn get(&self, natural_id: u64) -> Result<ResolvedState<E>, ResolveError> {
        let raw = Resolver::new(self.log).resolve_one(E::ENTITY_TYPE, natural_id, self.session_id)?;
        decode(raw, natural_id)
    }

    /// Resolve several resources, preserving input order and duplicates.
    pub fn get_many(&self, natural_ids: &[u64]) -> Result<Vec<ResolvedState<E>>, ResolveError> {
        let raw =
            Resolver::new(self.log).resolve_many(E::ENTITY_TYPE, natural_ids, self.session_id)?;
        raw.into_iter()
            .zip(natural_ids)
            .map(|(state, &id)| decode(state, id))
            .collect()
    }

    /// Every session id in this resource's full history, ascending.
    /// Audit data: deliberately not bounded by this view's session id.
    pub fn history(&self, natural_id: u64) -> Result<Vec<u64>, ResolveError> {
        audit::session_ids_for(self.log, E::ENTITY_TYPE, natural_id)
    }
}

fn decode<E: Entity>(
    state: ResolvedState<Payload>,
    natural_id: u64,
) -> Result<ResolvedState<E>, ResolveError> {
    Ok(match state {
        ResolvedState::Absent => ResolvedState::Absent,
        ResolvedState::Deleted { meta } => ResolvedState::Deleted { meta },
        ResolvedState::Existing { entity: payload, meta } => {
            let entity =
                serde_json::from_value(Value::Object(payload)).map_err(|source| {
                    ResolveError::Decode {
                        entity_type: E::ENTITY_TYPE.to_string(),
                        natural_id,
                        revision_number: meta.revision_number,
                        source,
                    }
                })?;
            ResolvedState::Existing { entity, meta }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::MemoryLog;
    use crate::record::{RevisionAction, RevisionRecord};
    use chrono::Utc;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Name {
        name: String,
    }

    impl Entity for Name {
        const ENTITY_TYPE: &'static str = "name";
    }

    fn make_record(
        natural_id: u64,
        revision: u32,
        session_id: u64,
        action: RevisionAction,
        payload: Option<serde_json::Value>,
    ) -> RevisionRecord {
        RevisionRecord {
            entity_type: Name::ENTITY_TYPE.to_string(),
            natural_id,
            revision_number: revision,
            session_id,
            action,
            payload: payload.map(|v| v.as_object().expect("object payload").clone()),
            recorded_at: Utc::now(),
        }
    }

    fn seeded_log() -> MemoryLog {
        let mut log = MemoryLog::new();
        log.append(make_record(
            1,
            1,
            1,
            RevisionAction::Insert,
            Some(serde_json::json!({"name": "a"})),
        ));
        log.append(make_record(
            1,
            2,
            5,
            RevisionAction::Update,
            Some(serde_json::json!({"name": "b"})),
        ));
        log.append(make_record(1, 3, 10, RevisionAction::Delete, None));
        log.append(make_record(
            2,
            1,
            5,
            RevisionAction::Insert,
            Some(serde_json::json!({"name": "foo"})),
        ));
        log
    }

    #[test]
    fn view_decodes_typed_entities() {
        let log = seeded_log();
        let session = Session::new(&log, 5);

        let state = session.view::<Name>().get(1).unwrap();
        assert_eq!(state.existing().unwrap().name, "b");
        assert_eq!(state.meta().unwrap().revision_number, 2);
    }

    #[test]
    fn views_from_one_session_share_the_session_id() {
        let log = seeded_log();
        let session = Session::new(&log, 4);
        assert_eq!(session.session_id(), 4);

        let first = session.view::<Name>().get(1).unwrap();
        let second = session.view::<Name>().get(1).unwrap();
        assert_eq!(first.existing().unwrap().name, "a");
        assert_eq!(first, second);
    }

    #[test]
    fn bulk_lookup_preserves_order_and_duplicates() {
        let log = seeded_log();
        let session = Session::new(&log, 6);

        let states = session.view::<Name>().get_many(&[1, 2, 1]).unwrap();
        assert_eq!(states.len(), 3);
        assert_eq!(states[0].existing().unwrap().name, "b");
        assert_eq!(states[1].existing().unwrap().name, "foo");
        assert_eq!(states[0], states[2]);
    }

    #[test]
    fn bulk_lookup_keeps_absent_in_place() {
        let log = seeded_log();
        let session = Session::new(&log, 1);

        let states = session.view::<Name>().get_many(&[1, 2]).unwrap();
        assert_eq!(states[0].existing().unwrap().name, "a");
        assert!(states[1].is_absent());
    }

    #[test]
    fn deleted_resource_resolves_to_tombstone() {
        let log = seeded_log();
        let session = Session::new(&log, 20);

        let state = session.view::<Name>().get(1).unwrap();
        assert!(state.is_deleted());
        assert_eq!(state.meta().unwrap().action, RevisionAction::Delete);
    }

    #[test]
    fn mismatched_payload_is_a_decode_fault() {
        let mut log = MemoryLog::new();
        log.append(make_record(
            1,
            1,
            1,
            RevisionAction::Insert,
            Some(serde_json::json!({"label": 7})),
        ));
        let session = Session::new(&log, 1);

        let err = session.view::<Name>().get(1).unwrap_err();
        assert!(matches!(err, ResolveError::Decode { natural_id: 1, .. }));
    }

    #[test]
    fn history_spans_the_full_record_sequence() {
        let log = seeded_log();
        let session = Session::new(&log, 1);

        assert_eq!(session.view::<Name>().history(1).unwrap(), vec![1, 5, 10]);
        assert_eq!(session.view::<Name>().history(2).unwrap(), vec![5]);
    }
}
