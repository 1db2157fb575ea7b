// ABOUTME: Typed references between entities and session-pinned link resolution.
// ABOUTME: Following a reference threads the originating session id explicitly through each hop.

use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::log::RevisionLog;
use crate::resolve::{ResolveError, ResolvedState};
use crate::session::Session;

/// A foreign natural id pointing at another entity type.
///
/// Serializes as the bare integer id, so a payload like
/// `{"email": "jon@example.com", "name_id": 2}` decodes into a struct with
/// a `name_id: Reference<Name>` field.
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reference<E> {
    id: u64,
    #[serde(skip)]
    _target: PhantomData<fn() -> E>,
}

impl<E> Reference<E> {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            _target: PhantomData,
        }
    }

    /// The target's natural id.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl<E> fmt::Debug for Reference<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reference({})", self.id)
    }
}

impl<E> Clone for Reference<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for Reference<E> {}

impl<E> PartialEq for Reference<E> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<E> Eq for Reference<E> {}

impl<E: Entity> Reference<E> {
    /// Resolve the target as of the session's id, never the target's
    /// latest state and never an ordering derived from the referencing
    /// record's own revision. An absent or deleted target is a normal
    /// historical fact, returned as a value.
    pub fn follow<L: RevisionLog>(
        &self,
        session: &Session<'_, L>,
    ) -> Result<ResolvedState<E>, ResolveError> {
        session.view::<E>().get(self.id)
    }
}

/// Free-function form of [`Reference::follow`]. Multi-hop chains repeat
/// this call with the same session, keeping every hop pinned to the
/// original session id.
pub fn follow<L: RevisionLog, E: Entity>(
    session: &Session<'_, L>,
    reference: Reference<E>,
) -> Result<ResolvedState<E>, ResolveError> {
    reference.follow(session)
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

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        email: String,
        name_id: Reference<Name>,
    }

    impl Entity for User {
        const ENTITY_TYPE: &'static str = "user";
    }

    #[derive(Debug, Deserialize)]
    struct Badge {
        user_id: Reference<User>,
    }

    impl Entity for Badge {
        const ENTITY_TYPE: &'static str = "badge";
    }

    fn make_record(
        entity_type: &str,
        natural_id: u64,
        revision: u32,
        session_id: u64,
        action: RevisionAction,
        payload: Option<serde_json::Value>,
    ) -> RevisionRecord {
        RevisionRecord {
            entity_type: entity_type.to_string(),
            natural_id,
            revision_number: revision,
            session_id,
            action,
            payload: payload.map(|v| v.as_object().expect("object payload").clone()),
            recorded_at: Utc::now(),
        }
    }

    /// Names: id 1 "jon"@1, "john"@2; id 2 "John"@4.
    /// Users: id 1 inserted@1 pointing at name 1, email updated@3,
    /// repointed at name 2 @4.
    fn seeded_log() -> MemoryLog {
        let mut log = MemoryLog::new();
        log.append(make_record(
            "name",
            1,
            1,
            1,
            RevisionAction::Insert,
            Some(serde_json::json!({"name": "jon"})),
        ));
        log.append(make_record(
            "name",
            1,
            2,
            2,
            RevisionAction::Update,
            Some(serde_json::json!({"name": "john"})),
        ));
        log.append(make_record(
            "name",
            2,
            1,
            4,
            RevisionAction::Insert,
            Some(serde_json::json!({"name": "John"})),
        ));
        log.append(make_record(
            "user",
            1,
            1,
            1,
            RevisionAction::Insert,
            Some(serde_json::json!({"email": "john.smith@example.com", "name_id": 1})),
        ));
        log.append(make_record(
            "user",
            1,
            2,
            3,
            RevisionAction::Update,
            Some(serde_json::json!({"email": "john.smith@gmail.com", "name_id": 1})),
        ));
        log.append(make_record(
            "user",
            1,
            3,
            4,
            RevisionAction::Update,
            Some(serde_json::json!({"email": "john.smith@gmail.com", "name_id": 2})),
        ));
        log
    }

    fn user_and_name(log: &MemoryLog, session_id: u64) -> (User, Name) {
        let session = Session::new(log, session_id);
        let user = session.view::<User>().get(1).unwrap().into_existing().unwrap();
        let name = user.name_id.follow(&session).unwrap().into_existing().unwrap();
        (user, name)
    }

    #[test]
    fn follow_resolves_at_the_originating_session() {
        let log = seeded_log();

        let (user, name) = user_and_name(&log, 1);
        assert_eq!(user.email, "john.smith@example.com");
        assert_eq!(name.name, "jon");

        let (user, name) = user_and_name(&log, 2);
        assert_eq!(user.email, "john.smith@example.com");
        assert_eq!(name.name, "john");

        let (user, name) = user_and_name(&log, 3);
        assert_eq!(user.email, "john.smith@gmail.com");
        assert_eq!(name.name, "john");

        let (user, name) = user_and_name(&log, 4);
        assert_eq!(user.email, "john.smith@gmail.com");
        assert_eq!(user.name_id, Reference::new(2));
        assert_eq!(name.name, "John");
    }

    #[test]
    fn follow_equals_direct_resolution_at_every_session() {
        let log = seeded_log();

        for session_id in 1..=6 {
            let session = Session::new(&log, session_id);
            let user_state = session.view::<User>().get(1).unwrap();
            let Some(user) = user_state.existing() else {
                continue;
            };
            let followed = user.name_id.follow(&session).unwrap();
            let direct = session.view::<Name>().get(user.name_id.id()).unwrap();
            assert_eq!(followed, direct, "session {session_id}");
        }
    }

    #[test]
    fn follow_returns_absent_for_early_sessions() {
        let mut log = seeded_log();
        // A user pointing at a name that is only inserted later.
        log.append(make_record(
            "user",
            2,
            1,
            2,
            RevisionAction::Insert,
            Some(serde_json::json!({"email": "early@example.com", "name_id": 2})),
        ));

        let session = Session::new(&log, 2);
        let user = session.view::<User>().get(2).unwrap().into_existing().unwrap();
        let name_state = follow(&session, user.name_id).unwrap();
        assert!(name_state.is_absent());
    }

    #[test]
    fn multi_hop_follow_stays_pinned() {
        let mut log = seeded_log();
        log.append(make_record(
            "badge",
            1,
            1,
            2,
            RevisionAction::Insert,
            Some(serde_json::json!({"user_id": 1})),
        ));

        let session = Session::new(&log, 2);
        let badge = session.view::<Badge>().get(1).unwrap().into_existing().unwrap();
        let user = badge.user_id.follow(&session).unwrap().into_existing().unwrap();
        let name = user.name_id.follow(&session).unwrap().into_existing().unwrap();

        // Both hops observe session 2: pre-gmail email, post-update name.
        assert_eq!(user.email, "john.smith@example.com");
        assert_eq!(name.name, "john");
    }

    #[test]
    fn reference_round_trips_as_bare_id() {
        let reference: Reference<Name> = serde_json::from_str("7").unwrap();
        assert_eq!(reference.id(), 7);
        assert_eq!(serde_json::to_string(&reference).unwrap(), "7");
    }
}
