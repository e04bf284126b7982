//! The registry table and its five operations.
//!
//! One logical record set, three indexes: by session, by connection, by
//! user. The connection and user indexes store the session id, not a copy
//! of the record, so the record by session is the single source of truth.
//! Every operation is a synchronous check-then-act sequence; callers
//! serialize through [`super::SharedRegistry`].

use std::collections::BTreeMap;

use thiserror::Error;

use crate::core::{
    Connection, ConnectionId, SessionId, SessionTimings, SignonFailureNotice, Timestamp, UserId,
};

use super::record::SessionRecord;

pub type SignonResult<T> = Result<T, SignonFailureNotice>;

/// Activation failure.
///
/// `Refused` is a refusal the peer should see; `Contract` means the caller
/// drove the state machine along an edge that does not exist and must never
/// reach the peer as a signon notice.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActivateError {
    #[error(transparent)]
    Refused(#[from] SignonFailureNotice),
    #[error("activate called on a {state} record with is_resumption={is_resumption}")]
    Contract {
        state: &'static str,
        is_resumption: bool,
    },
}

#[derive(Debug)]
pub struct SessionRegistry {
    timings: SessionTimings,
    records: BTreeMap<SessionId, SessionRecord>,
    by_connection: BTreeMap<ConnectionId, SessionId>,
    by_user: BTreeMap<UserId, SessionId>,
}

impl SessionRegistry {
    pub fn new(timings: SessionTimings) -> Self {
        Self {
            timings,
            records: BTreeMap::new(),
            by_connection: BTreeMap::new(),
            by_user: BTreeMap::new(),
        }
    }

    pub fn timings(&self) -> SessionTimings {
        self.timings
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, session: SessionId) -> Option<&SessionRecord> {
        self.records.get(&session)
    }

    pub fn session_for_connection(&self, connection: ConnectionId) -> Option<SessionId> {
        self.by_connection.get(&connection).copied()
    }

    /// Insert a new pending record.
    ///
    /// Refuses without mutation if the user already owns a record in any
    /// state. Performs no address validation; that happens at activation.
    pub fn create(
        &mut self,
        session: SessionId,
        connection: Connection,
        user: UserId,
        now: Timestamp,
    ) -> SignonResult<()> {
        if self.by_user.contains_key(&user) {
            return Err(SignonFailureNotice::session_already_attributed(&user));
        }
        debug_assert!(
            !self.records.contains_key(&session),
            "duplicate session id at create"
        );
        debug_assert!(
            !self.by_connection.contains_key(&connection.id()),
            "connection already bound at create"
        );

        self.insert_record(SessionRecord::Pending {
            session,
            user,
            connection,
            created_at: now,
            inactive_since: now,
        });
        Ok(())
    }

    /// Confirm a pending or resuming record onto its connection.
    ///
    /// Pending records get exactly one chance: an expired deadline or an
    /// unmatched address removes the record along with the refusal.
    /// Resuming records confirm unconditionally; their checks already
    /// happened in [`Self::resume`].
    pub fn activate(
        &mut self,
        session: SessionId,
        connection: Connection,
        now: Timestamp,
        is_resumption: bool,
    ) -> Result<UserId, ActivateError> {
        let Some(record) = self.records.get(&session) else {
            return Err(SignonFailureNotice::unknown_session(&session).into());
        };

        match (record, is_resumption) {
            (SessionRecord::Pending { .. }, false) => {
                self.activate_pending(session, connection, now)
            }
            (SessionRecord::Resuming { .. }, true) => self.activate_resuming(session),
            (record, is_resumption) => Err(ActivateError::Contract {
                state: record.state_name(),
                is_resumption,
            }),
        }
    }

    fn activate_pending(
        &mut self,
        session: SessionId,
        connection: Connection,
        now: Timestamp,
    ) -> Result<UserId, ActivateError> {
        let Some(record) = self.remove_record(session) else {
            return Err(SignonFailureNotice::unknown_session(&session).into());
        };
        let SessionRecord::Pending {
            user,
            connection: bound,
            created_at,
            ..
        } = record
        else {
            return Err(SignonFailureNotice::unknown_session(&session).into());
        };

        if now.is_past(created_at, self.timings.activation_deadline_ms) {
            return Err(SignonFailureNotice::unknown_session(&session).into());
        }
        if connection.remote() != bound.remote() {
            return Err(SignonFailureNotice::unmatched_network_address(&session).into());
        }

        self.insert_record(SessionRecord::Active {
            session,
            user: user.clone(),
            connection,
            created_at,
        });
        Ok(user)
    }

    fn activate_resuming(&mut self, session: SessionId) -> Result<UserId, ActivateError> {
        let Some(record) = self.remove_record(session) else {
            return Err(SignonFailureNotice::unknown_session(&session).into());
        };
        let SessionRecord::Resuming {
            user,
            connection,
            created_at,
            ..
        } = record
        else {
            return Err(SignonFailureNotice::unknown_session(&session).into());
        };

        self.insert_record(SessionRecord::Active {
            session,
            user: user.clone(),
            connection,
            created_at,
        });
        Ok(user)
    }

    /// Detach a connection from whatever record it carries.
    ///
    /// `now == None` is a deliberate sign-off and removes the record in any
    /// state. `now == Some(_)` is abrupt loss: an active record becomes
    /// orphaned (resumable); pending and resuming records lose their single
    /// chance along with the connection. A connection can trigger at most
    /// one successful detach; later calls fail quietly with `false`.
    pub fn remove_connection(&mut self, connection: ConnectionId, now: Option<Timestamp>) -> bool {
        let Some(&session) = self.by_connection.get(&connection) else {
            return false;
        };
        let Some(record) = self.remove_record(session) else {
            return false;
        };

        if let Some(at) = now {
            if let SessionRecord::Active {
                session,
                user,
                connection: bound,
                created_at,
            } = record
            {
                self.insert_record(SessionRecord::Orphaned {
                    session,
                    user,
                    created_at,
                    inactive_since: at,
                    remote: bound.remote(),
                });
            }
        }
        true
    }

    /// Provisionally rebind an orphaned record to a replacement connection.
    ///
    /// One chance: an expired grace window or an unmatched address removes
    /// the record along with the refusal. On success the caller must follow
    /// with `activate(.., is_resumption = true)` to finalize.
    pub fn resume(
        &mut self,
        session: SessionId,
        connection: Connection,
        now: Timestamp,
    ) -> SignonResult<()> {
        match self.records.get(&session) {
            Some(SessionRecord::Orphaned { .. }) => {}
            _ => return Err(SignonFailureNotice::unknown_session(&session)),
        }
        let Some(record) = self.remove_record(session) else {
            return Err(SignonFailureNotice::unknown_session(&session));
        };
        let SessionRecord::Orphaned {
            user,
            created_at,
            inactive_since,
            remote,
            ..
        } = record
        else {
            return Err(SignonFailureNotice::unknown_session(&session));
        };

        if now.is_past(inactive_since, self.timings.resume_grace_ms) {
            return Err(SignonFailureNotice::unknown_session(&session));
        }
        if connection.remote() != remote {
            return Err(SignonFailureNotice::unmatched_network_address(&session));
        }

        debug_assert!(
            !self.by_connection.contains_key(&connection.id()),
            "connection already bound at resume"
        );
        self.insert_record(SessionRecord::Resuming {
            session,
            user,
            connection,
            created_at,
            inactive_since,
        });
        Ok(())
    }

    /// Administrative removal regardless of state.
    ///
    /// Returns the connection that was bound, if any; idempotent.
    pub fn remove_session(&mut self, session: SessionId) -> Option<ConnectionId> {
        let record = self.remove_record(session)?;
        record.connection().map(Connection::id)
    }

    fn insert_record(&mut self, record: SessionRecord) {
        let session = record.session();
        if let Some(connection) = record.connection() {
            let evicted = self.by_connection.insert(connection.id(), session);
            debug_assert!(
                evicted.is_none() || evicted == Some(session),
                "connection bound to two sessions"
            );
        }
        let prior = self.by_user.insert(record.user().clone(), session);
        debug_assert!(
            prior.is_none() || prior == Some(session),
            "user owns two sessions"
        );
        self.records.insert(session, record);
    }

    fn remove_record(&mut self, session: SessionId) -> Option<SessionRecord> {
        let record = self.records.remove(&session)?;
        if let Some(connection) = record.connection() {
            self.by_connection.remove(&connection.id());
        }
        self.by_user.remove(record.user());
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{RemoteAddr, SignonFailureCode};

    fn conn(id: u64, addr: &str) -> Connection {
        Connection::new(ConnectionId::new(id), RemoteAddr::parse(addr).unwrap())
    }

    fn user(name: &str) -> UserId {
        UserId::new(name).unwrap()
    }

    fn timings() -> SessionTimings {
        SessionTimings {
            activation_deadline_ms: 500,
            resume_grace_ms: 1_000,
            signon_deadline_ms: 2_000,
        }
    }

    fn registry() -> SessionRegistry {
        SessionRegistry::new(timings())
    }

    fn activated(registry: &mut SessionRegistry, addr: &str, conn_id: u64, name: &str) -> SessionId {
        let session = SessionId::generate();
        let connection = conn(conn_id, addr);
        registry
            .create(session, connection, user(name), Timestamp(0))
            .unwrap();
        registry
            .activate(session, connection, Timestamp(0), false)
            .unwrap();
        session
    }

    #[test]
    fn second_create_for_same_user_is_refused() {
        let mut registry = registry();
        let first = SessionId::generate();
        registry
            .create(first, conn(1, "10.0.0.1"), user("alice"), Timestamp(0))
            .unwrap();

        let err = registry
            .create(SessionId::generate(), conn(2, "10.0.0.2"), user("alice"), Timestamp(1))
            .unwrap_err();
        assert_eq!(err.code, SignonFailureCode::SessionAlreadyAttributed);

        // The first record is untouched.
        assert_eq!(registry.len(), 1);
        assert!(matches!(
            registry.get(first),
            Some(SessionRecord::Pending { .. })
        ));
    }

    #[test]
    fn late_activation_consumes_the_pending_record() {
        let mut registry = registry();
        let session = SessionId::generate();
        let connection = conn(1, "10.0.0.1");
        registry
            .create(session, connection, user("alice"), Timestamp(0))
            .unwrap();

        let err = registry
            .activate(session, connection, Timestamp(501), false)
            .unwrap_err();
        assert_eq!(
            err,
            ActivateError::Refused(SignonFailureNotice::unknown_session(&session))
        );
        assert!(registry.get(session).is_none());

        // Deadline boundary itself is still inside the window.
        let session2 = SessionId::generate();
        registry
            .create(session2, connection, user("alice"), Timestamp(0))
            .unwrap();
        assert!(registry
            .activate(session2, connection, Timestamp(500), false)
            .is_ok());
    }

    #[test]
    fn activation_from_wrong_address_is_single_shot() {
        let mut registry = registry();
        let session = SessionId::generate();
        registry
            .create(session, conn(1, "10.0.0.1"), user("alice"), Timestamp(0))
            .unwrap();

        let err = registry
            .activate(session, conn(2, "10.0.0.9"), Timestamp(0), false)
            .unwrap_err();
        assert_eq!(
            err,
            ActivateError::Refused(SignonFailureNotice::unmatched_network_address(&session))
        );

        // No second chance, even from the right address.
        let err = registry
            .activate(session, conn(1, "10.0.0.1"), Timestamp(0), false)
            .unwrap_err();
        assert_eq!(
            err,
            ActivateError::Refused(SignonFailureNotice::unknown_session(&session))
        );
    }

    #[test]
    fn orphan_resume_rebinds_to_the_new_connection() {
        let mut registry = registry();
        let session = SessionId::generate();
        let first = conn(1, "10.0.0.1");
        registry
            .create(session, first, user("alice"), Timestamp(0))
            .unwrap();
        let who = registry
            .activate(session, first, Timestamp(0), false)
            .unwrap();
        assert_eq!(who, user("alice"));

        assert!(registry.remove_connection(first.id(), Some(Timestamp(100))));
        match registry.get(session) {
            Some(SessionRecord::Orphaned {
                inactive_since,
                remote,
                ..
            }) => {
                assert_eq!(*inactive_since, Timestamp(100));
                assert_eq!(*remote, first.remote());
            }
            other => panic!("expected orphaned record, got {other:?}"),
        }

        let replacement = conn(2, "10.0.0.1");
        registry
            .resume(session, replacement, Timestamp(200))
            .unwrap();
        assert!(matches!(
            registry.get(session),
            Some(SessionRecord::Resuming { .. })
        ));

        let who = registry
            .activate(session, replacement, Timestamp(300), true)
            .unwrap();
        assert_eq!(who, user("alice"));
        match registry.get(session) {
            Some(SessionRecord::Active { connection, .. }) => {
                assert_eq!(*connection, replacement);
            }
            other => panic!("expected active record, got {other:?}"),
        }
        assert_eq!(registry.session_for_connection(replacement.id()), Some(session));
        assert_eq!(registry.session_for_connection(first.id()), None);
    }

    #[test]
    fn resume_window_is_enforced() {
        let mut registry = registry();
        let first = conn(1, "10.0.0.1");
        let session = activated(&mut registry, "10.0.0.1", 1, "alice");
        registry.remove_connection(first.id(), Some(Timestamp(100)));

        let err = registry
            .resume(session, conn(2, "10.0.0.1"), Timestamp(1_101))
            .unwrap_err();
        assert_eq!(err.code, SignonFailureCode::UnknownSession);
        assert!(registry.get(session).is_none());
    }

    #[test]
    fn resume_address_mismatch_is_single_shot() {
        let mut registry = registry();
        let first = conn(1, "10.0.0.1");
        let session = activated(&mut registry, "10.0.0.1", 1, "alice");
        registry.remove_connection(first.id(), Some(Timestamp(100)));

        let err = registry
            .resume(session, conn(2, "10.9.9.9"), Timestamp(200))
            .unwrap_err();
        assert_eq!(err.code, SignonFailureCode::UnmatchedNetworkAddress);
        assert!(registry.get(session).is_none());

        // The chance is spent; the right address no longer helps.
        let err = registry
            .resume(session, conn(3, "10.0.0.1"), Timestamp(200))
            .unwrap_err();
        assert_eq!(err.code, SignonFailureCode::UnknownSession);
    }

    #[test]
    fn resume_of_non_orphaned_record_does_not_consume_it() {
        let mut registry = registry();
        let connection = conn(1, "10.0.0.1");
        let session = activated(&mut registry, "10.0.0.1", 1, "alice");

        let err = registry
            .resume(session, connection, Timestamp(10))
            .unwrap_err();
        assert_eq!(err.code, SignonFailureCode::UnknownSession);
        assert!(matches!(
            registry.get(session),
            Some(SessionRecord::Active { .. })
        ));
    }

    #[test]
    fn explicit_signoff_removes_while_abrupt_loss_orphans() {
        let mut registry = registry();
        let connection = conn(1, "10.0.0.1");
        let session = activated(&mut registry, "10.0.0.1", 1, "alice");

        assert!(registry.remove_connection(connection.id(), None));
        assert!(registry.get(session).is_none());
        assert!(!registry.remove_connection(connection.id(), Some(Timestamp(5))));

        let connection = conn(2, "10.0.0.1");
        let session = activated(&mut registry, "10.0.0.1", 2, "alice");
        assert!(registry.remove_connection(connection.id(), Some(Timestamp(50))));
        assert!(matches!(
            registry.get(session),
            Some(SessionRecord::Orphaned { .. })
        ));
    }

    #[test]
    fn abrupt_loss_of_a_pending_record_consumes_it() {
        let mut registry = registry();
        let session = SessionId::generate();
        let connection = conn(1, "10.0.0.1");
        registry
            .create(session, connection, user("alice"), Timestamp(0))
            .unwrap();

        assert!(registry.remove_connection(connection.id(), Some(Timestamp(10))));
        assert!(registry.get(session).is_none());

        // The user may sign on again right away.
        registry
            .create(SessionId::generate(), conn(2, "10.0.0.1"), user("alice"), Timestamp(20))
            .unwrap();
    }

    #[test]
    fn remove_session_returns_the_bound_connection_once() {
        let mut registry = registry();
        let connection = conn(1, "10.0.0.1");
        let session = activated(&mut registry, "10.0.0.1", 1, "alice");

        assert_eq!(registry.remove_session(session), Some(connection.id()));
        assert_eq!(registry.remove_session(session), None);
    }

    #[test]
    fn remove_session_on_an_orphan_returns_no_connection() {
        let mut registry = registry();
        let connection = conn(1, "10.0.0.1");
        let session = activated(&mut registry, "10.0.0.1", 1, "alice");
        registry.remove_connection(connection.id(), Some(Timestamp(10)));

        assert_eq!(registry.remove_session(session), None);
        assert!(registry.get(session).is_none());
    }

    #[test]
    fn detached_connection_removal_fails_quietly() {
        let mut registry = registry();
        let connection = conn(1, "10.0.0.1");
        let session = activated(&mut registry, "10.0.0.1", 1, "alice");

        assert!(registry.remove_connection(connection.id(), Some(Timestamp(10))));
        assert!(!registry.remove_connection(connection.id(), Some(Timestamp(20))));
        assert!(!registry.remove_connection(connection.id(), None));
        assert!(matches!(
            registry.get(session),
            Some(SessionRecord::Orphaned { .. })
        ));
    }

    #[test]
    fn activate_on_undefined_edges_is_a_contract_violation() {
        let mut registry = registry();
        let connection = conn(1, "10.0.0.1");
        let session = activated(&mut registry, "10.0.0.1", 1, "alice");

        // Activating an already-active record.
        let err = registry
            .activate(session, connection, Timestamp(10), false)
            .unwrap_err();
        assert_eq!(
            err,
            ActivateError::Contract {
                state: "active",
                is_resumption: false,
            }
        );

        // Pending with the resumption flag set.
        let pending = SessionId::generate();
        let other = conn(2, "10.0.0.2");
        registry
            .create(pending, other, user("bob"), Timestamp(0))
            .unwrap();
        let err = registry
            .activate(pending, other, Timestamp(10), true)
            .unwrap_err();
        assert_eq!(
            err,
            ActivateError::Contract {
                state: "pending",
                is_resumption: true,
            }
        );

        // Neither violation consumed the record.
        assert!(registry.get(session).is_some());
        assert!(registry.get(pending).is_some());
    }

    #[test]
    fn signoff_releases_the_user_for_a_fresh_signon() {
        let mut registry = registry();
        let connection = conn(1, "10.0.0.1");
        let session = activated(&mut registry, "10.0.0.1", 1, "alice");

        registry.remove_connection(connection.id(), None);
        assert!(registry.get(session).is_none());

        let again = SessionId::generate();
        registry
            .create(again, conn(2, "10.0.0.1"), user("alice"), Timestamp(100))
            .unwrap();
    }

    #[test]
    fn resuming_record_lost_abruptly_is_consumed() {
        let mut registry = registry();
        let first = conn(1, "10.0.0.1");
        let session = activated(&mut registry, "10.0.0.1", 1, "alice");
        registry.remove_connection(first.id(), Some(Timestamp(100)));

        let replacement = conn(2, "10.0.0.1");
        registry
            .resume(session, replacement, Timestamp(200))
            .unwrap();

        // The replacement dies before the confirming activation.
        assert!(registry.remove_connection(replacement.id(), Some(Timestamp(300))));
        assert!(registry.get(session).is_none());
    }
}
