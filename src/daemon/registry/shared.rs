//! Thread-safe registry handle for connection threads.
//!
//! One coarse lock over the whole table. The cross-record invariants
//! (single ownership, single binding) are check-then-act sequences, so the
//! entire operation must be atomic; per-record locking could not enforce
//! them. No operation calls back into external code while holding the
//! lock, so there is no re-entrancy hazard.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::core::{Connection, ConnectionId, SessionId, Timestamp, UserId};

use super::table::{ActivateError, SessionRegistry, SignonResult};

#[derive(Clone)]
pub struct SharedRegistry {
    inner: Arc<Mutex<SessionRegistry>>,
}

impl SharedRegistry {
    pub fn new(registry: SessionRegistry) -> Self {
        Self {
            inner: Arc::new(Mutex::new(registry)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, SessionRegistry> {
        self.inner.lock().expect("session registry lock poisoned")
    }

    pub fn create(
        &self,
        session: SessionId,
        connection: Connection,
        user: UserId,
        now: Timestamp,
    ) -> SignonResult<()> {
        self.lock().create(session, connection, user, now)
    }

    pub fn activate(
        &self,
        session: SessionId,
        connection: Connection,
        now: Timestamp,
        is_resumption: bool,
    ) -> Result<UserId, ActivateError> {
        self.lock().activate(session, connection, now, is_resumption)
    }

    pub fn remove_connection(&self, connection: ConnectionId, now: Option<Timestamp>) -> bool {
        self.lock().remove_connection(connection, now)
    }

    pub fn resume(
        &self,
        session: SessionId,
        connection: Connection,
        now: Timestamp,
    ) -> SignonResult<()> {
        self.lock().resume(session, connection, now)
    }

    pub fn remove_session(&self, session: SessionId) -> Option<ConnectionId> {
        self.lock().remove_session(session)
    }
}
