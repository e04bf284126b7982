//! Session record variants and the allowed transition edges.

use crate::core::{Connection, RemoteAddr, SessionId, Timestamp, UserId};

/// One session's lifecycle state.
///
/// Transitions flow pending -> active -> orphaned -> resuming -> active;
/// every other edge is a removal. Pending and resuming are single-shot: a
/// failed attempt to progress removes the record instead of leaving it for
/// a retry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionRecord {
    /// Created, awaiting the first activation.
    Pending {
        session: SessionId,
        user: UserId,
        connection: Connection,
        created_at: Timestamp,
        inactive_since: Timestamp,
    },
    /// Bound to a live connection; fully usable.
    Active {
        session: SessionId,
        user: UserId,
        connection: Connection,
        created_at: Timestamp,
    },
    /// Connection lost abruptly. Resumable within the grace window, only
    /// from the address that was active at loss time.
    Orphaned {
        session: SessionId,
        user: UserId,
        created_at: Timestamp,
        inactive_since: Timestamp,
        remote: RemoteAddr,
    },
    /// A replacement connection provisionally accepted, awaiting the
    /// confirming activation.
    Resuming {
        session: SessionId,
        user: UserId,
        connection: Connection,
        created_at: Timestamp,
        inactive_since: Timestamp,
    },
}

impl SessionRecord {
    pub fn session(&self) -> SessionId {
        match self {
            SessionRecord::Pending { session, .. }
            | SessionRecord::Active { session, .. }
            | SessionRecord::Orphaned { session, .. }
            | SessionRecord::Resuming { session, .. } => *session,
        }
    }

    pub fn user(&self) -> &UserId {
        match self {
            SessionRecord::Pending { user, .. }
            | SessionRecord::Active { user, .. }
            | SessionRecord::Orphaned { user, .. }
            | SessionRecord::Resuming { user, .. } => user,
        }
    }

    /// The bound connection, if any. Orphaned records have none.
    pub fn connection(&self) -> Option<Connection> {
        match self {
            SessionRecord::Pending { connection, .. }
            | SessionRecord::Active { connection, .. }
            | SessionRecord::Resuming { connection, .. } => Some(*connection),
            SessionRecord::Orphaned { .. } => None,
        }
    }

    pub fn created_at(&self) -> Timestamp {
        match self {
            SessionRecord::Pending { created_at, .. }
            | SessionRecord::Active { created_at, .. }
            | SessionRecord::Orphaned { created_at, .. }
            | SessionRecord::Resuming { created_at, .. } => *created_at,
        }
    }

    /// When the record last went inactive. Active records are not inactive.
    pub fn inactive_since(&self) -> Option<Timestamp> {
        match self {
            SessionRecord::Pending { inactive_since, .. }
            | SessionRecord::Orphaned { inactive_since, .. }
            | SessionRecord::Resuming { inactive_since, .. } => Some(*inactive_since),
            SessionRecord::Active { .. } => None,
        }
    }

    pub fn state_name(&self) -> &'static str {
        match self {
            SessionRecord::Pending { .. } => "pending",
            SessionRecord::Active { .. } => "active",
            SessionRecord::Orphaned { .. } => "orphaned",
            SessionRecord::Resuming { .. } => "resuming",
        }
    }
}
