//! Core value types and the signon failure taxonomy.
//!
//! Layered leaves-first: time and identity atoms, then notices and timing
//! windows. Nothing here does I/O or reads a clock on its own behalf.

pub mod error;
pub mod identity;
pub mod notice;
pub mod time;
pub mod timings;

pub use error::{CoreError, InvalidId};
pub use identity::{Connection, ConnectionId, RemoteAddr, SecondaryToken, SessionId, UserId};
pub use notice::{SignonFailureCode, SignonFailureNotice};
pub use time::Timestamp;
pub use timings::SessionTimings;
