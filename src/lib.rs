#![forbid(unsafe_code)]

pub mod config;
pub mod core;
pub mod daemon;
pub mod error;
pub mod telemetry;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

// Re-export core types at crate root for convenience
pub use crate::core::{
    Connection, ConnectionId, RemoteAddr, SecondaryToken, SessionId, SessionTimings,
    SignonFailureCode, SignonFailureNotice, Timestamp, UserId,
};
pub use crate::daemon::{SessionRecord, SessionRegistry, SharedRegistry};
