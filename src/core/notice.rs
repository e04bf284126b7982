//! Signon failure taxonomy.
//!
//! Failures are returned values, never exceptions. The registry recovers
//! every normal failure locally and hands the caller a notice; the gate
//! turns it into an outbound `SignonFailed` phase.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::identity::{SessionId, UserId};

/// Closed set of signon refusal kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SignonFailureCode {
    /// The user already owns a session in some state.
    SessionAlreadyAttributed,
    /// No matching record, or a single-shot record expired or was consumed.
    UnknownSession,
    /// The connection does not originate from the bound network address.
    UnmatchedNetworkAddress,
}

impl SignonFailureCode {
    pub fn as_str(self) -> &'static str {
        match self {
            SignonFailureCode::SessionAlreadyAttributed => "session_already_attributed",
            SignonFailureCode::UnknownSession => "unknown_session",
            SignonFailureCode::UnmatchedNetworkAddress => "unmatched_network_address",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "session_already_attributed" => Some(SignonFailureCode::SessionAlreadyAttributed),
            "unknown_session" => Some(SignonFailureCode::UnknownSession),
            "unmatched_network_address" => Some(SignonFailureCode::UnmatchedNetworkAddress),
            _ => None,
        }
    }
}

impl fmt::Display for SignonFailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for SignonFailureCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SignonFailureCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        SignonFailureCode::parse(&raw).ok_or_else(|| {
            serde::de::Error::custom(format!("unknown signon failure code `{raw}`"))
        })
    }
}

/// A signon refusal the peer is allowed to see.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct SignonFailureNotice {
    pub code: SignonFailureCode,
    pub message: String,
}

impl SignonFailureNotice {
    pub fn new(code: SignonFailureCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn session_already_attributed(user: &UserId) -> Self {
        Self::new(
            SignonFailureCode::SessionAlreadyAttributed,
            format!("user {user} already owns a session"),
        )
    }

    pub fn unknown_session(session: &SessionId) -> Self {
        Self::new(
            SignonFailureCode::UnknownSession,
            format!("session {session} is not available for signon"),
        )
    }

    pub fn unmatched_network_address(session: &SessionId) -> Self {
        Self::new(
            SignonFailureCode::UnmatchedNetworkAddress,
            format!("connection address does not match session {session}"),
        )
    }
}
