//! Layer 1: Identity atoms
//!
//! UserId: principal identity supplied by the authenticator
//! SessionId: session token spanning reconnections
//! ConnectionId/RemoteAddr: transport-assigned connection identity

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{CoreError, InvalidId};

/// User identifier - non-empty string.
///
/// Produced by an external authenticator at signon time. No validation
/// beyond non-empty; the connector never interprets it.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(s: impl Into<String>) -> Result<Self, CoreError> {
        let s = s.into();
        if s.is_empty() {
            Err(InvalidId::User {
                raw: s,
                reason: "empty".into(),
            }
            .into())
        } else {
            Ok(Self(s))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({:?})", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session identifier - globally unique across reconnections.
///
/// Generated by the gate at signon; clients echo it back verbatim in
/// resignon. Copy is fine: it is the lookup key everywhere.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Generate a fresh session identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        Uuid::parse_str(s).map(Self).map_err(|e| {
            InvalidId::Session {
                raw: s.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Base58 alphabet (Bitcoin-style, no 0OIl) for secondary-signon tokens.
const TOKEN_ALPHABET: &[u8] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

const TOKEN_LEN: usize = 16;

/// Secondary-signon challenge token.
///
/// Handed to the client with `SecondarySignonNeeded` and echoed back with
/// the verification code.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecondaryToken(String);

impl SecondaryToken {
    pub fn new(s: impl Into<String>) -> Result<Self, CoreError> {
        let s = s.into();
        if s.is_empty() {
            Err(InvalidId::Token {
                raw: s,
                reason: "empty".into(),
            }
            .into())
        } else {
            Ok(Self(s))
        }
    }

    /// Generate a new challenge token.
    pub fn generate() -> Self {
        use rand::Rng;
        let mut rng = rand::rng();
        let token: String = (0..TOKEN_LEN)
            .map(|_| {
                let idx = rng.random_range(0..TOKEN_ALPHABET.len());
                TOKEN_ALPHABET[idx] as char
            })
            .collect();
        Self(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecondaryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecondaryToken({:?})", self.0)
    }
}

impl fmt::Display for SecondaryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transport-assigned connection identity.
///
/// Stable for the life of one physical connection; equality and lookup use
/// only this value, never the socket itself.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionId({})", self.0)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Peer network address, host only.
///
/// Resumed connections arrive on a fresh source port, so binding and
/// comparison use the IP address alone.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RemoteAddr(IpAddr);

impl RemoteAddr {
    pub fn new(ip: IpAddr) -> Self {
        Self(ip)
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        s.parse::<IpAddr>().map(Self).map_err(|e| {
            InvalidId::Remote {
                raw: s.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    pub fn ip(self) -> IpAddr {
        self.0
    }
}

impl fmt::Debug for RemoteAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RemoteAddr({})", self.0)
    }
}

impl fmt::Display for RemoteAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to a live network endpoint.
///
/// Owned by the transport layer; the registry only references it and never
/// creates or closes one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Connection {
    id: ConnectionId,
    remote: RemoteAddr,
}

impl Connection {
    pub fn new(id: ConnectionId, remote: RemoteAddr) -> Self {
        Self { id, remote }
    }

    pub fn id(self) -> ConnectionId {
        self.id
    }

    pub fn remote(self) -> RemoteAddr {
        self.remote
    }
}
