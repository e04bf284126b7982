//! Session lifecycle timing windows.
//!
//! The registry takes these as construction input; it never hardcodes a
//! duration. Defaults here are the config-layer fallbacks.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionTimings {
    /// How long a pending session may wait for its first activation,
    /// measured from creation.
    pub activation_deadline_ms: u64,
    /// How long an orphaned session remains eligible for resumption,
    /// measured from the moment its connection was lost.
    pub resume_grace_ms: u64,
    /// How long a connection may sit without completing signon before the
    /// gate times it out.
    pub signon_deadline_ms: u64,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            activation_deadline_ms: 30_000,
            resume_grace_ms: 120_000,
            signon_deadline_ms: 60_000,
        }
    }
}
