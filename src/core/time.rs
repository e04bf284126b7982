//! Layer 0: Time primitives
//!
//! Caller-supplied wall-clock timestamps. The registry never reads a clock:
//! every operation takes the instant that should count as "now" (typically
//! message-arrival time), which keeps timing decisions deterministic.

use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch.
///
/// Copy is fine - it's a measurement, not causality.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Current wall time. Only transport-layer code calls this; everything
    /// below takes the value as a parameter.
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self(ms)
    }

    pub fn millis(self) -> u64 {
        self.0
    }

    /// Milliseconds elapsed since `earlier`, saturating at zero if the
    /// caller's clock ran backwards between calls.
    pub fn millis_since(self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    /// Whether more than `window_ms` has elapsed since `since`.
    ///
    /// The boundary instant itself is still inside the window.
    pub fn is_past(self, since: Timestamp, window_ms: u64) -> bool {
        self.millis_since(since) > window_ms
    }
}
