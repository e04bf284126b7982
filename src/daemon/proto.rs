//! Signon phase messages and codec.
//!
//! Protocol: newline-delimited JSON, one phase message per line, tagged by
//! `phase`. Command framing on an established session is carried elsewhere;
//! only the signon handshake lives here.
//!
//! Inbound: `{"phase": "primary_signon", "login": "...", "password": "..."}\n`
//! Outbound: `{"phase": "session_valid", "session": "..."}\n`

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{SecondaryToken, SessionId, SignonFailureNotice};

/// Wire code for refusals that do not come out of the session registry
/// (credential denials, protocol misuse). Registry refusals keep their own
/// closed code set.
pub const SIGNON_REFUSED: &str = "signon_refused";

/// Client -> connector signon phases.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum InboundPhase {
    /// Open a fresh session with primary credentials.
    PrimarySignon { login: String, password: String },
    /// Answer an outstanding secondary challenge.
    SecondarySignon { token: SecondaryToken, code: String },
    /// Rebind an orphaned session without re-running authentication.
    Resignon { session: SessionId },
    /// Deliberate sign-off; the session is released, not orphaned.
    Signoff,
}

impl InboundPhase {
    pub fn name(&self) -> &'static str {
        match self {
            InboundPhase::PrimarySignon { .. } => "primary_signon",
            InboundPhase::SecondarySignon { .. } => "secondary_signon",
            InboundPhase::Resignon { .. } => "resignon",
            InboundPhase::Signoff => "signoff",
        }
    }
}

/// Connector -> client signon phases.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum OutboundPhase {
    SecondarySignonNeeded { token: SecondaryToken },
    SessionValid { session: SessionId },
    SignonFailed { code: String, message: String },
    Kickout,
    Timeout,
}

impl OutboundPhase {
    /// A registry refusal, carrying its closed-taxonomy code.
    pub fn signon_failed(notice: &SignonFailureNotice) -> Self {
        OutboundPhase::SignonFailed {
            code: notice.code.as_str().to_string(),
            message: notice.message.clone(),
        }
    }

    /// A refusal originating outside the registry.
    pub fn signon_refused(message: impl Into<String>) -> Self {
        OutboundPhase::SignonFailed {
            code: SIGNON_REFUSED.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("malformed phase message: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub fn decode_inbound(line: &str) -> Result<InboundPhase, ProtoError> {
    Ok(serde_json::from_str(line)?)
}

/// Encode one outbound phase as a single ndjson line (newline included).
pub fn encode_outbound(phase: &OutboundPhase) -> Result<String, ProtoError> {
    let mut line = serde_json::to_string(phase)?;
    line.push('\n');
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SignonFailureCode;

    #[test]
    fn inbound_phases_decode() {
        let phase = decode_inbound(
            r#"{"phase": "primary_signon", "login": "alice", "password": "secret"}"#,
        )
        .unwrap();
        assert_eq!(
            phase,
            InboundPhase::PrimarySignon {
                login: "alice".into(),
                password: "secret".into(),
            }
        );

        let session = SessionId::generate();
        let phase =
            decode_inbound(&format!(r#"{{"phase": "resignon", "session": "{session}"}}"#)).unwrap();
        assert_eq!(phase, InboundPhase::Resignon { session });

        assert_eq!(
            decode_inbound(r#"{"phase": "signoff"}"#).unwrap(),
            InboundPhase::Signoff
        );
    }

    #[test]
    fn unknown_phase_tag_is_rejected() {
        assert!(decode_inbound(r#"{"phase": "warp_drive"}"#).is_err());
        assert!(decode_inbound("not json at all").is_err());
    }

    #[test]
    fn outbound_phases_encode_one_line() {
        let session = SessionId::generate();
        let line = encode_outbound(&OutboundPhase::SessionValid { session }).unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        assert!(line.contains("session_valid"));
    }

    #[test]
    fn signon_failed_carries_the_registry_code() {
        let session = SessionId::generate();
        let notice = SignonFailureNotice::unknown_session(&session);
        let phase = OutboundPhase::signon_failed(&notice);
        match &phase {
            OutboundPhase::SignonFailed { code, .. } => {
                assert_eq!(code, SignonFailureCode::UnknownSession.as_str());
            }
            other => panic!("expected signon_failed, got {other:?}"),
        }

        let line = encode_outbound(&phase).unwrap();
        let back: OutboundPhase = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(back, phase);
    }
}
