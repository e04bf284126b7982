//! Credential verification seam.
//!
//! The connector never checks credentials itself. The embedder supplies an
//! [`Authenticator`]; the gate only routes its outcome into the session
//! registry.

use crate::core::{SecondaryToken, UserId};

/// Outcome of one credential check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Credentials accepted; the principal owns the new session.
    Granted(UserId),
    /// Primary credentials accepted, second factor required. The token is
    /// handed to the client and must accompany the verification code.
    SecondaryNeeded(SecondaryToken),
    /// Credentials rejected. The message is peer-visible.
    Denied { message: String },
}

pub trait Authenticator: Send + Sync {
    fn primary(&self, login: &str, password: &str) -> AuthOutcome;
    fn secondary(&self, token: &SecondaryToken, code: &str) -> AuthOutcome;
}

/// Development authenticator: grants any non-empty login as its own user
/// id, with no password or second-factor check. `tetherd` falls back to
/// this when the embedder wires nothing else in; never expose it beyond a
/// development setup.
pub struct DevAuthenticator;

impl Authenticator for DevAuthenticator {
    fn primary(&self, login: &str, _password: &str) -> AuthOutcome {
        match UserId::new(login) {
            Ok(user) => AuthOutcome::Granted(user),
            Err(_) => AuthOutcome::Denied {
                message: "login must not be empty".into(),
            },
        }
    }

    fn secondary(&self, _token: &SecondaryToken, _code: &str) -> AuthOutcome {
        AuthOutcome::Denied {
            message: "no secondary challenge outstanding".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_authenticator_grants_any_login() {
        let outcome = DevAuthenticator.primary("alice", "whatever");
        assert_eq!(outcome, AuthOutcome::Granted(UserId::new("alice").unwrap()));
    }

    #[test]
    fn dev_authenticator_rejects_empty_login() {
        assert!(matches!(
            DevAuthenticator.primary("", ""),
            AuthOutcome::Denied { .. }
        ));
    }
}
