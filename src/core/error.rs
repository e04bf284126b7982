//! Core value-type errors (parsing, validation).
//!
//! These are bounded and stable: core errors represent invalid input,
//! not library implementation details. Signon refusals are not errors in
//! this sense; they live in [`super::notice`].

use thiserror::Error;

/// Invalid identifier.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum InvalidId {
    #[error("user id `{raw}` is invalid: {reason}")]
    User { raw: String, reason: String },
    #[error("session id `{raw}` is invalid: {reason}")]
    Session { raw: String, reason: String },
    #[error("secondary token `{raw}` is invalid: {reason}")]
    Token { raw: String, reason: String },
    #[error("remote address `{raw}` is invalid: {reason}")]
    Remote { raw: String, reason: String },
}

/// Canonical error enum for core value types.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum CoreError {
    #[error(transparent)]
    InvalidId(#[from] InvalidId),
}
