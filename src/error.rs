use thiserror::Error;

use crate::config::ConfigError;
use crate::core::CoreError;
use crate::daemon::server::ServerError;

/// Crate-level convenience error.
///
/// Not a "god error": it is a thin wrapper over canonical capability
/// errors. Signon refusals are returned values, not errors, and never
/// appear here.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Server(#[from] ServerError),
}
