//! Session registry: ownership, binding, and resumption state.

pub mod record;
mod shared;
mod table;

pub use record::SessionRecord;
pub use shared::SharedRegistry;
pub use table::{ActivateError, SessionRegistry, SignonResult};
