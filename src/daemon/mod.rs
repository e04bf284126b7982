//! Connector daemon: session registry, signon gate, protocol, server.

pub mod auth;
pub mod gate;
pub mod proto;
pub mod registry;
pub mod server;

pub use auth::{AuthOutcome, Authenticator, DevAuthenticator};
pub use gate::{Gate, GateAction, GatePhase};
pub use proto::{decode_inbound, encode_outbound, InboundPhase, OutboundPhase, ProtoError};
pub use registry::{
    ActivateError, SessionRecord, SessionRegistry, SharedRegistry, SignonResult,
};
pub use server::{Connector, ConnectorConfig, ConnectorHandle, ServerError};
