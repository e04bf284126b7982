//! Per-connection signon protocol driver.
//!
//! The gate is the registry's sole caller. Like the registry it is a pure
//! state machine: the server feeds it inbound phases together with the
//! arrival time, and it returns outbound actions. All registry calls go
//! through [`SharedRegistry`], which locks per call, so the gate never
//! holds the table lock across its own logic.

use tracing::{error, info, warn};

use crate::core::{Connection, SecondaryToken, SessionId, SessionTimings, Timestamp, UserId};

use super::auth::{AuthOutcome, Authenticator};
use super::proto::{InboundPhase, OutboundPhase};
use super::registry::{ActivateError, SharedRegistry};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GatePhase {
    AwaitingSignon,
    AwaitingSecondary,
    Established,
    Closed,
}

#[derive(Clone, Debug, PartialEq)]
pub enum GateAction {
    Send(OutboundPhase),
    Close,
}

#[derive(Debug)]
pub struct Gate {
    connection: Connection,
    opened_at: Timestamp,
    signon_deadline_ms: u64,
    phase: GatePhase,
    challenge: Option<SecondaryToken>,
    session: Option<SessionId>,
}

impl Gate {
    pub fn new(connection: Connection, opened_at: Timestamp, timings: &SessionTimings) -> Self {
        Self {
            connection,
            opened_at,
            signon_deadline_ms: timings.signon_deadline_ms,
            phase: GatePhase::AwaitingSignon,
            challenge: None,
            session: None,
        }
    }

    pub fn phase(&self) -> GatePhase {
        self.phase
    }

    pub fn connection(&self) -> Connection {
        self.connection
    }

    /// The established session, once signon completed.
    pub fn session(&self) -> Option<SessionId> {
        self.session
    }

    pub fn handle_phase(
        &mut self,
        phase: InboundPhase,
        registry: &SharedRegistry,
        auth: &dyn Authenticator,
        now: Timestamp,
    ) -> Vec<GateAction> {
        if self.phase == GatePhase::Closed {
            return Vec::new();
        }

        match (self.phase, phase) {
            (GatePhase::AwaitingSignon, InboundPhase::PrimarySignon { login, password }) => {
                match auth.primary(&login, &password) {
                    AuthOutcome::Granted(user) => self.establish(user, registry, now),
                    AuthOutcome::SecondaryNeeded(token) => {
                        self.phase = GatePhase::AwaitingSecondary;
                        self.challenge = Some(token.clone());
                        vec![GateAction::Send(OutboundPhase::SecondarySignonNeeded {
                            token,
                        })]
                    }
                    AuthOutcome::Denied { message } => self.refuse(message),
                }
            }
            (GatePhase::AwaitingSecondary, InboundPhase::SecondarySignon { token, code }) => {
                let Some(expected) = self.challenge.take() else {
                    return self.refuse("no secondary challenge outstanding");
                };
                if token != expected {
                    return self.refuse("secondary token does not match the challenge");
                }
                match auth.secondary(&token, &code) {
                    AuthOutcome::Granted(user) => self.establish(user, registry, now),
                    AuthOutcome::Denied { message } => self.refuse(message),
                    AuthOutcome::SecondaryNeeded(_) => {
                        self.refuse("secondary verification did not complete")
                    }
                }
            }
            (GatePhase::AwaitingSignon, InboundPhase::Resignon { session }) => {
                self.resign(session, registry, now)
            }
            (_, InboundPhase::Signoff) => {
                if self.phase == GatePhase::Established {
                    registry.remove_connection(self.connection.id(), None);
                    info!(connection = %self.connection.id(), "signed off");
                }
                self.phase = GatePhase::Closed;
                vec![GateAction::Close]
            }
            (_, other) => self.refuse(format!("unexpected {} phase", other.name())),
        }
    }

    /// Emit a timeout if signon has not completed within the deadline.
    ///
    /// Called by the server on idle ticks with the current time; the gate
    /// itself never reads a clock.
    pub fn check_signon_deadline(&mut self, now: Timestamp) -> Vec<GateAction> {
        match self.phase {
            GatePhase::AwaitingSignon | GatePhase::AwaitingSecondary
                if now.is_past(self.opened_at, self.signon_deadline_ms) =>
            {
                warn!(connection = %self.connection.id(), "signon deadline exceeded");
                self.phase = GatePhase::Closed;
                vec![GateAction::Send(OutboundPhase::Timeout), GateAction::Close]
            }
            _ => Vec::new(),
        }
    }

    /// The transport saw the connection drop.
    ///
    /// An established session becomes orphaned and may be resumed; a
    /// half-signed-on connection just loses its chance. Quietly does
    /// nothing when the record is already gone (sign-off, kickout).
    pub fn handle_disconnect(&mut self, registry: &SharedRegistry, now: Timestamp) -> bool {
        self.phase = GatePhase::Closed;
        let detached = registry.remove_connection(self.connection.id(), Some(now));
        if detached {
            info!(connection = %self.connection.id(), "connection lost, session detached");
        }
        detached
    }

    fn establish(
        &mut self,
        user: UserId,
        registry: &SharedRegistry,
        now: Timestamp,
    ) -> Vec<GateAction> {
        let session = SessionId::generate();
        if let Err(notice) = registry.create(session, self.connection, user, now) {
            warn!(connection = %self.connection.id(), %notice, "signon refused");
            self.phase = GatePhase::Closed;
            return vec![
                GateAction::Send(OutboundPhase::signon_failed(&notice)),
                GateAction::Close,
            ];
        }
        self.finalize(session, registry, now, false)
    }

    fn resign(
        &mut self,
        session: SessionId,
        registry: &SharedRegistry,
        now: Timestamp,
    ) -> Vec<GateAction> {
        if let Err(notice) = registry.resume(session, self.connection, now) {
            warn!(connection = %self.connection.id(), %notice, "resignon refused");
            self.phase = GatePhase::Closed;
            return vec![
                GateAction::Send(OutboundPhase::signon_failed(&notice)),
                GateAction::Close,
            ];
        }
        self.finalize(session, registry, now, true)
    }

    fn finalize(
        &mut self,
        session: SessionId,
        registry: &SharedRegistry,
        now: Timestamp,
        is_resumption: bool,
    ) -> Vec<GateAction> {
        match registry.activate(session, self.connection, now, is_resumption) {
            Ok(user) => {
                info!(
                    connection = %self.connection.id(),
                    %session,
                    %user,
                    resumed = is_resumption,
                    "session established"
                );
                self.phase = GatePhase::Established;
                self.session = Some(session);
                vec![GateAction::Send(OutboundPhase::SessionValid { session })]
            }
            Err(ActivateError::Refused(notice)) => {
                warn!(connection = %self.connection.id(), %notice, "activation refused");
                self.phase = GatePhase::Closed;
                vec![
                    GateAction::Send(OutboundPhase::signon_failed(&notice)),
                    GateAction::Close,
                ]
            }
            Err(err @ ActivateError::Contract { .. }) => {
                // Not peer-visible: this edge does not exist in the state
                // machine, so the peer gets a bare close.
                error!(connection = %self.connection.id(), %err, "activation contract violation");
                self.phase = GatePhase::Closed;
                vec![GateAction::Close]
            }
        }
    }

    fn refuse(&mut self, message: impl Into<String>) -> Vec<GateAction> {
        let message = message.into();
        warn!(connection = %self.connection.id(), %message, "signon refused");
        self.phase = GatePhase::Closed;
        vec![
            GateAction::Send(OutboundPhase::signon_refused(message)),
            GateAction::Close,
        ]
    }
}
