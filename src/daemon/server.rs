//! Connector accept loop and per-connection threads.
//!
//! One thread per live connection: a reader thread feeds decoded lines into
//! a channel, and the connection loop selects over inbound lines, control
//! messages (kickout), and an idle tick for the signon deadline. The gate
//! owns all registry traffic; this module only moves bytes and timestamps.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{Receiver, Sender};
use thiserror::Error;
use tracing::{info, warn};

use crate::core::{Connection, ConnectionId, RemoteAddr, SessionId, SessionTimings, Timestamp};

use super::auth::Authenticator;
use super::gate::{Gate, GateAction};
use super::proto::{decode_inbound, encode_outbound, OutboundPhase, ProtoError};
use super::registry::SharedRegistry;

#[derive(Clone, Debug)]
pub struct ConnectorConfig {
    pub listen_addr: String,
    pub max_connections: NonZeroUsize,
    pub timings: SessionTimings,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8473".to_string(),
            max_connections: NonZeroUsize::new(256).expect("nonzero"),
            timings: SessionTimings::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
enum ConnectionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode error: {0}")]
    Encode(#[from] ProtoError),
}

pub struct Connector {
    registry: SharedRegistry,
    auth: Arc<dyn Authenticator>,
    config: ConnectorConfig,
}

pub struct ConnectorHandle {
    shutdown: Arc<AtomicBool>,
    join: JoinHandle<()>,
    local_addr: SocketAddr,
    registry: SharedRegistry,
    directory: ConnectionDirectory,
}

impl ConnectorHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Administrative eviction: remove the session and kick the bound
    /// connection, if any. Idempotent like the registry operation.
    pub fn evict(&self, session: SessionId) -> Option<ConnectionId> {
        let connection = self.registry.remove_session(session)?;
        info!(%session, %connection, "session evicted");
        self.directory.kick(connection);
        Some(connection)
    }

    pub fn shutdown(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        let _ = self.join.join();
    }

    /// Block until the accept loop exits (external shutdown or bind loss).
    pub fn wait(self) {
        let _ = self.join.join();
    }
}

impl Connector {
    pub fn new(
        registry: SharedRegistry,
        auth: Arc<dyn Authenticator>,
        config: ConnectorConfig,
    ) -> Self {
        Self {
            registry,
            auth,
            config,
        }
    }

    pub fn start(self) -> Result<ConnectorHandle, ServerError> {
        let listener = TcpListener::bind(&self.config.listen_addr)?;
        let local_addr = listener.local_addr()?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let directory = ConnectionDirectory::default();

        let runtime = ConnectorRuntime {
            registry: self.registry.clone(),
            auth: self.auth,
            timings: self.config.timings,
            max_connections: self.config.max_connections,
            shutdown: Arc::clone(&shutdown),
            active_connections: Arc::new(AtomicUsize::new(0)),
            next_connection: Arc::new(AtomicU64::new(0)),
            directory: directory.clone(),
        };

        info!(%local_addr, "connector listening");
        let join = thread::spawn(move || run_accept_loop(listener, runtime));

        Ok(ConnectorHandle {
            shutdown,
            join,
            local_addr,
            registry: self.registry,
            directory,
        })
    }
}

#[derive(Clone)]
struct ConnectorRuntime {
    registry: SharedRegistry,
    auth: Arc<dyn Authenticator>,
    timings: SessionTimings,
    max_connections: NonZeroUsize,
    shutdown: Arc<AtomicBool>,
    active_connections: Arc<AtomicUsize>,
    next_connection: Arc<AtomicU64>,
    directory: ConnectionDirectory,
}

#[derive(Clone, Debug)]
enum ControlMessage {
    Kickout,
}

/// Routes control messages to the thread owning a connection.
#[derive(Clone, Default)]
struct ConnectionDirectory {
    inner: Arc<Mutex<BTreeMap<ConnectionId, Sender<ControlMessage>>>>,
}

impl ConnectionDirectory {
    fn register(&self, connection: ConnectionId, tx: Sender<ControlMessage>) {
        self.inner
            .lock()
            .expect("connection directory lock poisoned")
            .insert(connection, tx);
    }

    fn unregister(&self, connection: ConnectionId) {
        self.inner
            .lock()
            .expect("connection directory lock poisoned")
            .remove(&connection);
    }

    fn kick(&self, connection: ConnectionId) {
        let tx = self
            .inner
            .lock()
            .expect("connection directory lock poisoned")
            .get(&connection)
            .cloned();
        if let Some(tx) = tx {
            let _ = tx.send(ControlMessage::Kickout);
        }
    }
}

struct ConnectionGuard {
    active: Arc<AtomicUsize>,
}

impl ConnectionGuard {
    fn try_acquire(active: &Arc<AtomicUsize>, max: NonZeroUsize) -> Option<Self> {
        let mut current = active.load(Ordering::Acquire);
        loop {
            if current >= max.get() {
                return None;
            }
            match active.compare_exchange(
                current,
                current.saturating_add(1),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Some(Self {
                        active: Arc::clone(active),
                    });
                }
                Err(next) => current = next,
            }
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let prev = self.active.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "active connection counter underflow");
    }
}

fn run_accept_loop(listener: TcpListener, runtime: ConnectorRuntime) {
    if let Err(err) = listener.set_nonblocking(true) {
        tracing::error!("connector failed to set nonblocking: {err}");
        return;
    }

    loop {
        if runtime.shutdown.load(Ordering::Relaxed) {
            break;
        }

        match listener.accept() {
            Ok((stream, _)) => {
                if let Some(guard) =
                    ConnectionGuard::try_acquire(&runtime.active_connections, runtime.max_connections)
                {
                    let runtime = runtime.clone();
                    thread::spawn(move || {
                        if let Err(err) = run_connection(stream, runtime, guard) {
                            warn!("connection error: {err}");
                        }
                    });
                } else {
                    send_busy(stream);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(25));
            }
            Err(err) => {
                warn!("accept error: {err}");
                thread::sleep(Duration::from_millis(25));
            }
        }
    }
}

fn send_busy(mut stream: TcpStream) {
    let phase = OutboundPhase::signon_refused("connection limit reached");
    if let Ok(line) = encode_outbound(&phase) {
        let _ = stream.write_all(line.as_bytes());
    }
}

enum InboundEvent {
    Line(String),
    Closed,
}

fn run_connection(
    stream: TcpStream,
    runtime: ConnectorRuntime,
    _guard: ConnectionGuard,
) -> Result<(), ConnectionError> {
    // The accepted socket may inherit the listener's nonblocking mode.
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    let remote = RemoteAddr::new(stream.peer_addr()?.ip());
    let id = ConnectionId::new(runtime.next_connection.fetch_add(1, Ordering::Relaxed) + 1);
    let connection = Connection::new(id, remote);

    let reader_stream = stream.try_clone()?;
    let mut writer = stream.try_clone()?;

    let (inbound_tx, inbound_rx) = crossbeam::channel::unbounded::<InboundEvent>();
    let reader_handle = thread::spawn(move || run_reader_loop(reader_stream, inbound_tx));

    let (control_tx, control_rx) = crossbeam::channel::unbounded::<ControlMessage>();
    runtime.directory.register(id, control_tx);

    info!(connection = %id, %remote, "connection accepted");
    let mut gate = Gate::new(connection, Timestamp::now(), &runtime.timings);

    let result = drive_connection(
        &mut gate,
        &mut writer,
        &inbound_rx,
        &control_rx,
        &runtime,
    );

    runtime.directory.unregister(id);
    gate.handle_disconnect(&runtime.registry, Timestamp::now());
    let _ = stream.shutdown(Shutdown::Both);
    let _ = reader_handle.join();

    result
}

fn drive_connection(
    gate: &mut Gate,
    writer: &mut TcpStream,
    inbound_rx: &Receiver<InboundEvent>,
    control_rx: &Receiver<ControlMessage>,
    runtime: &ConnectorRuntime,
) -> Result<(), ConnectionError> {
    loop {
        if runtime.shutdown.load(Ordering::Relaxed) {
            return Ok(());
        }

        crossbeam::select! {
            recv(inbound_rx) -> event => {
                let event = match event {
                    Ok(event) => event,
                    Err(_) => return Ok(()),
                };
                match event {
                    InboundEvent::Line(line) => {
                        let now = Timestamp::now();
                        let actions = match decode_inbound(&line) {
                            Ok(phase) => gate.handle_phase(
                                phase,
                                &runtime.registry,
                                runtime.auth.as_ref(),
                                now,
                            ),
                            Err(err) => {
                                warn!(connection = %gate.connection().id(), %err, "undecodable phase");
                                vec![
                                    GateAction::Send(OutboundPhase::signon_refused(
                                        "malformed phase message",
                                    )),
                                    GateAction::Close,
                                ]
                            }
                        };
                        if apply_actions(writer, actions)? {
                            return Ok(());
                        }
                    }
                    InboundEvent::Closed => return Ok(()),
                }
            }
            recv(control_rx) -> msg => {
                match msg {
                    Ok(ControlMessage::Kickout) => {
                        let line = encode_outbound(&OutboundPhase::Kickout)?;
                        writer.write_all(line.as_bytes())?;
                        return Ok(());
                    }
                    Err(_) => return Ok(()),
                }
            }
            default(Duration::from_millis(250)) => {
                let actions = gate.check_signon_deadline(Timestamp::now());
                if apply_actions(writer, actions)? {
                    return Ok(());
                }
            }
        }
    }
}

/// Write outbound phases; `true` means the gate asked to close.
fn apply_actions(writer: &mut TcpStream, actions: Vec<GateAction>) -> Result<bool, ConnectionError> {
    let mut close = false;
    for action in actions {
        match action {
            GateAction::Send(phase) => {
                let line = encode_outbound(&phase)?;
                writer.write_all(line.as_bytes())?;
            }
            GateAction::Close => close = true,
        }
    }
    if close {
        writer.flush()?;
    }
    Ok(close)
}

fn run_reader_loop(stream: TcpStream, inbound_tx: Sender<InboundEvent>) {
    let reader = BufReader::new(stream);
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }
        if inbound_tx.send(InboundEvent::Line(line)).is_err() {
            return;
        }
    }
    let _ = inbound_tx.send(InboundEvent::Closed);
}
