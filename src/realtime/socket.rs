//! Realtime socket contract
//!
//! The supervisor only talks to sockets through `RealtimeSocket`, so the
//! websocket transport and test doubles are interchangeable.

use crate::realtime::listeners::{Handler, Listeners, Subscription};
use std::{fmt, sync::Arc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketEventKind {
    Connect,
    Disconnect,
    ConnectError,
    Error,
}

impl SocketEventKind {
    pub const ALL: [SocketEventKind; 4] = [
        SocketEventKind::Connect,
        SocketEventKind::Disconnect,
        SocketEventKind::ConnectError,
        SocketEventKind::Error,
    ];
}

impl fmt::Display for SocketEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketEventKind::Connect => write!(f, "connect"),
            SocketEventKind::Disconnect => write!(f, "disconnect"),
            SocketEventKind::ConnectError => write!(f, "connect_error"),
            SocketEventKind::Error => write!(f, "error"),
        }
    }
}

/// Lifecycle events raised by a socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Connect,
    Disconnect(String),   // reason
    ConnectError(String), // handshake/transport failure text
    Error(String),
}

impl SocketEvent {
    pub fn kind(&self) -> SocketEventKind {
        match self {
            SocketEvent::Connect => SocketEventKind::Connect,
            SocketEvent::Disconnect(_) => SocketEventKind::Disconnect,
            SocketEvent::ConnectError(_) => SocketEventKind::ConnectError,
            SocketEvent::Error(_) => SocketEventKind::Error,
        }
    }
}

pub type SocketHandler = Handler<SocketEvent>;

/// One authenticated realtime channel
pub trait RealtimeSocket: Send + Sync {
    /// Register a handler for one event kind
    fn on(&self, kind: SocketEventKind, handler: SocketHandler) -> Subscription;

    /// Replace the credential used by the next (re)connection attempt
    fn set_auth_token(&self, token: String);

    fn auth_token(&self) -> String;

    fn is_connected(&self) -> bool;

    /// Start (or restart) connecting. No-op while a connection loop runs.
    fn connect(&self);

    /// Stop connecting and drop the connection
    fn close(&self);
}

/// Opens sockets authenticated with a given access token
pub trait SocketConnector: Send + Sync {
    fn open(&self, token: String) -> Arc<dyn RealtimeSocket>;
}

/// Per-kind listener registries, shared by socket implementations
pub struct SocketEvents {
    connect: Arc<Listeners<SocketEvent>>,
    disconnect: Arc<Listeners<SocketEvent>>,
    connect_error: Arc<Listeners<SocketEvent>>,
    error: Arc<Listeners<SocketEvent>>,
}

impl SocketEvents {
    pub fn new() -> Self {
        Self {
            connect: Arc::new(Listeners::new()),
            disconnect: Arc::new(Listeners::new()),
            connect_error: Arc::new(Listeners::new()),
            error: Arc::new(Listeners::new()),
        }
    }

    fn registry(&self, kind: SocketEventKind) -> &Arc<Listeners<SocketEvent>> {
        match kind {
            SocketEventKind::Connect => &self.connect,
            SocketEventKind::Disconnect => &self.disconnect,
            SocketEventKind::ConnectError => &self.connect_error,
            SocketEventKind::Error => &self.error,
        }
    }

    pub fn on(&self, kind: SocketEventKind, handler: SocketHandler) -> Subscription {
        self.registry(kind).subscribe(handler)
    }

    pub fn emit(&self, event: &SocketEvent) {
        self.registry(event.kind()).emit(event);
    }

    pub fn listener_count(&self, kind: SocketEventKind) -> usize {
        self.registry(kind).len()
    }

    pub fn total_listeners(&self) -> usize {
        SocketEventKind::ALL
            .iter()
            .map(|kind| self.listener_count(*kind))
            .sum()
    }
}

impl Default for SocketEvents {
    fn default() -> Self {
        Self::new()
    }
}

/// Does this connect error mean the credential was rejected?
pub fn is_auth_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    ["401", "unauthorized", "authentication"]
        .iter()
        .any(|needle| lower.contains(needle))
}
