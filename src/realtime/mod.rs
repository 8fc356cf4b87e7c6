//! Realtime channel: socket contract, websocket transport and the
//! connection supervisor

pub mod listeners;
pub mod socket;
pub mod supervisor;
pub mod visibility;
pub mod ws;

pub use listeners::{Handler, Listeners, Subscription};
pub use socket::{
    is_auth_error, RealtimeSocket, SocketConnector, SocketEvent, SocketEventKind, SocketEvents,
};
pub use supervisor::{ConnectionError, ConnectionStatus, ConnectionSupervisor, SupervisorConfig};
pub use visibility::{Visibility, VisibilityMonitor};
pub use ws::{WsConnector, WsSocket, WsSocketConfig};
