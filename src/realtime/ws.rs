//! WebSocket Realtime Transport
//! Mission: Keep one authenticated channel open, reconnecting with backoff
//!
//! - Access token travels as `?token=<TOKEN>` and as `Authorization: Bearer <TOKEN>`
//! - Each attempt reads the current token, so a swapped credential is picked up
//! - Backoff doubles from 1s up to 30s; after too many consecutive failures
//!   the loop stops until `connect()` is called again
//! - Inbound text frames are forwarded on an mpsc channel

use crate::realtime::listeners::Subscription;
use crate::realtime::socket::{
    RealtimeSocket, SocketConnector, SocketEvent, SocketEventKind, SocketEvents, SocketHandler,
};
use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use reqwest::Url;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct WsSocketConfig {
    pub url: String,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Consecutive failed attempts before giving up
    pub max_attempts: u32,
}

impl WsSocketConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

struct WsShared {
    config: WsSocketConfig,
    token: RwLock<String>,
    connected: AtomicBool,
    events: SocketEvents,
    inbound: mpsc::UnboundedSender<String>,
}

impl WsShared {
    fn set_connected(&self, connected: bool) -> bool {
        self.connected.swap(connected, Ordering::SeqCst)
    }
}

/// tokio-tungstenite implementation of `RealtimeSocket`
pub struct WsSocket {
    shared: Arc<WsShared>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl WsSocket {
    pub fn new(
        config: WsSocketConfig,
        token: String,
        inbound: mpsc::UnboundedSender<String>,
    ) -> Self {
        Self {
            shared: Arc::new(WsShared {
                config,
                token: RwLock::new(token),
                connected: AtomicBool::new(false),
                events: SocketEvents::new(),
                inbound,
            }),
            driver: Mutex::new(None),
        }
    }

    pub fn listener_count(&self, kind: SocketEventKind) -> usize {
        self.shared.events.listener_count(kind)
    }
}

impl RealtimeSocket for WsSocket {
    fn on(&self, kind: SocketEventKind, handler: SocketHandler) -> Subscription {
        self.shared.events.on(kind, handler)
    }

    fn set_auth_token(&self, token: String) {
        *self.shared.token.write() = token;
        debug!("Socket credential updated");
    }

    fn auth_token(&self) -> String {
        self.shared.token.read().clone()
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    fn connect(&self) {
        let mut driver = self.driver.lock();
        if driver.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        *driver = Some(tokio::spawn(drive(self.shared.clone())));
    }

    fn close(&self) {
        if let Some(handle) = self.driver.lock().take() {
            handle.abort();
        }
        if self.shared.set_connected(false) {
            self.shared
                .events
                .emit(&SocketEvent::Disconnect("io client disconnect".to_string()));
        }
    }
}

impl Drop for WsSocket {
    fn drop(&mut self) {
        if let Some(handle) = self.driver.lock().take() {
            handle.abort();
        }
    }
}

/// Connection loop: connect, pump frames, back off, repeat
async fn drive(shared: Arc<WsShared>) {
    let config = &shared.config;
    let mut delay = config.initial_backoff;
    let mut failures: u32 = 0;

    loop {
        match open_stream(&shared).await {
            Ok(stream) => {
                failures = 0;
                delay = config.initial_backoff;
                shared.set_connected(true);
                info!("✅ Realtime channel connected");
                shared.events.emit(&SocketEvent::Connect);

                let reason = pump(&shared, stream).await;

                shared.set_connected(false);
                info!("Realtime channel disconnected: {}", reason);
                shared.events.emit(&SocketEvent::Disconnect(reason));
            }
            Err(e) => {
                failures += 1;
                let message = format!("{:#}", e);
                warn!(attempt = failures, "Realtime connect failed: {}", message);
                shared.events.emit(&SocketEvent::ConnectError(message));

                if failures >= config.max_attempts {
                    warn!(
                        "Giving up after {} consecutive failed attempts",
                        failures
                    );
                    return;
                }
            }
        }

        debug!("Reconnecting in {:?}...", delay);
        sleep(delay).await;
        delay = (delay * 2).min(config.max_backoff);
    }
}

async fn open_stream(shared: &WsShared) -> Result<WsStream> {
    // Read the token per attempt; never log it.
    let token = shared.token.read().clone();

    let mut url = Url::parse(&shared.config.url).context("Invalid realtime URL")?;
    url.query_pairs_mut().append_pair("token", &token);

    let mut request = url
        .as_str()
        .into_client_request()
        .context("Failed to build websocket request")?;
    if let Ok(value) = format!("Bearer {}", token).parse() {
        request.headers_mut().insert("Authorization", value);
    }

    debug!("🔌 Connecting to {}", shared.config.url);
    let (stream, response) = connect_async(request)
        .await
        .context("Failed to connect to realtime server")?;
    debug!("Handshake status: {}", response.status());

    Ok(stream)
}

/// Forward frames until the stream ends; returns the disconnect reason
async fn pump(shared: &WsShared, stream: WsStream) -> String {
    let (mut write, mut read) = stream.split();

    while let Some(message) = read.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if shared.inbound.send(text).is_err() {
                    debug!("Inbound receiver dropped");
                }
            }
            Ok(Message::Ping(payload)) => {
                if let Err(e) = write.send(Message::Pong(payload)).await {
                    return format!("transport error: {}", e);
                }
            }
            Ok(Message::Close(frame)) => {
                debug!("Closed by server: {:?}", frame);
                return "io server disconnect".to_string();
            }
            Ok(Message::Binary(data)) => {
                debug!("Ignoring binary frame ({} bytes)", data.len());
            }
            Ok(_) => {}
            Err(e) => {
                shared.events.emit(&SocketEvent::Error(e.to_string()));
                return format!("transport error: {}", e);
            }
        }
    }

    "transport close".to_string()
}

/// Opens `WsSocket`s that share one inbound message channel
pub struct WsConnector {
    config: WsSocketConfig,
    inbound: mpsc::UnboundedSender<String>,
}

impl WsConnector {
    /// Returns the connector and the receiver for inbound text frames
    pub fn new(config: WsSocketConfig) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (inbound, inbound_rx) = mpsc::unbounded_channel();
        (Self { config, inbound }, inbound_rx)
    }
}

impl SocketConnector for WsConnector {
    fn open(&self, token: String) -> Arc<dyn RealtimeSocket> {
        Arc::new(WsSocket::new(
            self.config.clone(),
            token,
            self.inbound.clone(),
        ))
    }
}
