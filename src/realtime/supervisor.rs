//! Realtime Connection Supervisor
//! Mission: Keep one authenticated channel alive for one mounted consumer
//!
//! Credential refresh has three independent triggers, all sharing one
//! single-flight refresher:
//! - the socket reports an authentication failure on connect
//! - the app becomes visible again
//! - a periodic timer (25 minutes by default)
//!
//! A reconnect after a disconnect of at least `gap_threshold` is a "gap
//! reconnect": consumers watching `ConnectionStatus::last_reconnect_time`
//! should re-sync anything they may have missed.

use crate::client::{
    credentials::CredentialReader,
    lifecycle::SessionManager,
    refresh::{RefreshTrigger, SharedRefresher},
};
use crate::realtime::{
    listeners::Subscription,
    socket::{is_auth_error, RealtimeSocket, SocketConnector, SocketEvent, SocketEventKind},
    visibility::{Visibility, VisibilityMonitor},
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::{Arc, Weak};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub refresh_interval: Duration,
    pub gap_threshold: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(25 * 60),
            gap_threshold: Duration::from_secs(10),
        }
    }
}

/// Connection state as seen by consumers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub is_connected: bool,
    pub last_disconnect_at: Option<DateTime<Utc>>,
    /// Set only by a reconnect after a long enough gap
    pub last_reconnect_time: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("No session available")]
    NoSession,

    #[error("No access token available")]
    NoCredential,

    #[error("Not started within a tokio runtime")]
    NoRuntime,
}

/// State shared by the socket handlers and trigger tasks of one channel
struct Channel {
    socket: Arc<dyn RealtimeSocket>,
    credentials: CredentialReader,
    refresher: Arc<SharedRefresher>,
    status: Arc<watch::Sender<ConnectionStatus>>,
    gap_threshold: Duration,
    last_disconnect: Mutex<Option<Instant>>,
    /// Runtime the channel was started on; events may arrive from any thread
    runtime: Handle,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Channel {
    fn on_connect(&self) {
        let gap = self
            .last_disconnect
            .lock()
            .map(|at| Instant::now().saturating_duration_since(at));
        let gap_reconnect = gap.is_some_and(|gap| gap >= self.gap_threshold);

        self.status.send_modify(|status| {
            status.is_connected = true;
            status.error = None;
            if gap_reconnect {
                status.last_reconnect_time = Some(Utc::now());
            }
        });

        if gap_reconnect {
            info!(gap = ?gap, "🔁 Realtime channel reconnected after gap");
        } else {
            debug!("Realtime channel connected");
        }
    }

    fn on_disconnect(&self, reason: &str) {
        *self.last_disconnect.lock() = Some(Instant::now());
        self.status.send_modify(|status| {
            status.is_connected = false;
            status.last_disconnect_at = Some(Utc::now());
        });
        info!("Realtime channel disconnected: {}", reason);
    }

    /// Refresh, then hand the new access token to the socket
    async fn refresh_credential(&self, trigger: RefreshTrigger) -> bool {
        if !self.refresher.refresh(trigger).await.is_refreshed() {
            return false;
        }
        match self.credentials.access_token() {
            Some(token) => {
                self.socket.set_auth_token(token);
                true
            }
            None => false,
        }
    }

    fn spawn_trigger(self: &Arc<Self>, trigger: RefreshTrigger) {
        let channel = Arc::downgrade(self);
        let handle = self.runtime.spawn(async move {
            let Some(channel) = channel.upgrade() else {
                return;
            };
            let refreshed = channel.refresh_credential(trigger).await;
            if refreshed && trigger == RefreshTrigger::Visibility && !channel.socket.is_connected()
            {
                debug!("Forcing reconnect after visibility refresh");
                channel.socket.connect();
            }
        });

        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    fn abort_tasks(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

fn socket_handler(
    channel: &Arc<Channel>,
    handle: impl Fn(&Arc<Channel>, &SocketEvent) + Send + Sync + 'static,
) -> Arc<dyn Fn(&SocketEvent) + Send + Sync> {
    let channel: Weak<Channel> = Arc::downgrade(channel);
    Arc::new(move |event: &SocketEvent| {
        if let Some(channel) = channel.upgrade() {
            handle(&channel, event);
        }
    })
}

struct Mounted {
    channel: Arc<Channel>,
    /// Four socket handlers, the visibility listener and the periodic timer
    subscriptions: Vec<Subscription>,
}

enum Phase {
    Idle,
    Failed(ConnectionError),
    Running(Mounted),
    TornDown,
}

/// Supervises one realtime channel for one consumer
pub struct ConnectionSupervisor {
    session: Arc<SessionManager>,
    refresher: Arc<SharedRefresher>,
    connector: Arc<dyn SocketConnector>,
    visibility: Arc<VisibilityMonitor>,
    config: SupervisorConfig,
    status: Arc<watch::Sender<ConnectionStatus>>,
    phase: Mutex<Phase>,
}

impl ConnectionSupervisor {
    pub fn new(
        session: Arc<SessionManager>,
        refresher: Arc<SharedRefresher>,
        connector: Arc<dyn SocketConnector>,
        visibility: Arc<VisibilityMonitor>,
        config: SupervisorConfig,
    ) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::default());
        Self {
            session,
            refresher,
            connector,
            visibility,
            config,
            status: Arc::new(status),
            phase: Mutex::new(Phase::Idle),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// The supervised socket, while running
    pub fn socket(&self) -> Option<Arc<dyn RealtimeSocket>> {
        match &*self.phase.lock() {
            Phase::Running(mounted) => Some(mounted.channel.socket.clone()),
            _ => None,
        }
    }

    /// Open the channel. Runs once: later calls return the first outcome.
    /// Must be called within a tokio runtime; events and visibility changes
    /// may then come from any thread.
    pub fn start(&self) -> Result<(), ConnectionError> {
        let mut phase = self.phase.lock();
        match &*phase {
            Phase::Idle => {}
            Phase::Failed(e) => return Err(e.clone()),
            Phase::Running(_) => return Ok(()),
            Phase::TornDown => {
                debug!("Supervisor already torn down; start ignored");
                return Ok(());
            }
        }

        match self.mount() {
            Ok(mounted) => {
                *phase = Phase::Running(mounted);
                Ok(())
            }
            Err(e) => {
                warn!("Realtime channel not started: {}", e);
                self.status
                    .send_modify(|status| status.error = Some(e.to_string()));
                *phase = Phase::Failed(e.clone());
                Err(e)
            }
        }
    }

    fn mount(&self) -> Result<Mounted, ConnectionError> {
        let info = self.session.info().ok_or(ConnectionError::NoSession)?;
        let credentials = self.session.credentials();
        let token = credentials
            .access_token()
            .ok_or(ConnectionError::NoCredential)?;

        let runtime = Handle::try_current().map_err(|_| ConnectionError::NoRuntime)?;
        let socket = self.connector.open(token);
        let channel = Arc::new(Channel {
            socket: socket.clone(),
            credentials,
            refresher: self.refresher.clone(),
            status: self.status.clone(),
            gap_threshold: self.config.gap_threshold,
            last_disconnect: Mutex::new(None),
            runtime: runtime.clone(),
            tasks: Mutex::new(Vec::new()),
        });

        let mut subscriptions = vec![
            socket.on(
                SocketEventKind::Connect,
                socket_handler(&channel, |channel, _| channel.on_connect()),
            ),
            socket.on(
                SocketEventKind::Disconnect,
                socket_handler(&channel, |channel, event| {
                    if let SocketEvent::Disconnect(reason) = event {
                        channel.on_disconnect(reason);
                    }
                }),
            ),
            socket.on(
                SocketEventKind::ConnectError,
                socket_handler(&channel, |channel, event| {
                    if let SocketEvent::ConnectError(message) = event {
                        if is_auth_error(message) {
                            info!("🔑 Credential rejected, refreshing: {}", message);
                            channel.spawn_trigger(RefreshTrigger::ConnectError);
                        } else {
                            debug!("Connect error (transport will retry): {}", message);
                        }
                    }
                }),
            ),
            socket.on(
                SocketEventKind::Error,
                socket_handler(&channel, |_, event| {
                    if let SocketEvent::Error(message) = event {
                        warn!("Realtime socket error: {}", message);
                    }
                }),
            ),
        ];

        let weak = Arc::downgrade(&channel);
        subscriptions.push(self.visibility.on_change(Arc::new(move |visibility: &Visibility| {
            if *visibility != Visibility::Visible {
                return;
            }
            if let Some(channel) = weak.upgrade() {
                channel.spawn_trigger(RefreshTrigger::Visibility);
            }
        })));

        subscriptions.push(Subscription::for_task(spawn_periodic_refresh(
            &runtime,
            Arc::downgrade(&channel),
            self.config.refresh_interval,
        )));

        info!(
            "📡 Opening realtime channel for {} ({})",
            info.username, info.user_id
        );
        socket.connect();

        Ok(Mounted {
            channel,
            subscriptions,
        })
    }

    /// Detach every handler, stop timers and tasks, close the socket.
    /// Idempotent; also runs on drop.
    pub fn teardown(&self) {
        let previous = std::mem::replace(&mut *self.phase.lock(), Phase::TornDown);
        let Phase::Running(mounted) = previous else {
            return;
        };

        for subscription in mounted.subscriptions {
            subscription.dispose();
        }
        mounted.channel.abort_tasks();
        mounted.channel.socket.close();
        self.status
            .send_modify(|status| status.is_connected = false);
        info!("Realtime channel torn down");
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn spawn_periodic_refresh(
    runtime: &Handle,
    channel: Weak<Channel>,
    period: Duration,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(channel) = channel.upgrade() else {
                return;
            };
            debug!("Periodic credential refresh");
            channel.refresh_credential(RefreshTrigger::Periodic).await;
        }
    })
}
