//! Session Probe
//!
//! Restores (or creates) a session against a running session server and
//! user API, then supervises one realtime channel and prints every status
//! change until Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use nextspace_session::{
    client::{
        build_http_client, CredentialStore, HttpGuestProvisioner, HttpSessionBackend,
        HttpTokenRefresher, RestoreOptions, SessionBackend, SessionManager, SharedRefresher,
    },
    config::{load_env, ClientEndpoints},
    realtime::{
        ConnectionSupervisor, SupervisorConfig, VisibilityMonitor, WsConnector, WsSocketConfig,
    },
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "session-probe")]
#[command(about = "Restore a session and watch its realtime channel")]
struct Args {
    /// Base URL of the session server
    #[arg(long, env = "SESSION_SERVER_URL", default_value = "http://127.0.0.1:3000")]
    session_url: String,

    /// Base URL of the user/auth API
    #[arg(long, env = "NEXTSPACE_API_URL", default_value = "http://127.0.0.1:8000/api")]
    api_url: String,

    /// Realtime websocket URL
    #[arg(long, env = "NEXTSPACE_REALTIME_URL", default_value = "ws://127.0.0.1:8000/ws")]
    realtime_url: String,

    /// Only restore an existing session; never mint a guest
    #[arg(long)]
    skip_creation: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("nextspace_session=debug,session_probe=debug")),
        )
        .init();

    let args = Args::parse();
    let endpoints = ClientEndpoints::new(&args.session_url, &args.api_url, &args.realtime_url);

    let http = build_http_client().context("Failed to build HTTP client")?;
    let credentials = CredentialStore::new();
    let backend: Arc<dyn SessionBackend> =
        Arc::new(HttpSessionBackend::new(http.clone(), endpoints.clone()));
    let session = Arc::new(SessionManager::new(
        backend.clone(),
        Arc::new(HttpGuestProvisioner::new(http.clone(), endpoints.clone())),
        credentials.clone(),
    ));

    let restored = session
        .restore_session(RestoreOptions {
            skip_creation: args.skip_creation,
        })
        .await
        .context("Session restoration failed")?;
    match &restored {
        Some(info) => info!("👤 Session: {} ({:?})", info.username, session.state()),
        None => warn!("No session (creation skipped)"),
    }

    let refresher = Arc::new(SharedRefresher::new(Arc::new(HttpTokenRefresher::new(
        http,
        endpoints.clone(),
        credentials,
        backend,
    ))));
    let (connector, mut inbound) = WsConnector::new(WsSocketConfig::new(&endpoints.realtime_url));

    let supervisor = ConnectionSupervisor::new(
        session,
        refresher,
        Arc::new(connector),
        Arc::new(VisibilityMonitor::default()),
        SupervisorConfig::default(),
    );
    supervisor.start()?;

    let mut status = supervisor.subscribe();
    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                info!(
                    connected = current.is_connected,
                    last_reconnect = ?current.last_reconnect_time,
                    error = ?current.error,
                    "📶 Connection status changed"
                );
            }
            Some(text) = inbound.recv() => {
                info!("📨 {}", text);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    supervisor.teardown();
    Ok(())
}
