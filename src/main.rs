//! NextSpace Session Server
//! Mission: Serve the sealed session cookie endpoints

use anyhow::{Context, Result};
use clap::Parser;
use nextspace_session::{
    auth::{CookieCodec, SessionApiState},
    config::{env_flag, load_env, ServerConfig},
    server::build_app,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "session-server")]
#[command(about = "Session cookie endpoints (/session-check, /session)")]
struct Args {
    /// Listen address
    #[arg(long, env = "SESSION_SERVER_ADDR", default_value = "0.0.0.0:3000")]
    addr: SocketAddr,

    /// Secret the cookie encryption key is derived from
    #[arg(long, env = "SESSION_SECRET", hide_env_values = true)]
    secret: String,

    /// Mark cookies `Secure` (serve behind TLS)
    #[arg(long)]
    secure_cookies: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let args = Args::parse();
    let secure_cookies = args.secure_cookies || env_flag("SESSION_COOKIE_SECURE", false);
    let config = ServerConfig::new(args.addr, args.secret, secure_cookies)?;

    info!("🚀 NextSpace session server starting");
    info!("🔐 Secure cookies: {}", config.secure_cookies);

    let state = SessionApiState::new(
        Arc::new(CookieCodec::new(&config.secret)),
        config.secure_cookies,
    );
    let app = build_app(state);

    let listener = TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.addr))?;
    info!("🎯 Session server listening on {}", config.addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nextspace_session=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
