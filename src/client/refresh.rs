//! Single-flight wrapper around the token refresher.
//!
//! Several independent triggers may ask for a refresh at the same moment
//! (a rejected handshake, the app becoming visible, the periodic timer).
//! They all share one call to the underlying refresher.

use crate::client::{
    collaborators::TokenRefresher, error::RefreshError, single_flight::SingleFlight,
};
use std::{fmt, sync::Arc};
use tracing::{debug, info, warn};

/// What asked for the refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    ConnectError,
    Visibility,
    Periodic,
}

impl fmt::Display for RefreshTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshTrigger::ConnectError => write!(f, "connect_error"),
            RefreshTrigger::Visibility => write!(f, "visibility"),
            RefreshTrigger::Periodic => write!(f, "periodic"),
        }
    }
}

/// Result of a shared refresh attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The credential store holds a new access token
    Refreshed,
    /// The refresher returned `false`
    Declined,
    /// The refresher errored; handled exactly like `Declined`
    Failed(RefreshError),
}

impl RefreshOutcome {
    pub fn is_refreshed(&self) -> bool {
        matches!(self, RefreshOutcome::Refreshed)
    }
}

pub struct SharedRefresher {
    inner: Arc<dyn TokenRefresher>,
    flight: SingleFlight<RefreshOutcome>,
}

impl SharedRefresher {
    pub fn new(inner: Arc<dyn TokenRefresher>) -> Self {
        Self {
            inner,
            flight: SingleFlight::new(),
        }
    }

    /// Refresh, joining an attempt already in flight
    pub async fn refresh(&self, trigger: RefreshTrigger) -> RefreshOutcome {
        if self.flight.is_in_flight() {
            debug!(%trigger, "Joining in-flight token refresh");
        }

        let inner = self.inner.clone();
        let outcome = self
            .flight
            .run(move || async move {
                match inner.refresh_access_token().await {
                    Ok(true) => RefreshOutcome::Refreshed,
                    Ok(false) => RefreshOutcome::Declined,
                    Err(e) => RefreshOutcome::Failed(e),
                }
            })
            .await;

        match &outcome {
            RefreshOutcome::Refreshed => info!(%trigger, "🔑 Token refresh succeeded"),
            RefreshOutcome::Declined => warn!(%trigger, "Token refresh declined"),
            RefreshOutcome::Failed(e) => warn!(%trigger, error = %e, "Token refresh failed"),
        }

        outcome
    }
}
