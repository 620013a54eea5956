//! Graceful shutdown: stop accepting, close every open session, then wait
//! for sessions to release their registry entries.
//!
//! Upgraded `WebSocket` connections run outside the listener task, so the
//! listener finishing says nothing about them. Each session holds a
//! [`SessionTicket`] until its admission guard is dropped; shutdown waits on
//! those tickets as well as on the listener.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TaskTrackerToken;
use tracing::{info, warn};

/// Default time to wait for the listener and sessions before giving up.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Held by a live session; shutdown waits until every ticket is dropped.
pub type SessionTicket = TaskTrackerToken;

/// Coordinates shutdown across the listener and every open session.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    sessions: TaskTracker,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            sessions: TaskTracker::new(),
        }
    }

    /// Token that fires when shutdown begins.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Register a session; drop the ticket once the session has left the
    /// registry.
    pub fn track_session(&self) -> SessionTicket {
        self.sessions.token()
    }

    /// Sessions still holding a ticket.
    pub fn open_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Initiate shutdown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel the token, then wait up to `timeout` for `handles` and for
    /// every open session to finish.
    pub async fn graceful_shutdown(&self, handles: Vec<JoinHandle<()>>, timeout: Option<Duration>) {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);

        self.shutdown();
        info!(
            task_count = handles.len(),
            open_sessions = self.open_sessions(),
            timeout_secs = timeout.as_secs(),
            "draining listener and sessions"
        );

        let drain = async {
            let _ = futures::future::join_all(handles).await;
            self.sessions.close();
            self.sessions.wait().await;
        };
        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!(
                open_sessions = self.open_sessions(),
                "shutdown timed out after {timeout:?}"
            );
        } else {
            info!("all sessions closed");
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
