//! `WebSocket` session lifecycle: one admitted client from the
//! `connection.established` frame through disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use carelink_chat::{AdmissionGuard, ChatEvent, ClientConnection};
use carelink_core::ConversationId;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::handler::handle_message;
use crate::config::ServerConfig;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};
use crate::rpc::context::RpcContext;
use crate::rpc::registry::MethodRegistry;

/// Smallest accepted ping interval; `tokio::time::interval` rejects zero.
const MIN_PING_INTERVAL: Duration = Duration::from_millis(10);

/// Ping cadence and the silence after which a client is dropped.
#[derive(Clone, Copy, Debug)]
pub struct Heartbeat {
    /// Interval between server pings.
    pub interval: Duration,
    /// Maximum time without a pong or any inbound frame.
    pub timeout: Duration,
}

impl From<&ServerConfig> for Heartbeat {
    fn from(config: &ServerConfig) -> Self {
        Self {
            interval: config.heartbeat_interval.max(MIN_PING_INTERVAL),
            timeout: config.heartbeat_timeout,
        }
    }
}

/// An authenticated, admitted connection ready to run.
pub struct Session {
    /// The registry entry.
    pub connection: Arc<ClientConnection>,
    /// Receiving end of the connection's outbound queue.
    pub outbound: mpsc::Receiver<Arc<String>>,
    /// Removes the connection from the registry when the session ends.
    pub guard: AdmissionGuard,
    /// Conversation joined at upgrade, if any.
    pub conversation_id: Option<ConversationId>,
}

/// Run a session until the client leaves, goes silent, or the server shuts
/// down.
///
/// 1. Sends `connection.established`
/// 2. Forwards queued responses and broadcasts, pinging on an interval
/// 3. Dispatches inbound text and UTF-8 binary frames as RPC requests;
///    replies wait for queue room, broadcasts never do
/// 4. Drops the admission guard on exit, which removes every membership
#[instrument(skip_all, fields(client_id = %session.connection.id, user_id = %session.connection.principal.user_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    session: Session,
    ctx: RpcContext,
    rpc: Arc<MethodRegistry>,
    heartbeat: Heartbeat,
    shutdown: CancellationToken,
) {
    let Session {
        connection,
        outbound: mut send_rx,
        guard,
        conversation_id,
    } = session;
    let (mut ws_tx, mut ws_rx) = ws.split();

    let started = Instant::now();
    info!(role = %connection.principal.role, "client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let established = ChatEvent::connection_established(
        &connection.id,
        &connection.principal,
        conversation_id.as_ref(),
    );
    if let Some(json) = established.encode() {
        let _ = ws_tx.send(Message::Text(json.as_str().into())).await;
    }

    let outbound_conn = Arc::clone(&connection);
    let mut outbound = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(heartbeat.interval);
        // Skip the immediate first tick
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    let _ = ws_tx
                        .send(Message::Close(Some(CloseFrame {
                            code: close_code::AWAY,
                            reason: "server shutting down".into(),
                        })))
                        .await;
                    break;
                }
                msg = send_rx.recv() => {
                    let Some(text) = msg else { break };
                    if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if !outbound_conn.check_alive()
                        && outbound_conn.last_pong_elapsed() > heartbeat.timeout
                    {
                        warn!(timeout = ?heartbeat.timeout, "client unresponsive, disconnecting");
                        let _ = ws_tx.close().await;
                        break;
                    }
                    if ws_tx.send(Message::Ping(bytes::Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    loop {
        let frame = tokio::select! {
            _ = &mut outbound => {
                debug!("outbound writer finished");
                break;
            }
            frame = ws_rx.next() => frame,
        };
        let Some(Ok(msg)) = frame else { break };
        connection.mark_alive();

        let text = match msg {
            Message::Text(t) => t.as_str().to_owned(),
            Message::Binary(data) => {
                if let Ok(s) = std::str::from_utf8(&data) {
                    s.to_owned()
                } else {
                    info!(len = data.len(), "ignoring non-UTF-8 binary frame");
                    continue;
                }
            }
            Message::Close(_) => {
                info!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        let result = handle_message(&text, &rpc, &ctx).await;
        if !connection.reply(Arc::new(result.response_json)).await {
            warn!(method = %result.method, "writer gone, dropping response");
            break;
        }
    }

    outbound.abort();
    drop(guard);
    info!(
        duration_secs = started.elapsed().as_secs_f64(),
        dropped = connection.drop_count(),
        "client disconnected"
    );
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_from_config() {
        let config = ServerConfig {
            heartbeat_interval: Duration::from_secs(5),
            heartbeat_timeout: Duration::from_secs(12),
            ..ServerConfig::default()
        };
        let hb = Heartbeat::from(&config);
        assert_eq!(hb.interval, Duration::from_secs(5));
        assert_eq!(hb.timeout, Duration::from_secs(12));
    }

    #[test]
    fn zero_interval_is_clamped() {
        let config = ServerConfig {
            heartbeat_interval: Duration::ZERO,
            ..ServerConfig::default()
        };
        assert_eq!(Heartbeat::from(&config).interval, MIN_PING_INTERVAL);
    }
}
