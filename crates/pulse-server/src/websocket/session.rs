//! WebSocket session lifecycle, from upgrade through disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, close_code};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use pulse_core::ids::{ConnectionId, Identity};
use pulse_signaling::{BindOutcome, ClientConnection, SignalingError};
use tokio::sync::mpsc;
use tracing::{Instrument, debug, info, instrument, warn};

use super::handler::{Inbound, classify};
use super::heartbeat::{Heartbeat, Liveness};
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL,
    WS_HEARTBEAT_TIMEOUTS_TOTAL, WS_REJECTED_TOTAL,
};
use crate::server::AppState;

/// How long the writer gets to flush a close frame after the session ends.
const WRITER_DRAIN: Duration = Duration::from_secs(1);

/// Run a session for an upgraded socket.
///
/// Sockets without an identity are closed with a policy-violation frame and
/// never bound.
pub async fn run_ws_session(mut socket: WebSocket, identity: Option<Identity>, state: AppState) {
    let Some(identity) = identity else {
        counter!(WS_REJECTED_TOTAL, "reason" => "identity_missing").increment(1);
        warn!("connection without userId, closing");
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: close_code::POLICY,
                reason: Utf8Bytes::from_static("userId is required"),
            })))
            .await;
        return;
    };

    run_bound_session(socket, ConnectionId::new(), identity, state).await;
}

#[instrument(skip_all, fields(identity = %identity, conn_id = %conn_id))]
async fn run_bound_session(socket: WebSocket, conn_id: ConnectionId, identity: Identity, state: AppState) {
    let config = Arc::clone(&state.config);
    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(config.send_queue_capacity);
    let connection = Arc::new(
        ClientConnection::with_id(conn_id, identity, send_tx).with_drop_limit(config.max_send_drops),
    );
    let (mut ws_tx, mut ws_rx) = socket.split();

    // The pre-upgrade capacity check can race; this one is authoritative.
    match state.hub.connect_within(Arc::clone(&connection), config.max_connections) {
        Ok(BindOutcome::Added) => info!("client connected"),
        Ok(BindOutcome::Replaced(previous)) => {
            info!(replaced = %previous.id, "client reconnected, previous connection evicted");
        }
        Err(SignalingError::AtCapacity(limit)) => {
            counter!(WS_REJECTED_TOTAL, "reason" => "capacity").increment(1);
            warn!(limit, "connection limit reached at bind, closing");
            let _ = ws_tx
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::AGAIN,
                    reason: Utf8Bytes::from_static("connection limit reached"),
                })))
                .await;
            return;
        }
        Err(e) => {
            counter!(WS_REJECTED_TOTAL, "reason" => "bind_failed").increment(1);
            warn!(error = %e, "failed to bind connection");
            let _ = ws_tx.send(Message::Close(None)).await;
            return;
        }
    }
    let started = Instant::now();
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    // Writer: drains the send queue, pings on the heartbeat cadence and
    // closes the socket when the connection is asked to close.
    let heartbeat = Heartbeat::new(config.heartbeat_interval, config.heartbeat_timeout);
    let writer_conn = Arc::clone(&connection);
    let close = connection.close_token();
    let writer_close = close.clone();
    let mut writer = tokio::spawn(
        async move {
            let mut ticker = heartbeat.ticker();
            loop {
                tokio::select! {
                    () = writer_close.cancelled() => break,
                    frame = send_rx.recv() => {
                        let Some(frame) = frame else { break };
                        if ws_tx.send(Message::Text(frame.as_str().into())).await.is_err() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        if heartbeat.check(&writer_conn) == Liveness::Unresponsive {
                            counter!(WS_HEARTBEAT_TIMEOUTS_TOTAL).increment(1);
                            warn!(silent_for = ?writer_conn.last_seen_elapsed(), "client unresponsive, disconnecting");
                            break;
                        }
                        if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                            break;
                        }
                    }
                }
            }
            writer_conn.close();
            let _ = ws_tx.send(Message::Close(None)).await;
        }
        .in_current_span(),
    );

    // Reader: frames are handled one at a time, in arrival order.
    let shutdown = state.shutdown.token();
    loop {
        tokio::select! {
            () = close.cancelled() => break,
            () = shutdown.cancelled() => {
                debug!("server shutting down");
                break;
            }
            msg = ws_rx.next() => {
                let Some(Ok(msg)) = msg else { break };
                connection.mark_alive();
                match classify(msg) {
                    Inbound::Text(text) => state.hub.handle_frame(&connection, &text).await,
                    Inbound::Close => {
                        debug!("client sent close frame");
                        break;
                    }
                    Inbound::Skip => {}
                }
            }
        }
    }

    connection.close();
    let was_bound = state.hub.disconnect(&connection);
    if tokio::time::timeout(WRITER_DRAIN, &mut writer).await.is_err() {
        writer.abort();
    }

    info!(was_bound, dropped = connection.drop_count(), "client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
}
