//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::session::{ConnId, SessionHandle};
use crate::util::rate_limit::InboundRateLimiter;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.session))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, session: SessionHandle) {
    let conn_id: ConnId = Uuid::new_v4();
    info!(conn_id = %conn_id, "New connection");

    let (ws_sink, ws_stream) = socket.split();

    let outbound_rx = match session.connect(conn_id).await {
        Ok(rx) => rx,
        Err(e) => {
            error!(conn_id = %conn_id, error = %e, "Failed to join session");
            return;
        }
    };

    run_connection(conn_id, &session, ws_sink, ws_stream, outbound_rx).await;

    // Cleanup on disconnect
    if let Err(e) = session.disconnect(conn_id).await {
        warn!(conn_id = %conn_id, error = %e, "Failed to signal disconnect");
    }

    info!(conn_id = %conn_id, "Connection closed");
}

/// Pump one connection until either side goes away
async fn run_connection(
    conn_id: ConnId,
    session: &SessionHandle,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: SplitStream<WebSocket>,
    mut outbound_rx: mpsc::Receiver<ServerMsg>,
) {
    let rate_limiter = InboundRateLimiter::default();

    // Writer task: session -> WebSocket
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(conn_id = %conn_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> session
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => {
                        if !rate_limiter.admit(&msg) {
                            debug!(conn_id = %conn_id, "Rate limited move");
                            continue;
                        }
                        if session.inbound(conn_id, msg).await.is_err() {
                            debug!(conn_id = %conn_id, "Session closed");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(conn_id = %conn_id, error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(conn_id = %conn_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(conn_id = %conn_id, "Client initiated close");
                break;
            }
            Err(e) => {
                debug!(conn_id = %conn_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}

#[derive(Debug, thiserror::Error)]
enum SendError {
    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("socket: {0}")]
    Socket(#[from] axum::Error),
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), SendError> {
    let json = serde_json::to_string(msg)?;
    sink.send(Message::Text(json)).await?;
    Ok(())
}
