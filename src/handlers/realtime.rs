//! Realtime WebSocket handler
//!
//! Upgrades the browser connection and hands the socket to the relay. The
//! browser speaks the realtime protocol directly; this handler adds nothing
//! to the handshake beyond limits and request correlation.

use axum::{
    Extension,
    extract::{State, ws::WebSocketUpgrade},
    http::HeaderMap,
    response::Response,
};
use std::sync::Arc;
use tracing::info;

use crate::core::relay::CLIENT_REQUEST_ID_HEADER;
use crate::middleware::ConnectionSlot;
use crate::state::AppState;

/// Maximum WebSocket frame size (10 MB)
const MAX_WS_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Maximum WebSocket message size (10 MB)
const MAX_WS_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// `GET /realtime`
///
/// The `x-ms-client-request-id` header, when present, is forwarded upstream so
/// both legs of a session can be correlated.
pub async fn realtime_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    slot: Option<Extension<ConnectionSlot>>,
) -> Response {
    let client_request_id = headers
        .get(CLIENT_REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let slot = slot.map(|Extension(slot)| slot);

    info!(
        client_ip = ?slot.as_ref().map(ConnectionSlot::ip),
        client_request_id = ?client_request_id,
        "Realtime WebSocket connection upgrade requested"
    );

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| async move {
            // Held for the lifetime of the session
            let _slot = slot;
            state.relay.serve(socket, client_request_id).await;
        })
}
