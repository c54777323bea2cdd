//! Connection limit middleware for the realtime WebSocket endpoint
//!
//! Enforces the global WebSocket cap and the per-IP cap configured in
//! [`ServerConfig`](crate::config::ServerConfig). Plain HTTP requests pass
//! through untouched.
//!
//! ```ignore
//! use axum::Router;
//! use voicerag_gateway::middleware::connection_limit_middleware;
//!
//! let app = Router::new()
//!     .route("/realtime", get(realtime_handler))
//!     .layer(axum::middleware::from_fn_with_state(
//!         state.clone(),
//!         connection_limit_middleware,
//!     ));
//! ```

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::state::{AppState, ConnectionLimitError};

/// Client address of an admitted WebSocket request
#[derive(Clone, Copy, Debug)]
pub struct ClientIp(pub IpAddr);

/// A reserved WebSocket slot.
///
/// The slot is released when the last clone is dropped: either when the
/// request is discarded before the upgrade, or when the session holding it
/// ends.
#[derive(Clone)]
pub struct ConnectionSlot(Arc<SlotGuard>);

struct SlotGuard {
    state: Arc<AppState>,
    ip: IpAddr,
}

impl ConnectionSlot {
    pub fn ip(&self) -> IpAddr {
        self.0.ip
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.state.release_connection(self.ip);
        tracing::debug!(
            ip = %self.ip,
            active = self.state.ws_connection_count(),
            "Released WebSocket slot"
        );
    }
}

fn is_websocket_upgrade(request: &Request<Body>) -> bool {
    request
        .headers()
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

/// Reject WebSocket upgrades beyond the configured limits.
///
/// Returns 503 when the global limit is reached and 429 when the caller's
/// IP is at its limit. Admitted requests carry [`ClientIp`] and a
/// [`ConnectionSlot`] extension.
pub async fn connection_limit_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if !is_websocket_upgrade(&request) {
        return next.run(request).await;
    }

    let client_ip = addr.ip();

    match state.try_acquire_connection(client_ip) {
        Ok(()) => {
            let slot = ConnectionSlot(Arc::new(SlotGuard {
                state: state.clone(),
                ip: client_ip,
            }));
            request.extensions_mut().insert(ClientIp(client_ip));
            request.extensions_mut().insert(slot);
            next.run(request).await
        }
        Err(ConnectionLimitError::GlobalLimitReached) => {
            tracing::warn!(ip = %client_ip, "Rejecting connection: global limit reached");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Server at capacity. Please try again later.",
            )
                .into_response()
        }
        Err(ConnectionLimitError::PerIpLimitReached) => {
            tracing::warn!(ip = %client_ip, "Rejecting connection: per-IP limit reached");
            (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many connections from your IP address.",
            )
                .into_response()
        }
    }
}
