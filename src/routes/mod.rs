//! Router assembly
//!
//! - `api` - health endpoint
//! - `realtime` - `/realtime` WebSocket relay
//! - `frontend` - static browser assets

use axum::{Router, middleware};
use std::sync::Arc;

use crate::middleware::connection_limit_middleware;
use crate::state::AppState;

pub mod api;
pub mod frontend;
pub mod realtime;

/// Build the application router with connection limits applied to the relay.
///
/// Cross-cutting layers (CORS, rate limiting, security headers) are added by
/// the binary so tests can exercise routes without them.
pub fn create_app(state: Arc<AppState>) -> Router {
    let realtime_routes = realtime::create_realtime_router().layer(
        middleware::from_fn_with_state(state.clone(), connection_limit_middleware),
    );

    api::create_api_router()
        .merge(realtime_routes)
        .merge(frontend::create_frontend_router(&state.config.static_dir))
        .with_state(state)
}
