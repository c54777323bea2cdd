//! Realtime WebSocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::realtime::realtime_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the realtime relay router
///
/// # Endpoint
///
/// `GET /realtime` - WebSocket upgrade; frames follow the upstream realtime
/// protocol unchanged, except that session configuration is owned by the
/// server and tool calls are resolved before the browser sees them.
///
/// Server-initiated frames specific to this gateway:
///
/// ```json
/// {"type": "extension.middle_tier_tool_response", "previous_item_id": "item_1",
///  "tool_name": "search", "tool_result": "{\"listings\": [...]}"}
/// ```
pub fn create_realtime_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/realtime", get(realtime_handler))
        .layer(TraceLayer::new_for_http())
}
