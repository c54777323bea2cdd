//! Static frontend assets
//!
//! `/` serves `index.html` from the configured static directory; every other
//! unmatched path falls through to the same directory.

use axum::Router;
use std::path::Path;
use std::sync::Arc;
use tower_http::services::{ServeDir, ServeFile};

use crate::state::AppState;

pub fn create_frontend_router(static_dir: &Path) -> Router<Arc<AppState>> {
    let index = ServeFile::new(static_dir.join("index.html"));

    Router::new()
        .route_service("/", index)
        .fallback_service(ServeDir::new(static_dir))
}
