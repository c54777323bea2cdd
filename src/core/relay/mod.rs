//! Realtime middle-tier relay
//!
//! Each browser connection gets its own session: a second WebSocket to the
//! upstream realtime endpoint plus two forwarding loops. Frames pass through
//! the [`MessageRewriter`]; function calls announced by upstream are tracked,
//! executed against the [`ToolRegistry`] and answered with function results,
//! so the browser never sees credentials, tool schemas or tool-call chatter.
//!
//! ```text
//! browser ──inbound──▶ rewriter ──▶ upstream
//! browser ◀─outbound── rewriter ◀── upstream
//!                         │
//!                  ToolCallTracker ──▶ ToolRegistry (spawned per call)
//! ```

use std::sync::Arc;

use axum::extract::ws::WebSocket;
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

pub mod messages;
pub mod rewriter;
pub mod session;
pub mod tool_calls;
pub mod upstream;

pub use messages::{FrameKind, TOOL_RESPONSE_EVENT, frame_kind};
pub use rewriter::{MessageRewriter, Rewrite, SessionSettings};
pub use session::SessionState;
pub use tool_calls::{ReadyCall, ToolCallTracker};
pub use upstream::{CLIENT_REQUEST_ID_HEADER, UpstreamTarget};

use crate::core::credentials::Credential;
use crate::core::tools::ToolRegistry;

/// Errors raised by a relay session
#[derive(Debug, Error)]
pub enum RelayError {
    /// Fatal to the session; the client is closed with an error status
    #[error("Upstream connection failed: {0}")]
    UpstreamConnect(String),

    /// A single frame is dropped; the session continues
    #[error("Malformed frame: {0}")]
    ProtocolParse(String),

    #[error("Client socket error: {0}")]
    ClientSocket(String),

    #[error("Upstream socket error: {0}")]
    UpstreamSocket(String),
}

/// Process-wide relay configuration shared by every session.
///
/// Cheap to clone; all sessions read the same registry and rewriter.
#[derive(Clone)]
pub struct RealtimeRelay {
    target: Arc<UpstreamTarget>,
    credential: Credential,
    registry: Arc<ToolRegistry>,
    rewriter: Arc<MessageRewriter>,
}

impl RealtimeRelay {
    pub fn new(
        target: UpstreamTarget,
        credential: Credential,
        registry: Arc<ToolRegistry>,
        settings: SessionSettings,
    ) -> Self {
        let rewriter = MessageRewriter::new(settings, &registry);
        Self {
            target: Arc::new(target),
            credential,
            registry,
            rewriter: Arc::new(rewriter),
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn target(&self) -> &UpstreamTarget {
        &self.target
    }

    /// Run one session until either side closes.
    pub async fn serve(&self, client: WebSocket, client_request_id: Option<String>) {
        let session_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("realtime_session", session_id = %session_id);

        session::run(
            session::SessionContext {
                target: self.target.clone(),
                credential: self.credential.clone(),
                registry: self.registry.clone(),
                rewriter: self.rewriter.clone(),
            },
            client,
            client_request_id,
        )
        .instrument(span)
        .await
    }
}
