//! One relay session: connection pair, forwarding loops and tool dispatch

use std::fmt;
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, close_code};
use futures::stream::SplitStream;
use futures::{Sink, SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_tungstenite::tungstenite::Message as UpstreamMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::RelayError;
use super::messages::{
    FrameKind, frame_kind, function_call_output, response_create, tool_response_notification,
};
use super::rewriter::{MessageRewriter, Rewrite};
use super::tool_calls::{ReadyCall, ToolCallTracker};
use super::upstream::{self, UpstreamSocket, UpstreamTarget};
use crate::core::credentials::Credential;
use crate::core::tools::{ToolError, ToolRegistry, ToolResult};

/// Frames buffered per direction before the reader waits on the writer
const CHANNEL_BUFFER_SIZE: usize = 1024;

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Closing,
    Closed,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (SessionState::Connecting, SessionState::Active)
                | (SessionState::Connecting, SessionState::Closed)
                | (SessionState::Active, SessionState::Closing)
                | (SessionState::Closing, SessionState::Closed)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Connecting => write!(f, "Connecting"),
            SessionState::Active => write!(f, "Active"),
            SessionState::Closing => write!(f, "Closing"),
            SessionState::Closed => write!(f, "Closed"),
        }
    }
}

struct Lifecycle {
    state: SessionState,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            state: SessionState::Connecting,
        }
    }

    fn advance(&mut self, next: SessionState) {
        if self.state.can_transition_to(next) {
            debug!(from = %self.state, to = %next, "Session state changed");
            self.state = next;
        } else {
            warn!(from = %self.state, to = %next, "Ignoring invalid session state transition");
        }
    }
}

pub(crate) struct SessionContext {
    pub target: Arc<UpstreamTarget>,
    pub credential: Credential,
    pub registry: Arc<ToolRegistry>,
    pub rewriter: Arc<MessageRewriter>,
}

pub(crate) async fn run(
    ctx: SessionContext,
    mut client: WebSocket,
    client_request_id: Option<String>,
) {
    let mut lifecycle = Lifecycle::new();
    info!("Realtime session opened");

    let connected =
        upstream::connect(&ctx.target, &ctx.credential, client_request_id.as_deref()).await;
    let upstream = match connected {
        Ok(socket) => socket,
        Err(e) => {
            error!(error = %e, "Upstream connection failed");
            let _ = client
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::ERROR,
                    reason: Utf8Bytes::from_static("upstream connection failed"),
                })))
                .await;
            lifecycle.advance(SessionState::Closed);
            info!("Realtime session closed");
            return;
        }
    };
    lifecycle.advance(SessionState::Active);

    let cancel = CancellationToken::new();
    let (client_sink, client_stream) = client.split();
    let (upstream_sink, upstream_stream) = upstream.split();
    let (client_tx, client_rx) = mpsc::channel::<Message>(CHANNEL_BUFFER_SIZE);
    let (upstream_tx, upstream_rx) = mpsc::channel::<UpstreamMessage>(CHANNEL_BUFFER_SIZE);

    let client_writer = tokio::spawn(write_frames(
        client_sink,
        client_rx,
        cancel.clone(),
        "client",
    ));
    let upstream_writer = tokio::spawn(write_frames(
        upstream_sink,
        upstream_rx,
        cancel.clone(),
        "upstream",
    ));

    let inbound = pump_inbound(
        client_stream,
        upstream_tx.clone(),
        ctx.rewriter.clone(),
        cancel.clone(),
    );
    let outbound = OutboundPump {
        client_tx,
        upstream_tx,
        rewriter: ctx.rewriter,
        registry: ctx.registry,
        tracker: ToolCallTracker::new(),
        tasks: JoinSet::new(),
    }
    .run(upstream_stream, cancel.clone());

    tokio::join!(inbound, outbound);

    lifecycle.advance(SessionState::Closing);
    cancel.cancel();
    let _ = tokio::join!(client_writer, upstream_writer);
    lifecycle.advance(SessionState::Closed);
    info!("Realtime session closed");
}

fn parse_frame(text: &str) -> Result<Value, RelayError> {
    let frame: Value =
        serde_json::from_str(text).map_err(|e| RelayError::ProtocolParse(e.to_string()))?;
    if !frame.is_object() {
        return Err(RelayError::ProtocolParse("frame is not a JSON object".to_string()));
    }
    Ok(frame)
}

/// Drain `rx` into `sink` until cancelled, then close the sink.
async fn write_frames<S, M>(
    mut sink: S,
    mut rx: mpsc::Receiver<M>,
    cancel: CancellationToken,
    peer: &'static str,
) where
    S: Sink<M> + Unpin,
    S::Error: fmt::Display,
{
    loop {
        tokio::select! {
            biased;
            frame = rx.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = sink.send(frame).await {
                        warn!(peer, error = %e, "Failed to write frame");
                        break;
                    }
                }
                None => break,
            },
            _ = cancel.cancelled() => break,
        }
    }
    cancel.cancel();
    if let Err(e) = sink.close().await {
        debug!(peer, error = %e, "Socket already closed");
    }
}

/// Client → upstream
async fn pump_inbound(
    mut stream: SplitStream<WebSocket>,
    upstream_tx: mpsc::Sender<UpstreamMessage>,
    rewriter: Arc<MessageRewriter>,
    cancel: CancellationToken,
) {
    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => break,
            msg = stream.next() => msg,
        };

        let forward = match msg {
            Some(Ok(Message::Text(text))) => match parse_frame(text.as_str()) {
                Ok(frame) => match rewriter.inbound(frame) {
                    Rewrite::Forward(frame) => UpstreamMessage::Text(frame.to_string().into()),
                    Rewrite::Drop => {
                        debug!("Dropped client frame");
                        continue;
                    }
                },
                Err(e) => {
                    warn!(error = %e, "Dropping malformed client frame");
                    continue;
                }
            },
            Some(Ok(Message::Binary(data))) => UpstreamMessage::Binary(data),
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) | None => {
                info!("Client closed the connection");
                break;
            }
            Some(Err(e)) => {
                let e = RelayError::ClientSocket(e.to_string());
                warn!(error = %e, "Ending session");
                break;
            }
        };

        if upstream_tx.send(forward).await.is_err() {
            break;
        }
    }
    cancel.cancel();
}

type DispatchOutcome = (ReadyCall, Result<ToolResult, ToolError>);

/// Upstream → client, plus tool dispatch and result delivery
struct OutboundPump {
    client_tx: mpsc::Sender<Message>,
    upstream_tx: mpsc::Sender<UpstreamMessage>,
    rewriter: Arc<MessageRewriter>,
    registry: Arc<ToolRegistry>,
    tracker: ToolCallTracker,
    tasks: JoinSet<DispatchOutcome>,
}

impl OutboundPump {
    async fn run(mut self, mut stream: SplitStream<UpstreamSocket>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    match joined {
                        Ok((call, result)) => {
                            if !self.deliver(call, result).await {
                                break;
                            }
                        }
                        Err(e) => error!(error = %e, "Tool task failed"),
                    }
                }
                msg = stream.next() => {
                    let keep_going = match msg {
                        Some(Ok(UpstreamMessage::Text(text))) => self.on_frame(text.as_str()).await,
                        Some(Ok(UpstreamMessage::Binary(data))) => {
                            self.client_tx.send(Message::Binary(data)).await.is_ok()
                        }
                        Some(Ok(UpstreamMessage::Close(frame))) => {
                            info!(frame = ?frame, "Upstream closed the connection");
                            false
                        }
                        Some(Ok(_)) => true,
                        Some(Err(e)) => {
                            let e = RelayError::UpstreamSocket(e.to_string());
                            warn!(error = %e, "Ending session");
                            false
                        }
                        None => {
                            info!("Upstream stream ended");
                            false
                        }
                    };
                    if !keep_going {
                        break;
                    }
                }
            }
        }
        cancel.cancel();

        if !self.tasks.is_empty() {
            debug!(in_flight = self.tasks.len(), "Aborting in-flight tool calls");
            self.tasks.abort_all();
        }
    }

    async fn on_frame(&mut self, text: &str) -> bool {
        let frame = match parse_frame(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Dropping malformed upstream frame");
                return true;
            }
        };

        let kind = frame_kind(&frame);
        for call in self.tracker.observe(kind, &frame) {
            self.spawn_call(call);
        }

        if let Rewrite::Forward(frame) = self.rewriter.outbound(frame)
            && self.client_tx.send(text_message(&frame)).await.is_err()
        {
            return false;
        }

        if kind == FrameKind::ResponseDone {
            return self.continue_if_ready().await;
        }
        true
    }

    fn spawn_call(&mut self, call: ReadyCall) {
        info!(call_id = %call.call_id, tool = %call.name, "Dispatching tool call");
        let registry = self.registry.clone();
        self.tasks.spawn(async move {
            let result = registry.dispatch(&call.name, &call.arguments).await;
            (call, result)
        });
    }

    /// Hand the result to upstream and, when client-visible, to the browser.
    async fn deliver(&mut self, call: ReadyCall, result: Result<ToolResult, ToolError>) -> bool {
        self.tracker.finish(&call.call_id);

        let (output, client_visible) = match result {
            Ok(result) => {
                info!(
                    call_id = %call.call_id,
                    tool = %call.name,
                    direction = ?result.direction,
                    "Tool call completed"
                );
                (result.to_text(), result.is_client_visible())
            }
            Err(e) => {
                warn!(
                    call_id = %call.call_id,
                    tool = %call.name,
                    kind = e.kind(),
                    error = %e,
                    "Tool call failed"
                );
                (e.to_payload().to_string(), false)
            }
        };

        let frame = function_call_output(&call.call_id, &output);
        if self.upstream_tx.send(upstream_text(&frame)).await.is_err() {
            return false;
        }

        if client_visible {
            let notification = tool_response_notification(
                call.previous_item_id.as_deref(),
                &call.call_id,
                &call.name,
                &output,
            );
            if self.client_tx.send(text_message(&notification)).await.is_err() {
                return false;
            }
        }

        self.continue_if_ready().await
    }

    async fn continue_if_ready(&mut self) -> bool {
        if !self.tracker.take_continuation() {
            return true;
        }
        debug!("All tool results delivered, requesting continuation");
        self.upstream_tx
            .send(upstream_text(&response_create()))
            .await
            .is_ok()
    }
}

fn text_message(frame: &Value) -> Message {
    Message::Text(frame.to_string().into())
}

fn upstream_text(frame: &Value) -> UpstreamMessage {
    UpstreamMessage::Text(frame.to_string().into())
}
