//! Shared fixtures: configuration, a scripted mock upstream and a fake search
//! backend.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{Map, Value, json};
use tokio::net::TcpListener;
use tokio::sync::{Barrier, mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderMap;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, accept_hdr_async};

use voicerag_gateway::config::{
    DEFAULT_AUTHORITY_HOST, DEFAULT_LLM_API_VERSION, DEFAULT_SEARCH_API_VERSION, SecretString,
};
use voicerag_gateway::core::credentials::Credential;
use voicerag_gateway::core::search::{SearchBackend, SearchError};
use voicerag_gateway::{ServerConfig, routes, state::AppState};

pub const SYSTEM_MESSAGE: &str = "You are a test assistant.";
pub const FRAME_TIMEOUT: Duration = Duration::from_secs(5);

pub type ClientSocket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub fn test_config(llm_endpoint: &str) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        tls: None,
        static_dir: PathBuf::from("static"),
        llm_endpoint: llm_endpoint.to_string(),
        llm_deployment: "gpt-4o-realtime-preview".to_string(),
        llm_api_version: DEFAULT_LLM_API_VERSION.to_string(),
        llm_api_key: Some(SecretString::from("llm-key")),
        voice_choice: "alloy".to_string(),
        temperature: 0.6,
        max_tokens: 1000,
        system_message: SYSTEM_MESSAGE.to_string(),
        disable_audio: false,
        search_service_name: "listings".to_string(),
        search_index: "vienna".to_string(),
        search_api_key: Some(SecretString::from("search-key")),
        search_endpoint: None,
        search_api_version: DEFAULT_SEARCH_API_VERSION.to_string(),
        search_vector_field: "embedding".to_string(),
        search_top_k: 5,
        embedding_deployment: None,
        tenant_id: None,
        client_id: None,
        client_secret: None,
        authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
        cors_allowed_origins: None,
        rate_limit_requests_per_second: 60,
        rate_limit_burst_size: 10,
        max_websocket_connections: None,
        max_connections_per_ip: 100,
    }
}

/// Search backend returning canned hits and recording queries
#[derive(Default)]
pub struct FakeSearch {
    pub hits: Vec<Map<String, Value>>,
    pub fail: bool,
    pub queries: Mutex<Vec<(String, usize)>>,
    /// Queries equal to this never complete
    pub stall_on: Option<String>,
    /// Every query waits here until the barrier fills
    pub rendezvous: Option<Barrier>,
}

impl FakeSearch {
    pub fn with_hits(hits: Vec<Value>) -> Self {
        Self {
            hits: hits
                .into_iter()
                .filter_map(|hit| hit.as_object().cloned())
                .collect(),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn stalling_on(query: &str) -> Self {
        Self {
            stall_on: Some(query.to_string()),
            ..Default::default()
        }
    }

    /// Each query returns only once `callers` queries are running at the same time
    pub fn concurrent(callers: usize, hits: Vec<Value>) -> Self {
        Self {
            rendezvous: Some(Barrier::new(callers)),
            ..Self::with_hits(hits)
        }
    }

    pub fn queries(&self) -> Vec<(String, usize)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchBackend for FakeSearch {
    async fn search_by_embedding(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<Map<String, Value>>, SearchError> {
        self.queries.lock().unwrap().push((query.to_string(), k));
        if self.stall_on.as_deref() == Some(query) {
            std::future::pending::<()>().await;
        }
        if let Some(barrier) = &self.rendezvous {
            barrier.wait().await;
        }
        if self.fail {
            return Err(SearchError::Unavailable("backend returned 503".to_string()));
        }
        Ok(self.hits.clone())
    }
}

pub fn two_listings() -> Vec<Value> {
    vec![
        json!({
            "id": "l1",
            "title": "Bright 2-room flat",
            "description": "Close to Mariahilfer Strasse",
            "location": "Mariahilf",
            "price": 1150.0,
            "contact": "owner1@example.com",
            "rooms": 2,
            "size": 58.5,
            "floor": 3,
            "available_from": "2025-01-01",
            "lat": 48.196,
            "lng": 16.347
        }),
        json!({
            "id": "l2",
            "title": "Quiet courtyard flat",
            "location": "Mariahilf",
            "price": 990,
            "rooms": 2
        }),
    ]
}

pub enum Script {
    Send(Value),
    Close,
}

/// A one-connection upstream realtime endpoint driven by the test
pub struct MockUpstream {
    pub endpoint: String,
    pub received: mpsc::UnboundedReceiver<Value>,
    script: mpsc::UnboundedSender<Script>,
    handshake: Option<oneshot::Receiver<HeaderMap>>,
    closed: Option<oneshot::Receiver<()>>,
}

impl MockUpstream {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (received_tx, received) = mpsc::unbounded_channel();
        let (script, mut script_rx) = mpsc::unbounded_channel();
        let (headers_tx, headers_rx) = oneshot::channel();
        let (closed_tx, closed_rx) = oneshot::channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let callback = move |request: &Request, response: Response| {
                let _ = headers_tx.send(request.headers().clone());
                Ok::<_, ErrorResponse>(response)
            };
            let socket = accept_hdr_async(stream, callback).await.unwrap();
            let (mut write, mut read) = socket.split();

            loop {
                tokio::select! {
                    cmd = script_rx.recv() => match cmd {
                        Some(Script::Send(frame)) => {
                            if write.send(Message::Text(frame.to_string().into())).await.is_err() {
                                break;
                            }
                        }
                        Some(Script::Close) | None => {
                            let _ = write.send(Message::Close(None)).await;
                            break;
                        }
                    },
                    msg = read.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            let frame: Value = serde_json::from_str(text.as_str()).unwrap();
                            let _ = received_tx.send(frame);
                        }
                        Some(Ok(Message::Close(_))) => {
                            let _ = closed_tx.send(());
                            break;
                        }
                        Some(Ok(_)) => {}
                        _ => {
                            let _ = closed_tx.send(());
                            break;
                        }
                    },
                }
            }
        });

        Self {
            endpoint: format!("http://{addr}"),
            received,
            script,
            handshake: Some(headers_rx),
            closed: Some(closed_rx),
        }
    }

    pub fn send(&self, frame: Value) {
        self.script.send(Script::Send(frame)).unwrap();
    }

    pub fn close(&self) {
        self.script.send(Script::Close).unwrap();
    }

    /// Next frame the relay sent upstream
    pub async fn recv(&mut self) -> Value {
        tokio::time::timeout(FRAME_TIMEOUT, self.received.recv())
            .await
            .expect("timed out waiting for upstream frame")
            .expect("mock upstream stopped")
    }

    /// Skip frames until one of type `frame_type` arrives
    pub async fn recv_type(&mut self, frame_type: &str) -> Value {
        loop {
            let frame = self.recv().await;
            if frame["type"] == frame_type {
                return frame;
            }
        }
    }

    /// Wait until the relay closes the upstream socket
    pub async fn wait_closed(&mut self) {
        let rx = self.closed.take().expect("close already awaited");
        tokio::time::timeout(FRAME_TIMEOUT, rx)
            .await
            .expect("relay did not close the upstream socket")
            .unwrap();
    }

    pub async fn handshake_headers(&mut self) -> HeaderMap {
        let rx = self.handshake.take().expect("handshake already taken");
        tokio::time::timeout(FRAME_TIMEOUT, rx)
            .await
            .expect("timed out waiting for upstream handshake")
            .unwrap()
    }
}

pub fn state_with(config: ServerConfig, search: Arc<FakeSearch>) -> Arc<AppState> {
    AppState::with_search_backend(
        config,
        search,
        Credential::ApiKey(SecretString::from("llm-key")),
    )
}

/// Serve the full application on a random local port
pub async fn spawn_gateway(state: Arc<AppState>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = routes::create_app(state);
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    addr
}

pub async fn connect_client(addr: SocketAddr) -> ClientSocket {
    let (socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/realtime"))
        .await
        .unwrap();
    socket
}

pub async fn send_json(socket: &mut ClientSocket, frame: Value) {
    socket
        .send(Message::Text(frame.to_string().into()))
        .await
        .unwrap();
}

/// Next text frame from the gateway, or `None` once the socket closes
pub async fn next_json(socket: &mut ClientSocket) -> Option<Value> {
    loop {
        let msg = tokio::time::timeout(FRAME_TIMEOUT, socket.next())
            .await
            .expect("timed out waiting for client frame")?;
        match msg {
            Ok(Message::Text(text)) => return Some(serde_json::from_str(text.as_str()).unwrap()),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}
