//! Upstream realtime WebSocket connection

use http::HeaderValue;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::info;
use url::Url;

use super::RelayError;
use crate::core::credentials::Credential;

/// Header correlating client and upstream requests in Azure logs
pub const CLIENT_REQUEST_ID_HEADER: &str = "x-ms-client-request-id";

pub type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Where sessions are relayed to
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamTarget {
    pub endpoint: String,
    pub deployment: String,
    pub api_version: String,
}

impl UpstreamTarget {
    /// `{ws(s) endpoint}/openai/realtime?api-version=…&deployment=…`
    pub fn realtime_url(&self) -> Result<Url, RelayError> {
        let endpoint = self.endpoint.trim_end_matches('/');
        let ws_endpoint = if let Some(rest) = endpoint.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = endpoint.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            endpoint.to_string()
        };

        let mut url = Url::parse(&format!("{ws_endpoint}/openai/realtime"))
            .map_err(|e| RelayError::UpstreamConnect(format!("invalid endpoint: {e}")))?;
        url.query_pairs_mut()
            .append_pair("api-version", &self.api_version)
            .append_pair("deployment", &self.deployment);
        Ok(url)
    }
}

/// Open the upstream socket with server-held credentials.
pub async fn connect(
    target: &UpstreamTarget,
    credential: &Credential,
    client_request_id: Option<&str>,
) -> Result<UpstreamSocket, RelayError> {
    let url = target.realtime_url()?;

    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| RelayError::UpstreamConnect(e.to_string()))?;

    let auth = credential
        .auth_header()
        .await
        .map_err(|e| RelayError::UpstreamConnect(e.to_string()))?;
    let headers = request.headers_mut();
    headers.insert(auth.name, auth.value);
    if let Some(id) = client_request_id
        && let Ok(value) = HeaderValue::from_str(id)
    {
        headers.insert(CLIENT_REQUEST_ID_HEADER, value);
    }

    let (socket, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| RelayError::UpstreamConnect(e.to_string()))?;

    info!(
        deployment = %target.deployment,
        credential = credential.kind(),
        "Connected to upstream realtime endpoint"
    );
    Ok(socket)
}
