//! Application state shared by all handlers

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tracing::info;

use crate::config::ServerConfig;
use crate::core::credentials::{
    COGNITIVE_SERVICES_SCOPE, Credential, SEARCH_SCOPE, TokenProvider, TokenSource,
};
use crate::core::relay::{RealtimeRelay, UpstreamTarget};
use crate::core::search::{AzureSearchBackend, SearchAdapter, SearchBackend};
use crate::core::tools::builtin_registry;

/// Timeout for HTTP calls to the search, embedding and identity endpoints
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum StateError {
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("No credential available for {0}")]
    MissingCredential(&'static str),
}

/// Why a WebSocket connection was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionLimitError {
    GlobalLimitReached,
    PerIpLimitReached,
}

pub struct AppState {
    pub config: ServerConfig,
    pub relay: RealtimeRelay,
    pub search: Arc<SearchAdapter>,
    ws_connections: AtomicUsize,
    ip_connections: DashMap<IpAddr, u32>,
}

impl AppState {
    /// Build the production state: Azure credentials, the Azure AI Search
    /// backend and the built-in tool registry.
    pub async fn new(config: ServerConfig) -> Result<Arc<Self>, StateError> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;

        let token_provider = config.needs_token_credential().then(|| {
            Arc::new(TokenProvider::new(
                TokenSource::from_config(&config),
                http.clone(),
            ))
        });

        let llm_credential = Credential::resolve(
            config.llm_api_key.as_ref(),
            token_provider.as_ref(),
            COGNITIVE_SERVICES_SCOPE,
        )
        .ok_or(StateError::MissingCredential("Azure OpenAI"))?;
        let search_credential = Credential::resolve(
            config.search_api_key.as_ref(),
            token_provider.as_ref(),
            SEARCH_SCOPE,
        )
        .ok_or(StateError::MissingCredential("Azure AI Search"))?;

        info!(
            llm_credential = llm_credential.kind(),
            search_credential = search_credential.kind(),
            "Resolved service credentials"
        );

        let backend = AzureSearchBackend::new(
            config.search_config(),
            http,
            search_credential,
            llm_credential.clone(),
        );

        let state = Self::with_search_backend(config, Arc::new(backend), llm_credential);
        state.search.warm_up().await;
        Ok(state)
    }

    /// Assemble state around an arbitrary search backend.
    pub fn with_search_backend(
        config: ServerConfig,
        backend: Arc<dyn SearchBackend>,
        llm_credential: Credential,
    ) -> Arc<Self> {
        let search = Arc::new(SearchAdapter::new(backend));
        let registry = Arc::new(builtin_registry(search.clone(), config.search_top_k));
        info!(tools = ?registry.names().collect::<Vec<_>>(), "Registered tools");

        let relay = RealtimeRelay::new(
            UpstreamTarget {
                endpoint: config.llm_endpoint.clone(),
                deployment: config.llm_deployment.clone(),
                api_version: config.llm_api_version.clone(),
            },
            llm_credential,
            registry,
            config.session_settings(),
        );

        Arc::new(Self {
            config,
            relay,
            search,
            ws_connections: AtomicUsize::new(0),
            ip_connections: DashMap::new(),
        })
    }

    /// Reserve a WebSocket slot for `ip`.
    pub fn try_acquire_connection(&self, ip: IpAddr) -> Result<(), ConnectionLimitError> {
        match self.config.max_websocket_connections {
            Some(max) => {
                self.ws_connections
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                        (n < max).then_some(n + 1)
                    })
                    .map_err(|_| ConnectionLimitError::GlobalLimitReached)?;
            }
            None => {
                self.ws_connections.fetch_add(1, Ordering::SeqCst);
            }
        }

        let mut count = self.ip_connections.entry(ip).or_insert(0);
        if *count >= self.config.max_connections_per_ip {
            drop(count);
            self.ip_connections.remove_if(&ip, |_, c| *c == 0);
            self.decrement_global();
            return Err(ConnectionLimitError::PerIpLimitReached);
        }
        *count += 1;
        Ok(())
    }

    /// Give back a slot taken by [`try_acquire_connection`](Self::try_acquire_connection).
    pub fn release_connection(&self, ip: IpAddr) {
        self.decrement_global();
        if let Some(mut count) = self.ip_connections.get_mut(&ip) {
            *count = count.saturating_sub(1);
        }
        self.ip_connections.remove_if(&ip, |_, c| *c == 0);
    }

    pub fn ws_connection_count(&self) -> usize {
        self.ws_connections.load(Ordering::SeqCst)
    }

    pub fn ip_connection_count(&self, ip: &IpAddr) -> u32 {
        self.ip_connections.get(ip).map(|c| *c).unwrap_or(0)
    }

    fn decrement_global(&self) {
        let _ = self
            .ws_connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecretString;
    use crate::config::tests::test_config;
    use crate::core::search::SearchError;
    use async_trait::async_trait;
    use serde_json::{Map, Value};
    use std::net::Ipv4Addr;

    struct EmptyBackend;

    #[async_trait]
    impl SearchBackend for EmptyBackend {
        async fn search_by_embedding(
            &self,
            _query: &str,
            _k: usize,
        ) -> Result<Vec<Map<String, Value>>, SearchError> {
            Ok(Vec::new())
        }
    }

    fn state_with_limits(global: Option<usize>, per_ip: u32) -> Arc<AppState> {
        let mut config = test_config();
        config.max_websocket_connections = global;
        config.max_connections_per_ip = per_ip;
        AppState::with_search_backend(
            config,
            Arc::new(EmptyBackend),
            Credential::ApiKey(SecretString::from("k")),
        )
    }

    #[test]
    fn test_registry_has_builtin_tools() {
        let state = state_with_limits(None, 100);
        let registry = state.relay.registry();
        assert!(registry.lookup("search").is_ok());
        assert!(registry.lookup("update_preferences").is_ok());
        assert_eq!(registry.len(), 7);
    }

    #[test]
    fn test_per_ip_limit() {
        let state = state_with_limits(Some(10), 3);
        let ip: IpAddr = Ipv4Addr::new(192, 168, 1, 100).into();

        assert_eq!(state.ws_connection_count(), 0);
        for _ in 0..3 {
            assert!(state.try_acquire_connection(ip).is_ok());
        }
        assert_eq!(state.ip_connection_count(&ip), 3);

        assert_eq!(
            state.try_acquire_connection(ip),
            Err(ConnectionLimitError::PerIpLimitReached)
        );
        // The rejected attempt does not hold a global slot
        assert_eq!(state.ws_connection_count(), 3);

        state.release_connection(ip);
        assert_eq!(state.ws_connection_count(), 2);
        assert!(state.try_acquire_connection(ip).is_ok());
    }

    #[test]
    fn test_global_limit() {
        let state = state_with_limits(Some(5), 10);
        let ips: Vec<IpAddr> = (1..=6).map(|i| Ipv4Addr::new(10, 0, 0, i).into()).collect();

        for ip in &ips[0..5] {
            assert!(state.try_acquire_connection(*ip).is_ok());
        }
        assert_eq!(
            state.try_acquire_connection(ips[5]),
            Err(ConnectionLimitError::GlobalLimitReached)
        );

        state.release_connection(ips[0]);
        assert_eq!(state.ip_connection_count(&ips[0]), 0);
        assert!(state.try_acquire_connection(ips[5]).is_ok());
    }

    #[test]
    fn test_release_without_acquire_does_not_underflow() {
        let state = state_with_limits(None, 1);
        let ip: IpAddr = Ipv4Addr::LOCALHOST.into();
        state.release_connection(ip);
        assert_eq!(state.ws_connection_count(), 0);
        assert_eq!(state.ip_connection_count(&ip), 0);
    }
}
