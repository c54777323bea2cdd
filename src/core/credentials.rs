//! Credentials for the upstream realtime model and the search service.
//!
//! Each service is given one [`Credential`] at startup:
//!
//! - **ApiKey**: a static key sent as the `api-key` header
//! - **Token**: an Azure AD bearer token obtained from a shared
//!   [`TokenProvider`] and cached per scope until shortly before expiry
//!
//! The provider uses the OAuth2 client-credentials flow when a tenant id,
//! client id and client secret are configured, otherwise the managed identity
//! endpoint of the host.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use http::{HeaderName, HeaderValue};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::{SecretString, ServerConfig};

/// Scope for Azure OpenAI (Cognitive Services)
pub const COGNITIVE_SERVICES_SCOPE: &str = "https://cognitiveservices.azure.com/.default";

/// Scope for Azure AI Search
pub const SEARCH_SCOPE: &str = "https://search.azure.com/.default";

/// Instance metadata endpoint for managed identity tokens
pub const IMDS_TOKEN_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

const IMDS_API_VERSION: &str = "2018-02-01";

/// Tokens are refreshed this long before they expire
const REFRESH_MARGIN: Duration = Duration::from_secs(300);

/// Header carrying static Azure keys
const API_KEY_HEADER: &str = "api-key";

/// Errors raised while resolving credentials
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Token request failed: {0}")]
    TokenRequest(String),

    #[error("Invalid token response: {0}")]
    InvalidResponse(String),

    #[error("Credential cannot be encoded as a header value")]
    InvalidHeader,
}

/// An authentication header ready to attach to an outgoing request.
///
/// The value is marked sensitive so `http` redacts it from debug output.
#[derive(Clone)]
pub struct AuthHeader {
    pub name: HeaderName,
    pub value: HeaderValue,
}

impl fmt::Debug for AuthHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthHeader")
            .field("name", &self.name)
            .field("value", &"***")
            .finish()
    }
}

/// Credential used for one downstream service, chosen once at startup.
#[derive(Clone)]
pub enum Credential {
    /// Static key sent as `api-key`
    ApiKey(SecretString),
    /// Bearer token for `scope`, refreshed on demand
    Token {
        provider: Arc<TokenProvider>,
        scope: &'static str,
    },
}

impl Credential {
    /// Pick key-based auth when a key is configured, token-based otherwise.
    pub fn resolve(
        key: Option<&SecretString>,
        provider: Option<&Arc<TokenProvider>>,
        scope: &'static str,
    ) -> Option<Self> {
        match (key, provider) {
            (Some(key), _) => Some(Credential::ApiKey(key.clone())),
            (None, Some(provider)) => Some(Credential::Token {
                provider: provider.clone(),
                scope,
            }),
            (None, None) => None,
        }
    }

    /// Short label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Credential::ApiKey(_) => "api-key",
            Credential::Token { .. } => "aad-token",
        }
    }

    /// Build the header that authenticates a request with this credential.
    pub async fn auth_header(&self) -> Result<AuthHeader, CredentialError> {
        match self {
            Credential::ApiKey(key) => {
                let mut value =
                    HeaderValue::from_str(key.expose()).map_err(|_| CredentialError::InvalidHeader)?;
                value.set_sensitive(true);
                Ok(AuthHeader {
                    name: HeaderName::from_static(API_KEY_HEADER),
                    value,
                })
            }
            Credential::Token { provider, scope } => {
                let token = provider.get_token(scope).await?;
                let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose()))
                    .map_err(|_| CredentialError::InvalidHeader)?;
                value.set_sensitive(true);
                Ok(AuthHeader {
                    name: http::header::AUTHORIZATION,
                    value,
                })
            }
        }
    }

    /// Acquire a token ahead of the first request. No-op for keys.
    pub async fn warm_up(&self) -> Result<(), CredentialError> {
        if let Credential::Token { provider, scope } = self {
            provider.get_token(scope).await?;
            info!(scope = %scope, "Pre-fetched access token");
        }
        Ok(())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::ApiKey(_) => f.write_str("Credential::ApiKey(***)"),
            Credential::Token { scope, .. } => write!(f, "Credential::Token({scope})"),
        }
    }
}

/// Where Azure AD tokens come from
#[derive(Debug, Clone)]
pub enum TokenSource {
    /// OAuth2 client-credentials flow
    ClientSecret {
        authority_host: String,
        tenant_id: String,
        client_id: String,
        client_secret: SecretString,
    },
    /// Host-provided managed identity
    ManagedIdentity {
        endpoint: String,
        client_id: Option<String>,
    },
}

impl TokenSource {
    /// Select the token source from configuration.
    pub fn from_config(config: &ServerConfig) -> Self {
        match (&config.tenant_id, &config.client_id, &config.client_secret) {
            (Some(tenant_id), Some(client_id), Some(client_secret)) => TokenSource::ClientSecret {
                authority_host: config.authority_host.trim_end_matches('/').to_string(),
                tenant_id: tenant_id.clone(),
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
            },
            _ => TokenSource::ManagedIdentity {
                endpoint: IMDS_TOKEN_ENDPOINT.to_string(),
                client_id: config.client_id.clone(),
            },
        }
    }

    fn label(&self) -> &'static str {
        match self {
            TokenSource::ClientSecret { .. } => "client-secret",
            TokenSource::ManagedIdentity { .. } => "managed-identity",
        }
    }
}

#[derive(Clone)]
struct AccessToken {
    token: SecretString,
    expires_at: Instant,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + REFRESH_MARGIN < self.expires_at
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: ExpiresIn,
}

/// IMDS returns `expires_in` as a string, the AAD v2 endpoint as a number
#[derive(Deserialize)]
#[serde(untagged)]
enum ExpiresIn {
    Seconds(u64),
    Text(String),
}

impl ExpiresIn {
    fn seconds(&self) -> Result<u64, CredentialError> {
        match self {
            ExpiresIn::Seconds(s) => Ok(*s),
            ExpiresIn::Text(s) => s
                .parse()
                .map_err(|_| CredentialError::InvalidResponse(format!("expires_in '{s}'"))),
        }
    }
}

/// Fetches and caches Azure AD access tokens per scope.
///
/// Shared by every session; safe for concurrent callers. Each scope has its
/// own slot: a burst of sessions triggers one request per scope, and a slow
/// fetch for one scope never delays another.
pub struct TokenProvider {
    source: TokenSource,
    http: reqwest::Client,
    cache: DashMap<String, Arc<Mutex<Option<AccessToken>>>>,
}

impl TokenProvider {
    pub fn new(source: TokenSource, http: reqwest::Client) -> Self {
        info!(source = source.label(), "Using Azure AD token credential");
        Self {
            source,
            http,
            cache: DashMap::new(),
        }
    }

    /// Return a valid token for `scope`, fetching a new one when needed.
    pub async fn get_token(&self, scope: &str) -> Result<SecretString, CredentialError> {
        let slot = self.cache.entry(scope.to_string()).or_default().clone();
        let mut cached = slot.lock().await;
        if let Some(token) = cached.as_ref()
            && token.is_fresh()
        {
            return Ok(token.token.clone());
        }

        debug!(scope = %scope, "Requesting access token");
        let fetched = self.fetch(scope).await?;
        let token = fetched.token.clone();
        *cached = Some(fetched);
        Ok(token)
    }

    async fn fetch(&self, scope: &str) -> Result<AccessToken, CredentialError> {
        let request = match &self.source {
            TokenSource::ClientSecret {
                authority_host,
                tenant_id,
                client_id,
                client_secret,
            } => self
                .http
                .post(format!("{authority_host}/{tenant_id}/oauth2/v2.0/token"))
                .form(&[
                    ("grant_type", "client_credentials"),
                    ("client_id", client_id.as_str()),
                    ("client_secret", client_secret.expose()),
                    ("scope", scope),
                ]),
            TokenSource::ManagedIdentity {
                endpoint,
                client_id,
            } => {
                let resource = scope.trim_end_matches("/.default");
                let mut query = vec![("api-version", IMDS_API_VERSION), ("resource", resource)];
                if let Some(id) = client_id {
                    query.push(("client_id", id.as_str()));
                }
                self.http
                    .get(endpoint)
                    .header("Metadata", "true")
                    .query(&query)
            }
        };

        let response = request
            .send()
            .await
            .map_err(|e| CredentialError::TokenRequest(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            // The body may echo request parameters; only the status is reported
            return Err(CredentialError::TokenRequest(format!(
                "Identity endpoint returned {status}"
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| CredentialError::InvalidResponse(e.to_string()))?;

        Ok(AccessToken {
            token: SecretString::from(body.access_token),
            expires_at: Instant::now() + Duration::from_secs(body.expires_in.seconds()?),
        })
    }
}
