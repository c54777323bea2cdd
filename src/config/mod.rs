//! Configuration module for the VoiceRAG gateway
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//! The configuration is split into logical submodules for maintainability.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//! - `secret`: Zeroizing, log-safe secret strings
//!
//! # Example
//! ```rust,no_run
//! use voicerag_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable base
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

use thiserror::Error;

mod env;
mod merge;
mod secret;
mod validation;
mod yaml;

pub use secret::SecretString;
pub use yaml::YamlConfig;

use crate::core::relay::SessionSettings;
use crate::core::search::AzureSearchConfig;

/// Default Azure OpenAI realtime API version
pub const DEFAULT_LLM_API_VERSION: &str = "2024-10-01-preview";

/// Default Azure AI Search REST API version
pub const DEFAULT_SEARCH_API_VERSION: &str = "2024-07-01";

/// Default Azure AD authority
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Default instructions given to the realtime model.
pub const DEFAULT_SYSTEM_MESSAGE: &str = "\
You are a helpful real estate assistant helping users find the right flat in Vienna.
You have access to a knowledge base containing data about flat listings in Vienna.

IMPORTANT: When starting a conversation with a user, first ask about their preferences
for an apartment. Ask about their budget range, desired size, number of rooms,
preferred location in Vienna, and any special features they're looking for (like balcony,
parking, etc.). Use the update_preferences tool to store this information.

When using the update_preferences tool:
- Only include the specific preferences that the user mentioned
- Do not include fields that weren't discussed
- For features, you can add new ones without removing existing ones
- The frontend will merge these updates with existing preferences

You have access to the following tools that will help you when interacting with the user:

1- 'search' tool: helps you query the knowledge base for flat listings.
2- 'return_listing_id' tool: helps you provide the id of the listing the user is asking about.
3- 'zoom_in_or_out' tool: helps you zoom in or out of the map.
4- 'add_or_remove_from_favorites' tool: helps you add or remove a listing to the user's favorites.
5- 'navigate_page' tool: helps you navigate to the page the user is requesting to navigate to.
6- 'send_message' tool: helps you initiate a message to the owner of a listing.
7- 'update_preferences' tool: helps you store the user's preferences for apartment search.

When a user wants to message the owner of a listing, use the 'send_message' tool with the listing ID
and contact information. This will open the messaging interface for that specific listing.

You must rely on that information returned from the search tool. Do not invent information.
When you retrieve listings from the knowledge base only list the titles and locations to the user.
When the user specifically asks for more details about a particular listing,
provide them with the accurate and exact fields as returned from the knowledge base.

Remember to use the update_preferences tool whenever the user provides new information about
their preferences, and use these preferences to refine your search queries.
";

/// Configuration errors raised while loading or validating `ServerConfig`
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key} ({value}): {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration
///
/// Contains all configuration needed to run the gateway, including:
/// - Server settings (host, port, TLS, static assets)
/// - Realtime model endpoint, deployment and server-held session settings
/// - Search service settings
/// - Azure AD identity used when API keys are absent
/// - Security settings (CORS, rate limiting, connection limits)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,
    pub tls: Option<TlsConfig>,
    /// Directory holding `index.html` and the frontend bundle
    pub static_dir: PathBuf,

    // Realtime model
    pub llm_endpoint: String,
    pub llm_deployment: String,
    pub llm_api_version: String,
    /// Azure OpenAI key; when absent a token credential is used
    pub llm_api_key: Option<SecretString>,
    pub voice_choice: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub system_message: String,
    pub disable_audio: bool,

    // Search
    pub search_service_name: String,
    pub search_index: String,
    /// Azure AI Search admin/query key; when absent a token credential is used
    pub search_api_key: Option<SecretString>,
    /// Overrides `https://{service}.search.windows.net`
    pub search_endpoint: Option<String>,
    pub search_api_version: String,
    pub search_vector_field: String,
    /// Number of listings returned per search (k)
    pub search_top_k: usize,
    /// When set, queries are embedded through this Azure OpenAI deployment
    /// instead of relying on index-side vectorization
    pub embedding_deployment: Option<String>,

    // Identity
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<SecretString>,
    pub authority_host: String,

    // Security configuration
    /// CORS allowed origins (comma-separated list or "*" for all)
    pub cors_allowed_origins: Option<String>,
    /// Maximum requests per second per IP address
    pub rate_limit_requests_per_second: u32,
    /// Maximum burst size for rate limiting
    pub rate_limit_burst_size: u32,
    /// Maximum concurrent WebSocket connections (None = unlimited)
    pub max_websocket_connections: Option<usize>,
    /// Maximum concurrent WebSocket connections per IP address
    pub max_connections_per_ip: u32,
}

impl ServerConfig {
    /// Load configuration from environment variables only
    ///
    /// The `.env` file is applied in `main` before this is called.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = merge::merge_config(None)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let yaml_config = YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// True when either service lacks an API key and needs an Azure AD token
    pub fn needs_token_credential(&self) -> bool {
        self.llm_api_key.is_none() || self.search_api_key.is_none()
    }

    /// Base URL of the search service
    pub fn search_base_url(&self) -> String {
        match &self.search_endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://{}.search.windows.net", self.search_service_name),
        }
    }

    /// Server-held values that override every client session configuration
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            system_message: Some(self.system_message.clone()),
            voice_choice: self.voice_choice.clone(),
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            disable_audio: self.disable_audio,
        }
    }

    /// Settings for the Azure AI Search backend
    pub fn search_config(&self) -> AzureSearchConfig {
        AzureSearchConfig {
            base_url: self.search_base_url(),
            index: self.search_index.clone(),
            api_version: self.search_api_version.clone(),
            vector_field: self.search_vector_field.clone(),
            embedding_deployment: self.embedding_deployment.clone(),
            llm_endpoint: self.llm_endpoint.clone(),
        }
    }
}
