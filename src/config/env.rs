use std::env;
use std::str::FromStr;

use super::ConfigError;

/// Values read from the process environment (after `.env` has been applied).
///
/// Every field is optional; defaults are filled in by `merge`.
#[derive(Debug, Clone, Default)]
pub(crate) struct EnvConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
    pub static_dir: Option<String>,

    pub llm_endpoint: Option<String>,
    pub llm_deployment: Option<String>,
    pub llm_api_version: Option<String>,
    pub llm_api_key: Option<String>,
    pub voice_choice: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub system_message: Option<String>,
    pub disable_audio: Option<bool>,

    pub search_service_name: Option<String>,
    pub search_index: Option<String>,
    pub search_api_key: Option<String>,
    pub search_endpoint: Option<String>,
    pub search_api_version: Option<String>,
    pub search_vector_field: Option<String>,
    pub search_top_k: Option<usize>,
    pub embedding_deployment: Option<String>,

    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub authority_host: Option<String>,

    pub cors_allowed_origins: Option<String>,
    pub rate_limit_requests_per_second: Option<u32>,
    pub rate_limit_burst_size: Option<u32>,
    pub max_websocket_connections: Option<usize>,
    pub max_connections_per_ip: Option<u32>,
}

impl EnvConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            host: var("HOST"),
            port: parse_var("PORT")?,
            tls_cert_path: var("TLS_CERT_PATH"),
            tls_key_path: var("TLS_KEY_PATH"),
            static_dir: var("STATIC_DIR"),

            llm_endpoint: var("AZURE_OPENAI_ENDPOINT"),
            llm_deployment: var("AZURE_OPENAI_REALTIME_DEPLOYMENT"),
            llm_api_version: var("AZURE_OPENAI_API_VERSION"),
            llm_api_key: var("AZURE_OPENAI_API_KEY"),
            voice_choice: var("AZURE_OPENAI_REALTIME_VOICE_CHOICE"),
            temperature: parse_var("AZURE_OPENAI_TEMPERATURE")?,
            max_tokens: parse_var("AZURE_OPENAI_MAX_TOKENS")?,
            system_message: var("SYSTEM_MESSAGE"),
            disable_audio: bool_var("DISABLE_AUDIO")?,

            search_service_name: var("AZURE_SEARCH_SERVICE_NAME"),
            search_index: var("AZURE_SEARCH_INDEX"),
            search_api_key: var("AZURE_SEARCH_API_KEY"),
            search_endpoint: var("AZURE_SEARCH_ENDPOINT"),
            search_api_version: var("AZURE_SEARCH_API_VERSION"),
            search_vector_field: var("AZURE_SEARCH_VECTOR_FIELD"),
            search_top_k: parse_var("AZURE_SEARCH_TOP_K")?,
            embedding_deployment: var("AZURE_OPENAI_EMBEDDING_DEPLOYMENT"),

            tenant_id: var("AZURE_TENANT_ID"),
            client_id: var("AZURE_CLIENT_ID"),
            client_secret: var("AZURE_CLIENT_SECRET"),
            authority_host: var("AZURE_AUTHORITY_HOST"),

            cors_allowed_origins: var("CORS_ALLOWED_ORIGINS"),
            rate_limit_requests_per_second: parse_var("RATE_LIMIT_REQUESTS_PER_SECOND")?,
            rate_limit_burst_size: parse_var("RATE_LIMIT_BURST_SIZE")?,
            max_websocket_connections: parse_var("MAX_WEBSOCKET_CONNECTIONS")?,
            max_connections_per_ip: parse_var("MAX_CONNECTIONS_PER_IP")?,
        })
    }
}

/// Read a variable, treating empty values as unset.
fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key,
                value: raw,
                reason: e.to_string(),
            }),
        None => Ok(None),
    }
}

fn bool_var(key: &'static str) -> Result<Option<bool>, ConfigError> {
    match var(key) {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidValue {
                key,
                value: raw,
                reason: "expected a boolean".to_string(),
            }),
        },
        None => Ok(None),
    }
}
