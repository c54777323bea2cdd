use std::path::PathBuf;

use super::env::EnvConfig;
use super::yaml::YamlConfig;
use super::{
    ConfigError, DEFAULT_AUTHORITY_HOST, DEFAULT_LLM_API_VERSION, DEFAULT_SEARCH_API_VERSION,
    DEFAULT_SYSTEM_MESSAGE, SecretString, ServerConfig, TlsConfig,
};

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 8765;
const DEFAULT_STATIC_DIR: &str = "static";
const DEFAULT_VOICE_CHOICE: &str = "alloy";
const DEFAULT_TEMPERATURE: f64 = 0.6;
const DEFAULT_MAX_TOKENS: u32 = 1000;
const DEFAULT_VECTOR_FIELD: &str = "embedding";
const DEFAULT_TOP_K: usize = 5;
const DEFAULT_RATE_LIMIT_RPS: u32 = 60;
const DEFAULT_RATE_LIMIT_BURST: u32 = 10;
const DEFAULT_MAX_CONNECTIONS_PER_IP: u32 = 100;

/// Merge environment values (base) with optional YAML overrides and defaults.
pub(crate) fn merge_config(yaml: Option<YamlConfig>) -> Result<ServerConfig, ConfigError> {
    let env = EnvConfig::load()?;
    let yaml = yaml.unwrap_or_default();

    let server = yaml.server.unwrap_or_default();
    let llm = yaml.llm.unwrap_or_default();
    let search = yaml.search.unwrap_or_default();
    let identity = yaml.identity.unwrap_or_default();
    let security = yaml.security.unwrap_or_default();

    // TLS is only enabled from YAML when `enabled` is not explicitly false
    let yaml_tls = server.tls.filter(|tls| tls.enabled.unwrap_or(true));
    let tls_cert = yaml_tls
        .as_ref()
        .and_then(|t| t.cert_path.clone())
        .or(env.tls_cert_path);
    let tls_key = yaml_tls
        .as_ref()
        .and_then(|t| t.key_path.clone())
        .or(env.tls_key_path);
    let tls = match (tls_cert, tls_key) {
        (Some(cert), Some(key)) => Some(TlsConfig {
            cert_path: PathBuf::from(cert),
            key_path: PathBuf::from(key),
        }),
        (None, None) => None,
        _ => {
            return Err(ConfigError::Invalid(
                "TLS requires both a certificate path and a key path".to_string(),
            ));
        }
    };

    let llm_endpoint = llm
        .endpoint
        .or(env.llm_endpoint)
        .ok_or(ConfigError::Missing("AZURE_OPENAI_ENDPOINT"))?;
    let llm_deployment = llm
        .deployment
        .or(env.llm_deployment)
        .ok_or(ConfigError::Missing("AZURE_OPENAI_REALTIME_DEPLOYMENT"))?;
    let search_service_name = search
        .service_name
        .or(env.search_service_name)
        .ok_or(ConfigError::Missing("AZURE_SEARCH_SERVICE_NAME"))?;
    let search_index = search
        .index
        .or(env.search_index)
        .ok_or(ConfigError::Missing("AZURE_SEARCH_INDEX"))?;

    Ok(ServerConfig {
        host: server
            .host
            .or(env.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string()),
        port: server.port.or(env.port).unwrap_or(DEFAULT_PORT),
        tls,
        static_dir: PathBuf::from(
            server
                .static_dir
                .or(env.static_dir)
                .unwrap_or_else(|| DEFAULT_STATIC_DIR.to_string()),
        ),

        llm_endpoint,
        llm_deployment,
        llm_api_version: llm
            .api_version
            .or(env.llm_api_version)
            .unwrap_or_else(|| DEFAULT_LLM_API_VERSION.to_string()),
        llm_api_key: secret(llm.api_key.or(env.llm_api_key)),
        voice_choice: llm
            .voice_choice
            .or(env.voice_choice)
            .unwrap_or_else(|| DEFAULT_VOICE_CHOICE.to_string()),
        temperature: llm
            .temperature
            .or(env.temperature)
            .unwrap_or(DEFAULT_TEMPERATURE),
        max_tokens: llm
            .max_tokens
            .or(env.max_tokens)
            .unwrap_or(DEFAULT_MAX_TOKENS),
        system_message: llm
            .system_message
            .or(env.system_message)
            .unwrap_or_else(|| DEFAULT_SYSTEM_MESSAGE.to_string()),
        disable_audio: llm.disable_audio.or(env.disable_audio).unwrap_or(false),

        search_service_name,
        search_index,
        search_api_key: secret(search.api_key.or(env.search_api_key)),
        search_endpoint: search.endpoint.or(env.search_endpoint),
        search_api_version: search
            .api_version
            .or(env.search_api_version)
            .unwrap_or_else(|| DEFAULT_SEARCH_API_VERSION.to_string()),
        search_vector_field: search
            .vector_field
            .or(env.search_vector_field)
            .unwrap_or_else(|| DEFAULT_VECTOR_FIELD.to_string()),
        search_top_k: search.top_k.or(env.search_top_k).unwrap_or(DEFAULT_TOP_K),
        embedding_deployment: search.embedding_deployment.or(env.embedding_deployment),

        tenant_id: identity.tenant_id.or(env.tenant_id),
        client_id: identity.client_id.or(env.client_id),
        client_secret: secret(identity.client_secret.or(env.client_secret)),
        authority_host: identity
            .authority_host
            .or(env.authority_host)
            .unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string()),

        cors_allowed_origins: security.cors_allowed_origins.or(env.cors_allowed_origins),
        rate_limit_requests_per_second: security
            .rate_limit_requests_per_second
            .or(env.rate_limit_requests_per_second)
            .unwrap_or(DEFAULT_RATE_LIMIT_RPS),
        rate_limit_burst_size: security
            .rate_limit_burst_size
            .or(env.rate_limit_burst_size)
            .unwrap_or(DEFAULT_RATE_LIMIT_BURST),
        max_websocket_connections: security
            .max_websocket_connections
            .or(env.max_websocket_connections),
        max_connections_per_ip: security
            .max_connections_per_ip
            .or(env.max_connections_per_ip)
            .unwrap_or(DEFAULT_MAX_CONNECTIONS_PER_IP),
    })
}

fn secret(value: Option<String>) -> Option<SecretString> {
    value.filter(|v| !v.is_empty()).map(SecretString::from)
}
