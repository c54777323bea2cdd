use url::Url;

use super::{ConfigError, ServerConfig};

/// Temperature range accepted by the realtime API
const MIN_TEMPERATURE: f64 = 0.6;
const MAX_TEMPERATURE: f64 = 1.2;

/// Validate a merged configuration before the server starts.
pub(crate) fn validate(config: &ServerConfig) -> Result<(), ConfigError> {
    validate_endpoint("AZURE_OPENAI_ENDPOINT", &config.llm_endpoint)?;
    if let Some(endpoint) = &config.search_endpoint {
        validate_endpoint("AZURE_SEARCH_ENDPOINT", endpoint)?;
    }
    validate_endpoint("AZURE_AUTHORITY_HOST", &config.authority_host)?;

    if !(MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&config.temperature) {
        return Err(ConfigError::InvalidValue {
            key: "AZURE_OPENAI_TEMPERATURE",
            value: config.temperature.to_string(),
            reason: format!("must be between {MIN_TEMPERATURE} and {MAX_TEMPERATURE}"),
        });
    }

    if config.max_tokens == 0 {
        return Err(ConfigError::InvalidValue {
            key: "AZURE_OPENAI_MAX_TOKENS",
            value: "0".to_string(),
            reason: "must be positive".to_string(),
        });
    }

    if config.search_top_k == 0 {
        return Err(ConfigError::InvalidValue {
            key: "AZURE_SEARCH_TOP_K",
            value: "0".to_string(),
            reason: "must be positive".to_string(),
        });
    }

    validate_identity(config)
}

fn validate_endpoint(key: &'static str, raw: &str) -> Result<(), ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" | "ws" | "wss" => {}
        other => {
            return Err(ConfigError::InvalidValue {
                key,
                value: raw.to_string(),
                reason: format!("unsupported scheme '{other}'"),
            });
        }
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
            reason: "URL must have a host".to_string(),
        });
    }

    // Credentials belong in the key/identity settings, never in the URL
    if !url.username().is_empty() || url.password().is_some() {
        return Err(ConfigError::InvalidValue {
            key,
            value: "<redacted>".to_string(),
            reason: "URL must not embed credentials".to_string(),
        });
    }

    Ok(())
}

/// A client secret is only usable together with a tenant and client id.
fn validate_identity(config: &ServerConfig) -> Result<(), ConfigError> {
    if config.client_secret.is_some()
        && (config.tenant_id.is_none() || config.client_id.is_none())
    {
        return Err(ConfigError::Invalid(
            "AZURE_CLIENT_SECRET requires AZURE_TENANT_ID and AZURE_CLIENT_ID".to_string(),
        ));
    }
    Ok(())
}
