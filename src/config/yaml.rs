use serde::Deserialize;
use std::path::PathBuf;

use super::ConfigError;

/// Complete YAML configuration structure
///
/// This structure represents the full configuration that can be loaded from a YAML file.
/// All fields are optional to allow partial configuration. Values present here
/// override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 8765
///   static_dir: "./static"
///
/// llm:
///   endpoint: "https://my-aoai.openai.azure.com"
///   deployment: "gpt-4o-realtime-preview"
///   api_key: "your-aoai-key"
///   voice_choice: "alloy"
///   temperature: 0.6
///   max_tokens: 1000
///
/// search:
///   service_name: "my-search"
///   index: "vienna-listings"
///   api_key: "your-search-key"
///   top_k: 5
///
/// identity:
///   tenant_id: "00000000-0000-0000-0000-000000000000"
///   client_id: "11111111-1111-1111-1111-111111111111"
///   client_secret: "client-secret"
///
/// security:
///   cors_allowed_origins: "*"
///   max_connections_per_ip: 10
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub llm: Option<LlmYaml>,
    pub search: Option<SearchYaml>,
    pub identity: Option<IdentityYaml>,
    pub security: Option<SecurityYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls: Option<TlsYaml>,
    pub static_dir: Option<String>,
}

/// TLS configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TlsYaml {
    pub enabled: Option<bool>,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

/// Realtime model settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LlmYaml {
    pub endpoint: Option<String>,
    pub deployment: Option<String>,
    pub api_version: Option<String>,
    pub api_key: Option<String>,
    pub voice_choice: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub system_message: Option<String>,
    pub disable_audio: Option<bool>,
}

/// Search backend settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SearchYaml {
    pub service_name: Option<String>,
    pub index: Option<String>,
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    pub api_version: Option<String>,
    pub vector_field: Option<String>,
    pub top_k: Option<usize>,
    pub embedding_deployment: Option<String>,
}

/// Azure AD identity used when API keys are not configured
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct IdentityYaml {
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub authority_host: Option<String>,
}

/// Security configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    /// CORS allowed origins (comma-separated or "*")
    pub cors_allowed_origins: Option<String>,
    pub rate_limit_requests_per_second: Option<u32>,
    pub rate_limit_burst_size: Option<u32>,
    pub max_websocket_connections: Option<usize>,
    pub max_connections_per_ip: Option<u32>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Required fields have invalid types
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::Invalid(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| ConfigError::Invalid(format!("Failed to parse YAML config: {e}")))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_config_full() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 8080
  static_dir: "/srv/static"

llm:
  endpoint: "https://aoai.example.com"
  deployment: "gpt-4o-realtime-preview"
  api_key: "llm-key"
  voice_choice: "shimmer"
  temperature: 0.8
  max_tokens: 500
  disable_audio: true

search:
  service_name: "listings-search"
  index: "vienna"
  api_key: "search-key"
  top_k: 3
  embedding_deployment: "text-embedding-3-large"

identity:
  tenant_id: "tenant"
  client_id: "client"
  client_secret: "secret"

security:
  cors_allowed_origins: "*"
  max_connections_per_ip: 4
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        let server = config.server.unwrap();
        assert_eq!(server.host, Some("127.0.0.1".to_string()));
        assert_eq!(server.port, Some(8080));
        assert_eq!(server.static_dir, Some("/srv/static".to_string()));

        let llm = config.llm.unwrap();
        assert_eq!(llm.endpoint, Some("https://aoai.example.com".to_string()));
        assert_eq!(llm.voice_choice, Some("shimmer".to_string()));
        assert_eq!(llm.temperature, Some(0.8));
        assert_eq!(llm.max_tokens, Some(500));
        assert_eq!(llm.disable_audio, Some(true));

        let search = config.search.unwrap();
        assert_eq!(search.service_name, Some("listings-search".to_string()));
        assert_eq!(search.top_k, Some(3));
        assert_eq!(
            search.embedding_deployment,
            Some("text-embedding-3-large".to_string())
        );

        let identity = config.identity.unwrap();
        assert_eq!(identity.tenant_id, Some("tenant".to_string()));
        assert!(identity.authority_host.is_none());

        let security = config.security.unwrap();
        assert_eq!(security.cors_allowed_origins, Some("*".to_string()));
        assert_eq!(security.max_connections_per_ip, Some(4));
    }

    #[test]
    fn test_yaml_config_partial() {
        let yaml = r#"
llm:
  voice_choice: "echo"
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.server.is_none());
        assert!(config.search.is_none());
        let llm = config.llm.unwrap();
        assert_eq!(llm.voice_choice, Some("echo".to_string()));
        assert!(llm.endpoint.is_none());
    }

    #[test]
    fn test_yaml_config_empty() {
        let config: YamlConfig = serde_yaml::from_str("{}").unwrap();
        assert!(config.server.is_none());
        assert!(config.llm.is_none());
        assert!(config.identity.is_none());
    }

    #[test]
    fn test_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        fs::write(
            &config_path,
            r#"
server:
  host: "localhost"
  port: 3000
"#,
        )
        .unwrap();

        let config = YamlConfig::from_file(&config_path).unwrap();
        assert_eq!(
            config.server.as_ref().unwrap().host,
            Some("localhost".to_string())
        );
        assert_eq!(config.server.as_ref().unwrap().port, Some(3000));
    }

    #[test]
    fn test_from_file_not_found() {
        let path = PathBuf::from("/nonexistent/config.yaml");
        let result = YamlConfig::from_file(&path);

        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );
    }

    #[test]
    fn test_from_file_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalid.yaml");

        fs::write(&config_path, "invalid: yaml: content:").unwrap();

        let result = YamlConfig::from_file(&config_path);
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to parse YAML")
        );
    }
}
