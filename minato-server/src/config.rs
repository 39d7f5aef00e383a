use minato_client::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Gateway configuration loaded from a YAML file with env overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSettings,
    pub auth: AuthSettings,
    pub store: StoreSettings,
    pub specs: SpecSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub enabled: bool,
    pub jwt: JwtSettings,
    /// Clients allowed to obtain tokens via the client-credentials grant.
    pub clients: Vec<ClientCredential>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtSettings {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub token_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientCredential {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_scope")]
    pub scope: String,
}

fn default_scope() -> String {
    "hl7.ingest fhir.read".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Upsert mapped Patients (and push Coverage) into the store before
    /// returning the Bundle.
    pub upsert: bool,
    /// Base URL of the FHIR store. Empty disables the outbound client.
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub scope: String,
    pub retry: RetrySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_elapsed_ms: u64,
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_elapsed: Duration::from_millis(self.max_elapsed_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecSettings {
    pub mapping_file: String,
    pub validation_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8081,
        }
    }
}

impl Default for JwtSettings {
    fn default() -> Self {
        Self {
            secret: "change-me".to_string(),
            issuer: "minato-intake".to_string(),
            audience: "minato-clients".to_string(),
            token_ttl_secs: 3600,
        }
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            upsert: false,
            base_url: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            scope: "system/*.read system/*.write".to_string(),
            retry: RetrySettings::default(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 250,
            max_elapsed_ms: 15_000,
        }
    }
}

impl Default for SpecSettings {
    fn default() -> Self {
        Self {
            mapping_file: "specs/mapping.json".to_string(),
            validation_file: "specs/validation.json".to_string(),
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file
    pub fn load_from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: ServerConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        let mut config = if let Some(path) = config_path {
            Self::load_from_file(path)?
        } else {
            Self::default()
        };

        if let Ok(port) = std::env::var("MINATO_PORT")
            && let Ok(port_num) = port.parse()
        {
            config.server.port = port_num;
        }

        if let Ok(host) = std::env::var("MINATO_HOST") {
            config.server.host = host;
        }

        if let Ok(secret) = std::env::var("MINATO_JWT_SECRET") {
            config.auth.jwt.secret = secret;
        }

        if let Ok(base_url) = std::env::var("MINATO_STORE_BASE_URL") {
            config.store.base_url = base_url;
        }

        if let Ok(secret) = std::env::var("MINATO_STORE_CLIENT_SECRET") {
            config.store.client_secret = secret;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.server.port, 8081);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(!config.auth.enabled);
        assert!(!config.store.upsert);
        assert_eq!(config.specs.mapping_file, "specs/mapping.json");
    }

    #[test]
    fn test_retry_settings_build_policy() {
        let settings = RetrySettings {
            max_attempts: 2,
            base_delay_ms: 100,
            max_elapsed_ms: 1000,
        };
        let policy = settings.policy();
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.base_delay, Duration::from_millis(100));
        assert_eq!(policy.max_elapsed, Duration::from_millis(1000));
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
server:
  port: 9090
auth:
  enabled: true
  clients:
    - client_id: intake
      client_secret: s3cret
store:
  upsert: true
  base_url: https://fhir.example.com
"#;
        let config: ServerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 9090);
        assert!(config.auth.enabled);
        assert_eq!(config.auth.clients.len(), 1);
        assert_eq!(config.auth.clients[0].scope, "hl7.ingest fhir.read");
        assert!(config.store.upsert);
    }
}
