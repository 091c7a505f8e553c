//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Supported document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

impl ConfigFormat {
    /// Pick a format from the file extension; YAML is the default.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => ConfigFormat::Json,
            Some("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Yaml,
        }
    }
}

/// Load and validate configuration from a YAML, JSON or TOML file.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content, ConfigFormat::from_path(path))
}

/// Parse and validate a configuration document.
pub fn parse_config(content: &str, format: ConfigFormat) -> Result<ProxyConfig, ConfigError> {
    let config: ProxyConfig = match format {
        ConfigFormat::Yaml => serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?,
        ConfigFormat::Json => serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?,
        ConfigFormat::Toml => toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?,
    };

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::BalancingStrategy;

    const YAML: &str = r#"
server:
  listen: 8000
  workers: 2
  balancing: random
  upstreams:
    - id: node1
      url: http://localhost:8001
    - id: node2
      url: localhost:8002
  headers:
    - key: x-forward
      value: $ip
  rules:
    - path: /todos
      upstreams: [node1, node2]
      rateLimit:
        maxRequests: 3
        timeWindow: 30000
    - path: /users
      upstreams: [node2]
      cache:
        maxSize: 50
        expirationTime: 10000
rateLimit:
  enabled: false
  maxRequests: 100
  timeWindow: 60000
cache:
  enabled: true
  maxSize: 100
  expirationTime: 5000
"#;

    #[test]
    fn parses_yaml_document() {
        let config = parse_config(YAML, ConfigFormat::Yaml).unwrap();
        assert_eq!(config.server.listen, 8000);
        assert_eq!(config.server.workers, 2);
        assert_eq!(config.server.balancing, BalancingStrategy::Random);
        assert_eq!(config.server.upstreams.len(), 2);
        assert_eq!(config.server.headers[0].key, "x-forward");

        let todos = &config.server.rules[0];
        let limit = todos.rate_limit.as_ref().unwrap();
        assert!(limit.enabled, "enabled defaults to true when the section is present");
        assert_eq!(limit.max_requests, 3);
        assert_eq!(limit.time_window, 30_000);

        let users = &config.server.rules[1];
        assert_eq!(users.cache.as_ref().unwrap().max_size, 50);
        assert!(!config.rate_limit.as_ref().unwrap().enabled);
        assert_eq!(config.server.worker_timeout, 5_000);
    }

    #[test]
    fn parses_json_document() {
        let json = r#"{
            "server": {
                "listen": 9000,
                "workers": 1,
                "upstreams": [{"id": "a", "url": "http://127.0.0.1:1"}],
                "rules": [{"path": "/a", "upstreams": ["a"]}]
            }
        }"#;
        let config = parse_config(json, ConfigFormat::Json).unwrap();
        assert_eq!(config.server.listen, 9000);
        assert!(config.cache.is_none());
    }

    #[test]
    fn parses_toml_document() {
        let doc = r#"
[server]
listen = 7000
workers = 3

[[server.upstreams]]
id = "a"
url = "http://127.0.0.1:1"

[[server.rules]]
path = "/a"
upstreams = ["a"]
"#;
        let config = parse_config(doc, ConfigFormat::Toml).unwrap();
        assert_eq!(config.server.workers, 3);
    }

    #[test]
    fn validation_failure_is_reported() {
        let doc = "server:\n  workers: 0\n";
        match parse_config(doc, ConfigFormat::Yaml) {
            Err(ConfigError::Validation(errors)) => {
                assert_eq!(errors, vec![ValidationError::NoWorkers]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(ConfigFormat::from_path(Path::new("proxy.json")), ConfigFormat::Json);
        assert_eq!(ConfigFormat::from_path(Path::new("proxy.toml")), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path(Path::new("proxy.yml")), ConfigFormat::Yaml);
    }
}
