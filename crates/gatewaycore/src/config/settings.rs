//! Configuration document shape and loading.
//!
//! Deserialized once at startup from a JSON file; the path comes from
//! `GATEWAY_CONFIG_PATH` (default `./config.json`).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A single upstream service entry under a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub url: String,
    #[serde(default = "default_health_path")]
    pub health_path: String,
}

fn default_health_path() -> String {
    "/health".to_string()
}

/// A tenant: claims one or more hosts and/or a path prefix, owns a pool of
/// backend services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    pub name: String,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub path_prefix: Option<String>,
    pub services: Vec<ServiceConfig>,
    #[serde(default = "default_health_interval_sec")]
    pub health_interval_sec: u64,
    #[serde(default)]
    pub script_tag: Option<String>,
}

fn default_health_interval_sec() -> u64 {
    10
}

/// Response compression policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_compression_level")]
    pub level: u32,
    #[serde(default = "default_content_types")]
    pub content_types: Vec<String>,
}

fn default_compression_level() -> u32 {
    5
}

fn default_content_types() -> Vec<String> {
    vec![
        "text/html".to_string(),
        "text/css".to_string(),
        "text/javascript".to_string(),
        "application/json".to_string(),
        "application/xml".to_string(),
        "text/plain".to_string(),
    ]
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            level: default_compression_level(),
            content_types: default_content_types(),
        }
    }
}

/// Scripting substrate configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScriptingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub scripts_dir: String,
    #[serde(default)]
    pub global_scripts: Vec<String>,
}

/// Top-level configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u8,
    pub listen_address: String,
    #[serde(default = "default_admin_base_path")]
    pub admin_base_path: String,
    pub tenants: Vec<TenantConfig>,
    #[serde(default)]
    pub compression: CompressionConfig,
    #[serde(default)]
    pub scripting: ScriptingConfig,
}

fn default_version() -> u8 {
    1
}

fn default_admin_base_path() -> String {
    "/".to_string()
}

/// Load and parse the configuration document from `GATEWAY_CONFIG_PATH`
/// (falling back to `./config.json`).
pub fn load_settings() -> Result<Settings, ConfigError> {
    let path = std::env::var("GATEWAY_CONFIG_PATH").unwrap_or_else(|_| "config.json".to_string());
    load_settings_from(&path)
}

pub fn load_settings_from(path: impl AsRef<Path>) -> Result<Settings, ConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let settings: Settings = serde_json::from_str(&raw)?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_document() {
        let json = r#"{
            "listen_address": "0.0.0.0:8080",
            "tenants": [
                {
                    "name": "api",
                    "domains": ["api.example.com"],
                    "services": [{"name": "api-1", "url": "http://127.0.0.1:9001"}]
                }
            ]
        }"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.admin_base_path, "/");
        assert_eq!(settings.tenants[0].services[0].health_path, "/health");
        assert_eq!(settings.tenants[0].health_interval_sec, 10);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = load_settings_from("/nonexistent/path/config.json").unwrap_err();
        matches!(err, ConfigError::Read { .. });
    }
}
