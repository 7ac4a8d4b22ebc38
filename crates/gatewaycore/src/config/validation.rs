//! Configuration validation with detailed error reporting.
//!
//! Validation accumulates every problem found rather than failing fast, so
//! a single run surfaces the complete list of issues to fix.

use std::collections::HashSet;

use log::{info, warn};

use crate::config::settings::Settings;

/// Result of configuration validation containing errors, warnings, and
/// recommendations.
///
/// # Examples
///
/// ```
/// use gatewaycore::config::validation::ValidationResult;
///
/// let mut result = ValidationResult::new();
/// result.add_error("Missing required field".to_string());
/// result.add_warning("Using default value".to_string());
///
/// assert!(!result.is_valid);
/// assert_eq!(result.errors.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: String) {
        self.is_valid = false;
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn add_recommendation(&mut self, recommendation: String) {
        self.recommendations.push(recommendation);
    }
}

/// Validates a [`Settings`] document before it is turned into a
/// `TenantMatcher`.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Performs comprehensive validation of gateway settings: tenant shape,
    /// domain/prefix rules, compression bounds, and scripting directory
    /// reachability.
    pub fn validate_comprehensive(settings: &Settings) -> ValidationResult {
        let mut result = ValidationResult::new();

        if settings.tenants.is_empty() {
            result.add_warning("configuration defines no tenants".to_string());
        }

        let mut seen_names = HashSet::new();
        for tenant in &settings.tenants {
            if !seen_names.insert(tenant.name.clone()) {
                result.add_error(format!("duplicate tenant name '{}'", tenant.name));
            }

            if tenant.domains.is_empty() && tenant.path_prefix.is_none() {
                result.add_error(format!(
                    "tenant '{}' must define either domains or path_prefix",
                    tenant.name
                ));
            }

            if let Some(prefix) = &tenant.path_prefix {
                if !prefix.starts_with('/') || !prefix.ends_with('/') {
                    result.add_error(format!(
                        "tenant '{}' path_prefix '{}' must start and end with '/'",
                        tenant.name, prefix
                    ));
                }
                if prefix == "/" && !tenant.domains.is_empty() {
                    result.add_recommendation(format!(
                        "tenant '{}' uses a catch-all path_prefix alongside domains; confirm this is intentional",
                        tenant.name
                    ));
                }
            }

            for domain in &tenant.domains {
                if !domain.contains('.') || domain.chars().any(|c| c.is_whitespace()) {
                    result.add_error(format!(
                        "tenant '{}' domain '{}' must contain a dot and no whitespace",
                        tenant.name, domain
                    ));
                }
            }

            if tenant.services.is_empty() {
                result.add_error(format!("tenant '{}' defines no services", tenant.name));
            }

            for service in &tenant.services {
                if url::Url::parse(&service.url).is_err() {
                    result.add_error(format!(
                        "tenant '{}' service '{}' has an invalid url '{}'",
                        tenant.name, service.name, service.url
                    ));
                }
                if !service.health_path.starts_with('/') {
                    result.add_error(format!(
                        "tenant '{}' service '{}' health_path must start with '/'",
                        tenant.name, service.name
                    ));
                }
            }

            if tenant.health_interval_sec < 1 {
                result.add_recommendation(format!(
                    "tenant '{}' health_interval_sec below 1s is unusually aggressive",
                    tenant.name
                ));
            }
        }

        if settings.compression.enabled && !(1..=9).contains(&settings.compression.level) {
            result.add_error(format!(
                "compression.level {} must be within 1..=9",
                settings.compression.level
            ));
        }

        if settings.scripting.enabled {
            if settings.scripting.scripts_dir.is_empty() {
                result.add_error("scripting.enabled is true but scripts_dir is empty".to_string());
            } else if !std::path::Path::new(&settings.scripting.scripts_dir).is_dir() {
                result.add_error(format!(
                    "scripting.scripts_dir '{}' does not exist or is not a directory",
                    settings.scripting.scripts_dir
                ));
            }
        }

        if result.is_valid {
            info!("configuration validated with {} warnings", result.warnings.len());
        } else {
            warn!("configuration validation failed with {} errors", result.errors.len());
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::{CompressionConfig, ScriptingConfig, ServiceConfig, TenantConfig};

    fn base_settings() -> Settings {
        Settings {
            version: 1,
            listen_address: "0.0.0.0:8080".to_string(),
            admin_base_path: "/".to_string(),
            tenants: vec![TenantConfig {
                name: "api".to_string(),
                domains: vec!["api.example.com".to_string()],
                path_prefix: None,
                services: vec![ServiceConfig {
                    name: "api-1".to_string(),
                    url: "http://127.0.0.1:9001".to_string(),
                    health_path: "/healthz".to_string(),
                }],
                health_interval_sec: 10,
                script_tag: None,
            }],
            compression: CompressionConfig::default(),
            scripting: ScriptingConfig::default(),
        }
    }

    #[test]
    fn valid_config_passes() {
        let result = ConfigValidator::validate_comprehensive(&base_settings());
        assert!(result.is_valid, "{:?}", result.errors);
    }

    #[test]
    fn rejects_empty_path_prefix_without_trailing_slash() {
        let mut settings = base_settings();
        settings.tenants[0].domains.clear();
        settings.tenants[0].path_prefix = Some("/api".to_string());
        let result = ConfigValidator::validate_comprehensive(&settings);
        assert!(!result.is_valid);
    }

    #[test]
    fn rejects_tenant_with_neither_domain_nor_prefix() {
        let mut settings = base_settings();
        settings.tenants[0].domains.clear();
        let result = ConfigValidator::validate_comprehensive(&settings);
        assert!(!result.is_valid);
    }

    #[test]
    fn rejects_duplicate_tenant_names() {
        let mut settings = base_settings();
        let dup = settings.tenants[0].clone();
        settings.tenants.push(dup);
        let result = ConfigValidator::validate_comprehensive(&settings);
        assert!(!result.is_valid);
    }
}
