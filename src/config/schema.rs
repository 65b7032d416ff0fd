//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for an application.
//! All types derive Serde traits for deserialization from config files.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for an application.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Application identity and environment tier.
    pub app: AppInfo,

    /// Listener configuration (bind address, restart timeout).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request body limits.
    pub uploads: UploadConfig,

    /// Static file serving.
    pub static_files: StaticFilesConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Application identity.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppInfo {
    /// Application name, also used as the optional group path prefix.
    pub name: String,

    /// Application version (diagnostic only).
    pub version: String,

    /// Deployment tier.
    pub environment: Environment,
}

impl Default for AppInfo {
    fn default() -> Self {
        Self {
            name: "switchyard".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: Environment::Dev,
        }
    }
}

/// Deployment tier.
///
/// `Pre` and `Online` are production tiers: internal error details are
/// never echoed to clients there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Dev,
    Test,
    Pre,
    Online,
}

impl Environment {
    /// Returns true for tiers that serve real traffic.
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Pre | Environment::Online)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Environment::Dev => "dev",
            Environment::Test => "test",
            Environment::Pre => "pre",
            Environment::Online => "online",
        };
        f.write_str(name)
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Listen address (e.g., "0.0.0.0:8080" or ":8080").
    pub listen: String,

    /// How long a stopping process waits for in-flight requests, in seconds.
    pub restart_timeout_secs: u64,
}

impl ListenerConfig {
    /// Resolve the listen address. A bare `:port` binds every interface.
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        if self.listen.starts_with(':') {
            format!("0.0.0.0{}", self.listen).parse()
        } else {
            self.listen.parse()
        }
    }

    pub fn restart_timeout(&self) -> Duration {
        Duration::from_secs(self.restart_timeout_secs)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            restart_timeout_secs: 5,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Request body limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Multipart bytes kept in memory; file data past this spills to temp files.
    pub max_multipart_memory: usize,

    /// Maximum size of a URL-encoded form body.
    pub max_form_size: usize,

    /// Maximum size of any other request body, and of a whole multipart upload.
    pub max_body_size: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_multipart_memory: 16 << 20, // 16 MiB
            max_form_size: 10 << 20,
            max_body_size: 64 << 20,
        }
    }
}

/// Static file serving configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StaticFilesConfig {
    /// Serve files under `<prefix>/public/`.
    pub enabled: bool,

    /// Deployment root. Defaults to the directory holding the executable.
    pub root: Option<String>,

    /// Directory under the root holding the files (also the URL segment).
    pub dir: String,
}

impl Default for StaticFilesConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            root: None,
            dir: "public".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.listener.restart_timeout(), Duration::from_secs(5));
        assert_eq!(config.uploads.max_multipart_memory, 16 * 1024 * 1024);
        assert_eq!(config.app.environment, Environment::Dev);
        assert!(!config.static_files.enabled);
    }

    #[test]
    fn test_bare_port_listen_address() {
        let listener = ListenerConfig {
            listen: ":8888".into(),
            ..Default::default()
        };
        assert_eq!(listener.socket_addr().unwrap().port(), 8888);
        assert!(listener.socket_addr().unwrap().ip().is_unspecified());
    }

    #[test]
    fn test_production_tiers() {
        assert!(Environment::Online.is_production());
        assert!(Environment::Pre.is_production());
        assert!(!Environment::Dev.is_production());
        assert!(!Environment::Test.is_production());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: AppConfig = toml::from_str(
            r#"
            [app]
            name = "shop"
            environment = "online"

            [listener]
            listen = "127.0.0.1:9000"
            "#,
        )
        .unwrap();
        assert_eq!(config.app.name, "shop");
        assert_eq!(config.app.environment, Environment::Online);
        assert_eq!(config.listener.restart_timeout_secs, 5);
        assert_eq!(config.timeouts.request_secs, 30);
    }
}
