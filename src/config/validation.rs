//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, limits > 0, addresses parse)
//! - Validate the application name is usable as a path segment
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::AppConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid listen address `{0}`")]
    ListenAddress(String),

    #[error("app name must be non-empty and must not contain '/' (got `{0}`)")]
    AppName(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("invalid metrics address `{0}`")]
    MetricsAddress(String),
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.socket_addr().is_err() {
        errors.push(ValidationError::ListenAddress(config.listener.listen.clone()));
    }

    let name = &config.app.name;
    if name.is_empty() || name.contains('/') {
        errors.push(ValidationError::AppName(name.clone()));
    }

    if config.listener.restart_timeout_secs == 0 {
        errors.push(ValidationError::Zero("listener.restart_timeout_secs"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.request_secs"));
    }
    if config.uploads.max_multipart_memory == 0 {
        errors.push(ValidationError::Zero("uploads.max_multipart_memory"));
    }
    if config.uploads.max_form_size == 0 {
        errors.push(ValidationError::Zero("uploads.max_form_size"));
    }
    if config.uploads.max_body_size == 0 {
        errors.push(ValidationError::Zero("uploads.max_body_size"));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = AppConfig::default();
        config.listener.listen = "not-an-address".into();
        config.app.name = "a/b".into();
        config.listener.restart_timeout_secs = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::AppName("a/b".into())));
        assert!(errors.contains(&ValidationError::Zero("listener.restart_timeout_secs")));
    }

    #[test]
    fn test_metrics_address_checked_only_when_enabled() {
        let mut config = AppConfig::default();
        config.observability.metrics_address = "nope".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::MetricsAddress("nope".into())]
        );
    }
}
