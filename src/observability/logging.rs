//! Structured logging.
//!
//! # Responsibilities
//! - Install the global tracing subscriber
//! - Pick the output format from the environment tier
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured level
//! - JSON format for production tiers, human-readable fmt otherwise

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Environment;

/// Filter from `RUST_LOG`, falling back to `level`.
pub fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(level: &str, environment: Environment) -> Result<(), TryInitError> {
    let filter = build_filter(level);
    if environment.is_production() {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_current_span(true))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .try_init()
    }
}
