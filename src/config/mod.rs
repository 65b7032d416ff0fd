//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, <deploy root>/config/app.toml)
//!     → loader.rs (read & deserialize)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → moved into the Application, shared via Arc<AppContext>
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; routes are never hot-reloaded, so
//!   neither is configuration
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::AppConfig;
pub use schema::Environment;
pub use schema::ListenerConfig;
pub use schema::UploadConfig;
