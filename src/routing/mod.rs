//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (at startup):
//!     (method, path, handlers)
//!     → matcher.rs (validate, normalize, apply group prefix)
//!     → router.rs (shared middleware ++ handlers, frozen as a chain)
//!
//! Incoming Request (method, path)
//!     → primary group, then secondary groups in registration order
//!     → Return: first matching chain or no match
//! ```
//!
//! # Design Decisions
//! - Route tables are built at startup and immutable while serving
//! - Exact string matching only
//! - First matching group wins

pub mod matcher;
pub mod router;

pub use router::{ControllerRoutes, Route, RouteError, RouteGroup, DEFAULT_GROUP_NAME};
