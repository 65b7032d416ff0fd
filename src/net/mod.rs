//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Cold start:  listener.rs binds the configured address
//! Restart:     listener.rs adopts descriptor 3 from the predecessor
//!     → axum accept loop (one task per connection)
//!     → inflight.rs (request counted until its response is produced)
//! ```
//!
//! # Design Decisions
//! - The same listening socket survives a restart; no connection is refused
//! - In-flight counts feed shutdown diagnostics, not admission control

pub mod inflight;
pub mod listener;

pub use inflight::{InFlightGuard, InFlightTracker};
pub use listener::{bind_or_inherit, ListenerError, ListenerOrigin, GRACE_ENV_KEY, INHERITED_FD};
