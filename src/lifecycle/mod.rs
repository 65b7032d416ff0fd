//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Start:
//!     net::listener (bind fresh, or adopt fd 3 when SWITCHYARD_GRACE is set)
//!     → grace.rs (serve until an event arrives)
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Stop    → drain up to the timeout → exit
//!     SIGUSR2        → Restart → handoff.rs spawns successor on fd 3
//!                              → drain up to the timeout → exit
//!     SIGTERM/SIGINT again → Force → abandon the drain → exit
//! ```
//!
//! # Design Decisions
//! - At most one of stop or handoff is ever in flight
//! - Shutdown has a timeout: past it, in-flight requests are abandoned and
//!   the timeout is reported as an error
//! - The binary drops its runtime without waiting, so abandoned blocking
//!   chains never delay exit
//! - Handoff is local, parent to child; no coordination between instances

pub mod grace;
pub mod handoff;
pub mod shutdown;
pub mod signals;

pub use grace::{Grace, LifecycleError, LifecycleState};
pub use handoff::{Handoff, HandoffError, InheritableListener, ProcessHandoff};
pub use shutdown::Shutdown;
pub use signals::LifecycleEvent;
