//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum setup, request ID, timeout, tracing)
//!     → dispatcher.rs (parse, match groups, static files, not-found)
//!     → request.rs (query, form and multipart parsing)
//!     → context.rs (handler chain execution)
//!     → response.rs (buffered status, headers, body)
//!     → Send to client
//! ```

pub mod chain;
pub mod context;
pub mod dispatcher;
pub mod fault;
pub mod handlers;
pub mod middleware;
pub mod params;
pub mod render;
pub mod request;
pub mod response;
pub mod server;

/// Header carrying the per-request correlation ID.
pub const X_REQUEST_ID: &str = "x-request-id";

pub use chain::{handler, Handler, HandlerChain};
pub use context::Context;
pub use dispatcher::Dispatcher;
pub use fault::{Fault, HandlerResult};
pub use params::Values;
pub use server::HttpServer;
