//! Request dispatch and zero-downtime lifecycle core for small web servers.
//!
//! # Data Flow
//! ```text
//! net::listener (bind, or inherit fd 3 on restart)
//!     → http::server (axum, request ID, tracing, timeout)
//!     → http::dispatcher (parse, match groups, static, not-found)
//!     → http::context (handler chain: middleware → action)
//!     → http::response (buffered status, headers, body)
//!
//! lifecycle::signals → lifecycle::grace (drain, or hand off then drain)
//! ```

pub mod app;
pub mod config;
pub mod controller;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;

pub use app::{AppContext, Application};
pub use config::AppConfig;
pub use controller::{
    Action, AdminController, ApiController, BaseController, Controller, ControllerOptions,
};
pub use http::{handler, Context, Fault, Handler, HandlerResult, HttpServer};
pub use lifecycle::Shutdown;
pub use routing::RouteGroup;
