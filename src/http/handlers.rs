//! Default terminal handlers.

use axum::http::StatusCode;
use tracing::debug;

use crate::http::chain::{handler, Handler};

pub const NOT_FOUND_BODY: &str = "Not Found";
pub const INTERNAL_ERROR_BODY: &str = "Internal Server Error";

/// Answers 404 for requests no group matched.
pub fn not_found() -> Handler {
    handler(|ctx| {
        debug!(path = %ctx.path(), "No route matched");
        ctx.string(StatusCode::NOT_FOUND, NOT_FOUND_BODY);
        Ok(())
    })
}

/// Answers 500 after recovery stored a fault in the context.
///
/// Production tiers get an opaque body. Other tiers get the fault and its
/// stack so the developer sees what went wrong.
pub fn internal_server_error() -> Handler {
    handler(|ctx| {
        let production = ctx.app().config().app.environment.is_production();
        let body = match ctx.internal_error() {
            Some(fault) if !production => format!("{} \n{}", fault, fault.stack()),
            _ => INTERNAL_ERROR_BODY.to_string(),
        };
        ctx.string(StatusCode::INTERNAL_SERVER_ERROR, &body);
        Ok(())
    })
}
