//! Fault containment for handler chains.
//!
//! # Responsibilities
//! - Run everything downstream and catch both returned faults and panics
//! - Drop requests whose client connection is gone without writing
//! - Log the full diagnostic and hand off to the internal-error handler
//!
//! # Design Decisions
//! - Recovery never re-raises: the chain it wraps always ends `Ok`
//! - The fault is stored in the context before the error handler runs, so
//!   the handler can render it

use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, error};

use crate::http::chain::{handler, Handler};
use crate::http::context::Context;
use crate::http::fault::{install_panic_hook, Fault, FaultKind};

/// Middleware that contains faults raised anywhere after it in the chain.
pub fn recovery() -> Handler {
    install_panic_hook();
    handler(|ctx| {
        let fault = match panic::catch_unwind(AssertUnwindSafe(|| ctx.next())) {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(fault)) => fault,
            Err(payload) => Fault::from_panic(payload),
        };
        recover(ctx, fault);
        Ok(())
    })
}

fn recover(ctx: &mut Context, fault: Fault) {
    ctx.abort();

    if fault.is_broken_pipe() {
        debug!(path = %ctx.path(), error = %fault, "Client connection lost");
        return;
    }

    let origin = match fault.kind() {
        FaultKind::Panic => "panic",
        FaultKind::Error => "error",
    };
    error!(
        origin = origin,
        error = %fault,
        request = %ctx.dump_request(),
        stack = %fault.stack(),
        "Recovered from handler fault"
    );

    ctx.set_internal_error(fault);
    let on_error = ctx.app().internal_error_handler().clone();
    if let Err(nested) = on_error(ctx) {
        error!(error = %nested, "Internal error handler failed");
    }
}
