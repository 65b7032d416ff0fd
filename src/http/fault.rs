//! Per-request failure values.
//!
//! A `Fault` is what a handler hands back when it cannot finish: either an
//! error it returned through `?`, or a panic caught by the recovery
//! middleware. It carries a printable value, a stack snapshot, and the
//! transport error kind when the cause was an I/O error, so recovery can
//! tell a broken client connection from a real bug.
//!
//! Panic stacks are captured by a process-wide panic hook while the
//! panicking frames are still on the stack, then picked up by
//! [`Fault::from_panic`] on the same thread after unwinding.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::fmt;
use std::io;
use std::panic;
use std::sync::Once;

thread_local! {
    static PANIC_STACK: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Install the stack-capturing panic hook, chained to the current one.
/// Idempotent.
pub fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let stack = Backtrace::force_capture().to_string();
            PANIC_STACK.with(|slot| *slot.borrow_mut() = Some(stack));
            previous(info);
        }));
    });
}

/// Stack recorded by the hook for the last panic on this thread.
fn take_panic_stack() -> Option<String> {
    PANIC_STACK.with(|slot| slot.borrow_mut().take())
}

/// Outcome of a handler. `Err` stops the chain.
pub type HandlerResult = Result<(), Fault>;

/// Where a fault came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Returned by a handler.
    Error,
    /// Caught while unwinding.
    Panic,
}

/// Diagnostic snapshot of a failed unit of work.
pub struct Fault {
    message: String,
    kind: FaultKind,
    io_kind: Option<io::ErrorKind>,
    stack: String,
}

impl Fault {
    /// Fault with a plain message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: FaultKind::Error,
            io_kind: None,
            stack: Backtrace::force_capture().to_string(),
        }
    }

    /// Fault from a panic payload. Must be called on the thread that
    /// panicked, right after the unwind was caught.
    ///
    /// The stack is the one the panic hook recorded at the panic site, when
    /// [`install_panic_hook`] has run. Payloads raised with
    /// `std::panic::panic_any` keep their transport error kind when they
    /// are an `io::Error` or a `Fault`.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let site_stack = take_panic_stack();
        let payload = match payload.downcast::<Fault>() {
            Ok(fault) => {
                return Self {
                    kind: FaultKind::Panic,
                    ..*fault
                }
            }
            Err(payload) => payload,
        };

        let (message, io_kind) = if let Some(err) = payload.downcast_ref::<io::Error>() {
            (err.to_string(), Some(err.kind()))
        } else if let Some(s) = payload.downcast_ref::<&'static str>() {
            ((*s).to_string(), None)
        } else if let Some(s) = payload.downcast_ref::<String>() {
            (s.clone(), None)
        } else {
            ("unknown panic payload".to_string(), None)
        };

        Self {
            message,
            kind: FaultKind::Panic,
            io_kind,
            stack: site_stack.unwrap_or_else(|| Backtrace::force_capture().to_string()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> FaultKind {
        self.kind
    }

    pub fn stack(&self) -> &str {
        &self.stack
    }

    /// Transport error kind of the underlying cause, if it was I/O.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        self.io_kind
    }

    /// True when the client connection is gone and nothing can be written.
    pub fn is_broken_pipe(&self) -> bool {
        if matches!(
            self.io_kind,
            Some(io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset)
        ) {
            return true;
        }
        // Errors wrapped by other libraries often only keep the OS message.
        let message = self.message.to_lowercase();
        self.io_kind.is_some()
            && (message.contains("broken pipe") || message.contains("connection reset by peer"))
    }
}

impl<E> From<E> for Fault
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        let io_kind = io_kind_of(&err);
        Self {
            message: err.to_string(),
            kind: FaultKind::Error,
            io_kind,
            stack: Backtrace::force_capture().to_string(),
        }
    }
}

/// First `io::Error` kind found walking the source chain.
fn io_kind_of(err: &(dyn std::error::Error + 'static)) -> Option<io::ErrorKind> {
    let mut current = Some(err);
    while let Some(err) = current {
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            return Some(io_err.kind());
        }
        current = err.source();
    }
    None
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl fmt::Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fault")
            .field("message", &self.message)
            .field("kind", &self.kind)
            .field("io_kind", &self.io_kind)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("write failed")]
    struct WriteFailed(#[source] io::Error);

    #[test]
    fn test_from_error_keeps_io_kind() {
        let fault = Fault::from(WriteFailed(io::Error::from(io::ErrorKind::BrokenPipe)));
        assert_eq!(fault.kind(), FaultKind::Error);
        assert_eq!(fault.io_kind(), Some(io::ErrorKind::BrokenPipe));
        assert!(fault.is_broken_pipe());
        assert_eq!(fault.message(), "write failed");
    }

    #[test]
    fn test_from_panic_payloads() {
        let fault = Fault::from_panic(Box::new("boom"));
        assert_eq!(fault.message(), "boom");
        assert_eq!(fault.kind(), FaultKind::Panic);
        assert!(!fault.stack().is_empty());

        let fault = Fault::from_panic(Box::new(String::from("owned boom")));
        assert_eq!(fault.message(), "owned boom");

        let fault = Fault::from_panic(Box::new(42_u8));
        assert_eq!(fault.message(), "unknown panic payload");
    }

    #[inline(never)]
    fn explode_deep_in_handler() -> u32 {
        panic!("deep failure")
    }

    #[test]
    fn test_panic_stack_taken_at_panic_site() {
        install_panic_hook();
        let payload = panic::catch_unwind(|| explode_deep_in_handler()).unwrap_err();
        let fault = Fault::from_panic(payload);
        assert_eq!(fault.message(), "deep failure");
        assert!(
            fault.stack().contains("explode_deep_in_handler"),
            "{}",
            fault.stack()
        );
    }

    #[test]
    fn test_connection_reset_panic_is_broken_pipe() {
        let reset = io::Error::new(io::ErrorKind::ConnectionReset, "connection reset by peer");
        let fault = Fault::from_panic(Box::new(reset));
        assert!(fault.is_broken_pipe());
    }

    #[test]
    fn test_plain_message_is_not_broken_pipe() {
        assert!(!Fault::new("broken pipe in the kitchen").is_broken_pipe());
    }
}
