//! Listener handoff to a successor process.
//!
//! # Responsibilities
//! - Keep a duplicate of the listening descriptor while serving
//! - Spawn the same executable with the same arguments and the restart
//!   marker, the listener on descriptor 3
//!
//! # Design Decisions
//! - The platform mechanism sits behind the [`Handoff`] trait
//! - Non-unix platforms reject restarts with [`HandoffError::Unsupported`]
//! - The successor is never waited on; it outlives this process

use std::io;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::net::listener::{GRACE_ENV_KEY, INHERITED_FD};

/// Errors raised while handing the listener off.
#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("failed to duplicate listener descriptor: {0}")]
    Duplicate(#[source] io::Error),

    #[error("failed to locate current executable: {0}")]
    Executable(#[source] io::Error),

    #[error("failed to spawn successor process: {0}")]
    Spawn(#[source] io::Error),

    #[error("graceful restart is not supported on this platform")]
    Unsupported,
}

/// A listening socket that can be passed to a child process.
#[derive(Debug)]
pub struct InheritableListener {
    #[cfg(unix)]
    fd: std::os::fd::OwnedFd,
}

impl InheritableListener {
    /// Duplicate the descriptor of `listener`.
    #[cfg(unix)]
    pub fn from_listener(listener: &TcpListener) -> Result<Self, HandoffError> {
        use std::os::fd::AsFd;

        let fd = listener
            .as_fd()
            .try_clone_to_owned()
            .map_err(HandoffError::Duplicate)?;
        Ok(Self { fd })
    }

    #[cfg(not(unix))]
    pub fn from_listener(_listener: &TcpListener) -> Result<Self, HandoffError> {
        Ok(Self {})
    }

    /// A fresh duplicate for a single spawn.
    #[cfg(unix)]
    pub fn duplicate(&self) -> Result<std::os::fd::OwnedFd, HandoffError> {
        self.fd.try_clone().map_err(HandoffError::Duplicate)
    }
}

/// Starts a successor process that takes over the listener.
pub trait Handoff: Send + Sync {
    /// Spawn the successor. Returns its process id.
    fn spawn_successor(&self, listener: &InheritableListener) -> Result<u32, HandoffError>;
}

/// Re-executes the current binary with the current arguments.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessHandoff;

#[cfg(unix)]
impl Handoff for ProcessHandoff {
    fn spawn_successor(&self, listener: &InheritableListener) -> Result<u32, HandoffError> {
        use std::os::fd::AsRawFd;
        use std::os::unix::process::CommandExt;
        use std::process::Command;

        let fd = listener.duplicate()?;
        let raw = fd.as_raw_fd();
        let exe = std::env::current_exe().map_err(HandoffError::Executable)?;

        let mut command = Command::new(&exe);
        command
            .args(std::env::args_os().skip(1))
            .env(GRACE_ENV_KEY, "true");
        // SAFETY: the closure runs between fork and exec and only calls
        // async-signal-safe dup2/fcntl.
        unsafe {
            command.pre_exec(move || place_inherited(raw));
        }

        let child = command.spawn().map_err(HandoffError::Spawn)?;
        tracing::info!(
            pid = child.id(),
            executable = %exe.display(),
            "Successor process spawned"
        );
        Ok(child.id())
    }
}

#[cfg(not(unix))]
impl Handoff for ProcessHandoff {
    fn spawn_successor(&self, _listener: &InheritableListener) -> Result<u32, HandoffError> {
        Err(HandoffError::Unsupported)
    }
}

/// Put `raw` on [`INHERITED_FD`] with close-on-exec cleared.
#[cfg(unix)]
fn place_inherited(raw: std::os::fd::RawFd) -> io::Result<()> {
    use nix::fcntl::{fcntl, FcntlArg, FdFlag};
    use nix::unistd::dup2;

    if raw == INHERITED_FD {
        let flags = FdFlag::from_bits_truncate(fcntl(raw, FcntlArg::F_GETFD)?);
        fcntl(raw, FcntlArg::F_SETFD(flags - FdFlag::FD_CLOEXEC))?;
    } else {
        // dup2 leaves close-on-exec cleared on the new descriptor.
        dup2(raw, INHERITED_FD)?;
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::fd::AsRawFd;

    #[tokio::test]
    async fn test_duplicate_is_a_distinct_descriptor() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let inheritable = InheritableListener::from_listener(&listener).unwrap();
        let dup = inheritable.duplicate().unwrap();

        use std::os::fd::AsFd;
        assert_ne!(dup.as_raw_fd(), listener.as_fd().as_raw_fd());
        assert_ne!(dup.as_raw_fd(), inheritable.fd.as_raw_fd());

        let addr = listener.local_addr().unwrap();
        let std_listener = std::net::TcpListener::from(dup);
        assert_eq!(std_listener.local_addr().unwrap(), addr);
    }
}
