//! Listening socket acquisition.
//!
//! # Responsibilities
//! - Bind the configured address on a cold start
//! - Adopt the socket a predecessor passed as descriptor 3 on a restart
//!
//! # Design Decisions
//! - Restart detection only checks that the marker variable is present
//! - An inherited socket is already bound and listening; it is only
//!   switched to non-blocking mode before tokio takes it over

use std::io;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::ListenerConfig;

/// Environment marker set on a successor process.
pub const GRACE_ENV_KEY: &str = "SWITCHYARD_GRACE";

/// Descriptor number the listening socket is passed on.
pub const INHERITED_FD: i32 = 3;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("invalid listen address '{addr}': {source}")]
    InvalidAddress {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to inherit listener from descriptor {fd}: {source}")]
    Inherit {
        fd: i32,
        #[source]
        source: io::Error,
    },

    #[error("inheriting a listener is not supported on this platform")]
    Unsupported,
}

/// How the listener was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerOrigin {
    Bound,
    Inherited,
}

/// True when this process was spawned by a restarting predecessor.
pub fn is_inherited() -> bool {
    std::env::var_os(GRACE_ENV_KEY).is_some()
}

/// Inherit the predecessor's socket if the marker is set, else bind fresh.
pub async fn bind_or_inherit(
    config: &ListenerConfig,
) -> Result<(TcpListener, ListenerOrigin), ListenerError> {
    if is_inherited() {
        let listener = inherit()?;
        tracing::info!(
            address = ?listener.local_addr().ok(),
            fd = INHERITED_FD,
            "Listener inherited"
        );
        return Ok((listener, ListenerOrigin::Inherited));
    }
    Ok((bind(config).await?, ListenerOrigin::Bound))
}

/// Bind the configured address.
pub async fn bind(config: &ListenerConfig) -> Result<TcpListener, ListenerError> {
    let addr = config
        .socket_addr()
        .map_err(|source| ListenerError::InvalidAddress {
            addr: config.listen.clone(),
            source,
        })?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ListenerError::Bind { addr, source })?;

    tracing::info!(
        address = ?listener.local_addr().ok(),
        "Listener bound"
    );
    Ok(listener)
}

/// Adopt the listening socket on [`INHERITED_FD`].
#[cfg(unix)]
pub fn inherit() -> Result<TcpListener, ListenerError> {
    use std::os::fd::FromRawFd;

    let wrap = |source| ListenerError::Inherit {
        fd: INHERITED_FD,
        source,
    };
    // SAFETY: a restarting predecessor places its listening socket on
    // INHERITED_FD before exec, and nothing else in this process owns it.
    let std_listener = unsafe { std::net::TcpListener::from_raw_fd(INHERITED_FD) };
    std_listener.set_nonblocking(true).map_err(wrap)?;
    TcpListener::from_std(std_listener).map_err(wrap)
}

#[cfg(not(unix))]
pub fn inherit() -> Result<TcpListener, ListenerError> {
    Err(ListenerError::Unsupported)
}
