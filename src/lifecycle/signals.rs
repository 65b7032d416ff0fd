//! OS signal handling.
//!
//! # Responsibilities
//! - Register handlers for SIGINT, SIGTERM and SIGUSR2
//! - Translate signals to [`LifecycleEvent`]s
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - The first signal picks stop or restart; a process does that once
//! - Any later SIGINT/SIGTERM escalates to [`LifecycleEvent::Force`], so an
//!   operator can still interrupt a drain that hangs
//! - Non-unix platforms only see Ctrl+C, mapped to a stop

use std::io;

use tokio::sync::mpsc;
use tracing::{info, warn};

/// What the serving loop should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Drain in-flight requests and exit.
    Stop,
    /// Hand the listener to a successor, then drain and exit.
    Restart,
    /// Give up draining and exit now.
    Force,
}

/// Signals the process reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(not(unix), allow(dead_code))]
enum Received {
    Interrupt,
    Terminate,
    User2,
}

/// Install signal handlers and forward lifecycle events.
///
/// The first signal becomes `Stop` or `Restart`. After that, SIGINT and
/// SIGTERM become `Force` and SIGUSR2 is ignored.
pub fn listen() -> io::Result<mpsc::Receiver<LifecycleEvent>> {
    let (tx, rx) = mpsc::channel(2);
    let mut source = SignalSource::new()?;
    tokio::spawn(async move {
        let mut started = false;
        while let Some(received) = source.next().await {
            let event = match (started, received) {
                (false, Received::User2) => LifecycleEvent::Restart,
                (false, _) => LifecycleEvent::Stop,
                (true, Received::User2) => {
                    info!("Restart already in progress, signal ignored");
                    continue;
                }
                (true, _) => LifecycleEvent::Force,
            };
            started = true;

            if event == LifecycleEvent::Force {
                warn!(signal = ?received, "Repeated signal, abandoning shutdown");
            } else {
                info!(signal = ?received, event = ?event, "Signal received");
            }
            if tx.send(event).await.is_err() || event == LifecycleEvent::Force {
                break;
            }
        }
    });
    Ok(rx)
}

#[cfg(unix)]
struct SignalSource {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    user2: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl SignalSource {
    fn new() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            user2: signal(SignalKind::user_defined2())?,
        })
    }

    async fn next(&mut self) -> Option<Received> {
        tokio::select! {
            Some(()) = self.interrupt.recv() => Some(Received::Interrupt),
            Some(()) = self.terminate.recv() => Some(Received::Terminate),
            Some(()) = self.user2.recv() => Some(Received::User2),
            else => None,
        }
    }
}

#[cfg(not(unix))]
struct SignalSource;

#[cfg(not(unix))]
impl SignalSource {
    fn new() -> io::Result<Self> {
        Ok(Self)
    }

    async fn next(&mut self) -> Option<Received> {
        match tokio::signal::ctrl_c().await {
            Ok(()) => Some(Received::Interrupt),
            Err(e) => {
                tracing::error!(error = %e, "Failed to wait for Ctrl+C");
                None
            }
        }
    }
}
