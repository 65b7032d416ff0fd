//! Graceful stop and restart of a serving process.
//!
//! # States
//! ```text
//! Binding → Serving → Stopping ──────────────→ Terminated
//!                   → HandingOff → Stopping ─→ Terminated
//! ```
//!
//! # Design Decisions
//! - The accept loop runs independently of signal handling
//! - A restart spawns the successor before the old process stops
//!   accepting, so the socket never goes unserved
//! - Any bind, duplication or spawn error ends `run` with that error; no
//!   retry
//! - Requests still running when the timeout expires are abandoned
//! - A `Force` event, before or during the drain, abandons them at once

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::lifecycle::handoff::{Handoff, HandoffError, InheritableListener};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::LifecycleEvent;
use crate::net::{InFlightTracker, ListenerError};
use crate::routing::RouteError;

/// Phase of the serving process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Binding,
    Serving,
    Stopping,
    HandingOff,
    Terminated,
}

/// Errors that end the serving process.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Bind(#[from] ListenerError),

    #[error(transparent)]
    Handoff(#[from] HandoffError),

    #[error(transparent)]
    Routes(#[from] RouteError),

    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] std::io::Error),

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error("graceful shutdown timed out after {timeout:?} with {abandoned} request(s) in flight")]
    ShutdownTimeout { timeout: Duration, abandoned: u64 },

    #[error("shutdown forced with {abandoned} request(s) in flight")]
    Forced { abandoned: u64 },
}

/// Drives one serving process from bound listener to exit.
pub struct Grace {
    timeout: Duration,
    handoff: Arc<dyn Handoff>,
    tracker: InFlightTracker,
    state: watch::Sender<LifecycleState>,
}

impl Grace {
    pub fn new(timeout: Duration, handoff: Arc<dyn Handoff>) -> Self {
        let (state, _) = watch::channel(LifecycleState::Binding);
        Self {
            timeout,
            handoff,
            tracker: InFlightTracker::new(),
            state,
        }
    }

    /// Use `tracker` to report abandoned requests on timeout.
    pub fn with_tracker(mut self, tracker: InFlightTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn subscribe_state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    fn enter(&self, state: LifecycleState) {
        info!(state = ?state, "Lifecycle transition");
        self.state.send_replace(state);
    }

    /// Serve `router` on `listener` until a lifecycle event ends it.
    pub async fn run(
        self,
        listener: TcpListener,
        router: Router,
        mut events: mpsc::Receiver<LifecycleEvent>,
    ) -> Result<(), LifecycleError> {
        let result = self.serve(listener, router, &mut events).await;
        self.enter(LifecycleState::Terminated);
        result
    }

    async fn serve(
        &self,
        listener: TcpListener,
        router: Router,
        events: &mut mpsc::Receiver<LifecycleEvent>,
    ) -> Result<(), LifecycleError> {
        let inheritable = InheritableListener::from_listener(&listener)?;
        let address = listener.local_addr().map_err(LifecycleError::Serve)?;
        let shutdown = Shutdown::new();

        let server = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.signalled())
            .into_future();
        tokio::pin!(server);

        self.enter(LifecycleState::Serving);
        info!(address = %address, "Serving");

        let event = tokio::select! {
            result = &mut server => return result.map_err(LifecycleError::Serve),
            Some(event) = events.recv() => event,
        };

        if event == LifecycleEvent::Force {
            return Err(self.forced());
        }
        if event == LifecycleEvent::Restart {
            self.enter(LifecycleState::HandingOff);
            let pid = self.handoff.spawn_successor(&inheritable)?;
            info!(successor_pid = pid, "Listener handed off");
        }
        drop(inheritable);

        self.enter(LifecycleState::Stopping);
        info!(
            in_flight = self.tracker.active_count(),
            timeout_secs = self.timeout.as_secs_f64(),
            "Draining in-flight requests"
        );
        shutdown.trigger();

        let drain = tokio::time::timeout(self.timeout, &mut server);
        tokio::pin!(drain);
        let mut listening = true;
        loop {
            tokio::select! {
                outcome = &mut drain => return self.drained(outcome),
                event = events.recv(), if listening => match event {
                    Some(LifecycleEvent::Force) => return Err(self.forced()),
                    Some(event) => info!(event = ?event, "Already stopping, event ignored"),
                    None => listening = false,
                },
            }
        }
    }

    fn drained(
        &self,
        outcome: Result<std::io::Result<()>, tokio::time::error::Elapsed>,
    ) -> Result<(), LifecycleError> {
        match outcome {
            Ok(result) => {
                info!("Graceful shutdown complete");
                result.map_err(LifecycleError::Serve)
            }
            Err(_) => {
                let abandoned = self.tracker.active_count();
                warn!(abandoned = abandoned, "Graceful shutdown timed out");
                Err(LifecycleError::ShutdownTimeout {
                    timeout: self.timeout,
                    abandoned,
                })
            }
        }
    }

    fn forced(&self) -> LifecycleError {
        let abandoned = self.tracker.active_count();
        warn!(abandoned = abandoned, "Shutdown forced");
        LifecycleError::Forced { abandoned }
    }
}
