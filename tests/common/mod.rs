//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use switchyard::lifecycle::{Grace, Handoff, LifecycleError, LifecycleEvent, ProcessHandoff};
use switchyard::net::InFlightTracker;
use switchyard::{Application, HttpServer};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A running application on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub events: mpsc::Sender<LifecycleEvent>,
    pub handle: JoinHandle<Result<(), LifecycleError>>,
    #[allow(dead_code)]
    pub tracker: InFlightTracker,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Serve `app` on 127.0.0.1 with a stop timeout of `timeout`.
pub async fn spawn_app(app: Application, timeout: Duration) -> TestServer {
    spawn_app_with_handoff(app, timeout, Arc::new(ProcessHandoff)).await
}

/// Serve `app` with a custom restart mechanism.
pub async fn spawn_app_with_handoff(
    app: Application,
    timeout: Duration,
    handoff: Arc<dyn Handoff>,
) -> TestServer {
    let config = app.config().clone();
    let dispatcher = app.into_dispatcher().unwrap();
    let tracker = InFlightTracker::new();
    let server = HttpServer::new(Arc::new(dispatcher), &config, tracker.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (events, rx) = mpsc::channel(1);
    let grace = Grace::new(timeout, handoff).with_tracker(tracker.clone());
    let handle = tokio::spawn(grace.run(listener, server.into_router(), rx));

    TestServer {
        addr,
        events,
        handle,
        tracker,
    }
}

/// Client without connection pooling, so shutdown never waits on idle
/// keep-alive connections.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
