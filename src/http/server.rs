//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the axum Router whose fallback is the dispatcher
//! - Wire up middleware (tracing, timeout, body limit, request ID)
//! - Count in-flight requests for graceful shutdown
//!
//! # Design Decisions
//! - No axum routes: every request goes to the dispatcher, which owns
//!   matching
//! - Request IDs are generated before the trace span opens so every log
//!   line of a request carries one
//! - The in-flight guard sits outside the timeout and rides in the request
//!   extensions, so a chain still running on a blocking thread after its
//!   response timed out keeps counting

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::{HeaderValue, Request},
    middleware::{self, Next},
    response::Response,
    Router,
};
use tower_http::{
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::http::dispatcher::Dispatcher;
use crate::http::X_REQUEST_ID;
use crate::net::{InFlightGuard, InFlightTracker};

/// Generates UUID v4 request IDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// HTTP front end of an application.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(dispatcher: Arc<Dispatcher>, config: &AppConfig, tracker: InFlightTracker) -> Self {
        Self {
            router: Self::build_router(dispatcher, config, tracker),
        }
    }

    /// Build the axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(
        dispatcher: Arc<Dispatcher>,
        config: &AppConfig,
        tracker: InFlightTracker,
    ) -> Router {
        let x_request_id = axum::http::HeaderName::from_static(X_REQUEST_ID);
        Router::new()
            .fallback(dispatch)
            .with_state(dispatcher)
            .layer(DefaultBodyLimit::max(config.uploads.max_body_size))
            .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(middleware::from_fn_with_state(tracker, track_in_flight))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get(X_REQUEST_ID)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id = %request_id,
                )
            }))
            .layer(SetRequestIdLayer::new(x_request_id, UuidRequestId))
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn into_router(self) -> Router {
        self.router
    }
}

async fn dispatch(State(dispatcher): State<Arc<Dispatcher>>, request: Request<Body>) -> Response {
    dispatcher.dispatch(request).await
}

async fn track_in_flight(
    State(tracker): State<InFlightTracker>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let guard: Arc<InFlightGuard> = Arc::new(tracker.track());
    request.extensions_mut().insert(guard.clone());
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::AppContext;
    use crate::http::chain::handler;
    use crate::http::handlers::not_found;
    use crate::http::request::BodyLimits;
    use crate::routing::RouteGroup;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    fn server() -> HttpServer {
        server_with(AppConfig::default(), InFlightTracker::new())
    }

    fn server_with(config: AppConfig, tracker: InFlightTracker) -> HttpServer {
        let mut group = RouteGroup::new("app");
        group
            .get(
                "/id",
                vec![handler(|ctx| {
                    let id = ctx.request_id().unwrap_or_default().to_string();
                    ctx.string(StatusCode::OK, &id);
                    Ok(())
                })],
            )
            .unwrap();
        group
            .get(
                "/stall",
                vec![handler(|ctx| {
                    std::thread::sleep(Duration::from_millis(600));
                    ctx.string(StatusCode::OK, "late");
                    Ok(())
                })],
            )
            .unwrap();
        let dispatcher = Dispatcher::new(
            Arc::new(AppContext::default()),
            vec![group],
            not_found(),
            BodyLimits::default(),
            None,
        );
        HttpServer::new(Arc::new(dispatcher), &config, tracker)
    }

    #[tokio::test]
    async fn test_request_id_generated_and_propagated() {
        let response = server()
            .into_router()
            .oneshot(Request::builder().uri("/id").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let header = response.headers()[X_REQUEST_ID].to_str().unwrap().to_string();
        assert!(Uuid::parse_str(&header).is_ok());

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, header.as_bytes());
    }

    #[tokio::test]
    async fn test_incoming_request_id_kept() {
        let response = server()
            .into_router()
            .oneshot(
                Request::builder()
                    .uri("/id")
                    .header(X_REQUEST_ID, "abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()[X_REQUEST_ID], "abc-123");
    }

    #[tokio::test]
    async fn test_unmatched_falls_through_to_dispatcher() {
        let response = server()
            .into_router()
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_timed_out_chain_still_counted() {
        let mut config = AppConfig::default();
        config.timeouts.request_secs = 0;
        let tracker = InFlightTracker::new();
        let response = server_with(config, tracker.clone())
            .into_router()
            .oneshot(Request::builder().uri("/stall").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(tracker.active_count(), 1);

        tokio::time::timeout(Duration::from_secs(2), tracker.wait_idle())
            .await
            .unwrap();
        assert_eq!(tracker.active_count(), 0);
    }
}
