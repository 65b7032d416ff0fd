//! Per-request entry point.
//!
//! # Data Flow
//! ```text
//! axum fallback (every request)
//!     → request.rs (query, form, multipart parsing)
//!     → primary group, then secondary groups in order
//!     → matched: chain runs on a blocking worker
//!     → no match: static files under `<prefix>/public/`, else not-found
//!     → status observer (log non-200, record metrics)
//! ```
//!
//! # Design Decisions
//! - Chains run on `spawn_blocking` and never yield mid-chain
//! - Parse failures and faults no recovery caught end the request
//!   abnormally: logged, then an empty 500 with `Connection: close`

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Request, StatusCode, Uri};
use axum::response::Response;
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tracing::{error, warn};

use crate::app::AppContext;
use crate::http::chain::{Handler, HandlerChain};
use crate::http::context::Context;
use crate::http::fault::{install_panic_hook, Fault};
use crate::http::request::{parse_request, BodyLimits, ParsedRequest};
use crate::http::response::ResponseWriter;
use crate::observability::metrics;
use crate::routing::matcher::strip_path_prefix;
use crate::routing::RouteGroup;

/// Directory and URL segment static files are served from.
pub const STATIC_DIR: &str = "public";

/// Logs and records the final status of a request.
#[derive(Debug, Clone)]
pub struct StatusObserver {
    method: Method,
    path: String,
    started: Instant,
}

impl StatusObserver {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            started: Instant::now(),
        }
    }

    /// Observe `status` and hand it back unchanged.
    pub fn observe(&self, status: StatusCode) -> StatusCode {
        if status != StatusCode::OK {
            warn!(
                status = status.as_u16(),
                elapsed_ms = self.started.elapsed().as_millis() as u64,
                path = %self.path,
                "Non-OK response"
            );
        }
        metrics::record_request(self.method.as_str(), status.as_u16(), self.started);
        status
    }
}

/// Static file serving rooted at `<root>/public`.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    url_prefix: String,
    dir: PathBuf,
}

impl StaticFiles {
    /// Serve `<root>/<dir>` at `<path_prefix>/<dir>/`.
    pub fn new(root: impl Into<PathBuf>, dir: &str, path_prefix: &str) -> Self {
        Self {
            url_prefix: format!("{}/{}/", path_prefix.trim_end_matches('/'), dir),
            dir: root.into().join(dir),
        }
    }

    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    /// File path below the static directory, when `path` is under the prefix.
    fn relative<'a>(&self, path: &'a str) -> Option<&'a str> {
        strip_path_prefix(path, &self.url_prefix)
    }

    async fn serve(&self, parsed: ParsedRequest, relative: &str) -> Result<Response, Fault> {
        let mut parts = parsed.parts;
        let path_and_query = match parts.uri.query() {
            Some(query) => format!("/{}?{}", relative, query),
            None => format!("/{}", relative),
        };
        parts.uri = Uri::try_from(path_and_query)?;
        let request = Request::from_parts(parts, Body::empty());

        let response = match ServeDir::new(&self.dir).oneshot(request).await {
            Ok(response) => response,
            Err(infallible) => match infallible {},
        };
        Ok(response.map(Body::new))
    }
}

/// Routes requests through the application's groups.
pub struct Dispatcher {
    app: Arc<AppContext>,
    groups: Vec<RouteGroup>,
    not_found: Handler,
    limits: BodyLimits,
    static_files: Option<StaticFiles>,
}

impl Dispatcher {
    /// `groups[0]` is the primary group; the rest are tried in order.
    pub fn new(
        app: Arc<AppContext>,
        groups: Vec<RouteGroup>,
        not_found: Handler,
        limits: BodyLimits,
        static_files: Option<StaticFiles>,
    ) -> Self {
        install_panic_hook();
        Self {
            app,
            groups,
            not_found,
            limits,
            static_files,
        }
    }

    pub fn app(&self) -> &Arc<AppContext> {
        &self.app
    }

    pub fn groups(&self) -> &[RouteGroup] {
        &self.groups
    }

    /// First chain registered for `method` at `path`, primary group first.
    pub fn match_route(&self, method: &Method, path: &str) -> Option<&HandlerChain> {
        self.groups
            .iter()
            .find_map(|group| group.match_route(method, path))
    }

    /// Handle one request end to end.
    pub async fn dispatch(&self, request: Request<Body>) -> Response {
        let observer = StatusObserver::new(request.method().clone(), request.uri().path());
        let request_id = request
            .headers()
            .get(crate::http::X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        match self.route(request, &observer).await {
            Ok(Routed::Observed(response)) => response,
            Ok(Routed::Unobserved(response)) => {
                observer.observe(response.status());
                response
            }
            Err(fault) => {
                error!(
                    request_id = %request_id,
                    method = %observer.method,
                    path = %observer.path,
                    error = %fault,
                    stack = %fault.stack(),
                    "Request terminated abnormally"
                );
                observer.observe(StatusCode::INTERNAL_SERVER_ERROR);
                abnormal_termination()
            }
        }
    }

    async fn route(&self, request: Request<Body>, observer: &StatusObserver) -> Result<Routed, Fault> {
        let parsed = parse_request(request, &self.limits).await?;

        let matched = self
            .match_route(&parsed.parts.method, parsed.parts.uri.path())
            .cloned();
        if let Some(chain) = matched {
            return self.run_chain(parsed, chain, observer).await;
        }

        if let Some(static_files) = &self.static_files {
            let path = parsed.parts.uri.path().to_string();
            if let Some(relative) = static_files.relative(&path) {
                let response = static_files.serve(parsed, relative).await?;
                return Ok(Routed::Unobserved(response));
            }
        }

        let not_found = HandlerChain::new(vec![self.not_found.clone()]);
        self.run_chain(parsed, not_found, observer).await
    }

    async fn run_chain(
        &self,
        parsed: ParsedRequest,
        chain: HandlerChain,
        observer: &StatusObserver,
    ) -> Result<Routed, Fault> {
        let app = self.app.clone();
        let hook_observer = observer.clone();
        let writer = ResponseWriter::new()
            .with_status_hook(Box::new(move |status| hook_observer.observe(status)));

        // Unrecovered panics become faults on the worker thread, where the
        // panic hook left the stack.
        let outcome = tokio::task::spawn_blocking(move || {
            panic::catch_unwind(AssertUnwindSafe(move || {
                let mut ctx = Context::new(app, parsed, writer);
                ctx.set_chain(chain);
                ctx.next()?;
                Ok::<_, Fault>(ctx.into_response())
            }))
            .unwrap_or_else(|payload| Err(Fault::from_panic(payload)))
        })
        .await;

        match outcome {
            Ok(Ok(response)) => Ok(Routed::Observed(response)),
            Ok(Err(fault)) => Err(fault),
            Err(join) if join.is_panic() => Err(Fault::from_panic(join.into_panic())),
            Err(join) => Err(Fault::from(join)),
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("groups", &self.groups)
            .field("static_files", &self.static_files)
            .finish_non_exhaustive()
    }
}

/// Whether the status observer already saw a response.
enum Routed {
    Observed(Response),
    Unobserved(Response),
}

/// Empty 500 that closes the connection.
fn abnormal_termination() -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}
