//! Application assembly.
//!
//! # Responsibilities
//! - Own the route groups while routes are registered
//! - Freeze configuration and collaborators into an [`AppContext`]
//! - Build the dispatcher and HTTP server, then run the lifecycle
//!
//! # Design Decisions
//! - Everything is set up through the builder before `start`; nothing is
//!   mutable while serving
//! - The health group is added last, so application routes win

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;

use crate::config::loader::deploy_root;
use crate::config::AppConfig;
use crate::http::chain::{handler, Handler};
use crate::http::dispatcher::{Dispatcher, StaticFiles};
use crate::http::handlers;
use crate::http::render::TemplateRenderer;
use crate::http::request::BodyLimits;
use crate::http::server::HttpServer;
use crate::lifecycle::{signals, Grace, LifecycleError, ProcessHandoff};
use crate::net::{bind_or_inherit, InFlightTracker, ListenerOrigin};
use crate::routing::{RouteError, RouteGroup, DEFAULT_GROUP_NAME};

/// Name of the built-in health group.
pub const HEALTH_GROUP_NAME: &str = "health_profiling_for_app";

/// Immutable application state shared with every request.
pub struct AppContext {
    config: AppConfig,
    internal_error: Handler,
    renderer: Option<Arc<dyn TemplateRenderer>>,
}

impl AppContext {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            internal_error: handlers::internal_server_error(),
            renderer: None,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.app.name
    }

    pub fn version(&self) -> &str {
        &self.config.app.version
    }

    /// Handler recovery invokes after storing a fault in the context.
    pub fn internal_error_handler(&self) -> &Handler {
        &self.internal_error
    }

    pub fn renderer(&self) -> Option<&Arc<dyn TemplateRenderer>> {
        self.renderer.as_ref()
    }
}

impl Default for AppContext {
    fn default() -> Self {
        Self::new(AppConfig::default())
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("name", &self.config.app.name)
            .field("environment", &self.config.app.environment)
            .field("renderer", &self.renderer.is_some())
            .finish()
    }
}

/// Builder for a serving application.
pub struct Application {
    config: AppConfig,
    primary: RouteGroup,
    groups: Vec<RouteGroup>,
    not_found: Handler,
    internal_error: Handler,
    renderer: Option<Arc<dyn TemplateRenderer>>,
    limits: BodyLimits,
    restart_timeout: Duration,
}

impl Application {
    pub fn new(config: AppConfig) -> Self {
        let limits = BodyLimits::from(&config.uploads);
        let restart_timeout = config.listener.restart_timeout();
        Self {
            config,
            primary: RouteGroup::new(DEFAULT_GROUP_NAME),
            groups: Vec::new(),
            not_found: handlers::not_found(),
            internal_error: handlers::internal_server_error(),
            renderer: None,
            limits,
            restart_timeout,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The primary group, matched before any other.
    pub fn routes(&mut self) -> &mut RouteGroup {
        &mut self.primary
    }

    /// Add a secondary group; groups are tried in the order added.
    pub fn add_group(&mut self, group: RouteGroup) {
        self.groups.push(group);
    }

    /// Prefix the primary group with `/<app name>`.
    pub fn enable_app_name_prefix(&mut self) -> Result<(), RouteError> {
        let name = self.config.app.name.clone();
        self.primary.enable_app_name_prefix(&name)
    }

    pub fn set_not_found(&mut self, handler: Handler) {
        self.not_found = handler;
    }

    pub fn set_internal_error_handler(&mut self, handler: Handler) {
        self.internal_error = handler;
    }

    pub fn set_renderer(&mut self, renderer: Arc<dyn TemplateRenderer>) {
        self.renderer = Some(renderer);
    }

    /// Serve `<root>/public` under `<primary prefix>/public/`.
    pub fn enable_static_files(&mut self) {
        self.config.static_files.enabled = true;
    }

    /// Uploads beyond this many bytes spill to temporary files.
    pub fn set_max_multipart_memory(&mut self, bytes: usize) {
        self.limits.max_multipart_memory = bytes;
    }

    pub fn set_restart_timeout(&mut self, timeout: Duration) {
        self.restart_timeout = timeout;
    }

    pub fn restart_timeout(&self) -> Duration {
        self.restart_timeout
    }

    fn static_files(&self) -> Option<StaticFiles> {
        let settings = &self.config.static_files;
        if !settings.enabled {
            return None;
        }
        let root = match &settings.root {
            Some(root) => PathBuf::from(root),
            None => match deploy_root() {
                Ok(root) => root,
                Err(e) => {
                    tracing::warn!(error = %e, "Cannot resolve deploy root, static files disabled");
                    return None;
                }
            },
        };
        Some(StaticFiles::new(root, &settings.dir, self.primary.prefix()))
    }

    /// Freeze the route table into a dispatcher. Adds the health group.
    pub fn into_dispatcher(self) -> Result<Dispatcher, RouteError> {
        let static_files = self.static_files();

        let mut groups = Vec::with_capacity(self.groups.len() + 2);
        groups.push(self.primary);
        groups.extend(self.groups);
        groups.push(health_group()?);

        let app = Arc::new(AppContext {
            config: self.config,
            internal_error: self.internal_error,
            renderer: self.renderer,
        });
        Ok(Dispatcher::new(
            app,
            groups,
            self.not_found,
            self.limits,
            static_files,
        ))
    }

    /// Bind (or inherit) the listener and serve until stopped or restarted.
    pub async fn start(self) -> Result<(), LifecycleError> {
        let config = self.config.clone();
        let restart_timeout = self.restart_timeout;

        tracing::info!(
            app = %config.app.name,
            version = %config.app.version,
            environment = %config.app.environment,
            listen = %config.listener.listen,
            "Starting application"
        );

        let dispatcher = self.into_dispatcher()?;
        let tracker = InFlightTracker::new();
        let server = HttpServer::new(Arc::new(dispatcher), &config, tracker.clone());

        let (listener, origin) = bind_or_inherit(&config.listener).await?;
        if origin == ListenerOrigin::Inherited {
            tracing::info!("Took over listener from previous process");
        }
        let events = signals::listen().map_err(LifecycleError::Signals)?;

        Grace::new(restart_timeout, Arc::new(ProcessHandoff))
            .with_tracker(tracker)
            .run(listener, server.into_router(), events)
            .await
    }
}

/// `GET /healthz` answering `200`.
pub fn health_group() -> Result<RouteGroup, RouteError> {
    let mut group = RouteGroup::new(HEALTH_GROUP_NAME);
    group.get(
        "/healthz",
        vec![handler(|ctx| {
            ctx.string(StatusCode::OK, "200");
            Ok(())
        })],
    )?;
    Ok(group)
}
