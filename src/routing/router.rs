//! Route groups.
//!
//! # Responsibilities
//! - Store routes keyed by method, then normalized path
//! - Snapshot shared middleware into each route's chain at registration
//! - Look up the chain for a (method, path) pair
//!
//! # Design Decisions
//! - Write-once at startup, read-many without locking
//! - Registration errors are returned, never swallowed
//! - Middleware added after a route does not reach that route

use std::collections::HashMap;
use std::fmt;

use axum::http::Method;
use thiserror::Error;
use tracing::debug;

use crate::http::chain::{Handler, HandlerChain};
use crate::routing::matcher::{normalize_path, validate_prefix};

/// Name of the primary group every application owns.
pub const DEFAULT_GROUP_NAME: &str = "app";

/// Errors raised while building a route table.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("route path must not be empty")]
    EmptyPath,

    #[error("route path must begin with '/': {0}")]
    MissingLeadingSlash(String),

    #[error("invalid route path: {0}")]
    InvalidPath(String),

    #[error("no handlers supplied for {method} {path}")]
    NoHandlers { method: Method, path: String },

    #[error("multiple registrations for {method} {path} in group '{group}'")]
    Duplicate {
        group: String,
        method: Method,
        path: String,
    },

    #[error("no middleware supplied to group '{0}'")]
    EmptyMiddleware(String),

    #[error("path prefix for group '{0}' must be set before any route is added")]
    PrefixAfterRoutes(String),

    #[error("path prefix must begin with '/': {0}")]
    InvalidPrefix(String),
}

/// A registered route.
#[derive(Debug, Clone)]
pub struct Route {
    method: Method,
    path: String,
    chain: HandlerChain,
}

impl Route {
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Full path, group prefix included.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn chain(&self) -> &HandlerChain {
        &self.chain
    }
}

/// Routes a controller contributed to a group.
#[derive(Debug, Clone)]
pub struct ControllerRoutes {
    pub controller: &'static str,
    pub base_path: String,
    pub routes: Vec<(Method, String)>,
}

/// A named set of routes sharing a prefix and leading middleware.
pub struct RouteGroup {
    name: String,
    prefix: String,
    shared: Vec<Handler>,
    routes: HashMap<Method, HashMap<String, Route>>,
    controllers: Vec<ControllerRoutes>,
}

impl RouteGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: String::new(),
            shared: Vec::new(),
            routes: HashMap::new(),
            controllers: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path prefix, empty when none.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Prefix every route registered from now on with `prefix`.
    pub fn enable_path_prefix(&mut self, prefix: &str) -> Result<(), RouteError> {
        if !self.is_empty() {
            return Err(RouteError::PrefixAfterRoutes(self.name.clone()));
        }
        validate_prefix(prefix)?;
        self.prefix = prefix.trim_end_matches('/').to_string();
        Ok(())
    }

    /// Use `/<app name>` as the group prefix.
    pub fn enable_app_name_prefix(&mut self, app_name: &str) -> Result<(), RouteError> {
        self.enable_path_prefix(&format!("/{}", app_name))
    }

    /// Append shared middleware for routes registered after this call.
    pub fn add_middleware(&mut self, handlers: Vec<Handler>) -> Result<(), RouteError> {
        if handlers.is_empty() {
            return Err(RouteError::EmptyMiddleware(self.name.clone()));
        }
        self.shared.extend(handlers);
        Ok(())
    }

    pub fn shared_handlers(&self) -> &[Handler] {
        &self.shared
    }

    /// Register `handlers` for `method` at `path`.
    pub fn handle(
        &mut self,
        method: Method,
        path: &str,
        handlers: Vec<Handler>,
    ) -> Result<(), RouteError> {
        let route = self.prepare(method, path, handlers)?;
        self.insert(route);
        Ok(())
    }

    /// Register every route, or none of them when any one is rejected.
    pub fn handle_all<I>(&mut self, routes: I) -> Result<(), RouteError>
    where
        I: IntoIterator<Item = (Method, String, Vec<Handler>)>,
    {
        let mut staged: Vec<Route> = Vec::new();
        for (method, path, handlers) in routes {
            let route = self.prepare(method, &path, handlers)?;
            if staged
                .iter()
                .any(|r| r.method == route.method && r.path == route.path)
            {
                return Err(RouteError::Duplicate {
                    group: self.name.clone(),
                    method: route.method,
                    path: route.path,
                });
            }
            staged.push(route);
        }
        for route in staged {
            self.insert(route);
        }
        Ok(())
    }

    /// Validate a registration against the current table without storing it.
    fn prepare(&self, method: Method, path: &str, handlers: Vec<Handler>) -> Result<Route, RouteError> {
        let normalized = normalize_path(path)?;
        if handlers.is_empty() {
            return Err(RouteError::NoHandlers {
                method,
                path: normalized,
            });
        }

        let full_path = format!("{}{}", self.prefix, normalized);
        if self.match_route(&method, &full_path).is_some() {
            return Err(RouteError::Duplicate {
                group: self.name.clone(),
                method,
                path: full_path,
            });
        }

        Ok(Route {
            method,
            path: full_path,
            chain: HandlerChain::combine(&self.shared, &handlers),
        })
    }

    fn insert(&mut self, route: Route) {
        debug!(group = %self.name, method = %route.method, path = %route.path, "Route registered");
        self.routes
            .entry(route.method.clone())
            .or_default()
            .insert(route.path.clone(), route);
    }

    pub fn get(&mut self, path: &str, handlers: Vec<Handler>) -> Result<(), RouteError> {
        self.handle(Method::GET, path, handlers)
    }

    pub fn post(&mut self, path: &str, handlers: Vec<Handler>) -> Result<(), RouteError> {
        self.handle(Method::POST, path, handlers)
    }

    pub fn put(&mut self, path: &str, handlers: Vec<Handler>) -> Result<(), RouteError> {
        self.handle(Method::PUT, path, handlers)
    }

    pub fn patch(&mut self, path: &str, handlers: Vec<Handler>) -> Result<(), RouteError> {
        self.handle(Method::PATCH, path, handlers)
    }

    pub fn head(&mut self, path: &str, handlers: Vec<Handler>) -> Result<(), RouteError> {
        self.handle(Method::HEAD, path, handlers)
    }

    pub fn delete(&mut self, path: &str, handlers: Vec<Handler>) -> Result<(), RouteError> {
        self.handle(Method::DELETE, path, handlers)
    }

    pub fn options(&mut self, path: &str, handlers: Vec<Handler>) -> Result<(), RouteError> {
        self.handle(Method::OPTIONS, path, handlers)
    }

    /// Chain registered for `method` at exactly `path`.
    pub fn match_route(&self, method: &Method, path: &str) -> Option<&HandlerChain> {
        self.routes
            .get(method)?
            .get(path)
            .map(|route| &route.chain)
    }

    /// Every registered route, in no particular order.
    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.values().flat_map(|by_path| by_path.values())
    }

    pub fn len(&self) -> usize {
        self.routes.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn record_controller(&mut self, entry: ControllerRoutes) {
        self.controllers.push(entry);
    }

    /// Controllers registered on this group, in registration order.
    pub fn controllers(&self) -> &[ControllerRoutes] {
        &self.controllers
    }
}

impl fmt::Debug for RouteGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteGroup")
            .field("name", &self.name)
            .field("prefix", &self.prefix)
            .field("shared", &self.shared.len())
            .field("routes", &self.len())
            .finish()
    }
}
