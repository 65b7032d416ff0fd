//! Controller registration on route groups.

use std::any::type_name;
use std::str::FromStr;

use axum::http::Method;
use thiserror::Error;
use tracing::{debug, info};

use crate::controller::naming::{action_segment, controller_path};
use crate::controller::Controller;
use crate::http::chain::{handler, Handler};
use crate::http::fault::Fault;
use crate::routing::matcher::validate_prefix;
use crate::routing::{ControllerRoutes, RouteError, RouteGroup};

/// Errors raised while registering a controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("{0} is not a controller: the type name must end in 'Controller' and embed a base controller")]
    NotAController(&'static str),

    #[error("controller path prefix must begin with '/': {0}")]
    InvalidPrefix(String),

    #[error("unknown HTTP method '{0}'")]
    UnknownMethod(String),

    #[error(transparent)]
    Route(#[from] RouteError),
}

/// How a controller's actions are registered.
#[derive(Debug, Clone, Default)]
pub struct ControllerOptions {
    /// Method names, case-insensitive. Empty means GET and POST.
    pub methods: Vec<String>,
    /// Prepended to every action path.
    pub path_prefix: Option<String>,
}

impl ControllerOptions {
    pub fn methods<I, S>(methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            methods: methods.into_iter().map(Into::into).collect(),
            path_prefix: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = Some(prefix.into());
        self
    }

    fn resolve_methods(&self) -> Result<Vec<Method>, ControllerError> {
        if self.methods.is_empty() {
            return Ok(vec![Method::GET, Method::POST]);
        }
        self.methods.iter().map(|name| parse_method(name)).collect()
    }
}

const ROUTABLE_METHODS: [Method; 7] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::HEAD,
    Method::DELETE,
    Method::OPTIONS,
];

fn parse_method(name: &str) -> Result<Method, ControllerError> {
    let unknown = || ControllerError::UnknownMethod(name.to_string());
    let method = Method::from_str(&name.to_ascii_uppercase()).map_err(|_| unknown())?;
    if ROUTABLE_METHODS.contains(&method) {
        Ok(method)
    } else {
        Err(unknown())
    }
}

impl RouteGroup {
    /// Register every action of `C` on this group.
    ///
    /// Each request to an action builds a fresh `C`, initialises its base
    /// with the application handle, runs `C::init`, then the action.
    pub fn register_controller<C: Controller>(
        &mut self,
        options: ControllerOptions,
    ) -> Result<(), ControllerError> {
        let type_name = type_name::<C>();
        let mut sample = C::default();
        if sample.base().is_none() {
            return Err(ControllerError::NotAController(type_name));
        }
        let path = controller_path(type_name).ok_or(ControllerError::NotAController(type_name))?;

        let prefix = options.path_prefix.clone().unwrap_or_default();
        validate_prefix(&prefix).map_err(|_| ControllerError::InvalidPrefix(prefix.clone()))?;
        let methods = options.resolve_methods()?;

        let base_path = format!("{}{}", prefix.trim_end_matches('/'), path.base_path());
        let mut pending = Vec::new();

        for action in C::actions() {
            let Some(segment) = action_segment(action.name()) else {
                debug!(controller = %type_name, action = %action.name(), "Skipping non-action method");
                continue;
            };
            let route_path = format!("{}/{}", base_path, segment);
            let action_handler: Handler = handler(move |ctx| {
                let mut controller = C::default();
                let base = controller
                    .base()
                    .ok_or_else(|| Fault::new(format!("{} lost its base controller", type_name)))?;
                base.init(ctx.app().clone());
                controller.init();
                action.call(&mut controller, ctx)
            });

            for method in &methods {
                pending.push((method.clone(), route_path.clone(), vec![action_handler.clone()]));
            }
        }

        let registered: Vec<(Method, String)> = pending
            .iter()
            .map(|(method, route_path, _)| (method.clone(), format!("{}{}", self.prefix(), route_path)))
            .collect();
        self.handle_all(pending)?;

        info!(
            controller = %type_name,
            base_path = %base_path,
            routes = registered.len(),
            "Controller registered"
        );
        self.record_controller(ControllerRoutes {
            controller: type_name,
            base_path,
            routes: registered,
        });
        Ok(())
    }
}
