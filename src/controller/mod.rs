//! Convention-based controller routing.
//!
//! # Data Flow
//! ```text
//! Registration (at startup):
//!     C: Controller
//!     → naming.rs (type name → namespace + controller segment)
//!     → C::actions() (name + fn pointer per action)
//!     → registry.rs (one route per action and method)
//!
//! Per request:
//!     C::default() → base.init(app) → C::init() → action(&mut C, ctx)
//! ```
//!
//! # Design Decisions
//! - Controllers list their actions explicitly with [`actions!`]
//! - Base capabilities are a closed set; the trait is sealed
//! - A fresh instance per request, never shared or reused

pub mod naming;
pub mod registry;

use std::fmt;
use std::sync::Arc;

use crate::app::AppContext;
use crate::http::context::Context;
use crate::http::fault::HandlerResult;

pub use registry::{ControllerError, ControllerOptions};

/// Which base capability a controller embeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerKind {
    Api,
    Admin,
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::ApiController {}
    impl Sealed for super::AdminController {}
}

/// Capability every controller embeds. Implemented only by
/// [`ApiController`] and [`AdminController`].
pub trait BaseController: sealed::Sealed + Send {
    /// Attach the application handle. Runs before the controller's own
    /// `init`.
    fn init(&mut self, app: Arc<AppContext>);

    /// Application handle, `None` before `init`.
    fn app(&self) -> Option<&Arc<AppContext>>;

    fn kind(&self) -> ControllerKind;
}

/// Base for public API controllers.
#[derive(Debug, Default)]
pub struct ApiController {
    app: Option<Arc<AppContext>>,
}

impl BaseController for ApiController {
    fn init(&mut self, app: Arc<AppContext>) {
        self.app = Some(app);
    }

    fn app(&self) -> Option<&Arc<AppContext>> {
        self.app.as_ref()
    }

    fn kind(&self) -> ControllerKind {
        ControllerKind::Api
    }
}

/// Base for back-office controllers.
#[derive(Debug, Default)]
pub struct AdminController {
    app: Option<Arc<AppContext>>,
}

impl BaseController for AdminController {
    fn init(&mut self, app: Arc<AppContext>) {
        self.app = Some(app);
    }

    fn app(&self) -> Option<&Arc<AppContext>> {
        self.app.as_ref()
    }

    fn kind(&self) -> ControllerKind {
        ControllerKind::Admin
    }
}

/// Signature of a controller action.
pub type ActionFn<C> = fn(&mut C, &mut Context) -> HandlerResult;

/// A named controller action.
pub struct Action<C> {
    name: &'static str,
    func: ActionFn<C>,
}

impl<C> Action<C> {
    pub fn new(name: &'static str, func: ActionFn<C>) -> Self {
        Self { name, func }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn call(&self, controller: &mut C, ctx: &mut Context) -> HandlerResult {
        (self.func)(controller, ctx)
    }
}

impl<C> Clone for Action<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for Action<C> {}

impl<C> fmt::Debug for Action<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action").field("name", &self.name).finish()
    }
}

/// A type whose `*_action` methods become routes.
///
/// The type name must end in `Controller`, and [`Controller::base`] must
/// return the embedded base capability.
pub trait Controller: Default + Send + 'static {
    fn base(&mut self) -> Option<&mut dyn BaseController>;

    /// Every action to expose. Usually written with [`actions!`].
    fn actions() -> Vec<Action<Self>>;

    /// Per-request hook, after the base is initialised.
    fn init(&mut self) {}
}

/// Build the action list of a controller.
///
/// ```ignore
/// fn actions() -> Vec<Action<Self>> {
///     actions![ItemController => list_action, show_action]
/// }
/// ```
#[macro_export]
macro_rules! actions {
    ($controller:ty => $($action:ident),* $(,)?) => {
        vec![$($crate::controller::Action::<$controller>::new(
            stringify!($action),
            <$controller>::$action,
        )),*]
    };
}
