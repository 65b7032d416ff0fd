//! Route paths derived from controller and action names.
//!
//! `app::controllers::api::ItemListController::show_all_action` maps to
//! namespace `api`, controller segment `item_list` and action segment
//! `show_all`.

use heck::ToSnakeCase;
use once_cell::sync::Lazy;
use regex::Regex;

pub const CONTROLLER_SUFFIX: &str = "Controller";
pub const ACTION_SUFFIX: &str = "_action";

/// Crate name, then everything up to the first `controller`/`controllers`
/// module when there is one.
static DEPLOY_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\w+::(?:(?:\w+::)*?controllers?::)?").expect("deploy prefix pattern is valid")
});

/// Namespace and controller segment of a controller type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerPath {
    pub namespace: String,
    pub name: String,
}

impl ControllerPath {
    /// `/<namespace>/<name>`, or `/<name>` without a namespace.
    pub fn base_path(&self) -> String {
        if self.namespace.is_empty() {
            format!("/{}", self.name)
        } else {
            format!("/{}/{}", self.namespace, self.name)
        }
    }
}

/// Split a `std::any::type_name` into namespace and controller segment.
/// `None` when the type name does not end in `Controller`.
pub fn controller_path(type_name: &str) -> Option<ControllerPath> {
    let type_name = type_name.split('<').next().unwrap_or(type_name);
    let (module, ident) = match type_name.rsplit_once("::") {
        Some((module, ident)) => (module, ident),
        None => ("", type_name),
    };

    let stem = ident.strip_suffix(CONTROLLER_SUFFIX)?;
    if stem.is_empty() {
        return None;
    }

    let module = format!("{}::", module);
    let namespace = DEPLOY_PREFIX
        .replace(&module, "")
        .trim_end_matches("::")
        .replace("::", "/");

    Some(ControllerPath {
        namespace,
        name: stem.to_snake_case(),
    })
}

/// Route segment of an action, `None` for names without the action suffix.
pub fn action_segment(action: &str) -> Option<String> {
    let stem = action.strip_suffix(ACTION_SUFFIX)?;
    if stem.is_empty() {
        return None;
    }
    Some(stem.to_snake_case())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_path_under_controllers_module() {
        let path = controller_path("shop::controllers::api::ItemListController").unwrap();
        assert_eq!(path.namespace, "api");
        assert_eq!(path.name, "item_list");
        assert_eq!(path.base_path(), "/api/item_list");
    }

    #[test]
    fn test_nested_namespace() {
        let path = controller_path("shop::web::controller::admin::v2::UserController").unwrap();
        assert_eq!(path.base_path(), "/admin/v2/user");
    }

    #[test]
    fn test_crate_root_controller() {
        let path = controller_path("dispatch::FooController").unwrap();
        assert_eq!(path.namespace, "");
        assert_eq!(path.base_path(), "/foo");
    }

    #[test]
    fn test_controllers_module_only() {
        let path = controller_path("shop::controllers::FooController").unwrap();
        assert_eq!(path.base_path(), "/foo");
    }

    #[test]
    fn test_not_a_controller() {
        assert!(controller_path("shop::controllers::FooHandler").is_none());
        assert!(controller_path("shop::controllers::Controller").is_none());
    }

    #[test]
    fn test_action_segment() {
        assert_eq!(action_segment("bar_action").as_deref(), Some("bar"));
        assert_eq!(action_segment("show_all_action").as_deref(), Some("show_all"));
        assert_eq!(action_segment("helper"), None);
        assert_eq!(action_segment("_action"), None);
    }
}
