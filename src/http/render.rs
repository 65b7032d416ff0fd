//! Template rendering boundary.
//!
//! The dispatch core does not compile or cache templates itself. An
//! application plugs in a [`TemplateRenderer`] and handlers call
//! `Context::render`.

use thiserror::Error;

/// Error returned by a template renderer.
#[derive(Debug, Error)]
#[error("failed to render {template}: {message}")]
pub struct RenderError {
    pub template: String,
    pub message: String,
}

impl RenderError {
    pub fn new(template: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            message: message.into(),
        }
    }
}

/// Renders a template inside a layout.
///
/// Implementations are shared across request workers and must serialise
/// any cache fill themselves.
pub trait TemplateRenderer: Send + Sync {
    fn render(
        &self,
        layout: &str,
        template: &str,
        data: &serde_json::Value,
    ) -> Result<String, RenderError>;
}
