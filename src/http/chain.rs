//! Handlers and handler chains.
//!
//! A chain is the frozen list of handlers a route runs: the group's shared
//! middleware followed by the route's own handlers, the last of which is
//! normally the terminal action. Chains are cheap to clone and never change
//! after construction.

use std::fmt;
use std::sync::Arc;

use crate::http::context::Context;
use crate::http::fault::HandlerResult;

/// A request-processing step.
pub type Handler = Arc<dyn Fn(&mut Context) -> HandlerResult + Send + Sync>;

/// Wrap a closure or function as a [`Handler`].
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Immutable, ordered sequence of handlers.
#[derive(Clone, Default)]
pub struct HandlerChain(Arc<[Handler]>);

impl HandlerChain {
    pub fn new(handlers: Vec<Handler>) -> Self {
        Self(handlers.into())
    }

    /// `shared` followed by `own`, as a new chain.
    pub fn combine(shared: &[Handler], own: &[Handler]) -> Self {
        let mut merged = Vec::with_capacity(shared.len() + own.len());
        merged.extend_from_slice(shared);
        merged.extend_from_slice(own);
        Self::new(merged)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Handler> {
        self.0.get(index)
    }

    /// True when both chains hold the same handlers in the same order.
    pub fn same_handlers(&self, other: &HandlerChain) -> bool {
        self.len() == other.len()
            && self.0.iter().zip(other.0.iter()).all(|(a, b)| Arc::ptr_eq(a, b))
    }
}

impl From<Vec<Handler>> for HandlerChain {
    fn from(handlers: Vec<Handler>) -> Self {
        Self::new(handlers)
    }
}

impl fmt::Debug for HandlerChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerChain").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_keeps_order() {
        let m = handler(|_| Ok(()));
        let h = handler(|_| Ok(()));
        let chain = HandlerChain::combine(&[m.clone()], &[h.clone()]);
        assert_eq!(chain.len(), 2);
        assert!(Arc::ptr_eq(chain.get(0).unwrap(), &m));
        assert!(Arc::ptr_eq(chain.get(1).unwrap(), &h));
        assert!(chain.same_handlers(&HandlerChain::new(vec![m, h])));
    }
}
