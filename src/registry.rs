//! Event handler registry.
//!
//! Maps an event name to the ordered list of handlers that react to it.
//! Pure data: dispatch and error isolation live in the engine.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::engine::TodoEngine;
use crate::error::Result;

/// A reaction rule for one event kind.
///
/// The only side effect a handler should have is calling
/// [`TodoEngine::create_todo`] zero or more times.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, engine: &TodoEngine, data: &serde_json::Value) -> Result<()>;
}

/// Registry of handlers, indexed by event name.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Vec<Arc<dyn EventHandler>>>,
}

impl HandlerRegistry {
    /// Create an empty registry with no handlers.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Append a handler for `event`. Registering the same handler twice
    /// makes it run twice.
    pub fn register(&mut self, event: impl Into<String>, handler: Arc<dyn EventHandler>) {
        self.handlers.entry(event.into()).or_default().push(handler);
    }

    /// Handlers for `event` in registration order. Empty if none.
    pub fn handlers_for(&self, event: &str) -> &[Arc<dyn EventHandler>] {
        self.handlers.get(event).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Names of all events with at least one handler.
    pub fn events(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Total number of registered handlers across all events.
    pub fn len(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
