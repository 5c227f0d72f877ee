//! Step handler registry (C6) — maps a step's `type` to its handler.

use std::collections::HashMap;
use std::sync::Arc;

use crate::ai::AiHandler;
use crate::delay::DelayHandler;
use crate::http::HttpHandler;
use crate::traits::StepHandler;
use crate::transform::TransformHandler;

#[derive(Clone, Default)]
pub struct Registry {
    handlers: HashMap<String, Arc<dyn StepHandler>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, step_type: impl Into<String>, handler: Arc<dyn StepHandler>) {
        self.handlers.insert(step_type.into(), handler);
    }

    pub fn get(&self, step_type: &str) -> Option<Arc<dyn StepHandler>> {
        self.handlers.get(step_type).cloned()
    }
}

/// Build a registry with the four canonical handlers (spec.md §4.3).
pub fn default_registry(ai_endpoint: impl Into<String>) -> Registry {
    let mut registry = Registry::new();
    registry.register("http", Arc::new(HttpHandler::new()));
    registry.register("transform", Arc::new(TransformHandler::new()));
    registry.register("ai", Arc::new(AiHandler::new(ai_endpoint)));
    registry.register("delay", Arc::new(DelayHandler::new()));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_all_four_builtin_handlers() {
        let registry = default_registry("http://localhost:1234");
        assert!(registry.get("http").is_some());
        assert!(registry.get("transform").is_some());
        assert!(registry.get("ai").is_some());
        assert!(registry.get("delay").is_some());
        assert!(registry.get("unknown").is_none());
    }
}
