//! Adapter registry: one backend adapter per family.
//!
//! Dispatch looks adapters up by [`BackendFamily`] instead of branching on
//! family names, so adding a backend means registering one more adapter.
//!
//! ## Usage
//!
//! ```ignore
//! let mut registry = AdapterRegistry::new();
//! registry.register(Arc::new(OllamaAdapter::new("http://localhost:11434")));
//!
//! let adapter = registry.get(BackendFamily::Ollama);
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{BackendAdapter, BackendFamily};
use crate::config::Endpoints;

/// Registry of available backend adapters.
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    adapters: BTreeMap<BackendFamily, Arc<dyn BackendAdapter>>,
}

impl AdapterRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter.
    ///
    /// If an adapter for the same family already exists, it will be replaced.
    pub fn register(&mut self, adapter: Arc<dyn BackendAdapter>) {
        self.adapters.insert(adapter.family(), adapter);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, adapter: Arc<dyn BackendAdapter>) -> Self {
        self.register(adapter);
        self
    }

    /// Get the adapter for a family.
    pub fn get(&self, family: BackendFamily) -> Option<&Arc<dyn BackendAdapter>> {
        self.adapters.get(&family)
    }

    /// Check if a family has an adapter.
    pub fn has_adapter(&self, family: BackendFamily) -> bool {
        self.adapters.contains_key(&family)
    }

    /// List registered families.
    pub fn families(&self) -> Vec<BackendFamily> {
        self.adapters.keys().copied().collect()
    }

    /// Create a registry with every adapter compiled into this build.
    ///
    /// Families whose cargo feature is off stay unregistered and dispatch
    /// reports them as not implemented.
    #[allow(unused_mut, unused_variables)]
    pub fn with_defaults(endpoints: &Endpoints) -> Self {
        let mut registry = Self::new();

        #[cfg(feature = "local")]
        registry.register(Arc::new(super::OllamaAdapter::new(endpoints.ollama.clone())));

        #[cfg(feature = "openai")]
        {
            registry.register(Arc::new(super::OpenAiCompatibleAdapter::new(
                BackendFamily::OpenAi,
                endpoints.openai.clone(),
            )));
            registry.register(Arc::new(super::OpenAiCompatibleAdapter::new(
                BackendFamily::OpenRouter,
                endpoints.openrouter.clone(),
            )));
            registry.register(Arc::new(super::OpenAiCompatibleAdapter::new(
                BackendFamily::Groq,
                endpoints.groq.clone(),
            )));
        }

        #[cfg(feature = "anthropic")]
        registry.register(Arc::new(super::AnthropicAdapter::new(endpoints.anthropic.clone())));

        registry
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("families", &self.families())
            .finish()
    }
}
