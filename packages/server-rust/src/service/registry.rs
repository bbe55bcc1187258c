use std::sync::Arc;

use async_trait::async_trait;
use restkit_core::Model;
use tracing::warn;

use super::definition::RawServiceDefinition;

// ---------------------------------------------------------------------------
// ServiceFactory
// ---------------------------------------------------------------------------

/// Produces the raw definition for one resource.
///
/// Factories run once, concurrently with every other resource's factory,
/// during bootstrap. A factory may do asynchronous work such as reading a
/// policy document; any error aborts the whole bootstrap.
#[async_trait]
pub trait ServiceFactory: Send + Sync {
    async fn definition(&self) -> anyhow::Result<RawServiceDefinition>;
}

/// A factory that hands out a fixed definition.
#[derive(Debug, Clone, Default)]
pub struct StaticDefinition(pub RawServiceDefinition);

#[async_trait]
impl ServiceFactory for StaticDefinition {
    async fn definition(&self) -> anyhow::Result<RawServiceDefinition> {
        Ok(self.0.clone())
    }
}

// ---------------------------------------------------------------------------
// ResourceRegistry
// ---------------------------------------------------------------------------

/// A registered resource before resolution.
#[derive(Clone)]
pub struct ResourceEntry {
    pub model: Arc<dyn Model>,
    pub factory: Arc<dyn ServiceFactory>,
}

impl std::fmt::Debug for ResourceEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceEntry")
            .field("model", &self.model.name())
            .finish_non_exhaustive()
    }
}

/// Resource names mapped to their model and definition factory.
///
/// Populated at startup, read once by bootstrap. Iteration follows
/// registration order.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    entries: Vec<(String, ResourceEntry)>,
}

impl ResourceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name`. Registering a name twice replaces the earlier entry.
    pub fn register<F>(&mut self, name: impl Into<String>, model: Arc<dyn Model>, factory: F)
    where
        F: ServiceFactory + 'static,
    {
        self.register_shared(name, model, Arc::new(factory));
    }

    pub fn register_shared(
        &mut self,
        name: impl Into<String>,
        model: Arc<dyn Model>,
        factory: Arc<dyn ServiceFactory>,
    ) {
        let name = name.into();
        let entry = ResourceEntry { model, factory };
        if let Some(slot) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            warn!(resource = %name, "resource registered twice; replacing earlier entry");
            slot.1 = entry;
        } else {
            self.entries.push((name, entry));
        }
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with<F>(mut self, name: impl Into<String>, model: Arc<dyn Model>, factory: F) -> Self
    where
        F: ServiceFactory + 'static,
    {
        self.register(name, model, factory);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ResourceEntry> {
        self.entries
            .iter()
            .find_map(|(n, entry)| (n == name).then_some(entry))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ResourceEntry)> {
        self.entries.iter().map(|(n, entry)| (n.as_str(), entry))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
