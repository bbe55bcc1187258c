//! Persistence contract bound to each registered resource.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use crate::types::{Entity, Page, PageRequest};

/// Kind of write a payload is validated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Create,
    Replace,
}

/// Errors reported by a persistence model.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("{model} `{id}` not found")]
    NotFound { model: String, id: String },
    /// A unique field already holds the submitted value.
    #[error("duplicate value for unique field `{field}`")]
    DuplicateKey { field: String },
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl ModelError {
    #[must_use]
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. })
    }
}

/// Persistence handle for one resource type.
///
/// Implementations own storage, identifier assignment and uniqueness.
/// Wrapped in `Arc<dyn Model>` and shared by every request for the resource.
#[async_trait]
pub trait Model: Send + Sync {
    /// Resource name this model persists.
    fn name(&self) -> &str;

    /// Checks and prepares a client payload before it is written.
    ///
    /// The default accepts any JSON object unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Validation`] when the payload is unacceptable.
    fn validate(&self, _kind: WriteKind, data: &Entity) -> Result<Entity, ModelError> {
        if data.is_object() {
            Ok(data.clone())
        } else {
            Err(ModelError::Validation("payload must be a JSON object".to_string()))
        }
    }

    /// Persists a new entity and returns it with its assigned identifier.
    async fn create(&self, data: Entity) -> Result<Entity, ModelError>;

    /// Lists entities for the given page.
    async fn find(&self, page: &PageRequest) -> Result<Page, ModelError>;

    /// Loads one entity by identifier.
    async fn find_one(&self, id: &str) -> Result<Entity, ModelError>;

    /// Replaces the stored entity and returns the new state.
    async fn replace(&self, id: &str, data: Entity) -> Result<Entity, ModelError>;

    /// Deletes one entity.
    async fn remove(&self, id: &str) -> Result<(), ModelError>;

    /// Stamps `field` with the current time in epoch milliseconds.
    async fn touch(&self, id: &str, field: &str) -> Result<Entity, ModelError> {
        let mut entity = self.find_one(id).await?;
        if let Some(map) = entity.as_object_mut() {
            map.insert(field.to_string(), serde_json::Value::from(now_millis()));
        }
        self.replace(id, entity).await
    }
}

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}
