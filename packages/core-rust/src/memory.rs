//! In-memory [`Model`] implementation backed by [`DashMap`].
//!
//! Suitable for development, tests and small deployments where all data fits
//! in memory. Unique-field checks and the subsequent write happen under one
//! write lock so two concurrent creates cannot both claim the same value.

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

use crate::model::{now_millis, Model, ModelError, WriteKind};
use crate::types::{Entity, Page, PageRequest, SortDirection, ID_FIELD};

#[derive(Debug, Clone)]
struct Stored {
    /// Insertion sequence, used as the default sort key.
    seq: u64,
    entity: Entity,
}

/// Entity store for one resource held entirely in memory.
#[derive(Debug)]
pub struct MemoryModel {
    name: String,
    unique: Vec<String>,
    required: Vec<String>,
    entries: DashMap<String, Stored>,
    seq: AtomicU64,
    write_lock: Mutex<()>,
}

impl MemoryModel {
    /// Creates an empty store for the resource `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unique: Vec::new(),
            required: Vec::new(),
            entries: DashMap::new(),
            seq: AtomicU64::new(0),
            write_lock: Mutex::new(()),
        }
    }

    /// Declares fields whose non-null values must be unique across entities.
    #[must_use]
    pub fn with_unique<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Declares fields that must be present and non-null on every write.
    #[must_use]
    pub fn with_required<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Number of stored entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn not_found(&self, id: &str) -> ModelError {
        ModelError::NotFound {
            model: self.name.clone(),
            id: id.to_string(),
        }
    }

    /// Finds the first unique field whose value in `data` is already held by
    /// an entity other than `except`.
    fn conflicting_field(&self, data: &Entity, except: Option<&str>) -> Option<String> {
        self.unique.iter().find_map(|field| {
            let value = data.get(field).filter(|v| !v.is_null())?;
            let taken = self.entries.iter().any(|entry| {
                Some(entry.key().as_str()) != except && entry.value().entity.get(field) == Some(value)
            });
            taken.then(|| field.clone())
        })
    }

    fn insert(&self, mut data: Entity) -> Result<Entity, ModelError> {
        let _guard = self.write_lock.lock();
        if let Some(field) = self.conflicting_field(&data, None) {
            return Err(ModelError::DuplicateKey { field });
        }
        let id = Uuid::new_v4().simple().to_string();
        object_mut(&mut data)?.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(
            id,
            Stored {
                seq,
                entity: data.clone(),
            },
        );
        Ok(data)
    }

    fn overwrite(&self, id: &str, mut data: Entity) -> Result<Entity, ModelError> {
        let _guard = self.write_lock.lock();
        let seq = self
            .entries
            .get(id)
            .map(|stored| stored.seq)
            .ok_or_else(|| self.not_found(id))?;
        if let Some(field) = self.conflicting_field(&data, Some(id)) {
            return Err(ModelError::DuplicateKey { field });
        }
        object_mut(&mut data)?.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
        self.entries.insert(
            id.to_string(),
            Stored {
                seq,
                entity: data.clone(),
            },
        );
        Ok(data)
    }
}

fn object_mut(data: &mut Entity) -> Result<&mut serde_json::Map<String, Value>, ModelError> {
    data.as_object_mut()
        .ok_or_else(|| ModelError::Validation("payload must be a JSON object".to_string()))
}

/// Orders JSON values of the same kind; mixed kinds and nulls sort last.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> CmpOrdering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(CmpOrdering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(v), _) if !v.is_null() => CmpOrdering::Less,
        (_, Some(v)) if !v.is_null() => CmpOrdering::Greater,
        _ => CmpOrdering::Equal,
    }
}

#[async_trait]
impl Model for MemoryModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, _kind: WriteKind, data: &Entity) -> Result<Entity, ModelError> {
        let Some(map) = data.as_object() else {
            return Err(ModelError::Validation("payload must be a JSON object".to_string()));
        };
        if let Some(missing) = self
            .required
            .iter()
            .find(|field| map.get(field.as_str()).map_or(true, Value::is_null))
        {
            return Err(ModelError::Validation(format!("`{missing}` is required")));
        }
        let mut prepared = map.clone();
        prepared.remove(ID_FIELD);
        Ok(Value::Object(prepared))
    }

    async fn create(&self, data: Entity) -> Result<Entity, ModelError> {
        self.insert(data)
    }

    async fn find(&self, page: &PageRequest) -> Result<Page, ModelError> {
        let mut all: Vec<Stored> = self.entries.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| {
            let ord = match &page.sort {
                Some(field) => compare_values(a.entity.get(field), b.entity.get(field))
                    .then(a.seq.cmp(&b.seq)),
                None => a.seq.cmp(&b.seq),
            };
            match page.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        });

        let total = all.len();
        let items: Vec<Entity> = all
            .into_iter()
            .skip(page.start)
            .take(page.count)
            .map(|s| s.entity)
            .collect();
        let next = (page.start.saturating_add(page.count) < total).then(|| page.next());

        Ok(Page { items, next })
    }

    async fn find_one(&self, id: &str) -> Result<Entity, ModelError> {
        self.entries
            .get(id)
            .map(|stored| stored.entity.clone())
            .ok_or_else(|| self.not_found(id))
    }

    async fn replace(&self, id: &str, data: Entity) -> Result<Entity, ModelError> {
        self.overwrite(id, data)
    }

    async fn remove(&self, id: &str) -> Result<(), ModelError> {
        let _guard = self.write_lock.lock();
        self.entries
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| self.not_found(id))
    }

    async fn touch(&self, id: &str, field: &str) -> Result<Entity, ModelError> {
        let _guard = self.write_lock.lock();
        let mut stored = self.entries.get_mut(id).ok_or_else(|| self.not_found(id))?;
        object_mut(&mut stored.entity)?.insert(field.to_string(), Value::from(now_millis()));
        Ok(stored.entity.clone())
    }
}
