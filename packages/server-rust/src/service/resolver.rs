//! Normalization of raw definitions and the one-time bootstrap.
//!
//! [`resolve`] turns one [`RawServiceDefinition`] into a complete
//! [`ServiceDescriptor`] by field-by-field selection between the author's
//! value and the [`BaseTemplate`]. [`bootstrap`] does this for every
//! registered resource concurrently and yields a [`ServiceSet`] only when all
//! of them succeed. Routes are built from a `ServiceSet`, so no route is
//! reachable before bootstrap has completed.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::Method;
use futures_util::future::try_join_all;
use restkit_core::Model;
use tracing::{debug, info, info_span, Instrument};

use super::base::BaseTemplate;
use super::definition::{Operation, Override, RawServiceDefinition};
use super::descriptor::{HandlerSlot, Handlers, ServiceDescriptor, Transitions, BUMPUP};
use super::pipeline::Stage;
use super::registry::ResourceRegistry;

/// Errors raised while normalizing a single definition.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("resource `{resource}` declares transition `{name}` for {method} more than once")]
    DuplicateTransition {
        resource: String,
        method: Method,
        name: String,
    },
}

/// Errors that abort bootstrap.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("service factory for `{resource}` failed: {source}")]
    Factory {
        resource: String,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

fn select(op: Operation, value: Override<Arc<dyn Stage>>, base: &BaseTemplate) -> HandlerSlot {
    match value {
        Override::Inherit => HandlerSlot::Default(Arc::clone(base.handler(op))),
        Override::Replace(handler) => HandlerSlot::Custom(handler),
        Override::Disable => HandlerSlot::Disabled,
    }
}

/// Normalizes `raw` into the descriptor for resource `name`.
///
/// Policy fields take the author's value when present and non-empty, and the
/// base template's otherwise. Each handler slot is resolved independently. Unless
/// the definition opts out, the built-in `bumpup` transition is then inserted
/// under `POST`, replacing any author handler of the same name.
///
/// # Errors
///
/// Returns [`ResolveError::DuplicateTransition`] when the definition declares
/// the same `(method, name)` pair twice.
pub fn resolve(
    name: &str,
    raw: RawServiceDefinition,
    base: &BaseTemplate,
) -> Result<ServiceDescriptor, ResolveError> {
    let RawServiceDefinition {
        auth,
        transitions: declared,
        workflow,
        skip_bumpup,
        create,
        find,
        find_one,
        update,
        replace,
        remove,
    } = raw;

    let mut transitions = Transitions::default();
    for def in declared.unwrap_or_default() {
        if transitions
            .insert(def.method.clone(), &def.name, def.handler)
            .is_some()
        {
            return Err(ResolveError::DuplicateTransition {
                resource: name.to_string(),
                method: def.method,
                name: def.name,
            });
        }
    }
    if !skip_bumpup {
        transitions.insert(Method::POST, BUMPUP, Arc::clone(base.bumpup()));
    }

    Ok(ServiceDescriptor {
        name: name.to_string(),
        auth: auth
            .filter(|rules| !rules.is_empty())
            .unwrap_or_else(|| base.auth().clone()),
        transitions,
        workflow: workflow
            .filter(|w| !w.trim().is_empty())
            .unwrap_or_else(|| base.workflow().to_string()),
        skip_bumpup,
        handlers: Handlers {
            create: select(Operation::Create, create, base),
            find: select(Operation::Find, find, base),
            find_one: select(Operation::FindOne, find_one, base),
            update: select(Operation::Update, update, base),
            replace: select(Operation::Replace, replace, base),
            remove: select(Operation::Remove, remove, base),
        },
    })
}

/// A resolved resource: its persistence handle and descriptor.
#[derive(Clone)]
pub struct ResolvedService {
    pub model: Arc<dyn Model>,
    pub descriptor: Arc<ServiceDescriptor>,
}

impl std::fmt::Debug for ResolvedService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedService")
            .field("model", &self.model.name())
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

/// Key of the process-wide transition registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransitionKey {
    pub method: Method,
    pub resource: String,
    pub name: String,
}

/// The installed, immutable set of resolved resources.
#[derive(Debug, Default)]
pub struct ServiceSet {
    services: HashMap<String, ResolvedService>,
    transitions: HashMap<TransitionKey, Arc<dyn Stage>>,
}

impl ServiceSet {
    fn install(resolved: Vec<(String, ResolvedService)>) -> Self {
        let mut transitions = HashMap::new();
        for (resource, service) in &resolved {
            for (method, name, handler) in service.descriptor.transitions().iter() {
                transitions.insert(
                    TransitionKey {
                        method: method.clone(),
                        resource: resource.clone(),
                        name: name.to_string(),
                    },
                    Arc::clone(handler),
                );
            }
        }
        Self {
            services: resolved.into_iter().collect(),
            transitions,
        }
    }

    #[must_use]
    pub fn get(&self, resource: &str) -> Option<&ResolvedService> {
        self.services.get(resource)
    }

    #[must_use]
    pub fn descriptor(&self, resource: &str) -> Option<&Arc<ServiceDescriptor>> {
        self.get(resource).map(|s| &s.descriptor)
    }

    /// Looks up the transition `name` registered for `method` on `resource`.
    #[must_use]
    pub fn transition(&self, method: &Method, resource: &str, name: &str) -> Option<&Arc<dyn Stage>> {
        self.transitions.get(&TransitionKey {
            method: method.clone(),
            resource: resource.to_string(),
            name: name.to_string(),
        })
    }

    /// Resource names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.services.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// Resolves every registered resource concurrently.
///
/// Fails with the first error observed; in that case no descriptor is
/// installed and the caller has nothing to build routes from.
///
/// # Errors
///
/// Returns [`BootstrapError::Factory`] when a factory fails and
/// [`BootstrapError::Resolve`] when a definition cannot be normalized.
pub async fn bootstrap(
    registry: &ResourceRegistry,
    base: &BaseTemplate,
) -> Result<ServiceSet, BootstrapError> {
    let pending = registry.iter().map(|(name, entry)| {
        async move {
            let raw = entry
                .factory
                .definition()
                .await
                .map_err(|source| BootstrapError::Factory {
                    resource: name.to_string(),
                    source,
                })?;
            let descriptor = resolve(name, raw, base)?;
            debug!(summary = ?descriptor.summary(), "resolved service");
            Ok::<_, BootstrapError>((
                name.to_string(),
                ResolvedService {
                    model: Arc::clone(&entry.model),
                    descriptor: Arc::new(descriptor),
                },
            ))
        }
        .instrument(info_span!("resolve", resource = %name))
    });

    let resolved = try_join_all(pending).await?;
    let set = ServiceSet::install(resolved);
    info!(resources = set.len(), "services installed");
    Ok(set)
}
