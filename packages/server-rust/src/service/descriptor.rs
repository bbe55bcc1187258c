//! Normalized, immutable service descriptors.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use axum::http::Method;
use restkit_core::AuthRules;

use super::definition::Operation;
use super::pipeline::Stage;

/// Name of the built-in transition injected into every resource.
pub const BUMPUP: &str = "bumpup";

/// The resolved handler for one CRUD operation.
#[derive(Clone)]
pub enum HandlerSlot {
    /// The base template's handler.
    Default(Arc<dyn Stage>),
    /// The resource author's handler.
    Custom(Arc<dyn Stage>),
    /// Operation turned off by the author.
    Disabled,
}

impl HandlerSlot {
    /// The handler to run, or `None` when disabled.
    #[must_use]
    pub fn handler(&self) -> Option<&Arc<dyn Stage>> {
        match self {
            Self::Default(h) | Self::Custom(h) => Some(h),
            Self::Disabled => None,
        }
    }

    #[must_use]
    pub fn kind(&self) -> SlotKind {
        match self {
            Self::Default(_) => SlotKind::Default,
            Self::Custom(_) => SlotKind::Custom,
            Self::Disabled => SlotKind::Disabled,
        }
    }
}

impl fmt::Debug for HandlerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind())
    }
}

/// Which source a [`HandlerSlot`] was filled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Default,
    Custom,
    Disabled,
}

/// The six CRUD handler slots of a descriptor.
#[derive(Clone, Debug)]
pub struct Handlers {
    pub(crate) create: HandlerSlot,
    pub(crate) find: HandlerSlot,
    pub(crate) find_one: HandlerSlot,
    pub(crate) update: HandlerSlot,
    pub(crate) replace: HandlerSlot,
    pub(crate) remove: HandlerSlot,
}

impl Handlers {
    #[must_use]
    pub fn get(&self, op: Operation) -> &HandlerSlot {
        match op {
            Operation::Create => &self.create,
            Operation::Find => &self.find,
            Operation::FindOne => &self.find_one,
            Operation::Update => &self.update,
            Operation::Replace => &self.replace,
            Operation::Remove => &self.remove,
        }
    }
}

/// Transition handlers of one resource, keyed by HTTP method then name.
#[derive(Clone, Default)]
pub struct Transitions {
    by_method: HashMap<Method, HashMap<String, Arc<dyn Stage>>>,
}

impl Transitions {
    /// Inserts a handler, returning the one it replaced.
    pub(crate) fn insert(
        &mut self,
        method: Method,
        name: &str,
        handler: Arc<dyn Stage>,
    ) -> Option<Arc<dyn Stage>> {
        self.by_method
            .entry(method)
            .or_default()
            .insert(name.to_string(), handler)
    }

    #[must_use]
    pub fn get(&self, method: &Method, name: &str) -> Option<&Arc<dyn Stage>> {
        self.by_method.get(method).and_then(|named| named.get(name))
    }

    #[must_use]
    pub fn contains(&self, method: &Method, name: &str) -> bool {
        self.get(method, name).is_some()
    }

    /// Transition names registered under `method`, sorted.
    #[must_use]
    pub fn names(&self, method: &Method) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .by_method
            .get(method)
            .map(|named| named.keys().map(String::as_str).collect())
            .unwrap_or_default();
        names.sort_unstable();
        names
    }

    /// All `(method, name, handler)` entries.
    pub fn iter(&self) -> impl Iterator<Item = (&Method, &str, &Arc<dyn Stage>)> {
        self.by_method.iter().flat_map(|(method, named)| {
            named
                .iter()
                .map(move |(name, handler)| (method, name.as_str(), handler))
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_method.values().map(HashMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Transitions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self
            .iter()
            .map(|(method, name, _)| format!("{method} {name}"))
            .collect();
        f.debug_list().entries(keys).finish()
    }
}

/// Fully normalized policy and handler bundle for one resource.
///
/// Built once by the resolver and shared read-only by every request.
#[derive(Clone, Debug)]
pub struct ServiceDescriptor {
    pub(crate) name: String,
    pub(crate) auth: AuthRules,
    pub(crate) transitions: Transitions,
    pub(crate) workflow: String,
    pub(crate) skip_bumpup: bool,
    pub(crate) handlers: Handlers,
}

impl ServiceDescriptor {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn auth(&self) -> &AuthRules {
        &self.auth
    }

    #[must_use]
    pub fn transitions(&self) -> &Transitions {
        &self.transitions
    }

    #[must_use]
    pub fn workflow(&self) -> &str {
        &self.workflow
    }

    #[must_use]
    pub fn skips_bumpup(&self) -> bool {
        self.skip_bumpup
    }

    #[must_use]
    pub fn handlers(&self) -> &Handlers {
        &self.handlers
    }

    #[must_use]
    pub fn slot(&self, op: Operation) -> &HandlerSlot {
        self.handlers.get(op)
    }

    /// Comparable shape of this descriptor, without the handlers themselves.
    #[must_use]
    pub fn summary(&self) -> DescriptorSummary {
        let auth = [
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
        ]
        .into_iter()
        .map(|m| {
            let patterns: Vec<String> = self.auth.patterns(&m).map(str::to_string).collect();
            (m.to_string(), patterns)
        })
        .filter(|(_, patterns)| !patterns.is_empty())
        .collect();

        let mut transitions: Vec<String> = self
            .transitions
            .iter()
            .map(|(method, name, _)| format!("{method} {name}"))
            .collect();
        transitions.sort();

        DescriptorSummary {
            name: self.name.clone(),
            auth,
            transitions,
            workflow: self.workflow.clone(),
            skip_bumpup: self.skip_bumpup,
            slots: Operation::ALL
                .into_iter()
                .map(|op| (op, self.slot(op).kind()))
                .collect(),
        }
    }
}

/// Handler-free view of a [`ServiceDescriptor`], used for logging and comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorSummary {
    pub name: String,
    pub auth: BTreeMap<String, Vec<String>>,
    pub transitions: Vec<String>,
    pub workflow: String,
    pub skip_bumpup: bool,
    pub slots: Vec<(Operation, SlotKind)>,
}
