//! Author-supplied service definitions, before normalization.

use std::fmt;
use std::sync::Arc;

use axum::http::Method;
use restkit_core::AuthRules;
use serde::Deserialize;

use super::pipeline::Stage;

/// The six CRUD operations every resource exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Find,
    FindOne,
    Update,
    Replace,
    Remove,
}

impl Operation {
    pub const ALL: [Operation; 6] = [
        Operation::Create,
        Operation::Find,
        Operation::FindOne,
        Operation::Update,
        Operation::Replace,
        Operation::Remove,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Find => "find",
            Self::FindOne => "find_one",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Remove => "remove",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An optional replacement for a default.
#[derive(Clone)]
pub enum Override<T> {
    /// Use the base template's value.
    Inherit,
    Replace(T),
    /// Turn the operation off; requests for it answer NotFound.
    Disable,
}

impl<T> Default for Override<T> {
    fn default() -> Self {
        Self::Inherit
    }
}

impl<T> fmt::Debug for Override<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Inherit => "Inherit",
            Self::Replace(_) => "Replace(..)",
            Self::Disable => "Disable",
        })
    }
}

/// A named custom operation on an existing entity.
#[derive(Clone)]
pub struct TransitionDef {
    pub method: Method,
    pub name: String,
    pub handler: Arc<dyn Stage>,
}

impl fmt::Debug for TransitionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionDef")
            .field("method", &self.method)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A partial service definition as written by a resource author.
///
/// Every field is optional. The resolver fills the gaps from the base
/// template and produces an immutable [`ServiceDescriptor`].
///
/// [`ServiceDescriptor`]: super::descriptor::ServiceDescriptor
#[derive(Clone, Default, Debug)]
pub struct RawServiceDefinition {
    pub auth: Option<AuthRules>,
    pub transitions: Option<Vec<TransitionDef>>,
    pub workflow: Option<String>,
    /// Opts out of the built-in `bumpup` transition.
    pub skip_bumpup: bool,
    pub create: Override<Arc<dyn Stage>>,
    pub find: Override<Arc<dyn Stage>>,
    pub find_one: Override<Arc<dyn Stage>>,
    pub update: Override<Arc<dyn Stage>>,
    pub replace: Override<Arc<dyn Stage>>,
    pub remove: Override<Arc<dyn Stage>>,
}

impl RawServiceDefinition {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn auth(mut self, rules: AuthRules) -> Self {
        self.auth = Some(rules);
        self
    }

    #[must_use]
    pub fn workflow(mut self, name: impl Into<String>) -> Self {
        self.workflow = Some(name.into());
        self
    }

    #[must_use]
    pub fn skip_bumpup(mut self) -> Self {
        self.skip_bumpup = true;
        self
    }

    /// Declares a custom transition.
    #[must_use]
    pub fn transition<S: Stage + 'static>(self, method: Method, name: &str, handler: S) -> Self {
        self.transition_shared(method, name, Arc::new(handler))
    }

    #[must_use]
    pub fn transition_shared(
        mut self,
        method: Method,
        name: &str,
        handler: Arc<dyn Stage>,
    ) -> Self {
        self.transitions.get_or_insert_with(Vec::new).push(TransitionDef {
            method,
            name: name.to_string(),
            handler,
        });
        self
    }

    /// Replaces the default handler for `op`.
    #[must_use]
    pub fn handler<S: Stage + 'static>(self, op: Operation, handler: S) -> Self {
        self.with_slot(op, Override::Replace(Arc::new(handler)))
    }

    /// Disables `op` for this resource.
    #[must_use]
    pub fn disable(self, op: Operation) -> Self {
        self.with_slot(op, Override::Disable)
    }

    #[must_use]
    pub fn with_slot(mut self, op: Operation, value: Override<Arc<dyn Stage>>) -> Self {
        *self.slot_mut(op) = value;
        self
    }

    #[must_use]
    pub fn slot(&self, op: Operation) -> &Override<Arc<dyn Stage>> {
        match op {
            Operation::Create => &self.create,
            Operation::Find => &self.find,
            Operation::FindOne => &self.find_one,
            Operation::Update => &self.update,
            Operation::Replace => &self.replace,
            Operation::Remove => &self.remove,
        }
    }

    fn slot_mut(&mut self, op: Operation) -> &mut Override<Arc<dyn Stage>> {
        match op {
            Operation::Create => &mut self.create,
            Operation::Find => &mut self.find,
            Operation::FindOne => &mut self.find_one,
            Operation::Update => &mut self.update,
            Operation::Replace => &mut self.replace,
            Operation::Remove => &mut self.remove,
        }
    }
}
