//! Workflow engine contract and a table-driven state machine.
//!
//! Updates to an existing entity are not raw field writes: they are requests
//! to move the entity through a named workflow. The engine decides whether the
//! requested action is legal from the entity's current state.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::model::{Model, ModelError};
use crate::types::{Entity, ID_FIELD};

/// Name of the workflow used when a resource declares none.
pub const DEFAULT_WORKFLOW: &str = "model";

/// Payload field naming the requested action.
pub const ACTION_FIELD: &str = "action";

/// Errors reported by a workflow engine.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("unknown workflow `{0}`")]
    UnknownWorkflow(String),
    #[error("payload must name an `action`")]
    MissingAction,
    #[error("action `{action}` is not allowed from state `{state}`")]
    IllegalTransition { state: String, action: String },
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Binding of a workflow to the persistence handle it operates on.
#[derive(Clone)]
pub struct WorkflowBinding {
    pub workflow: String,
    pub model: Arc<dyn Model>,
}

impl std::fmt::Debug for WorkflowBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowBinding")
            .field("workflow", &self.workflow)
            .field("model", &self.model.name())
            .finish()
    }
}

/// External state machine governing entity updates.
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    /// Applies `payload` to entity `id` under the bound workflow and returns
    /// the entity's new state.
    async fn transit(
        &self,
        binding: &WorkflowBinding,
        id: &str,
        payload: Entity,
    ) -> Result<Entity, WorkflowError>;
}

/// A single workflow: states joined by named actions.
#[derive(Debug, Clone)]
pub struct StateMachine {
    state_field: String,
    initial: String,
    edges: HashMap<(String, String), String>,
}

impl StateMachine {
    /// Creates a machine whose entities start in `initial` and record their
    /// state under `status`.
    #[must_use]
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            state_field: "status".to_string(),
            initial: initial.into(),
            edges: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_state_field(mut self, field: impl Into<String>) -> Self {
        self.state_field = field.into();
        self
    }

    /// Allows `action` to move an entity from `from` to `to`.
    #[must_use]
    pub fn edge(mut self, from: &str, action: &str, to: &str) -> Self {
        self.edges
            .insert((from.to_string(), action.to_string()), to.to_string());
        self
    }

    /// State reached by applying `action` in `state`, if legal.
    #[must_use]
    pub fn next_state(&self, state: &str, action: &str) -> Option<&str> {
        self.edges
            .get(&(state.to_string(), action.to_string()))
            .map(String::as_str)
    }

    fn current_state<'a>(&'a self, entity: &'a Entity) -> &'a str {
        entity
            .get(&self.state_field)
            .and_then(Value::as_str)
            .unwrap_or(&self.initial)
    }

    /// Editing lifecycle used by [`DEFAULT_WORKFLOW`].
    #[must_use]
    pub fn editorial() -> Self {
        Self::new("editing")
            .edge("editing", "edit", "editing")
            .edge("editing", "review", "reviewing")
            .edge("reviewing", "approve", "published")
            .edge("reviewing", "reject", "editing")
            .edge("published", "unpublish", "editing")
    }
}

/// Named state machines implementing [`WorkflowEngine`].
#[derive(Debug, Clone, Default)]
pub struct StateMachines {
    machines: HashMap<String, StateMachine>,
}

impl StateMachines {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Machines with the editorial lifecycle registered as [`DEFAULT_WORKFLOW`].
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new().register(DEFAULT_WORKFLOW, StateMachine::editorial())
    }

    #[must_use]
    pub fn register(mut self, name: impl Into<String>, machine: StateMachine) -> Self {
        self.machines.insert(name.into(), machine);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&StateMachine> {
        self.machines.get(name)
    }
}

#[async_trait]
impl WorkflowEngine for StateMachines {
    async fn transit(
        &self,
        binding: &WorkflowBinding,
        id: &str,
        payload: Entity,
    ) -> Result<Entity, WorkflowError> {
        let machine = self
            .get(&binding.workflow)
            .ok_or_else(|| WorkflowError::UnknownWorkflow(binding.workflow.clone()))?;
        let action = payload
            .get(ACTION_FIELD)
            .and_then(Value::as_str)
            .ok_or(WorkflowError::MissingAction)?;

        let mut entity = binding.model.find_one(id).await?;
        let state = machine.current_state(&entity);
        let next = machine
            .next_state(state, action)
            .ok_or_else(|| WorkflowError::IllegalTransition {
                state: state.to_string(),
                action: action.to_string(),
            })?
            .to_string();

        tracing::debug!(
            model = binding.model.name(),
            workflow = %binding.workflow,
            id,
            action,
            next = %next,
            "workflow transition"
        );

        if let (Some(target), Some(fields)) = (entity.as_object_mut(), payload.as_object()) {
            for (key, value) in fields {
                if key != ACTION_FIELD && key != ID_FIELD && *key != machine.state_field {
                    target.insert(key.clone(), value.clone());
                }
            }
            target.insert(machine.state_field.clone(), Value::String(next));
        }

        Ok(binding.model.replace(id, entity).await?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::memory::MemoryModel;
    use crate::types::entity_id;

    async fn setup() -> (StateMachines, WorkflowBinding, String) {
        let model: Arc<dyn Model> = Arc::new(MemoryModel::new("posts"));
        let created = model.create(json!({"title": "draft"})).await.unwrap();
        let id = entity_id(&created).unwrap().to_string();
        let binding = WorkflowBinding {
            workflow: DEFAULT_WORKFLOW.to_string(),
            model,
        };
        (StateMachines::with_defaults(), binding, id)
    }

    #[tokio::test]
    async fn legal_action_moves_state_and_merges_fields() {
        let (engine, binding, id) = setup().await;
        let updated = engine
            .transit(&binding, &id, json!({"action": "review", "title": "final"}))
            .await
            .unwrap();
        assert_eq!(updated["status"], "reviewing");
        assert_eq!(updated["title"], "final");
    }

    #[tokio::test]
    async fn illegal_action_is_rejected() {
        let (engine, binding, id) = setup().await;
        let err = engine
            .transit(&binding, &id, json!({"action": "approve"}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::IllegalTransition { ref state, ref action }
                if state == "editing" && action == "approve"
        ));
    }

    #[tokio::test]
    async fn payload_cannot_set_state_directly() {
        let (engine, binding, id) = setup().await;
        let updated = engine
            .transit(&binding, &id, json!({"action": "edit", "status": "published"}))
            .await
            .unwrap();
        assert_eq!(updated["status"], "editing");
    }

    #[tokio::test]
    async fn missing_action_and_unknown_workflow() {
        let (engine, mut binding, id) = setup().await;
        assert!(matches!(
            engine.transit(&binding, &id, json!({})).await,
            Err(WorkflowError::MissingAction)
        ));

        binding.workflow = "nope".to_string();
        assert!(matches!(
            engine.transit(&binding, &id, json!({"action": "edit"})).await,
            Err(WorkflowError::UnknownWorkflow(name)) if name == "nope"
        ));
    }

    #[tokio::test]
    async fn unknown_entity_surfaces_model_error() {
        let (engine, binding, _) = setup().await;
        let err = engine
            .transit(&binding, "missing", json!({"action": "edit"}))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Model(ModelError::NotFound { .. })));
    }
}
