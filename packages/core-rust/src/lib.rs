//! `restkit` core: persistence and workflow contracts, auth rules, and paging.
//!
//! Nothing in this crate knows about HTTP routing. The server crate binds these
//! contracts to resources and drives them from request pipelines.

pub mod auth;
pub mod memory;
pub mod model;
pub mod types;
pub mod workflow;

pub use auth::{AuthRules, AuthRulesError};
pub use memory::MemoryModel;
pub use model::{Model, ModelError, WriteKind};
pub use types::{entity_id, Entity, Page, PageRequest, Principal, SortDirection, ID_FIELD};
pub use workflow::{
    StateMachine, StateMachines, WorkflowBinding, WorkflowEngine, WorkflowError, DEFAULT_WORKFLOW,
};
