//! Resource services: definition, resolution and request dispatch.
//!
//! 1. **Definition** (`definition`, `registry`): resources register a model and
//!    a factory producing a partial [`RawServiceDefinition`]
//! 2. **Resolution** (`resolver`, `base`): [`bootstrap`] normalizes every
//!    definition against the [`BaseTemplate`] into an immutable [`ServiceSet`]
//! 3. **Execution** (`pipeline`, `exchange`, `context`, `middleware`): each
//!    request runs an ordered list of [`Stage`]s over one [`Exchange`]
//! 4. **Routing** (`router`): the [`Dispatcher`] maps the six route templates
//!    to their pipelines

pub mod base;
pub mod config;
pub mod context;
pub mod definition;
pub mod descriptor;
pub mod exchange;
pub mod middleware;
pub mod pipeline;
pub mod registry;
pub mod resolver;
pub mod response;
pub mod router;

pub use base::BaseTemplate;
pub use config::{ApiToken, PagingConfig, ServiceConfig, ThrottleConfig};
pub use context::{ContextInitializer, RequestContext};
pub use definition::{Operation, Override, RawServiceDefinition, TransitionDef};
pub use descriptor::{HandlerSlot, ServiceDescriptor, SlotKind, Transitions, BUMPUP};
pub use exchange::Exchange;
pub use pipeline::{stage_fn, Flow, Pipeline, Stage, StageResult};
pub use registry::{ResourceEntry, ResourceRegistry, ServiceFactory, StaticDefinition};
pub use resolver::{bootstrap, resolve, BootstrapError, ResolveError, ServiceSet};
pub use response::{ApiResponse, ResponseBody};
pub use router::{Dispatcher, Route, ACTION_HEADER};
