//! Operational endpoints served outside the resource mount prefix.

pub mod health;

pub use health::{health_handler, liveness_handler, readiness_handler};

use std::sync::Arc;
use std::time::Instant;

use super::ShutdownController;
use crate::service::ServiceSet;

/// State shared by the operational handlers.
#[derive(Clone)]
pub struct AppState {
    pub shutdown: Arc<ShutdownController>,
    /// The installed resources, reported by `/health`.
    pub services: Arc<ServiceSet>,
    pub start_time: Instant,
}
