//! `restkit` server: registry-driven CRUD and transition routes on axum.
//!
//! Resources are declared in a [`service::ResourceRegistry`], resolved once by
//! [`service::bootstrap`] into an immutable [`service::ServiceSet`], and served
//! through the [`service::Dispatcher`] behind the [`network::NetworkModule`].

pub mod cli;
pub mod error;
pub mod logging;
pub mod manifest;
pub mod network;
pub mod service;

pub use error::ApiError;
pub use manifest::{Manifest, ManifestFactory, ResourceSpec};
pub use service::{bootstrap, BaseTemplate, Dispatcher, ResourceRegistry, ServiceConfig, ServiceSet};
