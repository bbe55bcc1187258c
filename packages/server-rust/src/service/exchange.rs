//! The per-request value threaded through every pipeline stage.

use std::collections::HashMap;

use axum::http::{HeaderMap, Method};
use bytes::Bytes;
use restkit_core::{Entity, PageRequest, Principal};

use super::context::RequestContext;
use crate::error::ApiError;

/// Request state shared by the stages of one pipeline run.
///
/// Created when a request arrives, mutated only by that request's stages, and
/// dropped when the response is written.
#[derive(Debug)]
pub struct Exchange {
    pub method: Method,
    /// Resource name segment of the path.
    pub resource: String,
    /// Entity identifier segment of the path, for instance routes.
    pub id: Option<String>,
    pub query: HashMap<String, String>,
    pub headers: HeaderMap,
    pub raw_body: Bytes,
    /// Parsed JSON body, set by the body-parsing stage.
    pub body: Option<Entity>,
    /// Set once the resource has been resolved.
    pub context: Option<RequestContext>,
    /// Prefix that entity identifiers are appended to for `Location` headers.
    pub location: Option<String>,
    /// Normalized pagination, set on list routes.
    pub page: Option<PageRequest>,
    pub principal: Option<Principal>,
}

impl Exchange {
    #[must_use]
    pub fn new(method: Method, resource: impl Into<String>) -> Self {
        Self {
            method,
            resource: resource.into(),
            id: None,
            query: HashMap::new(),
            headers: HeaderMap::new(),
            raw_body: Bytes::new(),
            body: None,
            context: None,
            location: None,
            page: None,
            principal: None,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_query(mut self, query: HashMap<String, String>) -> Self {
        self.query = query;
        self
    }

    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.raw_body = body.into();
        self
    }

    /// The resolved request context.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Internal`] if called before the context initializer ran.
    pub fn context(&self) -> Result<&RequestContext, ApiError> {
        self.context
            .as_ref()
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("request context not initialized")))
    }

    /// The entity identifier from the path.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotFound`] on collection routes.
    pub fn id(&self) -> Result<&str, ApiError> {
        self.id
            .as_deref()
            .ok_or_else(|| ApiError::not_found("missing entity id"))
    }

    /// The parsed body, required to be a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::BadRequest`] when the body is absent or not an object.
    pub fn json_object(&self) -> Result<&Entity, ApiError> {
        match &self.body {
            Some(body) if body.is_object() => Ok(body),
            Some(_) => Err(ApiError::bad_request("request body must be a JSON object")),
            None => Err(ApiError::bad_request("request body is required")),
        }
    }

    /// Path of the request relative to the resource mount: `/` or `/{id}`.
    #[must_use]
    pub fn relative_path(&self) -> String {
        match &self.id {
            Some(id) => format!("/{id}"),
            None => "/".to_string(),
        }
    }

    #[must_use]
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Location reference for the entity `id`, if a prefix has been set.
    #[must_use]
    pub fn locate(&self, id: &str) -> Option<String> {
        self.location.as_ref().map(|prefix| format!("{prefix}{id}"))
    }
}
