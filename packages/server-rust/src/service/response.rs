//! Final responses produced by request pipelines.

use axum::http::header::{LINK, LOCATION};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use restkit_core::Entity;

/// Body of a successful response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Entity(Entity),
    Many(Vec<Entity>),
    Empty,
}

/// A final response signalled by a stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: StatusCode,
    /// Reference to the affected entity, emitted as a `Location` header.
    pub location: Option<String>,
    /// Pagination reference, emitted as a `Link` header.
    pub link: Option<String>,
    pub body: ResponseBody,
}

impl ApiResponse {
    #[must_use]
    pub fn ok(entity: Entity) -> Self {
        Self {
            status: StatusCode::OK,
            location: None,
            link: None,
            body: ResponseBody::Entity(entity),
        }
    }

    #[must_use]
    pub fn created(location: Option<String>, entity: Entity) -> Self {
        Self {
            status: StatusCode::CREATED,
            location,
            ..Self::ok(entity)
        }
    }

    /// 200 with a reference to the entity that was written.
    #[must_use]
    pub fn located(location: Option<String>, entity: Entity) -> Self {
        Self {
            location,
            ..Self::ok(entity)
        }
    }

    #[must_use]
    pub fn many(items: Vec<Entity>, link: Option<String>) -> Self {
        Self {
            status: StatusCode::OK,
            location: None,
            link,
            body: ResponseBody::Many(items),
        }
    }

    #[must_use]
    pub fn no_content() -> Self {
        Self {
            status: StatusCode::NO_CONTENT,
            location: None,
            link: None,
            body: ResponseBody::Empty,
        }
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let mut response = match self.body {
            ResponseBody::Entity(entity) => (self.status, Json(entity)).into_response(),
            ResponseBody::Many(items) => (self.status, Json(items)).into_response(),
            ResponseBody::Empty => self.status.into_response(),
        };

        let headers = response.headers_mut();
        if let Some(value) = self.location.and_then(|l| HeaderValue::from_str(&l).ok()) {
            headers.insert(LOCATION, value);
        }
        if let Some(value) = self.link.and_then(|l| HeaderValue::from_str(&l).ok()) {
            headers.insert(LINK, value);
        }
        response
    }
}
