//! Authorization collaborator and its pipeline stage.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, Method};
use restkit_core::{AuthRules, Principal};
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::error::ApiError;
use crate::service::config::ApiToken;
use crate::service::exchange::Exchange;
use crate::service::pipeline::{Flow, Stage, StageResult};

/// Decides whether a request may proceed.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Checks the request against `rules`.
    ///
    /// Returns the authenticated principal, or `None` when the rules let the
    /// request through anonymously.
    ///
    /// # Errors
    ///
    /// [`ApiError::Unauthorized`] when credentials are needed but absent,
    /// [`ApiError::Forbidden`] when they are present but not accepted.
    async fn authorize(
        &self,
        rules: &AuthRules,
        method: &Method,
        path: &str,
        headers: &HeaderMap,
    ) -> Result<Option<Principal>, ApiError>;
}

/// Allow-list rules first, then a static set of bearer tokens.
#[derive(Debug, Clone, Default)]
pub struct TokenAuthorizer {
    tokens: Vec<ApiToken>,
}

impl TokenAuthorizer {
    #[must_use]
    pub fn new(tokens: Vec<ApiToken>) -> Self {
        Self { tokens }
    }

    fn lookup(&self, presented: &str) -> Option<&ApiToken> {
        // Every configured token is compared so the scan time does not
        // depend on which one matched.
        let mut found = None;
        for token in &self.tokens {
            if bool::from(token.token.as_bytes().ct_eq(presented.as_bytes())) {
                found = Some(token);
            }
        }
        found
    }
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl Authorizer for TokenAuthorizer {
    async fn authorize(
        &self,
        rules: &AuthRules,
        method: &Method,
        path: &str,
        headers: &HeaderMap,
    ) -> Result<Option<Principal>, ApiError> {
        if rules.permits(method, path) {
            return Ok(None);
        }
        let presented = bearer(headers)
            .ok_or_else(|| ApiError::Unauthorized("bearer token required".to_string()))?;
        let token = self
            .lookup(presented)
            .ok_or_else(|| ApiError::Forbidden("token not accepted".to_string()))?;
        Ok(Some(Principal {
            id: token.principal.clone(),
            roles: Vec::new(),
        }))
    }
}

/// Pipeline stage running the [`Authorizer`] against the resource's rules.
#[derive(Clone)]
pub struct Authorize {
    authorizer: Arc<dyn Authorizer>,
}

impl Authorize {
    #[must_use]
    pub fn new(authorizer: Arc<dyn Authorizer>) -> Self {
        Self { authorizer }
    }
}

#[async_trait]
impl Stage for Authorize {
    async fn run(&self, ex: &mut Exchange) -> StageResult {
        let descriptor = Arc::clone(&ex.context()?.descriptor);
        let path = ex.relative_path();
        let principal = self
            .authorizer
            .authorize(descriptor.auth(), &ex.method, &path, &ex.headers)
            .await?;
        if let Some(principal) = &principal {
            debug!(principal = %principal.id, resource = %ex.resource, "authenticated");
        }
        ex.principal = principal;
        Ok(Flow::Continue)
    }
}
