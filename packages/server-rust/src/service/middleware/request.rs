//! Request normalization stages: location prefix, body, id and paging.

use std::str::FromStr;

use async_trait::async_trait;
use restkit_core::{PageRequest, SortDirection};

use crate::error::ApiError;
use crate::service::config::PagingConfig;
use crate::service::exchange::Exchange;
use crate::service::pipeline::{Flow, Stage, StageResult};

const MAX_ID_LEN: usize = 64;

fn is_token(value: &str, max_len: usize) -> bool {
    !value.is_empty()
        && value.len() <= max_len
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Whether `id` follows the entity identifier convention.
#[must_use]
pub fn is_valid_id(id: &str) -> bool {
    is_token(id, MAX_ID_LEN)
}

/// Sets the prefix that `Location` headers are built from.
#[derive(Debug, Clone)]
pub struct Locate {
    mount_prefix: String,
}

impl Locate {
    /// `mount_prefix` must already be normalized (leading slash, no trailing).
    #[must_use]
    pub fn new(mount_prefix: impl Into<String>) -> Self {
        Self {
            mount_prefix: mount_prefix.into(),
        }
    }
}

#[async_trait]
impl Stage for Locate {
    async fn run(&self, ex: &mut Exchange) -> StageResult {
        ex.location = Some(format!("{}/{}/", self.mount_prefix, ex.resource));
        Ok(Flow::Continue)
    }
}

/// Parses the raw body as JSON. An empty body leaves no body.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseBody;

#[async_trait]
impl Stage for ParseBody {
    async fn run(&self, ex: &mut Exchange) -> StageResult {
        if ex.raw_body.iter().all(u8::is_ascii_whitespace) {
            ex.body = None;
            return Ok(Flow::Continue);
        }
        let body = serde_json::from_slice(&ex.raw_body)
            .map_err(|e| ApiError::bad_request(format!("invalid JSON body: {e}")))?;
        ex.body = Some(body);
        Ok(Flow::Continue)
    }
}

/// Fails with NotFound unless the path carries a well-formed id.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequireId;

#[async_trait]
impl Stage for RequireId {
    async fn run(&self, ex: &mut Exchange) -> StageResult {
        match ex.id.as_deref() {
            Some(id) if is_valid_id(id) => Ok(Flow::Continue),
            Some(id) => Err(ApiError::not_found(format!("malformed id `{id}`"))),
            None => Err(ApiError::not_found("missing entity id")),
        }
    }
}

/// Normalizes `start`, `count`, `sort` and `direction` into a [`PageRequest`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Paginate {
    config: PagingConfig,
}

impl Paginate {
    #[must_use]
    pub fn new(config: PagingConfig) -> Self {
        Self { config }
    }

    /// # Errors
    ///
    /// Returns [`ApiError::BadRequest`] for non-numeric `start`/`count`, an
    /// unknown `direction`, or a `sort` field that is not a plain name.
    pub fn parse(&self, ex: &Exchange) -> Result<PageRequest, ApiError> {
        let number = |name: &str| -> Result<Option<usize>, ApiError> {
            ex.query
                .get(name)
                .map(|raw| {
                    raw.trim()
                        .parse::<usize>()
                        .map_err(|_| {
                            ApiError::bad_request(format!("`{name}` must be a non-negative integer"))
                        })
                })
                .transpose()
        };

        let start = number("start")?.unwrap_or(0);
        let count = number("count")?
            .unwrap_or(self.config.default_count)
            .clamp(1, self.config.max_count.max(1));
        let sort = match ex.query.get("sort").map(|s| s.trim()) {
            None | Some("") => None,
            Some(field) if is_sort_field(field) => Some(field.to_string()),
            Some(field) => {
                return Err(ApiError::bad_request(format!("cannot sort by `{field}`")));
            }
        };
        let direction = ex
            .query
            .get("direction")
            .map(|raw| SortDirection::from_str(raw.trim()))
            .transpose()
            .map_err(|e| ApiError::bad_request(e.to_string()))?
            .unwrap_or_default();

        Ok(PageRequest {
            start,
            count,
            sort,
            direction,
        })
    }
}

fn is_sort_field(field: &str) -> bool {
    field.len() <= MAX_ID_LEN
        && field
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'))
}

#[async_trait]
impl Stage for Paginate {
    async fn run(&self, ex: &mut Exchange) -> StageResult {
        ex.page = Some(self.parse(ex)?);
        Ok(Flow::Continue)
    }
}

/// `Link` header value pointing at the page `next` of the collection whose
/// location prefix is `prefix`.
#[must_use]
pub fn next_link(prefix: &str, next: &PageRequest) -> String {
    let base = prefix.trim_end_matches('/');
    let mut query = format!("start={}&count={}", next.start, next.count);
    if let Some(sort) = &next.sort {
        query.push_str("&sort=");
        query.push_str(sort);
    }
    query.push_str("&direction=");
    query.push_str(next.direction.as_str());
    format!("<{base}?{query}>; rel=\"next\"")
}
