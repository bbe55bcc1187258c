use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A persisted resource instance.
///
/// Entities are JSON objects; the identifier lives under [`ID_FIELD`].
pub type Entity = serde_json::Value;

/// Field holding an entity's identifier.
pub const ID_FIELD: &str = "id";

/// Reads the identifier of an entity, if it has one.
#[must_use]
pub fn entity_id(entity: &Entity) -> Option<&str> {
    entity.get(ID_FIELD).and_then(serde_json::Value::as_str)
}

/// Sort order for list queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    /// Newest first.
    #[default]
    Desc,
}

impl SortDirection {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a sort direction string is neither `asc` nor `desc`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid sort direction `{0}`, expected `asc` or `desc`")]
pub struct ParseDirectionError(pub String);

impl FromStr for SortDirection {
    type Err = ParseDirectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" | "1" => Ok(Self::Asc),
            "desc" | "-1" => Ok(Self::Desc),
            _ => Err(ParseDirectionError(s.to_string())),
        }
    }
}

/// Normalized pagination parameters for a list query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Offset of the first item to return.
    pub start: usize,
    /// Maximum number of items to return.
    pub count: usize,
    /// Field to sort by. `None` sorts by insertion order.
    pub sort: Option<String>,
    pub direction: SortDirection,
}

impl PageRequest {
    /// The request for the page immediately following this one.
    #[must_use]
    pub fn next(&self) -> Self {
        Self {
            start: self.start + self.count,
            ..self.clone()
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            start: 0,
            count: 20,
            sort: None,
            direction: SortDirection::Desc,
        }
    }
}

/// One page of entities returned by a list query.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub items: Vec<Entity>,
    /// Request for the following page, present only when more items exist.
    pub next: Option<PageRequest>,
}

/// Authenticated caller attached to a request after authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Unique identifier for the authenticated entity.
    pub id: String,
    /// Roles assigned to this principal.
    pub roles: Vec<String>,
}
