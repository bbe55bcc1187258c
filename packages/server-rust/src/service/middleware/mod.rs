//! Policy and normalization stages shared by every resource route.
//!
//! - [`auth`]: allow-list rules and bearer-token authorization
//! - [`throttle`]: per-resource rate limiting via `governor`
//! - [`request`]: location prefix, body parsing, id and paging normalization

pub mod auth;
pub mod request;
pub mod throttle;

pub use auth::{Authorize, Authorizer, TokenAuthorizer};
pub use request::{Locate, Paginate, ParseBody, RequireId};
pub use throttle::{KeyedThrottle, NoThrottle, RateLimit, Throttle};
