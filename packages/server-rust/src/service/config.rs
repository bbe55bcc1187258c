use serde::Deserialize;

/// Request-path configuration for the resource routes.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Path under which the six resource routes are mounted.
    pub mount_prefix: String,
    pub paging: PagingConfig,
    pub throttle: ThrottleConfig,
    /// Upper bound on request body size in bytes.
    pub max_body_bytes: usize,
    /// Tokens accepted for requests the auth rules do not let through anonymously.
    pub api_tokens: Vec<ApiToken>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            mount_prefix: "/v".to_string(),
            paging: PagingConfig::default(),
            throttle: ThrottleConfig::default(),
            max_body_bytes: 1024 * 1024,
            api_tokens: Vec::new(),
        }
    }
}

impl ServiceConfig {
    /// Mount prefix with exactly one leading slash and no trailing slash.
    /// An empty or `/` prefix mounts the routes at the root.
    #[must_use]
    pub fn normalized_prefix(&self) -> String {
        let trimmed = self.mount_prefix.trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        }
    }
}

/// Limits applied to list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingConfig {
    /// Page size when the client sends no `count`.
    pub default_count: usize,
    /// Largest page size a client may request.
    pub max_count: usize,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            default_count: 20,
            max_count: 100,
        }
    }
}

/// Per-resource request rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleConfig {
    pub enabled: bool,
    /// Sustained requests per second for one resource.
    pub per_second: u32,
    /// Requests allowed in a burst above the sustained rate.
    pub burst: u32,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            per_second: 100,
            burst: 200,
        }
    }
}

/// A bearer token and the principal it authenticates.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ApiToken {
    pub principal: String,
    pub token: String,
}

impl ApiToken {
    #[must_use]
    pub fn new(principal: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            token: token.into(),
        }
    }
}

impl std::str::FromStr for ApiToken {
    type Err = String;

    /// Parses `principal:token`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.split_once(':') {
            Some((principal, token)) if !principal.is_empty() && !token.is_empty() => {
                Ok(Self::new(principal, token))
            }
            _ => Err("expected `principal:token`".to_string()),
        }
    }
}

impl std::fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiToken")
            .field("principal", &self.principal)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.mount_prefix, "/v");
        assert_eq!(config.paging.default_count, 20);
        assert_eq!(config.paging.max_count, 100);
        assert!(config.throttle.enabled);
        assert!(config.api_tokens.is_empty());
    }

    #[test]
    fn prefix_is_normalized() {
        let mut config = ServiceConfig::default();
        for (raw, expected) in [("/v", "/v"), ("v/", "/v"), ("/api/v1/", "/api/v1"), ("/", ""), ("", "")] {
            config.mount_prefix = raw.to_string();
            assert_eq!(config.normalized_prefix(), expected, "{raw}");
        }
    }

    #[test]
    fn token_parses_from_pair() {
        let token: ApiToken = "ops:a:b".parse().unwrap();
        assert_eq!(token, ApiToken::new("ops", "a:b"));
        assert!("ops".parse::<ApiToken>().is_err());
        assert!(":x".parse::<ApiToken>().is_err());
        assert!("ops:".parse::<ApiToken>().is_err());
    }

    #[test]
    fn token_debug_is_redacted() {
        let token = ApiToken::new("ops", "s3cret");
        assert!(!format!("{token:?}").contains("s3cret"));
    }
}
