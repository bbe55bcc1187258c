//! Per-method allow-lists of path patterns.
//!
//! A resource's [`AuthRules`] name the request paths, relative to the
//! resource mount (`/` for the collection, `/{id}` for an instance), that may
//! be served without credentials for a given HTTP method.

use std::collections::HashMap;

use http::Method;
use regex::Regex;

/// Errors raised while compiling auth rules.
#[derive(Debug, thiserror::Error)]
pub enum AuthRulesError {
    #[error("invalid HTTP method `{0}`")]
    InvalidMethod(String),
    #[error("invalid pattern `{pattern}` for {method}: {source}")]
    InvalidPattern {
        method: Method,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Compiled allow-list of path patterns keyed by HTTP method.
#[derive(Debug, Clone, Default)]
pub struct AuthRules {
    rules: HashMap<Method, Vec<Regex>>,
}

impl AuthRules {
    /// Creates an empty rule set. Every request then requires credentials.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rules applied when a resource declares none: anonymous reads of the
    /// collection and of any instance.
    #[must_use]
    pub fn base() -> Self {
        Self::from_patterns([(Method::GET, vec![r"^/$", r"^/.*"])])
            .unwrap_or_default()
    }

    /// Adds `pattern` to the allow-list of `method`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthRulesError::InvalidPattern`] if the pattern does not compile.
    pub fn allow(mut self, method: Method, pattern: &str) -> Result<Self, AuthRulesError> {
        let regex = Regex::new(pattern).map_err(|source| AuthRulesError::InvalidPattern {
            method: method.clone(),
            pattern: pattern.to_string(),
            source,
        })?;
        self.rules.entry(method).or_default().push(regex);
        Ok(self)
    }

    /// Builds rules from `(method, patterns)` pairs.
    ///
    /// # Errors
    ///
    /// Returns the first pattern that fails to compile.
    pub fn from_patterns<I, P, S>(entries: I) -> Result<Self, AuthRulesError>
    where
        I: IntoIterator<Item = (Method, P)>,
        P: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut rules = Self::new();
        for (method, patterns) in entries {
            for pattern in patterns {
                rules = rules.allow(method.clone(), pattern.as_ref())?;
            }
        }
        Ok(rules)
    }

    /// Builds rules from method names as they appear in configuration files.
    ///
    /// # Errors
    ///
    /// Returns [`AuthRulesError::InvalidMethod`] for an unparseable method name
    /// and [`AuthRulesError::InvalidPattern`] for a bad pattern.
    pub fn from_named<'a, I>(entries: I) -> Result<Self, AuthRulesError>
    where
        I: IntoIterator<Item = (&'a str, &'a [String])>,
    {
        let mut parsed = Vec::new();
        for (name, patterns) in entries {
            let method = Method::from_bytes(name.to_ascii_uppercase().as_bytes())
                .map_err(|_| AuthRulesError::InvalidMethod(name.to_string()))?;
            parsed.push((method, patterns));
        }
        Self::from_patterns(parsed)
    }

    /// Whether `path` may be served to anonymous callers for `method`.
    #[must_use]
    pub fn permits(&self, method: &Method, path: &str) -> bool {
        self.rules
            .get(method)
            .is_some_and(|patterns| patterns.iter().any(|p| p.is_match(path)))
    }

    /// Returns `true` if no method has any pattern.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.values().all(Vec::is_empty)
    }

    /// Patterns registered for `method`, in insertion order.
    pub fn patterns(&self, method: &Method) -> impl Iterator<Item = &str> {
        self.rules
            .get(method)
            .into_iter()
            .flatten()
            .map(Regex::as_str)
    }
}
