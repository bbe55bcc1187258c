//! Per-resource rate limiting.

use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};

use crate::error::ApiError;
use crate::service::config::ThrottleConfig;
use crate::service::exchange::Exchange;
use crate::service::pipeline::{Flow, Stage, StageResult};

/// Admits or rejects one request for a key.
pub trait Throttle: Send + Sync {
    /// # Errors
    ///
    /// Returns [`ApiError::TooManyRequests`] when `key` is over its limit.
    fn check(&self, key: &str) -> Result<(), ApiError>;
}

/// Token-bucket limiter with one bucket per key.
pub struct KeyedThrottle {
    limiter: DefaultKeyedRateLimiter<String>,
}

impl KeyedThrottle {
    #[must_use]
    pub fn new(config: &ThrottleConfig) -> Self {
        let per_second = NonZeroU32::new(config.per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.burst).unwrap_or(per_second);
        Self {
            limiter: RateLimiter::keyed(Quota::per_second(per_second).allow_burst(burst)),
        }
    }
}

impl std::fmt::Debug for KeyedThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedThrottle").finish_non_exhaustive()
    }
}

impl Throttle for KeyedThrottle {
    fn check(&self, key: &str) -> Result<(), ApiError> {
        self.limiter
            .check_key(&key.to_string())
            .map_err(|_| ApiError::TooManyRequests(key.to_string()))
    }
}

/// Admits everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoThrottle;

impl Throttle for NoThrottle {
    fn check(&self, _key: &str) -> Result<(), ApiError> {
        Ok(())
    }
}

/// Builds the throttle described by `config`.
#[must_use]
pub fn from_config(config: &ThrottleConfig) -> Arc<dyn Throttle> {
    if config.enabled {
        Arc::new(KeyedThrottle::new(config))
    } else {
        Arc::new(NoThrottle)
    }
}

/// Pipeline stage throttling by resource name.
#[derive(Clone)]
pub struct RateLimit {
    throttle: Arc<dyn Throttle>,
}

impl RateLimit {
    #[must_use]
    pub fn new(throttle: Arc<dyn Throttle>) -> Self {
        Self { throttle }
    }
}

#[async_trait]
impl Stage for RateLimit {
    async fn run(&self, ex: &mut Exchange) -> StageResult {
        self.throttle.check(&ex.resource)?;
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tight() -> KeyedThrottle {
        KeyedThrottle::new(&ThrottleConfig {
            enabled: true,
            per_second: 1,
            burst: 2,
        })
    }

    #[test]
    fn rejects_after_burst() {
        let throttle = tight();
        assert!(throttle.check("users").is_ok());
        assert!(throttle.check("users").is_ok());
        assert!(matches!(
            throttle.check("users"),
            Err(ApiError::TooManyRequests(key)) if key == "users"
        ));
    }

    #[test]
    fn keys_have_separate_buckets() {
        let throttle = tight();
        throttle.check("users").unwrap();
        throttle.check("users").unwrap();
        assert!(throttle.check("users").is_err());
        assert!(throttle.check("orders").is_ok());
    }

    #[test]
    fn disabled_config_admits_everything() {
        let throttle = from_config(&ThrottleConfig {
            enabled: false,
            per_second: 1,
            burst: 1,
        });
        for _ in 0..10 {
            assert!(throttle.check("users").is_ok());
        }
    }
}
