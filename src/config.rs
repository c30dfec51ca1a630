//! Coordinator configuration: retry policy, quorum parameters, and the
//! monotonic time source.

use std::sync::Arc;
use std::time::Instant;

/// The delay between acquisition retries.
///
/// Either a fixed millisecond value, or a callable mapping the zero-based
/// attempt index to a millisecond delay (enabling e.g. exponential backoff
/// without touching the coordinator itself).
#[derive(Clone)]
pub enum RetryDelay {
    Fixed(u64),
    Dynamic(Arc<dyn Fn(u32) -> u64 + Send + Sync>),
}

impl RetryDelay {
    pub fn resolve(&self, attempt_index: u32) -> u64 {
        match self {
            RetryDelay::Fixed(ms) => *ms,
            RetryDelay::Dynamic(f) => f(attempt_index),
        }
    }
}

impl std::fmt::Debug for RetryDelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryDelay::Fixed(ms) => f.debug_tuple("Fixed").field(ms).finish(),
            RetryDelay::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

impl Default for RetryDelay {
    fn default() -> Self {
        RetryDelay::Fixed(DEFAULT_RETRY_DELAY_MS)
    }
}

pub const DEFAULT_RETRY_COUNT: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 200;
pub const DEFAULT_RETRY_JITTER_MS: u64 = 50;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 100;
const DRIFT_FACTOR: f64 = 0.01;

/// `floor(ttl * 0.01) + 2` milliseconds: the conservative clock-skew and
/// expiry-granularity allowance subtracted from every validity computation.
pub fn drift(ttl_ms: i64) -> i64 {
    ((ttl_ms as f64) * DRIFT_FACTOR) as i64 + 2
}

/// Coordinator-wide, immutable-after-construction settings.
#[derive(Clone)]
pub struct CoordinatorConfig {
    pub(crate) retry_count: u32,
    pub(crate) retry_delay: RetryDelay,
    pub(crate) retry_jitter_ms: u64,
    pub(crate) time_source: Arc<dyn Fn() -> i64 + Send + Sync>,
}

impl std::fmt::Debug for CoordinatorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatorConfig")
            .field("retry_count", &self.retry_count)
            .field("retry_delay", &self.retry_delay)
            .field("retry_jitter_ms", &self.retry_jitter_ms)
            .finish()
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            retry_count: DEFAULT_RETRY_COUNT,
            retry_delay: RetryDelay::default(),
            retry_jitter_ms: DEFAULT_RETRY_JITTER_MS,
            time_source: Arc::new(monotonic_millis),
        }
    }
}

impl CoordinatorConfig {
    pub fn builder() -> CoordinatorConfigBuilder {
        CoordinatorConfigBuilder::default()
    }
}

/// Builder for [`CoordinatorConfig`], mirroring the constructor-with-defaults
/// style used throughout this crate rather than a derive-macro builder.
#[derive(Clone)]
pub struct CoordinatorConfigBuilder {
    config: CoordinatorConfig,
}

impl Default for CoordinatorConfigBuilder {
    fn default() -> Self {
        CoordinatorConfigBuilder {
            config: CoordinatorConfig::default(),
        }
    }
}

impl CoordinatorConfigBuilder {
    pub fn retry_count(mut self, retry_count: u32) -> Self {
        self.config.retry_count = retry_count;
        self
    }

    pub fn retry_delay(mut self, retry_delay: RetryDelay) -> Self {
        self.config.retry_delay = retry_delay;
        self
    }

    pub fn retry_jitter_ms(mut self, retry_jitter_ms: u64) -> Self {
        self.config.retry_jitter_ms = retry_jitter_ms;
        self
    }

    pub fn time_source<F>(mut self, time_source: F) -> Self
    where
        F: Fn() -> i64 + Send + Sync + 'static,
    {
        self.config.time_source = Arc::new(time_source);
        self
    }

    pub fn build(self) -> CoordinatorConfig {
        self.config
    }
}

/// Default monotonic millisecond counter, anchored at first use.
fn monotonic_millis() -> i64 {
    static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    START.get_or_init(Instant::now).elapsed().as_millis() as i64
}

/// Default server list: `redis://<host>:<port>`, where `host`/`port` come
/// from `DEFAULT_REDIS_HOST`/`DEFAULT_REDIS_PORT` or fall back to
/// `localhost`/`6379`.
pub fn default_redis_urls() -> Vec<String> {
    let host = std::env::var("DEFAULT_REDIS_HOST").unwrap_or_else(|_| "localhost".to_string());
    let port = std::env::var("DEFAULT_REDIS_PORT").unwrap_or_else(|_| "6379".to_string());
    vec![format!("redis://{host}:{port}")]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drift_matches_spec_formula() {
        assert_eq!(drift(1000), 12);
        assert_eq!(drift(0), 2);
        assert_eq!(drift(2000), 22);
    }

    #[test]
    fn retry_delay_fixed_resolves_constant() {
        let rd = RetryDelay::Fixed(200);
        assert_eq!(rd.resolve(0), 200);
        assert_eq!(rd.resolve(5), 200);
    }

    #[test]
    fn retry_delay_dynamic_resolves_per_attempt() {
        let rd = RetryDelay::Dynamic(Arc::new(|attempt: u32| 100 * (attempt + 1) as u64));
        assert_eq!(rd.resolve(0), 100);
        assert_eq!(rd.resolve(3), 400);
    }

    #[test]
    fn default_urls_fall_back_to_localhost() {
        std::env::remove_var("DEFAULT_REDIS_HOST");
        std::env::remove_var("DEFAULT_REDIS_PORT");
        assert_eq!(default_redis_urls(), vec!["redis://localhost:6379"]);
    }
}
