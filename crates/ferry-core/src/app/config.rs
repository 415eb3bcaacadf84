//! Publisher configuration.
//!
//! Plain numeric/duration settings read once at startup. Every option has a
//! default and can be overridden through a `FERRY_*` environment variable.

use std::time::Duration;

use tracing::warn;

use super::retry::Backoff;

/// PublisherConfig drives one Publisher Loop instance.
#[derive(Debug, Clone, PartialEq)]
pub struct PublisherConfig {
    /// Delay between the end of one cycle and the start of the next.
    pub poll_interval: Duration,

    /// Maximum entries fetched per cycle.
    pub batch_size: usize,

    /// Retry budget for entries written without one of their own. Applied by
    /// `Operations::enqueue` and by stores built with this default.
    pub max_retries: u32,

    /// How long a successful acquisition keeps the lock.
    pub lock_hold: Duration,

    pub lock_name: String,

    /// Per-entry send deadline; expiry counts as a transient failure.
    pub send_timeout: Duration,

    /// Sends in flight at once within one batch. 1 means sequential.
    pub delivery_concurrency: usize,

    /// How long shutdown waits for an in-flight cycle.
    pub shutdown_deadline: Duration,

    /// Explicit backoff via `next_retry_at`. `None` keeps the fixed poll
    /// interval as the only spacing between attempts.
    pub backoff: Option<Backoff>,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1_000),
            batch_size: 100,
            max_retries: 5,
            lock_hold: Duration::from_millis(30_000),
            lock_name: "outbox-publisher".to_string(),
            send_timeout: Duration::from_millis(10_000),
            delivery_concurrency: 1,
            shutdown_deadline: Duration::from_millis(5_000),
            backoff: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{key}={value:?} is not a valid {expected}")]
    Parse {
        key: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error(
        "lock hold ({hold_ms}ms) must be longer than the send timeout ({timeout_ms}ms), \
         otherwise a single send can outlive the lock"
    )]
    HoldTooShort { hold_ms: u128, timeout_ms: u128 },

    #[error("backoff multiplier must be at least 1.0, got {0}")]
    Multiplier(f64),
}

impl PublisherConfig {
    pub const ENV_POLL_INTERVAL_MS: &'static str = "FERRY_POLL_INTERVAL_MS";
    pub const ENV_BATCH_SIZE: &'static str = "FERRY_BATCH_SIZE";
    pub const ENV_MAX_RETRIES: &'static str = "FERRY_MAX_RETRIES";
    pub const ENV_LOCK_HOLD_MS: &'static str = "FERRY_LOCK_HOLD_MS";
    pub const ENV_LOCK_NAME: &'static str = "FERRY_LOCK_NAME";
    pub const ENV_SEND_TIMEOUT_MS: &'static str = "FERRY_SEND_TIMEOUT_MS";
    pub const ENV_DELIVERY_CONCURRENCY: &'static str = "FERRY_DELIVERY_CONCURRENCY";
    pub const ENV_SHUTDOWN_DEADLINE_MS: &'static str = "FERRY_SHUTDOWN_DEADLINE_MS";
    pub const ENV_BACKOFF_BASE_MS: &'static str = "FERRY_BACKOFF_BASE_MS";

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(ms) = parse::<u64, _>(&lookup, Self::ENV_POLL_INTERVAL_MS, "duration in ms")? {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(n) = parse(&lookup, Self::ENV_BATCH_SIZE, "batch size")? {
            config.batch_size = n;
        }
        if let Some(n) = parse(&lookup, Self::ENV_MAX_RETRIES, "retry count")? {
            config.max_retries = n;
        }
        if let Some(ms) = parse::<u64, _>(&lookup, Self::ENV_LOCK_HOLD_MS, "duration in ms")? {
            config.lock_hold = Duration::from_millis(ms);
        }
        if let Some(name) = lookup(Self::ENV_LOCK_NAME).filter(|s| !s.trim().is_empty()) {
            config.lock_name = name;
        }
        if let Some(ms) = parse::<u64, _>(&lookup, Self::ENV_SEND_TIMEOUT_MS, "duration in ms")? {
            config.send_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = parse(&lookup, Self::ENV_DELIVERY_CONCURRENCY, "concurrency")? {
            config.delivery_concurrency = n;
        }
        if let Some(ms) = parse::<u64, _>(&lookup, Self::ENV_SHUTDOWN_DEADLINE_MS, "duration in ms")? {
            config.shutdown_deadline = Duration::from_millis(ms);
        }
        if let Some(ms) = parse::<u64, _>(&lookup, Self::ENV_BACKOFF_BASE_MS, "duration in ms")? {
            config.backoff = Some(Backoff::with_base(Duration::from_millis(ms)));
        }

        Ok(config)
    }

    /// Reject settings the loop cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Zero("batch size"));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::Zero("max retries"));
        }
        if self.delivery_concurrency == 0 {
            return Err(ConfigError::Zero("delivery concurrency"));
        }
        if self.lock_hold.is_zero() {
            return Err(ConfigError::Zero("lock hold"));
        }
        if self.send_timeout.is_zero() {
            return Err(ConfigError::Zero("send timeout"));
        }
        if self.lock_hold <= self.send_timeout {
            return Err(ConfigError::HoldTooShort {
                hold_ms: self.lock_hold.as_millis(),
                timeout_ms: self.send_timeout.as_millis(),
            });
        }
        if let Some(backoff) = &self.backoff {
            if backoff.base.is_zero() {
                return Err(ConfigError::Zero("backoff base"));
            }
            if backoff.multiplier.is_nan() || backoff.multiplier < 1.0 {
                return Err(ConfigError::Multiplier(backoff.multiplier));
            }
        }

        if self.poll_interval >= self.lock_hold {
            warn!(
                poll_interval_ms = self.poll_interval.as_millis() as u64,
                lock_hold_ms = self.lock_hold.as_millis() as u64,
                "poll interval is not shorter than the lock hold; expect idle gaps between holders"
            );
        }
        Ok(())
    }
}

fn parse<T, F>(lookup: &F, key: &'static str, expected: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Parse {
                key,
                value: raw,
                expected,
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = PublisherConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.lock_hold, Duration::from_secs(30));
        assert_eq!(config.lock_name, "outbox-publisher");
        assert_eq!(config.delivery_concurrency, 1);
        assert!(config.backoff.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = PublisherConfig::from_lookup(lookup(&[
            ("FERRY_POLL_INTERVAL_MS", "250"),
            ("FERRY_BATCH_SIZE", "10"),
            ("FERRY_MAX_RETRIES", "2"),
            ("FERRY_LOCK_HOLD_MS", "5000"),
            ("FERRY_LOCK_NAME", "billing-publisher"),
            ("FERRY_SEND_TIMEOUT_MS", "1000"),
            ("FERRY_DELIVERY_CONCURRENCY", "4"),
            ("FERRY_BACKOFF_BASE_MS", "500"),
        ]))
        .unwrap();

        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.lock_hold, Duration::from_secs(5));
        assert_eq!(config.lock_name, "billing-publisher");
        assert_eq!(config.send_timeout, Duration::from_secs(1));
        assert_eq!(config.delivery_concurrency, 4);
        assert_eq!(config.backoff.map(|b| b.base), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_unparseable_value_is_reported() {
        let err = PublisherConfig::from_lookup(lookup(&[("FERRY_BATCH_SIZE", "lots")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Parse {
                key: "FERRY_BATCH_SIZE",
                value: "lots".into(),
                expected: "batch size",
            }
        );
    }

    #[rstest]
    #[case::zero_batch(PublisherConfig { batch_size: 0, ..Default::default() })]
    #[case::zero_retries(PublisherConfig { max_retries: 0, ..Default::default() })]
    #[case::zero_concurrency(PublisherConfig { delivery_concurrency: 0, ..Default::default() })]
    #[case::zero_hold(PublisherConfig { lock_hold: Duration::ZERO, ..Default::default() })]
    #[case::hold_equals_timeout(PublisherConfig {
        lock_hold: Duration::from_secs(10),
        send_timeout: Duration::from_secs(10),
        ..Default::default()
    })]
    fn test_validate_rejects(#[case] config: PublisherConfig) {
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_slow_poll_is_accepted() {
        let config = PublisherConfig {
            poll_interval: Duration::from_secs(60),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
