//! Service configuration
//!
//! Loaded from environment variables (a `.env` file is honored in
//! development); every knob except `DATABASE_URI` and `JWT_SECRET` has a
//! built-in default.

use std::fmt::Debug;
use std::str::FromStr;
use std::time::Duration;

use crate::db::retry::RetryConfig;

#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen address (host:port)
    pub run_address: String,
    /// Graceful shutdown deadline
    pub shutdown_timeout: Duration,
    /// PostgreSQL connection string
    pub database_uri: String,
    /// Pool sizing
    pub db_max_conns: u32,
    pub db_min_conns: u32,
    pub db_max_conn_lifetime: Duration,
    pub db_max_conn_idle: Duration,
    pub db_test_before_acquire: bool,
    /// Storage retry policy
    pub db_retry: RetryConfig,
    /// JWT signing secret and token lifetime
    pub jwt_secret: String,
    pub jwt_ttl: Duration,
    /// bcrypt cost (4-31)
    pub bcrypt_cost: u32,
    /// Accrual system base URL and per-request timeout
    pub accrual_address: String,
    pub accrual_http_timeout: Duration,
    /// Reconciliation worker tuning
    pub accrual_poll_interval: Duration,
    pub accrual_batch_size: i64,
    pub accrual_max_workers: usize,
    /// Attempts after an optimistic conflict (withdraw, accrual credit)
    pub optimistic_retries: u32,
    /// Default log verbosity (RUST_LOG overrides)
    pub log_level: String,
}

impl Config {
    /// Loads configuration from the environment.
    pub fn from_env() -> Self {
        Self {
            run_address: env_or("RUN_ADDRESS", "127.0.0.1:8080"),
            shutdown_timeout: env_secs("SHUTDOWN_TIMEOUT_SECS", 5),
            database_uri: std::env::var("DATABASE_URI").expect("DATABASE_URI must be set"),
            db_max_conns: env_parse("DB_MAX_CONNS", 10),
            db_min_conns: env_parse("DB_MIN_CONNS", 1),
            db_max_conn_lifetime: env_secs("DB_MAX_CONN_LIFETIME_SECS", 30 * 60),
            db_max_conn_idle: env_secs("DB_MAX_CONN_IDLE_SECS", 10 * 60),
            db_test_before_acquire: env_parse("DB_TEST_BEFORE_ACQUIRE", false),
            db_retry: RetryConfig {
                max_retries: env_parse("DB_RETRY_MAX", 3),
                base_delay: env_millis("DB_RETRY_BASE_MS", 100),
                max_delay: env_millis("DB_RETRY_MAX_MS", 2_000),
            },
            jwt_secret: std::env::var("JWT_SECRET").expect("JWT_SECRET must be set"),
            jwt_ttl: env_secs("JWT_TTL_SECS", 24 * 60 * 60),
            bcrypt_cost: env_parse("BCRYPT_COST", bcrypt::DEFAULT_COST),
            accrual_address: env_or("ACCRUAL_ADDRESS", "http://127.0.0.1:8081"),
            accrual_http_timeout: env_secs("ACCRUAL_HTTP_TIMEOUT_SECS", 10),
            accrual_poll_interval: env_secs("ACCRUAL_POLL_INTERVAL_SECS", 2),
            accrual_batch_size: env_parse("ACCRUAL_BATCH_SIZE", 100),
            accrual_max_workers: env_parse("ACCRUAL_MAX_WORKERS", 5),
            optimistic_retries: env_parse("OPTIMISTIC_RETRIES", 3),
            log_level: env_or("LOG_LEVEL", "info"),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => default.to_string(),
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Debug,
{
    let Ok(raw) = std::env::var(key) else {
        return default;
    };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(key, raw = %raw, default = ?default, "unparsable value, using default");
            default
        }
    }
}

fn env_secs(key: &str, default_secs: u64) -> Duration {
    Duration::from_secs(env_parse(key, default_secs))
}

fn env_millis(key: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_parse(key, default_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    // set_var is process-global; every test uses its own key
    #[test]
    fn parse_falls_back_on_missing_or_garbage() {
        assert_eq!(env_parse("SCRIP_TEST_UNSET_KEY", 7u32), 7);

        std::env::set_var("SCRIP_TEST_GARBAGE_KEY", "not-a-number");
        assert_eq!(env_parse("SCRIP_TEST_GARBAGE_KEY", 7u32), 7);

        std::env::set_var("SCRIP_TEST_VALID_KEY", " 42 ");
        assert_eq!(env_parse("SCRIP_TEST_VALID_KEY", 7u32), 42);
    }

    #[test]
    fn duration_helpers_use_the_right_units() {
        assert_eq!(env_secs("SCRIP_TEST_UNSET_SECS", 5), Duration::from_secs(5));
        assert_eq!(
            env_millis("SCRIP_TEST_UNSET_MS", 100),
            Duration::from_millis(100)
        );
    }

    #[test]
    fn string_values_are_trimmed() {
        std::env::set_var("SCRIP_TEST_ADDR_KEY", "  0.0.0.0:9090  ");
        assert_eq!(env_or("SCRIP_TEST_ADDR_KEY", "x"), "0.0.0.0:9090");
        assert_eq!(env_or("SCRIP_TEST_UNSET_ADDR", "127.0.0.1:8080"), "127.0.0.1:8080");
    }
}
