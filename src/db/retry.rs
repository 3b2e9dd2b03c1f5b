//! Retry of transient storage failures
//!
//! Exponential backoff with full jitter: after attempt k the wait is drawn
//! uniformly from [0, min(max_delay, base_delay * 2^k)). Only transient
//! errors are retried; cancellation during a wait aborts without another
//! attempt.

use std::future::Future;
use std::io::ErrorKind;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::error::AppError;

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

/// Runs `op` with the default storage transience classification.
pub async fn retry<T, F, Fut>(
    cfg: &RetryConfig,
    cancel: &CancellationToken,
    op: F,
) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    retry_if(cfg, cancel, is_transient, op).await
}

/// Runs `op` up to `max_retries + 1` times, retrying errors accepted by
/// `transient`. The first rejected error (or the last one on exhaustion)
/// is returned as-is.
pub async fn retry_if<T, F, Fut, P>(
    cfg: &RetryConfig,
    cancel: &CancellationToken,
    transient: P,
    mut op: F,
) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
    P: Fn(&AppError) -> bool,
{
    let mut attempt: u32 = 0;
    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !transient(&err) || attempt >= cfg.max_retries {
            return Err(err);
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            _ = tokio::time::sleep(backoff_delay(cfg, attempt)) => {}
        }

        attempt += 1;
    }
}

pub(crate) fn backoff_delay(cfg: &RetryConfig, attempt: u32) -> Duration {
    let cap = cfg
        .base_delay
        .saturating_mul(1u32 << attempt.min(16))
        .min(cfg.max_delay);
    let cap_ms = cap.as_millis() as u64;
    if cap_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..cap_ms))
}

/// Default classification: storage errors worth another attempt.
pub fn is_transient(err: &AppError) -> bool {
    match err {
        AppError::Storage(err) => is_transient_sqlx(err),
        _ => false,
    }
}

fn is_transient_sqlx(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(io) => matches!(
            io.kind(),
            ErrorKind::ConnectionRefused
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::BrokenPipe
                | ErrorKind::UnexpectedEof
                | ErrorKind::TimedOut
        ),
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => db.code().is_some_and(|code| is_transient_sqlstate(&code)),
        _ => false,
    }
}

/// SQLSTATE classes that signal a transient server-side condition:
/// 08 connection exception, 25 invalid transaction state, 40 transaction
/// rollback (deadlock, serialization failure), 53 insufficient resources,
/// plus the operator-intervention shutdown codes from class 57.
pub(crate) fn is_transient_sqlstate(code: &str) -> bool {
    if let Some(class) = code.get(..2) {
        if matches!(class, "08" | "25" | "40" | "53") {
            return true;
        }
    }
    matches!(code, "57P01" | "57P02" | "57P03" | "57P04")
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast_config() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    fn transient_error() -> AppError {
        AppError::Storage(sqlx::Error::PoolTimedOut)
    }

    #[tokio::test]
    async fn returns_first_success() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result = retry(&fast_config(), &CancellationToken::new(), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, AppError>(7)
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn terminal_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result: Result<(), _> = retry(&fast_config(), &CancellationToken::new(), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::AlreadyExists)
        })
        .await;
        assert!(matches!(result, Err(AppError::AlreadyExists)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_errors_exhaust_all_attempts() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result: Result<(), _> = retry(&fast_config(), &CancellationToken::new(), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(transient_error())
        })
        .await;
        assert!(matches!(
            result,
            Err(AppError::Storage(sqlx::Error::PoolTimedOut))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 4); // max_retries + 1
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result = retry(&fast_config(), &CancellationToken::new(), || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(transient_error())
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cancellation_aborts_the_backoff_wait() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let slow = RetryConfig {
            max_retries: 3,
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(30),
        };
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result: Result<(), _> = retry(&slow, &cancel, || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(transient_error())
        })
        .await;
        assert!(matches!(result, Err(AppError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn custom_predicate_overrides_classification() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result: Result<(), _> = retry_if(
            &fast_config(),
            &CancellationToken::new(),
            |err| matches!(err, AppError::Conflict),
            || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::Conflict)
            },
        )
        .await;
        assert!(matches!(result, Err(AppError::Conflict)));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn backoff_is_capped_and_jittered() {
        let cfg = RetryConfig {
            max_retries: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        };
        for attempt in 0..10 {
            let cap = Duration::from_millis(100 * (1 << attempt.min(16))).min(cfg.max_delay);
            for _ in 0..50 {
                assert!(backoff_delay(&cfg, attempt) < cap.max(Duration::from_millis(1)));
            }
        }
    }

    #[test]
    fn transient_sqlstates() {
        for code in ["08006", "08000", "25P03", "25001", "40001", "40P01", "53300", "57P01", "57P02", "57P03", "57P04"] {
            assert!(is_transient_sqlstate(code), "{code} should be transient");
        }
        for code in ["23505", "22001", "42601", "57014", "P0001"] {
            assert!(!is_transient_sqlstate(code), "{code} should be terminal");
        }
    }

    #[test]
    fn only_storage_errors_are_transient() {
        assert!(is_transient(&transient_error()));
        assert!(!is_transient(&AppError::Storage(sqlx::Error::RowNotFound)));
        assert!(!is_transient(&AppError::OptimisticLock));
        assert!(!is_transient(&AppError::AlreadyExists));
        assert!(!is_transient(&AppError::Cancelled));
    }
}
