//! Per-provider request-rate governor.
//!
//! One [`RateLimiter`] instance is shared by every client of a given
//! provider brand; `providers()` (a process-global keyed map) lazily
//! creates and memoizes one per brand the first time it is asked for.

mod bucket;
mod config;
mod error;

pub use config::RateLimiterConfig;
pub use error::RateLimiterError;

use bucket::TokenBucket;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Governs request/token admission and retry/backoff for one provider brand.
///
/// Two token buckets (requests-per-second, tokens-per-minute) gate
/// admission; a bounded FIFO wait enforces `QueueTimeout`; `Do` wraps
/// admission + the caller's closure in a retry loop with exponential
/// backoff on retryable errors.
pub struct RateLimiter {
    config: RateLimiterConfig,
    requests: Mutex<TokenBucket>,
    tokens: Mutex<TokenBucket>,
    last_admission: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        let requests = TokenBucket::new(config.requests_per_second, config.burst_capacity);
        // Tokens-per-minute bucket refills continuously; convert to a per-second rate.
        let tpm_per_sec = config.tokens_per_minute as f64 / 60.0;
        let tokens = TokenBucket::new(tpm_per_sec, config.tokens_per_minute as f64);
        Self {
            config,
            requests: Mutex::new(requests),
            tokens: Mutex::new(tokens),
            last_admission: Mutex::new(None),
        }
    }

    /// Runs `op` under admission control, retrying retryable failures with
    /// exponential backoff up to `MaxRetries`. Cancelling `cancel` aborts
    /// admission or an in-progress backoff wait at the next checkpoint and
    /// returns `RateLimiterError::Cancelled`; it does not interrupt `op`
    /// itself once it has started.
    pub async fn r#do<F, Fut, T>(&self, cancel: &CancellationToken, mut op: F) -> Result<T, RateLimiterError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, RateLimiterError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            self.admit(cancel).await?;
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let backoff = self.backoff_duration(attempt);
                    warn!(attempt, ?backoff, "retrying after retryable provider error");
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = cancel.cancelled() => return Err(RateLimiterError::Cancelled),
                    }
                    attempt += 1;
                }
                Err(e) if e.is_retryable() => return Err(RateLimiterError::RetriesExhausted),
                Err(e) => return Err(e),
            }
        }
    }

    /// Debits the token budget after a successful response.
    pub async fn record_token_usage(&self, n: u64) {
        self.tokens.lock().await.debit(n as f64);
    }

    fn backoff_duration(&self, attempt: u32) -> Duration {
        let base = self.config.retry_backoff.as_millis() as u64;
        let capped_exp = attempt.min(20);
        let millis = base.saturating_mul(1u64 << capped_exp).min(60_000);
        let jitter_ms = rand::thread_rng().gen_range(0..=(millis / 4).max(1));
        Duration::from_millis(millis + jitter_ms)
    }

    /// Admits one unit of work: waits for both buckets and the minimum
    /// inter-call spacing, bounded by `QueueTimeout`. Returns
    /// `RateLimiterError::Cancelled` if `cancel` fires first.
    async fn admit(&self, cancel: &CancellationToken) -> Result<(), RateLimiterError> {
        let fut = async {
            loop {
                let tokens_available = self.tokens.lock().await.has_available();
                if tokens_available {
                    let mut req = self.requests.lock().await;
                    if req.try_take(1.0) {
                        drop(req);
                        break;
                    }
                }
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(10)) => {}
                    _ = cancel.cancelled() => return Err(RateLimiterError::Cancelled),
                }
            }
            let mut last = self.last_admission.lock().await;
            if let Some(prev) = *last {
                let elapsed = prev.elapsed();
                if elapsed < self.config.min_delay {
                    tokio::time::sleep(self.config.min_delay - elapsed).await;
                }
            }
            *last = Some(Instant::now());
            Ok::<(), RateLimiterError>(())
        };

        if self.config.queue_timeout.is_zero() {
            // QueueTimeout=0 means any contention fails immediately.
            if cancel.is_cancelled() {
                return Err(RateLimiterError::Cancelled);
            }
            if !self.tokens.lock().await.has_available() {
                return Err(RateLimiterError::QueueTimeout);
            }
            let mut req = self.requests.lock().await;
            return if req.try_take(1.0) {
                debug!("admitted with zero queue timeout");
                Ok(())
            } else {
                Err(RateLimiterError::QueueTimeout)
            };
        }

        tokio::select! {
            r = timeout(self.config.queue_timeout, fut) => match r {
                Ok(r) => r,
                Err(_) => Err(RateLimiterError::QueueTimeout),
            },
            _ = cancel.cancelled() => Err(RateLimiterError::Cancelled),
        }
    }
}

/// Process-wide singleton map, one `RateLimiter` per provider brand.
///
/// Caller overrides merge into brand defaults only on the *first*
/// `Once`-style construction per brand; later callers with different
/// configs silently receive the first caller's limiter — see DESIGN.md
/// for the tradeoff.
static LIMITERS: OnceLock<Mutex<HashMap<String, Arc<RateLimiter>>>> = OnceLock::new();

fn registry() -> &'static Mutex<HashMap<String, Arc<RateLimiter>>> {
    LIMITERS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Returns the shared limiter for `brand`, creating it from `defaults`
/// merged with `overrides` (non-zero override fields win) the first time
/// this brand is requested in the process.
pub async fn limiter_for_brand(brand: &str, overrides: RateLimiterConfig) -> Arc<RateLimiter> {
    let mut map = registry().lock().await;
    if let Some(existing) = map.get(brand) {
        return Arc::clone(existing);
    }
    let defaults = RateLimiterConfig::for_brand(brand);
    let merged = defaults.merge_overrides(overrides);
    let limiter = Arc::new(RateLimiter::new(merged));
    map.insert(brand.to_string(), Arc::clone(&limiter));
    limiter
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn depleted_token_bucket_blocks_admission_until_queue_timeout() {
        let cfg = RateLimiterConfig {
            requests_per_second: 1000.0,
            burst_capacity: 1000.0,
            tokens_per_minute: 60, // 1 token/sec refill, capacity 60
            max_retries: 0,
            retry_backoff: Duration::from_millis(1),
            queue_timeout: Duration::from_millis(50),
            min_delay: Duration::ZERO,
        };
        let limiter = RateLimiter::new(cfg);
        let cancel = CancellationToken::new();
        // Debit far past the bucket's capacity so it has no available budget.
        limiter.record_token_usage(10_000).await;
        let err = limiter.admit(&cancel).await.unwrap_err();
        assert!(matches!(err, RateLimiterError::QueueTimeout));
    }

    #[tokio::test]
    async fn zero_queue_timeout_fails_fast_when_token_budget_depleted() {
        let cfg = RateLimiterConfig {
            requests_per_second: 1000.0,
            burst_capacity: 1000.0,
            tokens_per_minute: 60,
            max_retries: 0,
            retry_backoff: Duration::from_millis(1),
            queue_timeout: Duration::ZERO,
            min_delay: Duration::ZERO,
        };
        let limiter = RateLimiter::new(cfg);
        let cancel = CancellationToken::new();
        limiter.record_token_usage(10_000).await;
        let err = limiter.admit(&cancel).await.unwrap_err();
        assert!(matches!(err, RateLimiterError::QueueTimeout));
    }

    #[tokio::test]
    async fn zero_queue_timeout_fails_fast_under_contention() {
        let cfg = RateLimiterConfig {
            requests_per_second: 0.001,
            burst_capacity: 1.0,
            tokens_per_minute: 1_000_000,
            max_retries: 0,
            retry_backoff: Duration::from_millis(1),
            queue_timeout: Duration::ZERO,
            min_delay: Duration::ZERO,
        };
        let limiter = RateLimiter::new(cfg);
        let cancel = CancellationToken::new();
        limiter.admit(&cancel).await.expect("first admission succeeds");
        let err = limiter.admit(&cancel).await.unwrap_err();
        assert!(matches!(err, RateLimiterError::QueueTimeout));
    }

    #[tokio::test]
    async fn admit_fails_with_cancelled_when_token_fires() {
        let cfg = RateLimiterConfig {
            requests_per_second: 0.001,
            burst_capacity: 0.0,
            tokens_per_minute: 1_000_000,
            max_retries: 0,
            retry_backoff: Duration::from_millis(1),
            queue_timeout: Duration::from_secs(5),
            min_delay: Duration::ZERO,
        };
        let limiter = RateLimiter::new(cfg);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = limiter.admit(&cancel).await.unwrap_err();
        assert!(matches!(err, RateLimiterError::Cancelled));
    }

    #[tokio::test]
    async fn retries_exhausted_after_max_retries() {
        let cfg = RateLimiterConfig {
            requests_per_second: 1000.0,
            burst_capacity: 1000.0,
            tokens_per_minute: 1_000_000,
            max_retries: 2,
            retry_backoff: Duration::from_millis(1),
            queue_timeout: Duration::from_secs(5),
            min_delay: Duration::ZERO,
        };
        let limiter = RateLimiter::new(cfg);
        let cancel = CancellationToken::new();
        let result: Result<(), RateLimiterError> = limiter
            .r#do(&cancel, || async { Err(RateLimiterError::Retryable("429".into())) })
            .await;
        assert!(matches!(result, Err(RateLimiterError::RetriesExhausted)));
    }

    #[tokio::test]
    async fn non_retryable_error_returns_immediately() {
        let cfg = RateLimiterConfig::for_brand("anthropic");
        let limiter = RateLimiter::new(cfg);
        let cancel = CancellationToken::new();
        let mut calls = 0;
        let result: Result<(), RateLimiterError> = limiter
            .r#do(&cancel, || {
                calls += 1;
                async { Err(RateLimiterError::NonRetryable("bad request".into())) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
