use std::time::Duration;

/// Rate limiter configuration. Zero-valued fields on a caller-supplied
/// override are treated as "inherit the brand default" — never the generic global default, so a generic zero-value
/// config can never accidentally loosen a stricter provider tier.
#[derive(Clone, Copy, Debug)]
pub struct RateLimiterConfig {
    pub requests_per_second: f64,
    pub burst_capacity: f64,
    pub tokens_per_minute: u64,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub queue_timeout: Duration,
    pub min_delay: Duration,
}

impl RateLimiterConfig {
    /// Conservative process-wide fallback used only when a brand has no
    /// dedicated tier below.
    pub fn generic_default() -> Self {
        Self {
            requests_per_second: 2.0,
            burst_capacity: 4.0,
            tokens_per_minute: 40_000,
            max_retries: 5,
            retry_backoff: Duration::from_millis(500),
            queue_timeout: Duration::from_secs(30),
            min_delay: Duration::from_millis(50),
        }
    }

    /// Per-brand tiers, approximating each provider's published default
    /// rate limits. Providers not listed fall back to `generic_default`.
    pub fn for_brand(brand: &str) -> Self {
        match brand {
            "anthropic" => Self {
                requests_per_second: 5.0,
                burst_capacity: 10.0,
                tokens_per_minute: 100_000,
                max_retries: 5,
                retry_backoff: Duration::from_millis(500),
                queue_timeout: Duration::from_secs(30),
                min_delay: Duration::from_millis(20),
            },
            "bedrock" => Self {
                requests_per_second: 4.0,
                burst_capacity: 8.0,
                tokens_per_minute: 80_000,
                ..Self::generic_default()
            },
            "openai" | "azure-openai" => Self {
                requests_per_second: 3.0,
                burst_capacity: 6.0,
                tokens_per_minute: 60_000,
                ..Self::generic_default()
            },
            "gemini" => Self {
                requests_per_second: 5.0,
                burst_capacity: 5.0,
                tokens_per_minute: 120_000,
                ..Self::generic_default()
            },
            "mistral" => Self {
                requests_per_second: 2.0,
                burst_capacity: 4.0,
                tokens_per_minute: 50_000,
                ..Self::generic_default()
            },
            "ollama" => Self {
                requests_per_second: 20.0,
                burst_capacity: 20.0,
                tokens_per_minute: 1_000_000,
                max_retries: 1,
                retry_backoff: Duration::from_millis(100),
                queue_timeout: Duration::from_secs(5),
                min_delay: Duration::ZERO,
            },
            "huggingface" => Self {
                requests_per_second: 1.0,
                burst_capacity: 2.0,
                tokens_per_minute: 30_000,
                ..Self::generic_default()
            },
            _ => Self::generic_default(),
        }
    }

    /// Merges `overrides` onto `self` (the brand default): a zero-valued
    /// field in `overrides` means "inherit", any non-zero field wins.
    pub fn merge_overrides(self, overrides: RateLimiterConfig) -> Self {
        Self {
            requests_per_second: non_zero_or(overrides.requests_per_second, self.requests_per_second),
            burst_capacity: non_zero_or(overrides.burst_capacity, self.burst_capacity),
            tokens_per_minute: if overrides.tokens_per_minute == 0 {
                self.tokens_per_minute
            } else {
                overrides.tokens_per_minute
            },
            max_retries: if overrides.max_retries == 0 {
                self.max_retries
            } else {
                overrides.max_retries
            },
            retry_backoff: if overrides.retry_backoff.is_zero() {
                self.retry_backoff
            } else {
                overrides.retry_backoff
            },
            queue_timeout: if overrides.queue_timeout.is_zero() {
                self.queue_timeout
            } else {
                overrides.queue_timeout
            },
            min_delay: if overrides.min_delay.is_zero() {
                self.min_delay
            } else {
                overrides.min_delay
            },
        }
    }

    /// Convenience constructor for the "fail fast under contention" test
    /// scenario in 
    pub fn zero_queue_timeout(mut self) -> Self {
        self.queue_timeout = Duration::ZERO;
        self
    }
}

fn non_zero_or(v: f64, default: f64) -> f64 {
    if v == 0.0 {
        default
    } else {
        v
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self::generic_default()
    }
}
