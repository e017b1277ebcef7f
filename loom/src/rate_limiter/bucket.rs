use std::time::Instant;

/// A simple leaky/token bucket refilled continuously at `rate` units/sec,
/// capped at `capacity`. Used for both the requests-per-second ceiling and
/// the tokens-per-minute budget (expressed as a per-second rate).
pub struct TokenBucket {
    rate_per_sec: f64,
    capacity: f64,
    available: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(rate_per_sec: f64, capacity: f64) -> Self {
        Self {
            rate_per_sec,
            capacity,
            available: capacity,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let elapsed = self.last_refill.elapsed().as_secs_f64();
        self.available = (self.available + elapsed * self.rate_per_sec).min(self.capacity);
        self.last_refill = Instant::now();
    }

    /// Attempts to take `n` units; returns `true` and debits on success.
    pub fn try_take(&mut self, n: f64) -> bool {
        self.refill();
        if self.available >= n {
            self.available -= n;
            true
        } else {
            false
        }
    }

    /// Refills and reports whether any budget remains, without debiting.
    /// Used to gate admission on a bucket whose real debit only happens
    /// post-hoc (`debit`), once the actual usage is known.
    pub fn has_available(&mut self) -> bool {
        self.refill();
        self.available > 0.0
    }

    /// Unconditionally debits `n` units (may go negative; used for
    /// post-hoc token accounting once the provider reports real usage).
    pub fn debit(&mut self, n: f64) {
        self.refill();
        self.available -= n;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausts_then_refills_over_time() {
        let mut b = TokenBucket::new(1000.0, 2.0);
        assert!(b.try_take(2.0));
        assert!(!b.try_take(1.0));
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(b.try_take(1.0));
    }
}
