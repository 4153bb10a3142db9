//! Token-bucket rate limiter
//!
//! Smooths the average outbound request rate while allowing bursts. Waiters
//! reserve a token immediately (the balance goes negative) and sleep until
//! their reservation matures, so N queued acquires pace out at `rate` per
//! second after the burst drains.
//!
//! Built on tokio time so paused-clock tests are deterministic.

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Platform API budget: ~20 requests/second sustained, bursts up to 50.
pub const DEFAULT_RATE: f64 = 20.0;
pub const DEFAULT_BURST: f64 = 50.0;

/// A token bucket with `rate` refill per second and `burst` capacity.
pub struct TokenBucket {
    rate: f64,
    burst: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    /// May go negative while reservations are outstanding
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(rate: f64, burst: f64) -> Self {
        assert!(rate > 0.0, "rate must be positive");
        assert!(burst >= 1.0, "burst must allow at least one token");
        Self {
            rate,
            burst,
            state: Mutex::new(BucketState {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one token, waiting for the refill when the bucket is drained.
    pub async fn acquire(&self) {
        let deadline = {
            let mut state = self.state.lock().expect("bucket lock");
            let now = Instant::now();
            let elapsed = now.duration_since(state.last_refill).as_secs_f64();
            state.tokens = (state.tokens + elapsed * self.rate).min(self.burst);
            state.last_refill = now;

            if state.tokens >= 1.0 {
                state.tokens -= 1.0;
                return;
            }

            // Reserve now; the wait covers the deficit for this token.
            let wait = Duration::from_secs_f64((1.0 - state.tokens) / self.rate);
            state.tokens -= 1.0;
            now + wait
        };

        tokio::time::sleep_until(deadline).await;
    }
}

impl Default for TokenBucket {
    fn default() -> Self {
        Self::new(DEFAULT_RATE, DEFAULT_BURST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_immediate() {
        let bucket = TokenBucket::new(20.0, 50.0);
        let start = Instant::now();
        for _ in 0..50 {
            bucket.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drained_bucket_paces_at_rate() {
        let bucket = TokenBucket::new(20.0, 50.0);
        for _ in 0..50 {
            bucket.acquire().await;
        }

        let start = Instant::now();
        for _ in 0..40 {
            bucket.acquire().await;
        }
        // 40 tokens at 20/s
        let elapsed = start.elapsed().as_secs_f64();
        assert!((elapsed - 2.0).abs() < 0.2, "elapsed {elapsed}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_200_calls_complete_near_expected_schedule() {
        // Burst of 50 immediate, remaining 150 paced at 20/s: ~7.5s total
        let bucket = std::sync::Arc::new(TokenBucket::new(20.0, 50.0));
        let start = Instant::now();

        let tasks: Vec<_> = (0..200)
            .map(|_| {
                let bucket = bucket.clone();
                async move { bucket.acquire().await }
            })
            .collect();
        futures::future::join_all(tasks).await;

        let elapsed = start.elapsed().as_secs_f64();
        assert!(
            (elapsed - 7.5).abs() < 0.75,
            "expected ~7.5s, got {elapsed}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_caps_at_burst() {
        let bucket = TokenBucket::new(20.0, 50.0);
        for _ in 0..50 {
            bucket.acquire().await;
        }
        // A long idle period must not accumulate more than `burst` tokens
        tokio::time::sleep(Duration::from_secs(3600)).await;

        let start = Instant::now();
        for _ in 0..50 {
            bucket.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);

        let start = Instant::now();
        bucket.acquire().await;
        assert!(start.elapsed() > Duration::ZERO);
    }
}
