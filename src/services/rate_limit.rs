//! Token bucket rate limiter for provider request pacing.
//!
//! Each provider pool owns one bucket; workers acquire a token before every
//! provider call. Tokens refill continuously at the configured rate, with
//! burst capacity equal to the refill rate.

use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

/// Token bucket state: available tokens plus the last refill instant,
/// guarded together so refill arithmetic is atomic.
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket rate limiter.
///
/// `tokens = min(tokens + elapsed_seconds * refill_rate, capacity)`; an
/// acquire waits until at least one token is available, then consumes it.
pub struct TokenBucket {
    bucket: Mutex<Bucket>,
    capacity: f64,
    refill_rate: f64,
}

impl TokenBucket {
    /// Create a bucket sustaining `requests_per_second`, starting full.
    pub fn new(requests_per_second: f64) -> Self {
        debug_assert!(requests_per_second > 0.0);
        Self {
            bucket: Mutex::new(Bucket {
                tokens: requests_per_second,
                last_refill: Instant::now(),
            }),
            capacity: requests_per_second,
            refill_rate: requests_per_second,
        }
    }

    /// Acquire one token, waiting as long as necessary.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
                let refilled = (bucket.tokens + elapsed * self.refill_rate).min(self.capacity);

                if refilled >= 1.0 {
                    bucket.tokens = refilled - 1.0;
                    bucket.last_refill = now;
                    return;
                }

                // Lock released before sleeping.
                let needed = 1.0 - refilled;
                Duration::from_secs_f64((needed / self.refill_rate).max(0.01))
            };
            sleep(wait).await;
        }
    }

    #[cfg(test)]
    async fn available(&self) -> f64 {
        let bucket = self.bucket.lock().await;
        let elapsed = Instant::now().duration_since(bucket.last_refill).as_secs_f64();
        (bucket.tokens + elapsed * self.refill_rate).min(self.capacity)
    }
}
