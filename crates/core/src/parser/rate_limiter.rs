//! Token bucket rate limiting for the remote filename parser.

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

/// Token bucket refilled at a constant rate.
///
/// Tokens are consumed by requests; when none are available the caller is
/// told how long to wait for the next one.
#[derive(Debug)]
pub struct TokenBucket {
    /// Max tokens (= requests per second).
    capacity: f32,
    /// Current available tokens.
    tokens: f32,
    /// Tokens added per second.
    refill_rate: f32,
    last_refill: Instant,
}

impl TokenBucket {
    /// The bucket starts full, allowing a burst up to the capacity.
    pub fn new(requests_per_second: u32) -> Self {
        let capacity = requests_per_second.max(1) as f32;
        Self {
            capacity,
            tokens: capacity,
            refill_rate: capacity,
            last_refill: Instant::now(),
        }
    }

    /// Take a token, or return how long until one is available.
    pub fn try_acquire(&mut self) -> Result<(), Duration> {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let tokens_needed = 1.0 - self.tokens;
            Err(Duration::from_secs_f32(tokens_needed / self.refill_rate))
        }
    }

    pub fn tokens_available(&mut self) -> f32 {
        self.refill();
        self.tokens
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f32();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }
}

/// Shared bucket that waits for a token instead of failing.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<TokenBucket>,
}

impl RateLimiter {
    pub fn new(requests_per_second: u32) -> Self {
        Self {
            bucket: Mutex::new(TokenBucket::new(requests_per_second)),
        }
    }

    /// Wait until a token is available and take it.
    pub async fn acquire(&self) {
        loop {
            let wait = match self.bucket.lock().await.try_acquire() {
                Ok(()) => return,
                Err(wait) => wait,
            };
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[test]
    fn test_token_bucket_new() {
        let bucket = TokenBucket::new(5);
        assert_eq!(bucket.capacity, 5.0);
        assert_eq!(bucket.tokens, 5.0);
        assert_eq!(bucket.refill_rate, 5.0);
    }

    #[test]
    fn test_zero_rate_is_clamped() {
        let mut bucket = TokenBucket::new(0);
        assert!(bucket.try_acquire().is_ok());
        assert!(bucket.try_acquire().is_err());
    }

    #[test]
    fn test_token_bucket_acquire_until_empty() {
        let mut bucket = TokenBucket::new(5);

        for _ in 0..5 {
            assert!(bucket.try_acquire().is_ok());
        }

        // At 5 rps one token takes 200ms
        let wait = bucket.try_acquire().unwrap_err();
        assert!(wait <= Duration::from_millis(200));
        assert!(wait.as_millis() > 0);
    }

    #[tokio::test]
    async fn test_token_bucket_refill() {
        let mut bucket = TokenBucket::new(10);
        for _ in 0..10 {
            bucket.try_acquire().unwrap();
        }
        assert!(bucket.tokens_available() < 1.0);

        sleep(Duration::from_millis(150)).await;
        assert!(bucket.tokens_available() >= 1.0);
    }

    #[tokio::test]
    async fn test_rate_limiter_waits_for_token() {
        let limiter = RateLimiter::new(10);
        for _ in 0..10 {
            limiter.acquire().await;
        }

        let started = Instant::now();
        limiter.acquire().await;
        assert!(started.elapsed() >= Duration::from_millis(50));
    }
}
