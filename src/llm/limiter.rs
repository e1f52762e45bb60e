//! Process-wide throttle for model calls.
//!
//! A counting semaphore bounds in-flight calls, and a post-call cooldown
//! must elapse before a slot is handed to the next waiter. The limiter is
//! injected into the gateway (shared via `Arc` across every document being
//! processed) rather than held as global state, so tests can substitute
//! an unthrottled one.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub struct RateLimiter {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    call_delay: Duration,
}

impl RateLimiter {
    pub fn new(max_concurrent: usize, call_delay: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            call_delay,
        }
    }

    /// No-op limiter for tests: effectively unbounded, zero cooldown.
    pub fn unthrottled() -> Self {
        Self::new(1024, Duration::ZERO)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Block until a capacity slot is free.
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("rate limiter semaphore closed")
    }

    /// Minimum spacing after a call; the caller awaits this while still
    /// holding its permit, which keeps the provider's request rate at
    /// `max_concurrent / (latency + call_delay)`.
    pub async fn cooldown(&self) {
        if self.call_delay > Duration::ZERO {
            tokio::time::sleep(self.call_delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[tokio::test]
    async fn bounds_concurrent_holders() {
        let limiter = Arc::new(RateLimiter::new(2, Duration::ZERO));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let limiter = Arc::clone(&limiter);
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let _permit = limiter.acquire().await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(
            peak.load(Ordering::SeqCst) <= 2,
            "more than 2 concurrent holders: {}",
            peak.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn cooldown_waits_at_least_the_delay() {
        let limiter = RateLimiter::new(1, Duration::from_millis(30));
        let start = Instant::now();
        limiter.cooldown().await;
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn unthrottled_has_zero_cooldown() {
        let limiter = RateLimiter::unthrottled();
        let start = Instant::now();
        limiter.cooldown().await;
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test]
    async fn permit_released_on_drop() {
        let limiter = RateLimiter::new(1, Duration::ZERO);
        let permit = limiter.acquire().await;
        drop(permit);
        // Would hang forever if the slot leaked
        let _second = limiter.acquire().await;
    }
}
