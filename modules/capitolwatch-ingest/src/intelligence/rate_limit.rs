use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Fixed-window limiter for provider calls. Owned by the intelligence
/// coordinator; no other component issues provider calls.
pub struct RateLimiter {
    max_calls: u32,
    window: Duration,
    state: Mutex<Window>,
}

struct Window {
    started: Instant,
    used: u32,
}

impl RateLimiter {
    pub fn new(max_calls: u32, window: Duration) -> Self {
        Self {
            max_calls: max_calls.max(1),
            window,
            state: Mutex::new(Window {
                started: Instant::now(),
                used: 0,
            }),
        }
    }

    pub fn per_minute(max_calls: u32) -> Self {
        Self::new(max_calls, Duration::from_secs(60))
    }

    /// Take one call slot. `false` if the current window is spent.
    pub async fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        if now.duration_since(state.started) >= self.window {
            state.started = now;
            state.used = 0;
        }
        if state.used < self.max_calls {
            state.used += 1;
            true
        } else {
            false
        }
    }

    /// Wait until a call slot is available.
    pub async fn acquire(&self) {
        loop {
            if self.try_acquire().await {
                return;
            }
            let wait = {
                let state = self.state.lock().await;
                (state.started + self.window).saturating_duration_since(Instant::now())
            };
            debug!(wait_ms = wait.as_millis() as u64, "Provider rate limit reached, waiting");
            tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn window_caps_calls() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.try_acquire().await);
        assert!(limiter.try_acquire().await);
        assert!(!limiter.try_acquire().await);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(limiter.try_acquire().await);
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_waits_for_next_window() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(60));
    }
}
