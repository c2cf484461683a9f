use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Sliding-window limiter: at most `max_per_interval` permits in any
/// `interval`.
pub struct RateLimiter {
    max_per_interval: usize,
    interval: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_per_interval: usize, interval: Duration) -> Self {
        RateLimiter {
            max_per_interval: max_per_interval.max(1),
            interval,
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    pub fn per_second(max: usize) -> Self {
        Self::new(max, Duration::from_secs(1))
    }

    /// Records `permits` if they fit in the current window.
    pub fn try_acquire(&self, permits: usize) -> bool {
        self.reserve(permits, Instant::now()).is_none()
    }

    /// Waits until `permits` fit in the window, then records them. Requests
    /// larger than the window capacity are clamped to it.
    pub async fn acquire(&self, permits: usize) {
        loop {
            match self.reserve(permits, Instant::now()) {
                None => return,
                Some(wait) => {
                    tracing::debug!("Rate limit reached, waiting {:?}", wait);
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// `None` when recorded, otherwise how long until enough slots free up.
    fn reserve(&self, permits: usize, now: Instant) -> Option<Duration> {
        let permits = permits.clamp(1, self.max_per_interval);
        let mut timestamps = self.timestamps.lock().unwrap_or_else(|e| e.into_inner());

        // Remove old timestamps
        while let Some(&front) = timestamps.front() {
            if now.duration_since(front) >= self.interval {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        let overflow = (timestamps.len() + permits).saturating_sub(self.max_per_interval);
        if overflow == 0 {
            timestamps.extend(std::iter::repeat(now).take(permits));
            return None;
        }

        // the overflow-th oldest slot has to expire first
        let release_at = timestamps[overflow - 1] + self.interval;
        Some(release_at.saturating_duration_since(now).max(Duration::from_millis(1)))
    }

    pub fn in_window(&self) -> usize {
        self.timestamps.lock().map(|t| t.len()).unwrap_or(0)
    }
}
