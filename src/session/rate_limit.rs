use crate::{ReverieError, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// Request budget of one bucket
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimit {
    pub max_requests: usize,
    pub window: Duration,
}

impl RateLimit {
    pub const fn per_minute(max_requests: usize) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(60),
        }
    }

    pub const DEFAULT: RateLimit = RateLimit::per_minute(10);
    pub const IMAGE_GENERATION: RateLimit = RateLimit::per_minute(5);
    pub const TTS_GENERATION: RateLimit = RateLimit::per_minute(10);
    pub const ANALYSIS: RateLimit = RateLimit::per_minute(15);
    pub const IMAGE_EDIT: RateLimit = RateLimit::per_minute(5);
}

impl Default for RateLimit {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Sliding-window limiter keyed by bucket name
#[derive(Default)]
pub struct RateLimiter {
    records: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    fn prune(timestamps: &mut VecDeque<Instant>, window: Duration, now: Instant) {
        while timestamps
            .front()
            .is_some_and(|ts| now.saturating_duration_since(*ts) >= window)
        {
            timestamps.pop_front();
        }
    }

    /// Whether a request in `key` may go out now
    pub fn can_proceed(&self, key: &str, limit: RateLimit) -> bool {
        self.remaining(key, limit) > 0
    }

    pub fn record(&self, key: &str) {
        self.records
            .lock()
            .entry(key.to_string())
            .or_default()
            .push_back(Instant::now());
    }

    /// Requests left in the current window
    pub fn remaining(&self, key: &str, limit: RateLimit) -> usize {
        let now = Instant::now();
        let mut records = self.records.lock();
        match records.get_mut(key) {
            Some(timestamps) => {
                Self::prune(timestamps, limit.window, now);
                limit.max_requests.saturating_sub(timestamps.len())
            }
            None => limit.max_requests,
        }
    }

    /// Time until the oldest request in the window expires
    pub fn time_until_reset(&self, key: &str, limit: RateLimit) -> Duration {
        let now = Instant::now();
        let mut records = self.records.lock();
        let Some(timestamps) = records.get_mut(key) else {
            return Duration::ZERO;
        };
        Self::prune(timestamps, limit.window, now);
        timestamps
            .front()
            .map(|oldest| (*oldest + limit.window).saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    /// Record a request, or fail with `RateLimited` if the bucket is full
    pub fn acquire(&self, key: &str, limit: RateLimit) -> Result<()> {
        if !self.can_proceed(key, limit) {
            let wait = self.time_until_reset(key, limit);
            let retry_after_secs = (wait.as_millis() as u64).div_ceil(1000);
            warn!("Rate limit reached for {}", key);
            return Err(ReverieError::RateLimited {
                key: key.to_string(),
                retry_after_secs,
            });
        }
        self.record(key);
        Ok(())
    }

    /// Forget every recorded request
    pub fn clear(&self) {
        self.records.lock().clear();
    }
}
