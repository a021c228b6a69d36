//! services/api/src/web/rate_limit.rs
//!
//! Short-term, per-user limit on generation requests, checked before the daily
//! quota. State lives in process memory only.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

/// A sliding-window counter of recent requests per user.
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    hits: Mutex<HashMap<Uuid, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// Records a request for `user_id` and reports whether it is within the limit.
    /// Rejected requests are not recorded.
    pub async fn try_acquire(&self, user_id: Uuid) -> bool {
        let now = Instant::now();
        let mut hits = self.hits.lock().await;

        // Forget users whose whole history has aged out.
        hits.retain(|_, times| {
            times
                .back()
                .is_some_and(|last| now.duration_since(*last) < self.window)
        });

        let times = hits.entry(user_id).or_default();
        while times
            .front()
            .is_some_and(|first| now.duration_since(*first) >= self.window)
        {
            times.pop_front();
        }

        if times.len() >= self.max_requests {
            return false;
        }
        times.push_back(now);
        true
    }
}
