//! Per-client submission rate limiter: at most one accepted attempt per window.
//!
//! Check and record happen under one lock, so two simultaneous requests from the same
//! address cannot both pass. The map is bounded: expired entries are swept, and the oldest
//! entry is evicted when the map is full of live ones.
//!
//! Eviction is intentional: a flood of distinct keys (e.g. spoofed `x-forwarded-for` values)
//! can reset another client's window, but a saturated map never turns away new clients and
//! memory stays bounded. Keys come from a client-supplied header anyway, so the limiter is a
//! courtesy throttle for the form, not an abuse barrier.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Limited { retry_after: Duration },
}

pub struct RateLimiter {
    window: Duration,
    max_entries: usize,
    last_hit: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_entries: usize) -> Self {
        Self {
            window,
            max_entries: max_entries.max(1),
            last_hit: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub async fn check_and_record(&self, key: &str) -> RateDecision {
        self.check_and_record_at(key, Instant::now()).await
    }

    /// Reject if the last accepted hit for `key` is younger than the window; otherwise
    /// record `now` as the new last hit.
    pub async fn check_and_record_at(&self, key: &str, now: Instant) -> RateDecision {
        let mut g = self.last_hit.lock().await;
        if let Some(last) = g.get(key) {
            let elapsed = now.saturating_duration_since(*last);
            if elapsed < self.window {
                return RateDecision::Limited {
                    retry_after: self.window - elapsed,
                };
            }
        } else if g.len() >= self.max_entries {
            let window = self.window;
            g.retain(|_, t| now.saturating_duration_since(*t) < window);
            if g.len() >= self.max_entries {
                if let Some(oldest) = g.iter().min_by_key(|(_, t)| **t).map(|(k, _)| k.clone()) {
                    g.remove(&oldest);
                }
            }
        }
        g.insert(key.to_string(), now);
        RateDecision::Allowed
    }

    /// Drop entries whose window has passed. Returns how many were removed.
    pub async fn evict_expired(&self, now: Instant) -> usize {
        let mut g = self.last_hit.lock().await;
        let before = g.len();
        let window = self.window;
        g.retain(|_, t| now.saturating_duration_since(*t) < window);
        before - g.len()
    }

    pub async fn len(&self) -> usize {
        self.last_hit.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
