//! Rate-limited operation tracking
//!
//! Holds the last-call timestamp per operation key so callers can skip
//! work that ran too recently. Used to debounce back-to-back trigger
//! invocations of the same pipeline.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct OpThrottle {
    min_spacing: Duration,
    last_calls: Arc<Mutex<HashMap<String, DateTime<Utc>>>>,
}

impl OpThrottle {
    pub fn new(min_spacing_secs: u64) -> Self {
        Self {
            min_spacing: Duration::seconds(min_spacing_secs as i64),
            last_calls: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record a call for `key` unless one happened within the spacing
    /// window. Returns false when the caller should skip the operation.
    pub async fn try_acquire(&self, key: &str) -> bool {
        self.try_acquire_at(key, Utc::now()).await
    }

    pub async fn try_acquire_at(&self, key: &str, now: DateTime<Utc>) -> bool {
        let mut last_calls = self.last_calls.lock().await;

        if let Some(last) = last_calls.get(key) {
            if now.signed_duration_since(*last) < self.min_spacing {
                return false;
            }
        }

        last_calls.insert(key.to_string(), now);
        true
    }
}
