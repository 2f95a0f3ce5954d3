use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use chrono::{DateTime, Utc, Duration};

use crate::config::RateLimitSettings;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window_size: Duration,
    pub limits: HashMap<String, u32>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let mut limits = HashMap::new();
        limits.insert("standard".to_string(), 5);   // 5 requests per window
        limits.insert("premium".to_string(), 20);   // 20 requests per window

        Self {
            window_size: Duration::minutes(1),
            limits,
        }
    }
}

impl From<&RateLimitSettings> for RateLimitConfig {
    fn from(settings: &RateLimitSettings) -> Self {
        let mut limits = HashMap::new();
        limits.insert("standard".to_string(), settings.standard);
        limits.insert("premium".to_string(), settings.premium);

        Self {
            window_size: Duration::seconds(settings.window_secs),
            limits,
        }
    }
}

#[derive(Debug)]
struct RequestWindow {
    timestamps: Vec<DateTime<Utc>>,
}

impl RequestWindow {
    fn new() -> Self {
        Self {
            timestamps: Vec::new(),
        }
    }

    fn cleanup_old_requests(&mut self, window_size: Duration) {
        let cutoff = Utc::now() - window_size;
        self.timestamps.retain(|ts| *ts > cutoff);
    }

    fn add_request(&mut self) {
        self.timestamps.push(Utc::now());
    }

    fn request_count(&self) -> usize {
        self.timestamps.len()
    }
}

/// Sliding-window limiter keyed by an arbitrary string (an email, a user id).
pub struct RateLimiter {
    windows: Arc<RwLock<HashMap<String, RequestWindow>>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            windows: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Records the request and returns whether it is within the tier's limit.
    /// Unknown tiers fall back to "standard".
    pub async fn check_rate_limit(&self, key: &str, tier: &str) -> bool {
        let limit = self
            .config
            .limits
            .get(tier)
            .or_else(|| self.config.limits.get("standard"))
            .copied()
            .unwrap_or(0);

        let mut windows = self.windows.write().await;
        let window = windows.entry(key.to_string()).or_insert_with(RequestWindow::new);

        window.cleanup_old_requests(self.config.window_size);

        if window.request_count() < limit as usize {
            window.add_request();
            true
        } else {
            false
        }
    }

    pub async fn cleanup(&self) {
        let mut windows = self.windows.write().await;

        // Remove windows with no recent requests
        windows.retain(|_, window| {
            window.cleanup_old_requests(self.config.window_size);
            !window.timestamps.is_empty()
        });
    }

    pub async fn tracked_keys(&self) -> usize {
        self.windows.read().await.len()
    }
}
