//! Per-client admission control.
//!
//! Each client key owns one entry `{count, last_seen}`. A request is admitted
//! when the entry is missing or its window has elapsed (the entry resets to
//! count 1), or while the count is still under the limit. Every admitted
//! request refreshes `last_seen`, so a client that keeps sending never sees
//! its window reset. Rejected requests change nothing.
//!
//! All reads and writes of the table happen under one lock, so concurrent
//! requests from the same client never admit more than the limit allows.

use crate::config::RateLimitConfig;
use hyper::HeaderMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Rejected,
}

#[derive(Debug, Clone, Copy)]
struct RateLimitEntry {
    count: u32,
    last_seen: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    entries: Mutex<HashMap<String, RateLimitEntry>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn admit(&self, key: &str) -> Admission {
        self.admit_at(key, Instant::now())
    }

    /// Admission decision for `key` at a caller-supplied instant.
    pub fn admit_at(&self, key: &str, now: Instant) -> Admission {
        let mut entries = self.entries.lock();

        if entries.len() > self.config.max_clients {
            let removed = sweep_expired(&mut entries, now, self.config.window);
            if removed > 0 {
                debug!(removed, remaining = entries.len(), "swept expired rate limit entries");
            }
        }

        if let Some(entry) = entries.get_mut(key) {
            if now.saturating_duration_since(entry.last_seen) > self.config.window {
                entry.count = 1;
            } else if entry.count >= self.config.max_requests {
                return Admission::Rejected;
            } else {
                entry.count += 1;
            }
            entry.last_seen = now;
            return Admission::Admitted;
        }

        entries.insert(
            key.to_string(),
            RateLimitEntry {
                count: 1,
                last_seen: now,
            },
        );
        Admission::Admitted
    }

    /// Drop entries whose window has already elapsed. Returns how many were removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut entries = self.entries.lock();
        sweep_expired(&mut entries, now, self.config.window)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

fn sweep_expired(
    entries: &mut HashMap<String, RateLimitEntry>,
    now: Instant,
    window: Duration,
) -> usize {
    let before = entries.len();
    entries.retain(|_, entry| now.saturating_duration_since(entry.last_seen) <= window);
    before - entries.len()
}

/// Identify the client: `Origin`, then the first `X-Forwarded-For` entry,
/// then `X-Real-IP`, then the peer IP.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(origin) = header("origin") {
        return origin.to_string();
    }
    if let Some(first) = header("x-forwarded-for")
        .and_then(|xff| xff.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return first.to_string();
    }
    if let Some(real_ip) = header("x-real-ip") {
        return real_ip.to_string();
    }
    peer.map(|addr| addr.ip().to_string()).unwrap_or_default()
}
