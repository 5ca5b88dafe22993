//! Runtime settings for the serving side of the gateway.

use crate::env_vars;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_RATE_LIMIT_REQUESTS: u32 = 10;
pub const DEFAULT_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(10);
pub const DEFAULT_RATE_LIMIT_MAX_CLIENTS: usize = 10_000;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Per-client admission limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
    /// Table size past which expired entries are swept on admission.
    pub max_clients: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_RATE_LIMIT_REQUESTS,
            window: DEFAULT_RATE_LIMIT_WINDOW,
            max_clients: DEFAULT_RATE_LIMIT_MAX_CLIENTS,
        }
    }
}

impl RateLimitConfig {
    /// Read limits from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read limits through `lookup`, falling back to defaults for values that
    /// are absent, unparsable or zero.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let max_requests = lookup(env_vars::RATE_LIMIT_REQUESTS)
            .and_then(|raw| parse_positive(env_vars::RATE_LIMIT_REQUESTS, &raw, |s| s.parse().ok()))
            .unwrap_or(DEFAULT_RATE_LIMIT_REQUESTS);

        let window = lookup(env_vars::RATE_LIMIT_WINDOW)
            .and_then(|raw| {
                parse_positive(env_vars::RATE_LIMIT_WINDOW, &raw, |s| {
                    parse_duration(s).ok().filter(|d| !d.is_zero())
                })
            })
            .unwrap_or(DEFAULT_RATE_LIMIT_WINDOW);

        let max_clients = lookup(env_vars::RATE_LIMIT_MAX_CLIENTS)
            .and_then(|raw| {
                parse_positive(env_vars::RATE_LIMIT_MAX_CLIENTS, &raw, |s| {
                    s.parse::<usize>().ok().filter(|n| *n > 0)
                })
            })
            .unwrap_or(DEFAULT_RATE_LIMIT_MAX_CLIENTS);

        Self {
            max_requests,
            window,
            max_clients,
        }
    }
}

fn parse_positive<T, F>(name: &str, raw: &str, parse: F) -> Option<T>
where
    F: Fn(&str) -> Option<T>,
    T: PartialEq + Default,
{
    match parse(raw.trim()) {
        Some(value) if value != T::default() => Some(value),
        _ => {
            warn!(variable = name, value = raw, "ignoring invalid value, using default");
            None
        }
    }
}

/// Everything the listener and the core service need at runtime.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub listen: SocketAddr,
    pub request_timeout: Duration,
    /// Maximum inbound body size in bytes; 0 means unlimited.
    pub max_request_size: u64,
    /// `None` disables rate limiting.
    pub rate_limit: Option<RateLimitConfig>,
    pub shutdown_grace: Duration,
}

impl GatewaySettings {
    pub fn new(listen: SocketAddr) -> Self {
        Self {
            listen,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_request_size: 0,
            rate_limit: None,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

/// Parse a duration written as `<number><unit>` where unit is one of
/// `ms`, `s`, `m`, `h`. Units may be chained (`1m30s`). A bare number is seconds.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty duration".to_string());
    }
    if let Ok(secs) = input.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = input;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .ok_or_else(|| format!("missing unit in duration '{input}'"))?;
        if digits == 0 {
            return Err(format!("invalid duration '{input}'"));
        }
        let value: f64 = rest[..digits]
            .parse()
            .map_err(|_| format!("invalid number in duration '{input}'"))?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(rest.len());
        let millis_per_unit = match &rest[..unit_len] {
            "ms" => 1.0,
            "s" => 1_000.0,
            "m" => 60_000.0,
            "h" => 3_600_000.0,
            unit => return Err(format!("unknown unit '{unit}' in duration '{input}'")),
        };
        rest = &rest[unit_len..];
        let part = Duration::try_from_secs_f64(value * millis_per_unit / 1_000.0)
            .map_err(|_| format!("duration '{input}' is out of range"))?;
        total = total
            .checked_add(part)
            .ok_or_else(|| format!("duration '{input}' is out of range"))?;
    }
    Ok(total)
}
