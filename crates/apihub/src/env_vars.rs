//! Environment variable names read by apihub.

/// Rate limiting configuration
pub const RATE_LIMIT_REQUESTS: &str = "APIHUB_RATELIMIT";
pub const RATE_LIMIT_WINDOW: &str = "APIHUB_RATEWINDOW";
pub const RATE_LIMIT_MAX_CLIENTS: &str = "APIHUB_RATE_MAX_CLIENTS";

/// Get all environment variable names for documentation/validation
pub fn all_env_vars() -> &'static [&'static str] {
    &[
        RATE_LIMIT_REQUESTS,
        RATE_LIMIT_WINDOW,
        RATE_LIMIT_MAX_CLIENTS,
    ]
}
