//! apihub: a declaratively configured HTTP gateway.
//!
//! Incoming requests are matched against an ordered rule list and either
//! answered with a configured mock response or forwarded to an upstream with
//! path parameters substituted into the target URL. An optional per-client
//! rate limiter runs in front of matching, and the rule list can be reloaded
//! from disk without restarting the listener.

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod env_vars;
pub mod gateway;
pub mod matcher;
pub mod middleware;
pub mod proxy;
pub mod rate_limit;
pub mod reload;
pub mod response;

pub use config::{ConfigError, GatewaySettings, RateLimitConfig};
pub use gateway::{shared_config, ActiveConfig, GatewayServer, SharedConfig};
pub use matcher::{find_matching_rule, CompiledRule, MatchResult, NoMatch};
pub use rate_limit::{Admission, RateLimiter};
pub use reload::{ReloadController, ReloadOutcome, ReloadState};
