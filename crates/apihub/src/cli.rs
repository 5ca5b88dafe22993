//! Command-line definitions.

use crate::config::server::parse_duration;
use crate::config::{GatewaySettings, RateLimitConfig};
use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Declarative HTTP gateway: mock responses and upstream proxying
#[derive(Parser, Debug)]
#[command(name = "apihub")]
#[command(author, version, about)]
pub struct Cli {
    /// Default log level when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the gateway
    Serve(ServeArgs),
    /// Load the config source, print its rules and exit
    Validate {
        /// Config file or directory of config files
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        file: PathBuf,
    },
    /// Print the version
    Version,
}

// `-h` is the host flag, so help is long-only here.
#[derive(clap::Args, Debug)]
#[command(disable_help_flag = true)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,

    /// Host name or IP address to bind
    #[arg(short = 'h', long, default_value = "0.0.0.0")]
    pub host: String,

    /// Config file or directory of config files
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub file: PathBuf,

    /// Reload rules when the config source changes
    #[arg(short, long)]
    pub watch: bool,

    /// Time allowed to produce response headers, e.g. 30s or 1500ms; 0 disables
    #[arg(long, value_parser = parse_duration, default_value = "30s")]
    pub request_timeout: Duration,

    /// Maximum request body size in bytes; 0 means unlimited
    #[arg(long, default_value_t = 0)]
    pub max_request_size: u64,

    /// Enable per-client rate limiting (limits read from APIHUB_RATELIMIT and APIHUB_RATEWINDOW)
    #[arg(long)]
    pub rate_limit: bool,

    /// How long in-flight connections may run after a shutdown signal
    #[arg(long, value_parser = parse_duration, default_value = "5s")]
    pub shutdown_grace: Duration,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    pub help: Option<bool>,
}

impl ServeArgs {
    /// Resolve `--host` and `--port` to the first address they name.
    pub async fn listen_addr(&self) -> Result<SocketAddr> {
        let mut addrs = tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .with_context(|| format!("failed to resolve host '{}'", self.host))?;
        addrs
            .next()
            .with_context(|| format!("host '{}' resolved to no addresses", self.host))
    }

    pub async fn settings(&self) -> Result<GatewaySettings> {
        Ok(GatewaySettings {
            listen: self.listen_addr().await?,
            request_timeout: self.request_timeout,
            max_request_size: self.max_request_size,
            rate_limit: self.rate_limit.then(RateLimitConfig::from_env),
            shutdown_grace: self.shutdown_grace,
        })
    }
}
