//! The serving side: the active rule set, the per-request handler and the
//! listener.

mod server;
mod service;

use crate::config::{self, ConfigError};
use crate::matcher::CompiledRule;
use arc_swap::ArcSwap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use server::GatewayServer;
pub use service::{handle_request, serve_request, GatewayState};

/// The rule list currently being served, with the source it was loaded from.
#[derive(Debug)]
pub struct ActiveConfig {
    pub rules: Vec<CompiledRule>,
    pub source: PathBuf,
}

impl ActiveConfig {
    pub fn load(source: &Path) -> Result<Self, ConfigError> {
        let rules = config::load_rules(source)?;
        Ok(Self::from_rules(rules, source))
    }

    pub fn from_rules(rules: Vec<CompiledRule>, source: &Path) -> Self {
        Self {
            rules,
            source: source.to_path_buf(),
        }
    }
}

/// Readers see either the old or the new config, never a mix. A request keeps
/// the `Arc` it loaded until it completes.
pub type SharedConfig = Arc<ArcSwap<ActiveConfig>>;

pub fn shared_config(config: ActiveConfig) -> SharedConfig {
    Arc::new(ArcSwap::from_pointee(config))
}
