//! Rule document loading and validation.
//!
//! A config source is a single YAML/JSON file or a directory of them. Every
//! rule is compiled into a [`CompiledRule`] while loading, so a config that
//! loads successfully never fails later at match time.

pub mod rules;
pub mod server;

use crate::matcher::CompiledRule;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub use rules::{MockResponse, ProxyTarget, RequestMatch, RuleConfig};
pub use server::{GatewaySettings, RateLimitConfig};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
    #[error("unsupported config format for {0} (expected .yaml, .yml or .json)")]
    UnsupportedFormat(PathBuf),
    #[error("invalid rule #{index} in {path}: {reason}")]
    InvalidRule {
        index: usize,
        path: PathBuf,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Json,
}

impl Format {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Some(Format::Yaml),
            Some("json") => Some(Format::Json),
            _ => None,
        }
    }
}

/// Parse a rule document. A blank document (such as a file caught halfway
/// through a save) is an error; an explicit `[]` yields no rules.
pub fn parse_document(text: &str, format: Format) -> Result<Vec<RuleConfig>, String> {
    if text.trim().is_empty() {
        return Err("empty document".to_string());
    }
    match format {
        Format::Yaml => serde_yaml::from_str(text).map_err(|e| e.to_string()),
        Format::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
    }
}

/// Load and compile every rule of one file. Any invalid rule fails the file.
pub fn load_file(path: &Path) -> Result<Vec<CompiledRule>, ConfigError> {
    let format =
        Format::from_path(path).ok_or_else(|| ConfigError::UnsupportedFormat(path.to_path_buf()))?;
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let documents = parse_document(&text, format).map_err(|reason| ConfigError::Parse {
        path: path.to_path_buf(),
        reason,
    })?;

    documents
        .iter()
        .enumerate()
        .map(|(index, rule)| {
            CompiledRule::compile(rule).map_err(|reason| ConfigError::InvalidRule {
                index,
                path: path.to_path_buf(),
                reason,
            })
        })
        .collect()
}

/// Load every rule file of a directory in file-name order. Files that fail to
/// load are logged and skipped.
pub fn load_directory(dir: &Path) -> Result<Vec<CompiledRule>, ConfigError> {
    let io_error = |source| ConfigError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error)? {
        let path = entry.map_err(io_error)?.path();
        if path.is_file() && Format::from_path(&path).is_some() {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    let mut compiled = Vec::new();
    for file in files {
        match load_file(&file) {
            Ok(rules) => {
                debug!(file = %file.display(), rules = rules.len(), "loaded rule file");
                compiled.extend(rules);
            }
            Err(e) => warn!(file = %file.display(), error = %e, "skipping rule file"),
        }
    }
    Ok(compiled)
}

/// Load a config source, which may be a single file or a directory.
pub fn load_rules(path: &Path) -> Result<Vec<CompiledRule>, ConfigError> {
    let metadata = fs::metadata(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if metadata.is_dir() {
        load_directory(path)
    } else {
        load_file(path)
    }
}
