//! Hot reload of the rule set.
//!
//! A file-system watcher feeds change events into a channel. The
//! [`ReloadController`] drains that channel on its own task, drops events that
//! arrive within the debounce interval of the last accepted one, re-parses the
//! config source off the async runtime and swaps the result into the shared
//! config. A failed parse leaves the previous rule set serving and does not
//! start a debounce interval, so the write that follows a truncating save is
//! still picked up.
//!
//! States: `Idle -> Reloading -> Idle`, with the debounce decision made on
//! the event itself. `WatchFailed` is terminal.
//!
//! The listener is never touched: requests already in flight finish against
//! the config they loaded, new requests see the new one.

use crate::config::{ConfigError, Format};
use crate::gateway::{ActiveConfig, SharedConfig};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub const DEBOUNCE_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadState {
    Idle,
    Reloading,
    /// The event channel closed; the last loaded config keeps serving.
    WatchFailed,
}

#[derive(Debug)]
pub enum ReloadOutcome {
    Applied { rules: usize },
    Rejected(ConfigError),
    Dropped,
}

pub type WatchEvents = mpsc::UnboundedReceiver<notify::Result<Event>>;

pub struct ReloadController {
    config: SharedConfig,
    source: PathBuf,
    debounce: Duration,
    last_accepted: Option<Instant>,
    state: ReloadState,
}

impl ReloadController {
    pub fn new(config: SharedConfig, source: impl Into<PathBuf>) -> Self {
        Self {
            config,
            source: source.into(),
            debounce: DEBOUNCE_INTERVAL,
            last_accepted: None,
            state: ReloadState::Idle,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn state(&self) -> ReloadState {
        self.state
    }

    /// Debounce decision for a change seen at `now`. Returns true and moves to
    /// `Reloading` when the change should be acted on.
    pub fn accept_event(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_accepted {
            if now.saturating_duration_since(last) < self.debounce {
                return false;
            }
        }
        self.last_accepted = Some(now);
        self.state = ReloadState::Reloading;
        true
    }

    /// Publish a freshly loaded config, or keep the current one if loading failed.
    pub fn apply(&mut self, loaded: Result<ActiveConfig, ConfigError>) -> ReloadOutcome {
        let outcome = match loaded {
            Ok(config) => {
                let rules = config.rules.len();
                self.config.store(Arc::new(config));
                info!(source = %self.source.display(), rules, "configuration reloaded");
                ReloadOutcome::Applied { rules }
            }
            Err(e) => {
                error!(error = %e, "configuration reload failed, keeping previous rules");
                self.last_accepted = None;
                ReloadOutcome::Rejected(e)
            }
        };
        self.state = ReloadState::Idle;
        outcome
    }

    /// Re-parse the source without debouncing.
    pub async fn reload_now(&mut self) -> ReloadOutcome {
        self.state = ReloadState::Reloading;
        let source = self.source.clone();
        let loaded = tokio::task::spawn_blocking(move || ActiveConfig::load(&source))
            .await
            .unwrap_or_else(|e| {
                Err(ConfigError::Io {
                    path: self.source.clone(),
                    source: std::io::Error::other(e.to_string()),
                })
            });
        self.apply(loaded)
    }

    pub async fn on_change(&mut self, now: Instant) -> ReloadOutcome {
        if !self.accept_event(now) {
            debug!("config change within debounce interval, ignored");
            return ReloadOutcome::Dropped;
        }
        self.reload_now().await
    }

    /// Whether `event` concerns the config source.
    pub fn is_relevant(&self, event: &Event) -> bool {
        let kind = &event.kind;
        if !(kind.is_modify() || kind.is_create() || kind.is_remove()) {
            return false;
        }
        if self.source.is_dir() {
            return event
                .paths
                .iter()
                .any(|path| Format::from_path(path).is_some());
        }
        let Some(name) = self.source.file_name() else {
            return false;
        };
        event
            .paths
            .iter()
            .any(|path| path.file_name() == Some(name))
    }

    /// Process watch events until the channel closes.
    pub async fn run(mut self, mut events: WatchEvents) -> ReloadState {
        while let Some(event) = events.recv().await {
            match event {
                Ok(event) if self.is_relevant(&event) => {
                    debug!(kind = ?event.kind, "config change detected");
                    self.on_change(Instant::now()).await;
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "config watch error"),
            }
        }
        self.state = ReloadState::WatchFailed;
        error!("config watch channel closed, hot reload disabled");
        self.state
    }
}

/// Start watching `source`. A file is watched through its parent directory
/// so that editors which replace the file on save are still observed.
///
/// The returned watcher must be kept alive; dropping it closes the channel.
pub fn watch_config(source: &Path) -> notify::Result<(RecommendedWatcher, WatchEvents)> {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let _ = tx.send(res);
    })?;

    let target = if source.is_dir() {
        source.to_path_buf()
    } else {
        match source.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    };
    watcher.watch(&target, RecursiveMode::NonRecursive)?;
    info!(path = %target.display(), "watching configuration for changes");
    Ok((watcher, rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::shared_config;
    use notify::event::{CreateKind, DataChange, EventKind, ModifyKind};
    use std::fs;
    use tempfile::TempDir;

    const PING: &str = "- request: { method: GET, path: /ping }\n  response: { body: pong }\n";
    const PING_AND_USERS: &str = "- request: { method: GET, path: /ping }\n  response: { body: pong }\n- request: { method: GET, path: /users }\n  response: { body: users }\n";

    fn setup(contents: &str) -> (TempDir, PathBuf, SharedConfig) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rules.yaml");
        fs::write(&path, contents).unwrap();
        let config = shared_config(ActiveConfig::load(&path).unwrap());
        (dir, path, config)
    }

    fn modify(path: &Path) -> Event {
        Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content))).add_path(path.to_path_buf())
    }

    #[test]
    fn test_debounce_drops_rapid_events() {
        let (_dir, path, config) = setup(PING);
        let mut controller = ReloadController::new(config, path);
        let t0 = Instant::now();

        assert!(controller.accept_event(t0));
        assert_eq!(controller.state(), ReloadState::Reloading);

        assert!(!controller.accept_event(t0 + Duration::from_millis(100)));

        // Measured from the last accepted event, not the dropped one.
        assert!(controller.accept_event(t0 + Duration::from_millis(550)));
    }

    #[test]
    fn test_first_event_is_accepted() {
        let (_dir, path, config) = setup(PING);
        let mut controller = ReloadController::new(config, path);
        assert!(controller.accept_event(Instant::now()));
    }

    #[tokio::test]
    async fn test_valid_edit_swaps_rules() {
        let (_dir, path, config) = setup(PING_AND_USERS);
        assert_eq!(config.load().rules.len(), 2);

        let mut controller = ReloadController::new(Arc::clone(&config), path.clone());
        fs::write(&path, PING).unwrap();

        let outcome = controller.on_change(Instant::now()).await;
        assert!(matches!(outcome, ReloadOutcome::Applied { rules: 1 }));
        assert_eq!(config.load().rules.len(), 1);
        assert_eq!(controller.state(), ReloadState::Idle);
    }

    #[tokio::test]
    async fn test_broken_edit_keeps_previous_rules() {
        let (_dir, path, config) = setup(PING_AND_USERS);
        let mut controller = ReloadController::new(Arc::clone(&config), path.clone());

        fs::write(&path, "- request: [broken").unwrap();
        let outcome = controller.on_change(Instant::now()).await;

        assert!(matches!(outcome, ReloadOutcome::Rejected(ConfigError::Parse { .. })));
        assert_eq!(config.load().rules.len(), 2);
        assert_eq!(controller.state(), ReloadState::Idle);
    }

    #[tokio::test]
    async fn test_truncating_save_keeps_rules_and_takes_next_write() {
        let (_dir, path, config) = setup(PING_AND_USERS);
        let mut controller = ReloadController::new(Arc::clone(&config), path.clone());
        let t0 = Instant::now();

        fs::write(&path, "").unwrap();
        let outcome = controller.on_change(t0).await;
        assert!(matches!(outcome, ReloadOutcome::Rejected(ConfigError::Parse { .. })));
        assert_eq!(config.load().rules.len(), 2);

        // The real write lands well inside the debounce interval.
        fs::write(&path, PING).unwrap();
        let outcome = controller.on_change(t0 + Duration::from_millis(50)).await;
        assert!(matches!(outcome, ReloadOutcome::Applied { rules: 1 }));
        assert_eq!(config.load().rules.len(), 1);
    }

    #[tokio::test]
    async fn test_applied_reload_still_debounces() {
        let (_dir, path, config) = setup(PING_AND_USERS);
        let mut controller = ReloadController::new(Arc::clone(&config), path.clone());
        let t0 = Instant::now();

        fs::write(&path, PING).unwrap();
        assert!(matches!(controller.on_change(t0).await, ReloadOutcome::Applied { rules: 1 }));

        fs::write(&path, PING_AND_USERS).unwrap();
        let outcome = controller.on_change(t0 + Duration::from_millis(50)).await;
        assert!(matches!(outcome, ReloadOutcome::Dropped));
        assert_eq!(config.load().rules.len(), 1);
    }

    #[tokio::test]
    async fn test_rule_without_behavior_is_rejected() {
        let (_dir, path, config) = setup(PING);
        let mut controller = ReloadController::new(Arc::clone(&config), path.clone());

        fs::write(&path, "- request: { method: GET, path: /ping }\n").unwrap();
        let outcome = controller.reload_now().await;

        assert!(matches!(outcome, ReloadOutcome::Rejected(ConfigError::InvalidRule { .. })));
        assert_eq!(config.load().rules.len(), 1);
    }

    #[test]
    fn test_relevance_filter() {
        let (_dir, path, config) = setup(PING);
        let controller = ReloadController::new(config, path.clone());

        assert!(controller.is_relevant(&modify(&path)));
        assert!(!controller.is_relevant(&modify(&path.with_file_name("other.yaml"))));
        assert!(controller.is_relevant(
            &Event::new(EventKind::Create(CreateKind::File)).add_path(path.clone())
        ));
        assert!(!controller.is_relevant(&Event::new(EventKind::Any).add_path(path)));
    }

    #[tokio::test]
    async fn test_run_applies_events_and_reports_closed_channel() {
        let (_dir, path, config) = setup(PING_AND_USERS);
        let controller =
            ReloadController::new(Arc::clone(&config), path.clone()).with_debounce(Duration::ZERO);

        let (tx, rx) = mpsc::unbounded_channel();
        fs::write(&path, PING).unwrap();
        tx.send(Ok(modify(&path))).unwrap();
        tx.send(Err(notify::Error::generic("watch backend hiccup"))).unwrap();
        drop(tx);

        let final_state = controller.run(rx).await;
        assert_eq!(final_state, ReloadState::WatchFailed);
        assert_eq!(config.load().rules.len(), 1);
    }

    #[tokio::test]
    async fn test_directory_source_reloads_on_new_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.yaml"), PING).unwrap();
        let config = shared_config(ActiveConfig::load(dir.path()).unwrap());
        let mut controller = ReloadController::new(Arc::clone(&config), dir.path());

        let added = dir.path().join("b.yaml");
        fs::write(&added, "- request: { method: GET, path: /b }\n  response: { body: b }\n").unwrap();
        let event = Event::new(EventKind::Create(CreateKind::File)).add_path(added);
        assert!(controller.is_relevant(&event));

        controller.on_change(Instant::now()).await;
        assert_eq!(config.load().rules.len(), 2);
    }

    #[tokio::test]
    async fn test_watch_config_starts_for_file() {
        let (_dir, path, _config) = setup(PING);
        let (watcher, _rx) = watch_config(&path).unwrap();
        drop(watcher);
    }
}
