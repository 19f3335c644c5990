//! Shared config with atomic reload support.
//!
//! Uses `arc-swap` for lock-free reads and atomic config replacement. The
//! monitor reads one snapshot per pass, so a reload applies from the next
//! pass on.

use std::hash::Hasher;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use rustc_hash::FxHasher;

use crate::config::MonitorConfig;

/// Cloneable handle to the current configuration.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    current: Arc<ArcSwap<MonitorConfig>>,
    /// Hash of the config file content the current snapshot came from.
    hash: Arc<AtomicU64>,
}

impl ConfigHandle {
    pub fn new(config: MonitorConfig) -> Self {
        let hash = std::fs::read(&config.config_path)
            .map(|content| content_hash(&content))
            .unwrap_or_default();
        Self {
            current: Arc::new(ArcSwap::from_pointee(config)),
            hash: Arc::new(AtomicU64::new(hash)),
        }
    }

    #[inline]
    pub fn load(&self) -> Arc<MonitorConfig> {
        self.current.load_full()
    }

    pub fn store(&self, config: MonitorConfig) {
        self.current.store(Arc::new(config));
    }

    /// Reload config from disk if content changed.
    ///
    /// Returns `Ok(true)` if config was updated, `Ok(false)` if unchanged.
    /// An invalid file leaves the current snapshot in place.
    pub fn reload(&self) -> Result<bool> {
        let path = self.load().config_path.clone();
        let content = std::fs::read(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let new_hash = content_hash(&content);
        if new_hash == self.hash.load(Ordering::Relaxed) {
            return Ok(false);
        }

        let config = MonitorConfig::from_path(&path)?;
        config.validate()?;
        self.store(config);
        self.hash.store(new_hash, Ordering::Relaxed);
        Ok(true)
    }

    /// Watch the config file and reload on change.
    ///
    /// The parent directory is watched since editors often replace the file.
    /// Dropping the returned watcher stops watching.
    pub fn watch(&self) -> Result<RecommendedWatcher> {
        let path = self.load().config_path.clone();
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf();
        let file_name = path.file_name().map(ToOwned::to_owned);

        let handle = self.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let Ok(event) = res else { return };
            let touches_config = event
                .paths
                .iter()
                .any(|p| p.file_name().map(ToOwned::to_owned) == file_name);
            if !touches_config || event.kind.is_access() {
                return;
            }
            match handle.reload() {
                Ok(true) => crate::log!("config"; "reloaded {}", path.display()),
                Ok(false) => {}
                Err(e) => crate::log!("error"; "config reload failed, keeping previous: {:#}", e),
            }
        })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        Ok(watcher)
    }
}

fn content_hash(content: &[u8]) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write(content);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("liveedit.toml");
        std::fs::write(&path, "[debounce]\nquiet_ms = 100\n").unwrap();

        let handle = ConfigHandle::new(MonitorConfig::load(&path).unwrap());
        assert_eq!(handle.load().debounce.quiet_ms, 100);
        assert!(!handle.reload().unwrap());

        std::fs::write(&path, "[debounce]\nquiet_ms = 300\n").unwrap();
        assert!(handle.reload().unwrap());
        assert_eq!(handle.load().debounce.quiet_ms, 300);
    }

    #[test]
    fn test_invalid_reload_keeps_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("liveedit.toml");
        std::fs::write(&path, "[agent]\nport = 9000\n").unwrap();

        let handle = ConfigHandle::new(MonitorConfig::load(&path).unwrap());
        std::fs::write(&path, "[agent]\nport = 0\n").unwrap();
        assert!(handle.reload().is_err());
        assert_eq!(handle.load().agent.port, 9000);
    }
}
