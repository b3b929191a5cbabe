//! Route file watcher for hot refresh.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::locator::refresh::RefreshHandle;

/// Watches route definition files and requests a refresh when they change.
pub struct RouteFileWatcher {
    paths: Vec<PathBuf>,
    poll_interval: Duration,
    refresh: RefreshHandle,
}

impl RouteFileWatcher {
    pub fn new(paths: &[PathBuf], poll_interval: Duration, refresh: RefreshHandle) -> Self {
        Self {
            paths: paths.to_vec(),
            poll_interval,
            refresh,
        }
    }

    /// Start watching in a background thread.
    ///
    /// The returned watcher must be kept alive for as long as changes should
    /// be observed.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let refresh = self.refresh.clone();
        let watched = self.paths.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let relevant = event.kind.is_modify()
                        || event.kind.is_create()
                        || event.kind.is_remove();
                    if relevant && touches(&event, &watched) {
                        tracing::info!(paths = ?event.paths, "Route file change detected, refreshing");
                        if let Err(e) = refresh.refresh() {
                            tracing::error!(error = %e, "Failed to request route refresh");
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(self.poll_interval),
        )?;

        // Watch parent directories so editors that replace files are still seen.
        for dir in watch_dirs(&self.paths) {
            watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        }

        tracing::info!(paths = ?self.paths, "Route file watcher started");
        Ok(watcher)
    }
}

fn touches(event: &Event, watched: &[PathBuf]) -> bool {
    event
        .paths
        .iter()
        .any(|changed| watched.iter().any(|w| same_file(changed, w)))
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a.file_name().is_some() && a.file_name() == b.file_name() && a.parent() == b.parent(),
    }
}

fn watch_dirs(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = paths
        .iter()
        .map(|p| match p.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        })
        .collect();
    dirs.sort();
    dirs.dedup();
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_dirs_dedup() {
        let dirs = watch_dirs(&[
            PathBuf::from("/etc/gw/a.toml"),
            PathBuf::from("/etc/gw/b.toml"),
            PathBuf::from("local.toml"),
        ]);
        assert_eq!(dirs, vec![PathBuf::from("."), PathBuf::from("/etc/gw")]);
    }

    #[test]
    fn test_touches_only_watched_files() {
        let watched = vec![PathBuf::from("/etc/gw/a.toml")];
        let event = Event::new(notify::EventKind::Any).add_path(PathBuf::from("/etc/gw/a.toml"));
        assert!(touches(&event, &watched));

        let other = Event::new(notify::EventKind::Any).add_path(PathBuf::from("/etc/gw/b.toml"));
        assert!(!touches(&other, &watched));
    }
}
