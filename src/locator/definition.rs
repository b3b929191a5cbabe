//! Route definition sources and caching.
//!
//! # Responsibilities
//! - Serve inline definitions from configuration
//! - Re-read TOML route files on every fetch
//! - Concatenate sources in declaration order
//! - Cache the last good, order-sorted sequence

use arc_swap::ArcSwap;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::LocatorError;
use crate::locator::RouteDefinitionLocator;
use crate::routing::definition::RouteDefinition;

/// Definitions held in memory, typically the inline `[[routes]]` of the config.
#[derive(Debug, Default)]
pub struct InMemoryDefinitionSource {
    definitions: Vec<RouteDefinition>,
}

impl InMemoryDefinitionSource {
    pub fn new(definitions: Vec<RouteDefinition>) -> Self {
        Self { definitions }
    }
}

#[async_trait]
impl RouteDefinitionLocator for InMemoryDefinitionSource {
    async fn definitions(&self) -> Result<Vec<RouteDefinition>, LocatorError> {
        Ok(self.definitions.clone())
    }
}

#[derive(Deserialize)]
struct RouteFile {
    #[serde(default)]
    routes: Vec<RouteDefinition>,
}

/// A TOML file of `[[routes]]` tables, read on every fetch.
#[derive(Debug)]
pub struct FileDefinitionSource {
    path: PathBuf,
}

impl FileDefinitionSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RouteDefinitionLocator for FileDefinitionSource {
    async fn definitions(&self) -> Result<Vec<RouteDefinition>, LocatorError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| LocatorError::Read {
                path: self.path.clone(),
                source,
            })?;
        let file: RouteFile = toml::from_str(&content).map_err(|source| LocatorError::Parse {
            path: self.path.clone(),
            source,
        })?;
        tracing::debug!(path = %self.path.display(), count = file.routes.len(), "Read route file");
        Ok(file.routes)
    }
}

/// Concatenation of several definition locators.
#[derive(Default)]
pub struct CompositeDefinitionLocator {
    delegates: Vec<Arc<dyn RouteDefinitionLocator>>,
}

impl CompositeDefinitionLocator {
    pub fn new(delegates: Vec<Arc<dyn RouteDefinitionLocator>>) -> Self {
        Self { delegates }
    }

    pub fn push(&mut self, delegate: Arc<dyn RouteDefinitionLocator>) {
        self.delegates.push(delegate);
    }
}

#[async_trait]
impl RouteDefinitionLocator for CompositeDefinitionLocator {
    async fn definitions(&self) -> Result<Vec<RouteDefinition>, LocatorError> {
        let mut all = Vec::new();
        for delegate in &self.delegates {
            all.extend(delegate.definitions().await?);
        }
        Ok(all)
    }
}

/// Last good definition sequence, sorted by order.
///
/// Fetch-and-store runs under a lock, so the sequence stored last is always
/// the one requested last.
pub struct CachingDefinitionLocator {
    delegate: Arc<dyn RouteDefinitionLocator>,
    cache: ArcSwap<Vec<RouteDefinition>>,
    refresh_lock: Mutex<()>,
}

impl CachingDefinitionLocator {
    /// An empty cache over `delegate`. Nothing is fetched until
    /// [`refresh`](Self::refresh).
    pub fn new(delegate: Arc<dyn RouteDefinitionLocator>) -> Self {
        Self {
            delegate,
            cache: ArcSwap::from_pointee(Vec::new()),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Fetch from the delegate and swap the cache, returning the stored
    /// sequence. On error the old sequence stays in place.
    pub async fn refresh(&self) -> Result<Arc<Vec<RouteDefinition>>, LocatorError> {
        let _guard = self.refresh_lock.lock().await;
        let definitions = self.delegate.definitions().await?;
        Ok(self.store(definitions))
    }

    /// Replace the cache with `definitions`, returning the stored sequence.
    pub async fn apply(&self, definitions: Vec<RouteDefinition>) -> Arc<Vec<RouteDefinition>> {
        let _guard = self.refresh_lock.lock().await;
        self.store(definitions)
    }

    fn store(&self, mut definitions: Vec<RouteDefinition>) -> Arc<Vec<RouteDefinition>> {
        definitions.sort_by_key(|d| d.order);
        let definitions = Arc::new(definitions);
        self.cache.store(definitions.clone());
        definitions
    }

    pub fn snapshot(&self) -> Arc<Vec<RouteDefinition>> {
        self.cache.load_full()
    }
}

#[async_trait]
impl RouteDefinitionLocator for CachingDefinitionLocator {
    async fn definitions(&self) -> Result<Vec<RouteDefinition>, LocatorError> {
        Ok(self.cache.load().as_ref().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn def(id: i64, order: i32) -> RouteDefinition {
        RouteDefinition {
            id,
            order,
            ..Default::default()
        }
    }

    fn ids(defs: &[RouteDefinition]) -> Vec<i64> {
        defs.iter().map(|d| d.id).collect()
    }

    struct Flaky {
        fail: AtomicBool,
        definitions: Vec<RouteDefinition>,
    }

    #[async_trait]
    impl RouteDefinitionLocator for Flaky {
        async fn definitions(&self) -> Result<Vec<RouteDefinition>, LocatorError> {
            if self.fail.load(Ordering::SeqCst) {
                Err(LocatorError::Source("unavailable".into()))
            } else {
                Ok(self.definitions.clone())
            }
        }
    }

    #[tokio::test]
    async fn test_composite_preserves_source_order() {
        let composite = CompositeDefinitionLocator::new(vec![
            Arc::new(InMemoryDefinitionSource::new(vec![def(1, 0), def(2, 0)])),
            Arc::new(InMemoryDefinitionSource::new(vec![def(3, 0)])),
        ]);
        assert_eq!(ids(&composite.definitions().await.unwrap()), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_cache_sorts_stably() {
        let source = InMemoryDefinitionSource::new(vec![def(1, 2), def(2, 1), def(3, 2), def(4, 1)]);
        let caching = CachingDefinitionLocator::new(Arc::new(source));
        assert!(caching.snapshot().is_empty());

        assert_eq!(caching.refresh().await.unwrap().len(), 4);
        assert_eq!(ids(&caching.snapshot()), vec![2, 4, 1, 3]);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_cache() {
        let flaky = Arc::new(Flaky {
            fail: AtomicBool::new(false),
            definitions: vec![def(1, 0)],
        });
        let caching = CachingDefinitionLocator::new(flaky.clone());
        caching.refresh().await.unwrap();

        flaky.fail.store(true, Ordering::SeqCst);
        assert!(caching.refresh().await.is_err());
        assert_eq!(ids(&caching.definitions().await.unwrap()), vec![1]);
    }

    #[tokio::test]
    async fn test_apply_replaces_cache() {
        let caching = CachingDefinitionLocator::new(Arc::new(InMemoryDefinitionSource::default()));
        assert_eq!(caching.apply(vec![def(9, 5), def(8, 0)]).await.len(), 2);
        assert_eq!(ids(&caching.snapshot()), vec![8, 9]);
    }

    /// Signals when a fetch starts, then holds it open for a while.
    struct Slow {
        started: Arc<tokio::sync::Notify>,
    }

    #[async_trait]
    impl RouteDefinitionLocator for Slow {
        async fn definitions(&self) -> Result<Vec<RouteDefinition>, LocatorError> {
            self.started.notify_one();
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            Ok(vec![def(1, 0)])
        }
    }

    #[tokio::test]
    async fn test_apply_during_refresh_is_stored_last() {
        let started = Arc::new(tokio::sync::Notify::new());
        let caching = Arc::new(CachingDefinitionLocator::new(Arc::new(Slow {
            started: started.clone(),
        })));

        let refreshing = {
            let caching = caching.clone();
            tokio::spawn(async move { caching.refresh().await })
        };
        started.notified().await;

        let applied = caching.apply(vec![def(9, 0)]).await;
        refreshing.await.unwrap().unwrap();

        assert_eq!(ids(&applied), vec![9]);
        assert_eq!(ids(&caching.snapshot()), vec![9]);
    }

    #[tokio::test]
    async fn test_file_source_rereads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routes.toml");
        std::fs::write(&path, "[[routes]]\nid = 1\npredicates = [\"Path=/a\"]\n").unwrap();

        let source = FileDefinitionSource::new(&path);
        assert_eq!(ids(&source.definitions().await.unwrap()), vec![1]);

        std::fs::write(&path, "[[routes]]\nid = 1\n\n[[routes]]\nid = 2\n").unwrap();
        assert_eq!(ids(&source.definitions().await.unwrap()), vec![1, 2]);

        std::fs::write(&path, "routes = 1").unwrap();
        assert!(matches!(
            source.definitions().await,
            Err(LocatorError::Parse { .. })
        ));

        let missing = FileDefinitionSource::new(dir.path().join("missing.toml"));
        assert!(matches!(
            missing.definitions().await,
            Err(LocatorError::Read { .. })
        ));
    }
}
