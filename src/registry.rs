//! Queue Registry
//!
//! An in-memory directory of named queues for processes that manage several
//! independent queues. The registry only maps names to shared handles; it
//! never opens, closes, or looks inside a queue.

use crate::error::{QueueError, Result};
use crate::storage::PersistentQueue;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Name -> queue mapping with unique names.
#[derive(Debug, Default)]
pub struct QueueRegistry {
    queues: Mutex<HashMap<String, Arc<PersistentQueue>>>,
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `queue` under `name`.
    ///
    /// Fails with [`QueueError::QueueExists`] if the name is taken.
    pub fn add(&self, name: &str, queue: Arc<PersistentQueue>) -> Result<()> {
        check_name(name)?;

        let mut queues = self.lock();
        if queues.contains_key(name) {
            return Err(QueueError::QueueExists(name.to_string()));
        }
        queues.insert(name.to_string(), queue);

        debug!(name = %name, "Queue registered");
        Ok(())
    }

    /// Registers `queue` under `name`, returning `false` instead of failing.
    pub fn try_add(&self, name: &str, queue: Arc<PersistentQueue>) -> bool {
        self.add(name, queue).is_ok()
    }

    /// Unregisters `name` and hands back its queue.
    ///
    /// Fails with [`QueueError::QueueNotFound`] if nothing is registered
    /// under that name.
    pub fn remove(&self, name: &str) -> Result<Arc<PersistentQueue>> {
        check_name(name)?;

        let removed = self
            .lock()
            .remove(name)
            .ok_or_else(|| QueueError::QueueNotFound(name.to_string()))?;

        debug!(name = %name, "Queue unregistered");
        Ok(removed)
    }

    /// Unregisters `name`, returning `false` instead of failing.
    pub fn try_remove(&self, name: &str) -> bool {
        self.remove(name).is_ok()
    }

    /// Looks up the queue registered under `name`.
    pub fn get(&self, name: &str) -> Result<Arc<PersistentQueue>> {
        check_name(name)?;

        self.lock()
            .get(name)
            .cloned()
            .ok_or_else(|| QueueError::QueueNotFound(name.to_string()))
    }

    /// Looks up the queue registered under `name`, or `None`.
    pub fn try_get(&self, name: &str) -> Option<Arc<PersistentQueue>> {
        self.get(name).ok()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<PersistentQueue>>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(QueueError::invalid("queue name must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::QueueConfig;
    use tempfile::TempDir;

    async fn queue_in(dir: &TempDir) -> Arc<PersistentQueue> {
        PersistentQueue::open(dir.path(), QueueConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_add_get_remove() {
        let dir = TempDir::new().unwrap();
        let registry = QueueRegistry::new();
        let queue = queue_in(&dir).await;

        registry.add("jobs", Arc::clone(&queue)).unwrap();
        assert!(registry.exists("jobs"));
        assert_eq!(registry.len(), 1);

        let fetched = registry.get("jobs").unwrap();
        assert!(Arc::ptr_eq(&fetched, &queue));

        let removed = registry.remove("jobs").unwrap();
        assert!(Arc::ptr_eq(&removed, &queue));
        assert!(!registry.exists("jobs"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let dir = TempDir::new().unwrap();
        let registry = QueueRegistry::new();
        let queue = queue_in(&dir).await;

        registry.add("jobs", Arc::clone(&queue)).unwrap();
        let err = registry.add("jobs", Arc::clone(&queue)).unwrap_err();
        assert!(matches!(err, QueueError::QueueExists(ref n) if n == "jobs"));

        assert!(!registry.try_add("jobs", queue));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_name_is_not_found() {
        let registry = QueueRegistry::new();

        assert!(registry.get("nope").unwrap_err().is_not_found());
        assert!(registry.remove("nope").unwrap_err().is_not_found());
        assert!(registry.try_get("nope").is_none());
        assert!(!registry.try_remove("nope"));
        assert!(!registry.exists("nope"));
    }

    #[tokio::test]
    async fn test_try_variants_succeed() {
        let dir = TempDir::new().unwrap();
        let registry = QueueRegistry::new();
        let queue = queue_in(&dir).await;

        assert!(registry.try_add("a", queue));
        assert!(registry.try_get("a").is_some());
        assert!(registry.try_remove("a"));
        assert!(registry.try_get("a").is_none());
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let dir = TempDir::new().unwrap();
        let registry = QueueRegistry::new();
        let queue = queue_in(&dir).await;

        assert!(matches!(
            registry.add("", queue),
            Err(QueueError::InvalidArgument(_))
        ));
        assert!(matches!(registry.get(""), Err(QueueError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_registry_does_not_touch_queue() {
        let dir = TempDir::new().unwrap();
        let registry = QueueRegistry::new();
        let queue = queue_in(&dir).await;
        queue.enqueue("kept", None).await.unwrap();

        registry.add("q", Arc::clone(&queue)).unwrap();
        registry.remove("q").unwrap();

        assert!(!queue.is_closed());
        assert_eq!(queue.depth().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_names_sorted() {
        let dir_a = TempDir::new().unwrap();
        let dir_b = TempDir::new().unwrap();
        let registry = QueueRegistry::new();

        registry.add("zeta", queue_in(&dir_a).await).unwrap();
        registry.add("alpha", queue_in(&dir_b).await).unwrap();

        assert_eq!(registry.names(), vec!["alpha", "zeta"]);
    }
}
