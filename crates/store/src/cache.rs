use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam::channel::{self, Receiver, Sender};

use crate::AssetId;

/// Which assets have a local copy, shared by every view in the process.
///
/// Listeners receive the full saved set after each change.
#[derive(Debug, Clone, Default)]
pub struct CacheStatus {
    inner: Arc<Mutex<CacheState>>,
}

#[derive(Debug, Default)]
struct CacheState {
    saved: BTreeMap<AssetId, PathBuf>,
    listeners: Vec<Sender<BTreeSet<AssetId>>>,
}

impl CacheStatus {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mark_saved(&self, asset: AssetId, path: impl Into<PathBuf>) {
        let mut state = self.state();
        state.saved.insert(asset, path.into());
        state.notify();
    }

    pub fn remove(&self, asset: &AssetId) -> bool {
        let mut state = self.state();
        let removed = state.saved.remove(asset).is_some();
        if removed {
            state.notify();
        }
        removed
    }

    pub fn is_saved(&self, asset: &AssetId) -> bool {
        self.state().saved.contains_key(asset)
    }

    /// Local copy of `asset`, if one was saved and still exists on disk.
    pub fn local_path(&self, asset: &AssetId) -> Option<PathBuf> {
        self.state()
            .saved
            .get(asset)
            .filter(|path| path.exists())
            .cloned()
    }

    pub fn saved_ids(&self) -> BTreeSet<AssetId> {
        self.state().saved.keys().cloned().collect()
    }

    /// The receiver gets the current set immediately, then every change.
    pub fn subscribe(&self) -> Receiver<BTreeSet<AssetId>> {
        let (sender, receiver) = channel::unbounded();
        let mut state = self.state();
        let _ = sender.send(state.saved.keys().cloned().collect());
        state.listeners.push(sender);
        receiver
    }
}

impl CacheState {
    fn notify(&mut self) {
        let ids: BTreeSet<AssetId> = self.saved.keys().cloned().collect();
        self.listeners.retain(|l| l.send(ids.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_mark_and_remove() {
        let cache = CacheStatus::new();
        let asset = AssetId::from("m1");

        cache.mark_saved(asset.clone(), "/tmp/m1.wav");
        assert!(cache.is_saved(&asset));

        assert!(cache.remove(&asset));
        assert!(!cache.is_saved(&asset));
        assert!(!cache.remove(&asset));
    }

    #[test]
    fn test_clones_share_state() {
        let cache = CacheStatus::new();
        let other = cache.clone();

        cache.mark_saved(AssetId::from("m1"), "/tmp/m1.wav");

        assert!(other.is_saved(&AssetId::from("m1")));
    }

    #[test]
    fn test_listeners_see_every_change() {
        let cache = CacheStatus::new();
        let rx = cache.subscribe();
        assert!(rx.try_recv().expect("initial").is_empty());

        cache.mark_saved(AssetId::from("m1"), "/tmp/m1.wav");
        cache.mark_saved(AssetId::from("m2"), "/tmp/m2.wav");
        cache.remove(&AssetId::from("m1"));

        let updates: Vec<_> = rx.try_iter().collect();
        assert_eq!(updates.len(), 3);
        assert_eq!(
            updates[2],
            BTreeSet::from([AssetId::from("m2")])
        );
    }

    #[test]
    fn test_local_path_requires_existing_file() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("m1.wav");
        std::fs::write(&path, b"RIFF").expect("write");

        let cache = CacheStatus::new();
        cache.mark_saved(AssetId::from("m1"), &path);
        cache.mark_saved(AssetId::from("m2"), dir.path().join("gone.wav"));

        assert_eq!(cache.local_path(&AssetId::from("m1")), Some(path));
        assert_eq!(cache.local_path(&AssetId::from("m2")), None);
    }

    #[test]
    fn test_dropped_listeners_are_pruned() {
        let cache = CacheStatus::new();
        drop(cache.subscribe());

        cache.mark_saved(AssetId::from("m1"), "/tmp/m1.wav");

        assert!(cache.state().listeners.is_empty());
    }
}
