//! Per-type cache of opened dataset handles
//!
//! Each record type gets its own [`OnceCell`]. The map lock is only held long
//! enough to find or insert that cell, so provisioning one type never blocks
//! callers working with another, while concurrent first requests for the same
//! type run the provisioning closure at most once.
//!
//! Every dataset name carries a generation, bumped by
//! [`DatasetCache::invalidate_name`]. An entry remembers the generation it was
//! provisioned under and is only served while that generation is current, so
//! a handle provisioned concurrently with a delete is never kept.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use once_cell::sync::OnceCell;
use tracing::debug;

use crate::error::Result;
use crate::repository::DatasetHandle;

/// A provisioned handle and the name generation it belongs to
struct Entry {
    name: String,
    generation: u64,
    handle: Arc<dyn DatasetHandle>,
}

type Slot = Arc<OnceCell<Entry>>;

/// Process-scoped map from record type to its dataset handle
///
/// Entries are never evicted on their own; they are only dropped by an
/// explicit [`DatasetCache::invalidate_name`] or [`DatasetCache::clear`].
#[derive(Default)]
pub struct DatasetCache {
    slots: RwLock<HashMap<TypeId, Slot>>,
    generations: Mutex<HashMap<String, u64>>,
}

impl DatasetCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the handle cached for `T`, running `provision` on first use
    ///
    /// `name` is the dataset `provision` opens. If `provision` fails nothing
    /// is cached and the next call tries again. If `name` is invalidated
    /// while `provision` runs, its handle is discarded and `provision` runs
    /// again.
    pub fn get_or_create<T, F>(&self, name: &str, mut provision: F) -> Result<Arc<dyn DatasetHandle>>
    where
        T: 'static,
        F: FnMut() -> Result<Arc<dyn DatasetHandle>>,
    {
        let key = TypeId::of::<T>();

        loop {
            let slot = self.slot(key);

            if let Some(entry) = slot.get() {
                if self.is_current(entry) {
                    debug!(dataset = %entry.name, "dataset cache hit");
                    return Ok(Arc::clone(&entry.handle));
                }
                self.evict(key, &slot);
                continue;
            }

            let entry = slot.get_or_try_init(|| {
                let generation = self.generation(name);
                let handle = provision()?;
                Ok::<_, crate::error::Error>(Entry {
                    name: name.to_string(),
                    generation,
                    handle,
                })
            })?;

            if self.is_current(entry) {
                return Ok(Arc::clone(&entry.handle));
            }

            debug!(dataset = %name, "dataset invalidated while provisioning, retrying");
            self.evict(key, &slot);
        }
    }

    /// Handle cached for `T`, if provisioned
    pub fn get<T: 'static>(&self) -> Option<Arc<dyn DatasetHandle>> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots
            .get(&TypeId::of::<T>())
            .and_then(|slot| slot.get())
            .filter(|entry| self.is_current(entry))
            .map(|entry| Arc::clone(&entry.handle))
    }

    /// Whether a handle is cached for `T`
    pub fn contains<T: 'static>(&self) -> bool {
        self.get::<T>().is_some()
    }

    /// Drop every entry bound to the dataset `name`, returning how many went
    ///
    /// Handles for `name` still being provisioned are discarded once they
    /// arrive.
    pub fn invalidate_name(&self, name: &str) -> usize {
        {
            let mut generations = self.generations.lock().unwrap_or_else(PoisonError::into_inner);
            *generations.entry(name.to_string()).or_default() += 1;
        }

        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let before = slots.len();
        slots.retain(|_, slot| slot.get().map_or(true, |entry| entry.name != name));
        let removed = before - slots.len();

        if removed > 0 {
            debug!(dataset = %name, entries = removed, "invalidated cached dataset");
        }
        removed
    }

    /// Number of provisioned entries
    pub fn len(&self) -> usize {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots
            .values()
            .filter(|slot| slot.get().map_or(false, |entry| self.is_current(entry)))
            .count()
    }

    /// Check if nothing has been provisioned
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all entries
    pub fn clear(&self) {
        self.slots.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    fn generation(&self, name: &str) -> u64 {
        let generations = self.generations.lock().unwrap_or_else(PoisonError::into_inner);
        generations.get(name).copied().unwrap_or(0)
    }

    fn is_current(&self, entry: &Entry) -> bool {
        self.generation(&entry.name) == entry.generation
    }

    fn slot(&self, key: TypeId) -> Slot {
        if let Some(slot) = self.slots.read().unwrap_or_else(PoisonError::into_inner).get(&key) {
            return Arc::clone(slot);
        }

        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(key).or_default())
    }

    /// Remove `slot` unless another caller already replaced it
    fn evict(&self, key: TypeId, slot: &Slot) {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        if slots.get(&key).map_or(false, |current| Arc::ptr_eq(current, slot)) {
            slots.remove(&key);
        }
    }
}

impl std::fmt::Debug for DatasetCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetCache").field("entries", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DatasetDescriptor;
    use crate::error::Error;
    use crate::memory::InMemoryDatasetRepository;
    use crate::repository::DatasetRepository;
    use crate::schema::{DataType, Schema};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Barrier};
    use std::thread;
    use std::time::Duration;

    struct Alpha;
    struct Beta;

    fn descriptor() -> DatasetDescriptor {
        DatasetDescriptor::new(Schema::builder().required("id", DataType::Int64).build())
    }

    #[test]
    fn test_second_request_is_a_hit() {
        let repo = InMemoryDatasetRepository::new();
        let cache = DatasetCache::new();

        let first = cache
            .get_or_create::<Alpha, _>("alpha", || repo.create_or_open("alpha", &descriptor()))
            .unwrap();
        let second = cache
            .get_or_create::<Alpha, _>("alpha", || panic!("provisioned twice"))
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(repo.provision_calls(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains::<Alpha>());
        assert!(!cache.contains::<Beta>());
    }

    #[test]
    fn test_failed_provisioning_is_retried() {
        let repo = InMemoryDatasetRepository::new();
        let cache = DatasetCache::new();

        let err = cache
            .get_or_create::<Alpha, _>("alpha", || Err(Error::provisioning("alpha", "disk full")))
            .unwrap_err();
        assert!(matches!(err, Error::DatasetProvisioning { .. }));
        assert!(cache.is_empty());

        cache
            .get_or_create::<Alpha, _>("alpha", || repo.create_or_open("alpha", &descriptor()))
            .unwrap();
        assert!(cache.contains::<Alpha>());
    }

    #[test]
    fn test_concurrent_same_type_provisions_once() {
        let repo = InMemoryDatasetRepository::new();
        let cache = DatasetCache::new();
        let calls = AtomicUsize::new(0);
        let barrier = Barrier::new(8);

        thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    barrier.wait();
                    cache
                        .get_or_create::<Alpha, _>("alpha", || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(20));
                            repo.create_or_open("alpha", &descriptor())
                        })
                        .unwrap();
                });
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(repo.provision_calls(), 1);
    }

    #[test]
    fn test_other_types_do_not_wait_on_slow_provisioning() {
        let repo = InMemoryDatasetRepository::new();
        let cache = DatasetCache::new();
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let (started_tx, started_rx) = mpsc::channel::<()>();

        let (cache_ref, repo_ref) = (&cache, &repo);

        thread::scope(|scope| {
            let slow = scope.spawn(move || {
                cache_ref.get_or_create::<Alpha, _>("alpha", || {
                    started_tx.send(()).unwrap();
                    // Only completes once Beta was provisioned alongside us
                    done_rx
                        .recv_timeout(Duration::from_secs(5))
                        .map_err(|e| Error::provisioning("alpha", e))?;
                    repo_ref.create_or_open("alpha", &descriptor())
                })
            });

            started_rx.recv().unwrap();
            cache
                .get_or_create::<Beta, _>("beta", || repo.create_or_open("beta", &descriptor()))
                .unwrap();
            done_tx.send(()).unwrap();

            assert!(slow.join().unwrap().is_ok());
        });

        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_invalidate_by_name() {
        let repo = InMemoryDatasetRepository::new();
        let cache = DatasetCache::new();
        cache
            .get_or_create::<Alpha, _>("alpha", || repo.create_or_open("alpha", &descriptor()))
            .unwrap();
        cache
            .get_or_create::<Beta, _>("beta", || repo.create_or_open("beta", &descriptor()))
            .unwrap();

        assert_eq!(cache.invalidate_name("alpha"), 1);
        assert_eq!(cache.invalidate_name("alpha"), 0);
        assert!(!cache.contains::<Alpha>());
        assert!(cache.contains::<Beta>());

        cache
            .get_or_create::<Alpha, _>("alpha", || repo.create_or_open("alpha", &descriptor()))
            .unwrap();
        assert!(cache.contains::<Alpha>());
        assert_eq!(repo.provision_calls(), 3);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidation_during_provisioning_discards_handle() {
        let repo = InMemoryDatasetRepository::new();
        let cache = DatasetCache::new();
        let calls = AtomicUsize::new(0);
        let opened = Barrier::new(2);
        let resume = Barrier::new(2);

        thread::scope(|scope| {
            let provisioning = scope.spawn(|| {
                cache.get_or_create::<Alpha, _>("alpha", || {
                    let handle = repo.create_or_open("alpha", &descriptor())?;
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        opened.wait();
                        resume.wait();
                    }
                    Ok(handle)
                })
            });

            // Delete lands after the repository call but before the handle is cached
            opened.wait();
            assert!(repo.delete("alpha").unwrap());
            cache.invalidate_name("alpha");
            resume.wait();

            let handle = provisioning.join().unwrap().unwrap();
            assert_eq!(handle.name(), "alpha");
        });

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cache.contains::<Alpha>());
        assert!(repo.exists("alpha").unwrap());
    }
}
