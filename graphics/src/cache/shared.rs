//! Deduplicating cache of reference-counted GPU objects.
//!
//! Objects are keyed by the [`ContentHash`] of their creation descriptor.
//! The cache itself only keeps weak references: an object lives exactly as
//! long as some [`SharedHandle`] to it does. When the last handle goes away the
//! object is passed to the cache's destroy sink (typically the deferred
//! reclaimer) and its slot is removed.
//!
//! ```text
//! get_or_create(key)
//!   hash = crc64(key)
//!   slot alive?  -> clone handle (count + 1)
//!   otherwise    -> build outside the lock, re-lock, insert
//!                   (if another thread won the race, destroy ours and share theirs)
//!
//! drop(last handle)
//!   destroy sink(object)
//!   remove slot if it is still the dead one
//! ```

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::ContentHash;
use crate::error::GraphicsError;

type DestroySink<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Removes dead slots on behalf of an entry, without knowing the key type.
trait SlotRelease: Send + Sync {
    fn release_slot(&self, hash: ContentHash);
}

struct Entry<T: Send + Sync + 'static> {
    value: T,
    hash: ContentHash,
    destroy: DestroySink<T>,
    cache: Weak<dyn SlotRelease>,
}

impl<T: Send + Sync + 'static> Drop for Entry<T> {
    fn drop(&mut self) {
        (self.destroy)(&self.value);
        if let Some(cache) = self.cache.upgrade() {
            cache.release_slot(self.hash);
        }
    }
}

/// A counted reference to a cached object.
///
/// Cloning increments the count; dropping (or [`invalidate`](Self::invalidate))
/// decrements it. The last release destroys the object.
pub struct SharedHandle<T: Send + Sync + 'static> {
    entry: Arc<Entry<T>>,
}

impl<T: Send + Sync + 'static> SharedHandle<T> {
    /// Number of outstanding handles to this object.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.entry)
    }

    /// The content hash the object is cached under.
    pub fn content_hash(&self) -> ContentHash {
        self.entry.hash
    }

    /// Release this handle.
    pub fn invalidate(self) {
        drop(self);
    }

    /// Whether two handles refer to the same object.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.entry, &b.entry)
    }
}

impl<T: Send + Sync + 'static> Clone for SharedHandle<T> {
    fn clone(&self) -> Self {
        Self {
            entry: Arc::clone(&self.entry),
        }
    }
}

impl<T: Send + Sync + 'static> std::ops::Deref for SharedHandle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.entry.value
    }
}

impl<T: Send + Sync + std::fmt::Debug + 'static> std::fmt::Debug for SharedHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedHandle")
            .field("hash", &self.entry.hash)
            .field("ref_count", &self.ref_count())
            .field("value", &self.entry.value)
            .finish()
    }
}

struct Slot<K, T: Send + Sync + 'static> {
    entry: Weak<Entry<T>>,
    key: K,
}

struct CacheShared<K, T: Send + Sync + 'static> {
    name: String,
    slots: Mutex<HashMap<ContentHash, Slot<K, T>>>,
    destroy: DestroySink<T>,
}

impl<K, T> SlotRelease for CacheShared<K, T>
where
    K: Send + Sync,
    T: Send + Sync + 'static,
{
    fn release_slot(&self, hash: ContentHash) {
        let mut slots = self.slots.lock();
        // A new object may already occupy the slot
        if slots.get(&hash).is_some_and(|s| s.entry.strong_count() == 0) {
            slots.remove(&hash);
            log::trace!("{} cache: released {}", self.name, hash);
        }
    }
}

/// Deduplicating cache of expensive-to-build objects.
///
/// At most one live object exists per distinct key hash. Distinct keys whose
/// CRC-64 collide would alias; debug builds compare the stored key on every
/// hit to catch that.
pub struct SharedHandleCache<K, T: Send + Sync + 'static> {
    shared: Arc<CacheShared<K, T>>,
}

impl<K, T> SharedHandleCache<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    /// Create a cache that hands released objects to `destroy`.
    pub fn new(name: impl Into<String>, destroy: impl Fn(&T) + Send + Sync + 'static) -> Self {
        Self {
            shared: Arc::new(CacheShared {
                name: name.into(),
                slots: Mutex::new(HashMap::new()),
                destroy: Arc::new(destroy),
            }),
        }
    }

    /// Return a handle to the object built from `key`, building it on a miss.
    ///
    /// `build` runs without the cache lock held, so concurrent misses on the
    /// same key may both build; the first to insert wins and the other object
    /// goes straight to the destroy sink.
    pub fn get_or_create<F>(&self, key: &K, build: F) -> Result<SharedHandle<T>, GraphicsError>
    where
        F: FnOnce(&K) -> Result<T, GraphicsError>,
    {
        let hash = ContentHash::from_key(key);
        if let Some(entry) = self.lookup(hash, key) {
            return Ok(SharedHandle { entry });
        }

        let value = build(key)?;

        let (existing, same_key) = {
            let mut slots = self.shared.slots.lock();
            if let Some(found) = live_slot(&slots, hash, key) {
                found
            } else {
                let entry = Arc::new(Entry {
                    value,
                    hash,
                    destroy: Arc::clone(&self.shared.destroy),
                    cache: self.slot_release(),
                });
                slots.insert(
                    hash,
                    Slot {
                        entry: Arc::downgrade(&entry),
                        key: key.clone(),
                    },
                );
                log::trace!("{} cache: inserted {}", self.shared.name, hash);
                return Ok(SharedHandle { entry });
            }
        };

        // Lost the race: share the winner's object.
        self.check_key(same_key, hash);
        (self.shared.destroy)(&value);
        log::trace!("{} cache: discarded duplicate build of {}", self.shared.name, hash);
        Ok(SharedHandle { entry: existing })
    }

    fn lookup(&self, hash: ContentHash, key: &K) -> Option<Arc<Entry<T>>> {
        // The guard must be released before the entry can be dropped.
        let (entry, same_key) = live_slot(&self.shared.slots.lock(), hash, key)?;
        self.check_key(same_key, hash);
        Some(entry)
    }

    fn check_key(&self, same_key: bool, hash: ContentHash) {
        debug_assert!(
            same_key,
            "{} cache: content hash collision on {}",
            self.shared.name,
            hash
        );
    }

    fn slot_release(&self) -> Weak<dyn SlotRelease> {
        let shared: Arc<dyn SlotRelease> = self.shared.clone();
        Arc::downgrade(&shared)
    }

    /// Whether a live object exists for `key`.
    pub fn contains(&self, key: &K) -> bool {
        let hash = ContentHash::from_key(key);
        self.shared
            .slots
            .lock()
            .get(&hash)
            .is_some_and(|s| s.entry.strong_count() > 0)
    }

    /// Number of slots, including dead ones not yet swept.
    pub fn len(&self) -> usize {
        self.shared.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop slots whose object is gone. Returns the number removed.
    pub fn sweep(&self) -> usize {
        let mut slots = self.shared.slots.lock();
        let before = slots.len();
        slots.retain(|_, s| s.entry.strong_count() > 0);
        let removed = before - slots.len();
        if removed > 0 {
            log::debug!("{} cache: swept {} dead slots", self.shared.name, removed);
        }
        removed
    }
}

/// The live entry under `hash`, and whether its stored key equals `key`.
/// The key is only compared in debug builds.
fn live_slot<K: Eq, T: Send + Sync + 'static>(
    slots: &HashMap<ContentHash, Slot<K, T>>,
    hash: ContentHash,
    key: &K,
) -> Option<(Arc<Entry<T>>, bool)> {
    let slot = slots.get(&hash)?;
    let entry = slot.entry.upgrade()?;
    Some((entry, !cfg!(debug_assertions) || slot.key == *key))
}

impl<K, T: Send + Sync + 'static> std::fmt::Debug for SharedHandleCache<K, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedHandleCache")
            .field("name", &self.shared.name)
            .field("slots", &self.shared.slots.lock().len())
            .finish()
    }
}
