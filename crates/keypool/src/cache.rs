use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::cell::Handle;
use crate::config::PoolConfig;
use crate::entry::Entry;
use crate::time::Instant;
use crate::{Closeable, Factory, PoolError};

/// A concurrent, bounded, per-key pooling cache.
///
/// Each key owns an independent sub-pool of up to a caller-chosen number of
/// values. Acquisitions hand out an idle value when one exists, or construct
/// a fresh one through the entry's factory while a creation slot is free, or
/// wait for either. Background sweeps close values that have sat idle past
/// [`PoolConfig::idle_timeout`] and drop entries that own nothing anymore.
///
/// The cache is cheap to clone and all clones share the same state.
pub struct PoolCache<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for PoolCache<K, V> {
    fn clone(&self) -> Self {
        // https://github.com/rust-lang/rust/issues/26925
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<K, V> {
    config: PoolConfig,
    entries: RwLock<HashMap<K, Arc<Entry<V>>>>,
    last_swept: Mutex<Instant>,
    closed: AtomicBool,
}

impl<K, V> Default for PoolCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Closeable,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> PoolCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Closeable,
{
    /// Creates an empty pool cache with the default configuration.
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    /// Creates an empty pool cache with the given configuration.
    pub fn with_config(config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                entries: RwLock::new(HashMap::new()),
                last_swept: Mutex::new(Instant::now()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Acquires a value for `key`, installing a new entry if none exists.
    ///
    /// For a new key this constructs the first value through `factory` while
    /// holding the cache lock, so at most one first-use construction runs per
    /// key; later constructions inside the entry proceed in parallel up to
    /// `max_capacity`. For an existing key the entry keeps its current
    /// factory and capacity — use [`update_if_exists`](Self::update_if_exists)
    /// to change them.
    ///
    /// The returned bool reports whether the entry already existed. A factory
    /// failure leaves a new entry installed but empty, so later calls retry.
    pub async fn add_and_acquire(
        &self,
        ctx: &CancellationToken,
        key: K,
        factory: Factory<V>,
        max_capacity: usize,
    ) -> Result<(Handle<V>, bool), PoolError> {
        if max_capacity == 0 {
            return Err(PoolError::InvalidCapacity);
        }

        let mut entries = self.inner.entries.write().await;
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(PoolError::ShutDown);
        }
        self.maybe_spawn_sweep();

        if let Some(entry) = entries.get(&key) {
            let handle = entry.get_value(ctx).await?;
            return Ok((handle, true));
        }

        // Install before constructing: a failed construction leaves the
        // empty entry behind for later calls to retry against.
        let entry = Arc::new(Entry::with_reserved_slot(factory, max_capacity));
        entries.insert(key, Arc::clone(&entry));

        let handle = entry.create_first().await?;
        Ok((handle, false))
    }

    /// Acquires a value for `key` if an entry exists; never installs one.
    pub async fn get(
        &self,
        ctx: &CancellationToken,
        key: &K,
    ) -> Result<Option<Handle<V>>, PoolError> {
        let entries = self.inner.entries.read().await;
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(PoolError::ShutDown);
        }
        self.maybe_spawn_sweep();

        match entries.get(key) {
            Some(entry) => entry.get_value(ctx).await.map(Some),
            None => Ok(None),
        }
    }

    /// Hot-swaps the factory and capacity of `key`'s entry without
    /// invalidating values currently in use, rebuilding retained values on
    /// the new factory as they become available.
    ///
    /// Returns false if no entry exists for `key`. An `Err` other than
    /// [`PoolError::ShutDown`] implies the entry existed; on
    /// [`PoolError::Rebuild`] the entry stays usable with whatever was
    /// rebuilt.
    pub async fn update_if_exists(
        &self,
        key: &K,
        factory: Factory<V>,
        max_capacity: usize,
    ) -> Result<bool, PoolError> {
        if max_capacity == 0 {
            return Err(PoolError::InvalidCapacity);
        }

        let entries = self.inner.entries.read().await;
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(PoolError::ShutDown);
        }
        let Some(entry) = entries.get(key) else {
            return Ok(false);
        };

        entry.reconfigure(factory, max_capacity).await?;
        Ok(true)
    }

    /// A snapshot of the keys currently holding an entry.
    pub async fn keys(&self) -> Vec<K> {
        let entries = self.inner.entries.read().await;
        entries.keys().cloned().collect()
    }

    /// Shuts the pool down.
    ///
    /// Every idle value is closed, parked acquirers are woken with
    /// [`PoolError::ShutDown`], and all later calls fail with the same
    /// error. Values still out with callers are closed in the background
    /// when their handles drop. Waits for in-flight acquisitions to settle.
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);

        let mut entries = self.inner.entries.write().await;
        for (_, entry) in entries.drain() {
            entry.dispose().await;
        }
    }

    /// Launches a background sweep if one hasn't run recently.
    ///
    /// Called with the entries lock held; the sweep reacquires it on its own
    /// task, after this acquisition has released it.
    fn maybe_spawn_sweep(&self) {
        let mut last_swept = self.inner.last_swept.lock();
        if last_swept.elapsed() < self.inner.config.sweep_interval {
            return;
        }
        *last_swept = Instant::now();
        drop(last_swept);

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.sweep().await;
        });
    }
}

impl<K, V> Inner<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Closeable,
{
    /// Closes timed-out idle values everywhere and removes entries that own
    /// no values at all.
    async fn sweep(&self) {
        tracing::trace!("sweeping pool entries");
        let mut entries = self.entries.write().await;

        let keys: Vec<K> = entries.keys().cloned().collect();
        for key in keys {
            let Some(entry) = entries.get(&key).map(Arc::clone) else {
                continue;
            };
            if entry.cleanup_values(self.config.idle_timeout).await {
                if let Some(entry) = entries.remove(&key) {
                    // Normally empty by now; dispose regardless so nothing an
                    // entry still owns can outlive its removal.
                    entry.dispose().await;
                    tracing::debug!("removed fully idle pool entry");
                }
            }
        }
    }
}
