// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Deduplicates observers onto loops. See [`SourceRegistry`].

use std::{collections::hash_map::Entry,
          fmt::{self, Display},
          sync::{Mutex, MutexGuard, PoisonError,
                 atomic::{AtomicU64, Ordering}}};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{BlockingLoop, CachedResult, DataSourceConfig, FetchFn, InvalidTransition,
            ResourceKey, ResultCache, RetryPolicy, Route, SharedResultCache, Subscription,
            lock_result_cache};

static NEXT_OBSERVER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one observer (a widget, a pane, a background task). Process unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl ObserverId {
    #[must_use]
    pub fn new() -> Self { Self(NEXT_OBSERVER_ID.fetch_add(1, Ordering::SeqCst)) }

    #[must_use]
    pub fn as_u64(self) -> u64 { self.0 }
}

impl Default for ObserverId {
    fn default() -> Self { Self::new() }
}

impl Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "observer-{}", self.0) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error, miette::Diagnostic)]
pub enum OpenError {
    #[error("A source can only be opened from inside a tokio runtime")]
    #[diagnostic(
        code(r3bl_data_source::open::no_async_runtime),
        help("Call `open()` from async code, or enter a runtime with `Handle::enter()`")
    )]
    NoAsyncRuntime,

    #[error(transparent)]
    #[diagnostic(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

struct LiveSource<V> {
    source: BlockingLoop<V>,
    observers: FxHashSet<ObserverId>,
}

/// Maps each [`ResourceKey`] to at most one live [`BlockingLoop`], and tracks which
/// observers hold a reference to it.
///
/// - [`open()`](Self::open) creates and starts a loop on the first reference, and
///   attaches later observers to the same loop (they get the current value as a replay).
/// - [`close()`](Self::close) drops a reference. Dropping the last one closes the loop,
///   which flushes its `{value, cursor}` into the [`ResultCache`] shared by all loops.
///
/// Both are synchronous. They never await and never touch the network, and all of their
/// bookkeeping happens in one short critical section, so they are atomic relative to
/// each other. Create one registry per process (or per session, or per test).
///
/// Lock order is registry → loop → cache.
pub struct SourceRegistry<V> {
    sources: Mutex<FxHashMap<ResourceKey, LiveSource<V>>>,
    cache: SharedResultCache<V>,
    policy: RetryPolicy,
    config: DataSourceConfig,
}

impl<V> fmt::Debug for SourceRegistry<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("config", &self.config)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl<V> SourceRegistry<V>
where
    V: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(config: DataSourceConfig, policy: RetryPolicy) -> Self {
        let cache = ResultCache::new_shared(config.cache_capacity);
        Self {
            sources: Mutex::new(FxHashMap::default()),
            cache,
            policy,
            config,
        }
    }

    fn lock_sources(&self) -> MutexGuard<'_, FxHashMap<ResourceKey, LiveSource<V>>> {
        self.sources.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attaches `observer` to the loop for `key`, creating and starting the loop if none
    /// is live. Opening the same key again with the same observer replaces its reference
    /// rather than adding a second one.
    ///
    /// `fetch` is only used when a new loop is created. Observers that attach to a loop
    /// that is already running share the fetch function it was started with.
    ///
    /// A loop that has ended with a terminal error is replaced by a fresh one (seeded
    /// from the cache), and the references to the dead loop are dropped with it.
    ///
    /// # Errors
    ///
    /// [`OpenError::NoAsyncRuntime`] if called outside a tokio runtime. Nothing is
    /// registered in that case.
    pub fn open(
        &self,
        key: impl Into<ResourceKey>,
        fetch: FetchFn<V>,
        observer: ObserverId,
    ) -> Result<Subscription<V>, OpenError> {
        let key = key.into();
        let mut sources = self.lock_sources();

        let live = match sources.entry(key.clone()) {
            Entry::Occupied(entry) if !entry.get().source.is_closed() => entry.into_mut(),
            entry => {
                let source = BlockingLoop::new(
                    key.clone(),
                    fetch,
                    self.policy.clone(),
                    self.cache.clone(),
                    self.config.channel_capacity,
                );
                source.start()?;
                let fresh = LiveSource {
                    source,
                    observers: FxHashSet::default(),
                };

                match entry {
                    Entry::Occupied(mut entry) => {
                        let dead = entry.insert(fresh);
                        tracing::debug!(
                            message = "Replaced failed loop",
                            key = %key,
                            stale_observers = dead.observers.len()
                        );
                        entry.into_mut()
                    }
                    Entry::Vacant(entry) => entry.insert(fresh),
                }
            }
        };
        live.observers.insert(observer);

        tracing::debug!(
            message = "Observer opened source",
            key = %key,
            observer = %observer,
            observers = live.observers.len()
        );

        Ok(live.source.attach(observer))
    }

    /// Same as [`Self::open()`], using a [`Route`] resolved by a
    /// [`FetchRouter`](crate::FetchRouter).
    ///
    /// # Errors
    ///
    /// See [`Self::open()`].
    pub fn open_route(
        &self,
        route: &Route<V>,
        observer: ObserverId,
    ) -> Result<Subscription<V>, OpenError> {
        self.open(&route.key, route.fetch.clone(), observer)
    }

    /// Drops `observer`'s reference to the loop for `key`. When the last reference is
    /// dropped the loop is closed and removed. Unknown keys and observers are ignored.
    pub fn close(&self, key: impl AsRef<str>, observer: ObserverId) {
        let key = key.as_ref();
        let mut sources = self.lock_sources();

        let Some(live) = sources.get_mut(key) else {
            return;
        };
        if !live.observers.remove(&observer) {
            return;
        }

        tracing::debug!(
            message = "Observer closed source",
            key = %key,
            observer = %observer,
            observers = live.observers.len()
        );

        if live.observers.is_empty()
            && let Some(live) = sources.remove(key)
        {
            live.source.request_close();
        }
    }

    /// Closes every loop. Their values are flushed to the cache as usual.
    pub fn close_all(&self) {
        let mut sources = self.lock_sources();
        for (_, live) in sources.drain() {
            live.source.request_close();
        }
    }

    /// `true` if a loop for `key` is registered and has not ended.
    #[must_use]
    pub fn is_live(&self, key: impl AsRef<str>) -> bool {
        self.lock_sources()
            .get(key.as_ref())
            .is_some_and(|live| !live.source.is_closed())
    }

    #[must_use]
    pub fn live_count(&self) -> usize {
        self.lock_sources()
            .values()
            .filter(|live| !live.source.is_closed())
            .count()
    }

    #[must_use]
    pub fn observer_count(&self, key: impl AsRef<str>) -> usize {
        self.lock_sources()
            .get(key.as_ref())
            .map_or(0, |live| live.observers.len())
    }

    /// The loop registered for `key`, for introspection.
    #[must_use]
    pub fn handle(&self, key: impl AsRef<str>) -> Option<BlockingLoop<V>> {
        self.lock_sources()
            .get(key.as_ref())
            .map(|live| live.source.clone())
    }

    /// The cache entry for `key`, without marking it as recently used.
    #[must_use]
    pub fn cache_snapshot(&self, key: impl AsRef<str>) -> Option<CachedResult<V>> {
        lock_result_cache(&self.cache).peek(&ResourceKey::new(key.as_ref()))
    }

    #[must_use]
    pub fn cache(&self) -> &SharedResultCache<V> { &self.cache }

    #[must_use]
    pub fn config(&self) -> &DataSourceConfig { &self.config }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy { &self.policy }
}
