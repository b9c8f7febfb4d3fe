// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! One long-poll loop for one resource key. See [`BlockingLoop`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError,
                atomic::{AtomicU64, Ordering}};

use tokio::{sync::broadcast, task::JoinHandle};

use crate::{AfterFetch, Cursor, ErrorClass, FetchError, FetchFn, LoopEvent, LoopPhase,
            ObserverId, OpenError, ResourceKey, RetryPolicy, SharedResultCache,
            SourceEvent, Subscription, lock_result_cache};

/// Counter for loop generations. Incremented each time a loop is created, so tests and
/// logs can tell a reused loop from a fresh one.
static LOOP_GENERATION: AtomicU64 = AtomicU64::new(0);

/// Drives `fetch(cursor)` for one [`ResourceKey`] and broadcasts every value to the
/// attached [`Subscription`]s.
///
/// This is a cheap to clone handle. All clones share the same state, which is only
/// touched under one [`std::sync::Mutex`] that is never held across an `.await`.
///
/// # Lifecycle
///
/// ```text
/// start()          seed {value, cursor} from the cache, spawn the task
///   │
///   ▼
/// fetch(cursor) ───ok──► emit Message, advance cursor ──autorefresh on──► fetch again
///   │  │                                            └───autorefresh off─► Waiting
///   │  └──abort "0"──► wait for transport, fetch(same cursor) again
///   └──terminal──────► emit Error, Closed (cache untouched)
///
/// request_close()  abort the task, flush {value, cursor} to the cache once, Closed
/// ```
///
/// Results that arrive once the phase is no longer [`LoopPhase::Fetching`] are dropped,
/// so a response that races with [`request_close()`](Self::request_close) is neither
/// emitted nor cached.
pub struct BlockingLoop<V> {
    inner: Arc<LoopInner<V>>,
}

impl<V> Clone for BlockingLoop<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V> std::fmt::Debug for BlockingLoop<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock_state();
        f.debug_struct("BlockingLoop")
            .field("key", &self.inner.key)
            .field("generation", &self.inner.generation)
            .field("phase", &state.phase)
            .field("cursor", &state.cursor)
            .finish_non_exhaustive()
    }
}

struct LoopInner<V> {
    key: ResourceKey,
    generation: u64,
    fetch: FetchFn<V>,
    policy: RetryPolicy,
    cache: SharedResultCache<V>,
    state: Mutex<LoopState<V>>,
}

struct LoopState<V> {
    phase: LoopPhase,
    cursor: Cursor,
    current_value: Option<V>,
    previous_value: Option<V>,
    /// Taken (dropped) when the loop reaches [`LoopPhase::Closed`], which ends every
    /// subscription's stream.
    sender: Option<broadcast::Sender<SourceEvent<V>>>,
    task: Option<JoinHandle<()>>,
    is_flushed: bool,
    fetch_count: u64,
}

impl<V> LoopInner<V> {
    fn lock_state(&self) -> MutexGuard<'_, LoopState<V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<V> LoopState<V> {
    /// Applies `event`. An invalid transition leaves the phase unchanged and is logged.
    fn transition(&mut self, key: &ResourceKey, event: LoopEvent) -> bool {
        match self.phase.apply(event) {
            Ok(next) => {
                self.phase = next;
                true
            }
            Err(error) => {
                tracing::debug!(message = "Ignoring loop event", key = %key, error = %error);
                false
            }
        }
    }

    fn emit(&self, key: &ResourceKey, event: SourceEvent<V>) {
        let Some(sender) = self.sender.as_ref() else {
            return;
        };
        if sender.send(event).is_err() {
            tracing::trace!(message = "No subscribers attached", key = %key);
        }
    }
}

impl<V> BlockingLoop<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates an [`Idle`](LoopPhase::Idle) loop. Nothing is fetched until
    /// [`start()`](Self::start).
    pub fn new(
        key: ResourceKey,
        fetch: FetchFn<V>,
        policy: RetryPolicy,
        cache: SharedResultCache<V>,
        channel_capacity: usize,
    ) -> Self {
        let (sender, _) = broadcast::channel(channel_capacity.max(1));
        let generation = LOOP_GENERATION.fetch_add(1, Ordering::SeqCst).wrapping_add(1);

        tracing::debug!(message = "Loop created", key = %key, generation);

        Self {
            inner: Arc::new(LoopInner {
                key,
                generation,
                fetch,
                policy,
                cache,
                state: Mutex::new(LoopState {
                    phase: LoopPhase::Idle,
                    cursor: Cursor::NONE,
                    current_value: None,
                    previous_value: None,
                    sender: Some(sender),
                    task: None,
                    is_flushed: false,
                    fetch_count: 0,
                }),
            }),
        }
    }

    /// Seeds the cursor and current value from the cache, moves to
    /// [`Fetching`](LoopPhase::Fetching), and spawns the task that runs the fetches.
    ///
    /// # Errors
    ///
    /// - [`OpenError::NoAsyncRuntime`] if called outside a tokio runtime.
    /// - [`OpenError::InvalidTransition`] if the loop was already started. No second
    ///   task is spawned in that case.
    pub fn start(&self) -> Result<(), OpenError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| OpenError::NoAsyncRuntime)?;

        let inner = &self.inner;
        let mut state = inner.lock_state();
        state.phase = state.phase.apply(LoopEvent::Start)?;

        if let Some(cached) = lock_result_cache(&inner.cache).get(&inner.key) {
            state.cursor = cached.cursor;
            state.current_value = cached.value;
        }

        tracing::debug!(
            message = "Loop started",
            key = %inner.key,
            generation = inner.generation,
            cursor = %state.cursor,
            seeded = state.current_value.is_some()
        );

        state.task = Some(runtime.spawn(self.clone().run()));
        Ok(())
    }

    /// Cancels the in-flight fetch, flushes `{current value, cursor}` to the cache
    /// exactly once, and moves to [`Closed`](LoopPhase::Closed). A no-op once closed.
    pub fn request_close(&self) {
        let inner = &self.inner;
        let mut state = inner.lock_state();

        if state.phase == LoopPhase::Closed {
            return;
        }
        state.transition(&inner.key, LoopEvent::RequestClose);

        if let Some(task) = state.task.take() {
            task.abort();
        }

        if !state.is_flushed {
            state.is_flushed = true;
            lock_result_cache(&inner.cache).put(
                inner.key.clone(),
                state.current_value.clone(),
                state.cursor,
            );
            tracing::debug!(
                message = "Loop flushed to cache",
                key = %inner.key,
                cursor = %state.cursor
            );
        }

        state.transition(&inner.key, LoopEvent::CloseCompleted);
        state.sender = None;

        tracing::debug!(
            message = "Loop closed",
            key = %inner.key,
            generation = inner.generation
        );
    }

    /// Creates a [`Subscription`] whose replay is the value that is current right now.
    /// Attaching to a loop that has already closed yields the replay (if any) and then
    /// ends.
    #[must_use]
    pub fn attach(&self, observer: ObserverId) -> Subscription<V> {
        let state = self.inner.lock_state();
        let receiver = state.sender.as_ref().map(broadcast::Sender::subscribe);
        Subscription::new(
            self.inner.key.clone(),
            observer,
            state.current_value.clone(),
            receiver,
            self.clone(),
        )
    }

    async fn run(self) {
        let inner = &self.inner;
        let mut consecutive_aborts: u32 = 0;

        loop {
            let cursor = {
                let mut state = inner.lock_state();
                if state.phase != LoopPhase::Fetching {
                    return;
                }
                state.fetch_count += 1;
                state.cursor
            };

            tracing::trace!(message = "Fetch issued", key = %inner.key, cursor = %cursor);
            let result = (inner.fetch)(cursor).await;

            match result {
                Ok(fetched) => {
                    consecutive_aborts = 0;
                    if !self.apply_value(fetched.value, fetched.cursor) {
                        return;
                    }

                    let keep_polling =
                        inner.policy.after_success().await == AfterFetch::Refetch;

                    let mut state = inner.lock_state();
                    if state.phase != LoopPhase::Fetching
                        || !state.transition(
                            &inner.key,
                            LoopEvent::FetchSucceeded { keep_polling },
                        )
                    {
                        return;
                    }
                    if !keep_polling {
                        tracing::debug!(
                            message = "Autorefresh off, loop waiting",
                            key = %inner.key
                        );
                        return;
                    }
                }

                Err(error) => match inner.policy.classify(&error) {
                    ErrorClass::Abort => {
                        consecutive_aborts = consecutive_aborts.saturating_add(1);
                        {
                            let mut state = inner.lock_state();
                            if state.phase != LoopPhase::Fetching
                                || !state.transition(&inner.key, LoopEvent::FetchAborted)
                            {
                                return;
                            }
                        }

                        tracing::info!(
                            message = "Fetch aborted, waiting for transport",
                            key = %inner.key,
                            cursor = %cursor,
                            attempt = consecutive_aborts
                        );

                        if let Err(error) =
                            inner.policy.recover(error, consecutive_aborts).await
                        {
                            self.fail(error);
                            return;
                        }
                    }
                    ErrorClass::Terminal => {
                        self.fail(error);
                        return;
                    }
                },
            }
        }
    }

    /// Returns `false` if the loop is no longer fetching, in which case the value was
    /// discarded.
    fn apply_value(&self, value: V, next_cursor: Cursor) -> bool {
        let inner = &self.inner;
        let mut state = inner.lock_state();
        if state.phase != LoopPhase::Fetching {
            tracing::debug!(message = "Discarding late result", key = %inner.key);
            return false;
        }

        state.previous_value = state.current_value.replace(value.clone());
        state.cursor = state.cursor.advance(next_cursor);
        state.emit(&inner.key, SourceEvent::Message(value));
        true
    }

    /// Emits the terminal error once, then closes without touching the cache.
    fn fail(&self, error: FetchError) {
        let inner = &self.inner;
        let mut state = inner.lock_state();
        if state.phase != LoopPhase::Fetching
            || !state.transition(&inner.key, LoopEvent::FetchFailed)
        {
            return;
        }

        tracing::debug!(
            message = "Loop failed with terminal error",
            key = %inner.key,
            error = %error
        );

        state.emit(&inner.key, SourceEvent::Error(Arc::new(error)));
        state.transition(&inner.key, LoopEvent::CloseCompleted);
        state.sender = None;
        state.task = None;
    }
}

/// Read only introspection.
impl<V: Clone> BlockingLoop<V> {
    #[must_use]
    pub fn key(&self) -> &ResourceKey { &self.inner.key }

    /// Which incarnation this is. A reopened key always gets a new generation.
    #[must_use]
    pub fn generation(&self) -> u64 { self.inner.generation }

    #[must_use]
    pub fn phase(&self) -> LoopPhase { self.inner.lock_state().phase }

    #[must_use]
    pub fn cursor(&self) -> Cursor { self.inner.lock_state().cursor }

    /// The most recently delivered value (including one seeded from the cache).
    #[must_use]
    pub fn current_value(&self) -> Option<V> { self.inner.lock_state().current_value.clone() }

    /// The value delivered before [`Self::current_value()`].
    #[must_use]
    pub fn previous_value(&self) -> Option<V> {
        self.inner.lock_state().previous_value.clone()
    }

    /// Number of fetches issued so far, including reissues after aborts.
    #[must_use]
    pub fn fetch_count(&self) -> u64 { self.inner.lock_state().fetch_count }

    /// Number of subscriptions still receiving live events.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .lock_state()
            .sender
            .as_ref()
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// `true` once the loop has reached [`LoopPhase::Closed`], either by being closed or
    /// by failing.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.phase() == LoopPhase::Closed }
}
