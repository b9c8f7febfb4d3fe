// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! The per-observer end of a loop. See [`Subscription`].

use std::sync::Arc;

use tokio::sync::broadcast::{Receiver,
                             error::{RecvError, TryRecvError}};

use crate::{BlockingLoop, FetchError, ObserverId, ResourceKey};

/// What an observer receives. Every observer of a loop sees the same sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent<V> {
    /// A new value. The replay delivered on attach is also a `Message`.
    Message(V),
    /// The loop failed with a terminal error and has ended. Always the last event.
    Error(Arc<FetchError>),
}

impl<V> SourceEvent<V> {
    #[must_use]
    pub fn message(&self) -> Option<&V> {
        match self {
            SourceEvent::Message(value) => Some(value),
            SourceEvent::Error(_) => None,
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool { matches!(self, SourceEvent::Error(_)) }
}

/// Returned by [`SourceRegistry::open()`](crate::SourceRegistry::open).
///
/// The replay value (the most recently delivered value at the moment of attaching, if
/// any) is yielded first, then live events in the order the loop emitted them. The
/// replay and the receiver are captured together under the loop's lock, so nothing is
/// duplicated or skipped between them.
///
/// Dropping a subscription does not release the observer's reference. Call
/// [`SourceRegistry::close()`](crate::SourceRegistry::close) for that.
pub struct Subscription<V> {
    key: ResourceKey,
    observer: ObserverId,
    replay: Option<V>,
    is_replay_pending: bool,
    /// [`None`] once the stream has ended.
    receiver: Option<Receiver<SourceEvent<V>>>,
    source: BlockingLoop<V>,
}

impl<V> std::fmt::Debug for Subscription<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("observer", &self.observer)
            .field("is_replay_pending", &self.is_replay_pending)
            .finish_non_exhaustive()
    }
}

impl<V> Subscription<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        key: ResourceKey,
        observer: ObserverId,
        replay: Option<V>,
        receiver: Option<Receiver<SourceEvent<V>>>,
        source: BlockingLoop<V>,
    ) -> Self {
        Self {
            key,
            observer,
            is_replay_pending: replay.is_some(),
            replay,
            receiver,
            source,
        }
    }

    #[must_use]
    pub fn key(&self) -> &ResourceKey { &self.key }

    #[must_use]
    pub fn observer(&self) -> ObserverId { self.observer }

    /// The value that was current when this subscription attached. Stays available after
    /// it has been yielded by [`Self::recv()`].
    #[must_use]
    pub fn replay(&self) -> Option<&V> { self.replay.as_ref() }

    /// The loop this subscription is attached to.
    #[must_use]
    pub fn source(&self) -> &BlockingLoop<V> { &self.source }

    /// Waits for the next event. Returns [`None`] once the loop has ended, either after
    /// delivering a [`SourceEvent::Error`] or because it was closed.
    pub async fn recv(&mut self) -> Option<SourceEvent<V>> {
        if let Some(replay) = self.take_pending_replay() {
            return Some(SourceEvent::Message(replay));
        }

        loop {
            let result = self.receiver.as_mut()?.recv().await;
            match result {
                Ok(event) => return Some(self.on_event(event)),
                Err(RecvError::Lagged(skipped)) => self.on_lagged(skipped),
                Err(RecvError::Closed) => {
                    self.receiver = None;
                    return None;
                }
            }
        }
    }

    /// Returns the next event if one is ready, without waiting.
    pub fn try_recv(&mut self) -> Option<SourceEvent<V>> {
        if let Some(replay) = self.take_pending_replay() {
            return Some(SourceEvent::Message(replay));
        }

        loop {
            let result = self.receiver.as_mut()?.try_recv();
            match result {
                Ok(event) => return Some(self.on_event(event)),
                Err(TryRecvError::Lagged(skipped)) => self.on_lagged(skipped),
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Closed) => {
                    self.receiver = None;
                    return None;
                }
            }
        }
    }

    /// `true` once the stream has ended and [`Self::recv()`] will only return [`None`].
    #[must_use]
    pub fn is_terminated(&self) -> bool { !self.is_replay_pending && self.receiver.is_none() }

    fn take_pending_replay(&mut self) -> Option<V> {
        if !self.is_replay_pending {
            return None;
        }
        self.is_replay_pending = false;
        self.replay.clone()
    }

    fn on_event(&mut self, event: SourceEvent<V>) -> SourceEvent<V> {
        if event.is_error() {
            self.receiver = None;
        }
        event
    }

    fn on_lagged(&self, skipped: u64) {
        tracing::warn!(
            message = "Subscriber lagged behind, skipping to newest events",
            key = %self.key,
            observer = %self.observer,
            skipped
        );
    }
}
