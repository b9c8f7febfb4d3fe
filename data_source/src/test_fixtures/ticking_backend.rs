// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use std::{sync::Arc, time::Duration};

use tokio::{sync::watch, task::JoinHandle};

use crate::{Cursor, FetchError, FetchFn, Fetched, fetch_fn};

/// How long a simulated blocking query is held open before the backend answers with
/// the unchanged state.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
struct Snapshot {
    index: u64,
    items: Vec<String>,
}

/// In-memory backend that answers blocking queries the way a catalog server does: a
/// request with cursor `n > 0` is held until the index moves past `n`, or until
/// [`max_wait`](Self::with_max_wait) elapses.
///
/// Used by the `watch_source` binary and by tests that want real long-poll behavior
/// instead of answering each [`FetchCall`](crate::FetchCall) by hand.
#[derive(Debug, Clone)]
pub struct TickingBackend {
    state: Arc<watch::Sender<Snapshot>>,
    max_wait: Duration,
}

impl Default for TickingBackend {
    fn default() -> Self { Self::new(Vec::new()) }
}

impl TickingBackend {
    /// Starts at index `1` holding `items`.
    #[must_use]
    pub fn new(items: Vec<String>) -> Self {
        let (sender, _) = watch::channel(Snapshot { index: 1, items });
        Self {
            state: Arc::new(sender),
            max_wait: DEFAULT_MAX_WAIT,
        }
    }

    #[must_use]
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    #[must_use]
    pub fn index(&self) -> Cursor { Cursor(self.state.borrow().index) }

    #[must_use]
    pub fn items(&self) -> Vec<String> { self.state.borrow().items.clone() }

    /// Replaces the items and bumps the index, releasing every held query.
    pub fn publish(&self, items: Vec<String>) {
        self.state.send_modify(|snapshot| {
            snapshot.index += 1;
            snapshot.items = items;
        });
    }

    /// Appends one item and bumps the index.
    pub fn push(&self, item: impl Into<String>) {
        let item = item.into();
        self.state.send_modify(|snapshot| {
            snapshot.index += 1;
            snapshot.items.push(item);
        });
    }

    /// Pushes `"{prefix}-{n}"` every `period` until the returned task is aborted.
    pub fn spawn_ticker(&self, prefix: impl Into<String>, period: Duration) -> JoinHandle<()> {
        let backend = self.clone();
        let prefix = prefix.into();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately.
            interval.tick().await;
            let mut count: u64 = 0;
            loop {
                interval.tick().await;
                count += 1;
                backend.push(format!("{prefix}-{count}"));
                tracing::trace!(message = "Backend ticked", index = %backend.index());
            }
        })
    }

    /// A blocking query against this backend. Fails with [`FetchError::Transport`] if
    /// the backend has been dropped.
    #[must_use]
    pub fn fetch_fn(&self) -> FetchFn<Vec<String>> {
        let state = Arc::clone(&self.state);
        let max_wait = self.max_wait;

        fetch_fn(move |cursor: Cursor| {
            let mut receiver = state.subscribe();
            async move {
                if !cursor.is_none() {
                    let wait = receiver.wait_for(|snapshot| snapshot.index > cursor.0);
                    match tokio::time::timeout(max_wait, wait).await {
                        Ok(Err(_)) => {
                            return Err(FetchError::Transport {
                                message: "backend is gone".to_string(),
                            });
                        }
                        // Timed out or changed. Either way answer with what is there now.
                        Err(_) | Ok(Ok(_)) => {}
                    }
                }

                let snapshot = receiver.borrow().clone();
                Ok(Fetched {
                    value: snapshot.items,
                    cursor: Cursor(snapshot.index),
                })
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_no_cursor_returns_immediately() {
        let backend = TickingBackend::new(vec!["a".into()]);
        let fetch = backend.fetch_fn();
        let fetched = fetch(Cursor::NONE).await.unwrap();
        assert_eq!(fetched.value, vec!["a".to_string()]);
        assert_eq!(fetched.cursor, Cursor(1));
    }

    #[tokio::test]
    async fn test_cursor_blocks_until_index_moves() {
        let backend = TickingBackend::default();
        let fetch = backend.fetch_fn();

        let pending = tokio::spawn(fetch(Cursor(1)));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!pending.is_finished());

        backend.push("b");
        let fetched = pending.await.unwrap().unwrap();
        assert_eq!(fetched.value, vec!["b".to_string()]);
        assert_eq!(fetched.cursor, Cursor(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_wait_answers_with_same_index() {
        let backend = TickingBackend::default().with_max_wait(Duration::from_secs(1));
        let fetched = backend.fetch_fn()(Cursor(1)).await.unwrap();
        assert_eq!(fetched.cursor, Cursor(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_pushes_items() {
        let backend = TickingBackend::default();
        let ticker = backend.spawn_ticker("svc", Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(250)).await;
        ticker.abort();

        assert_eq!(backend.items(), vec!["svc-1".to_string(), "svc-2".to_string()]);
        assert_eq!(backend.index(), Cursor(3));
    }
}
