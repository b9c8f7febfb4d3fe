// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! One-shot reads on top of the registry. See [`resolve_first()`].

use std::sync::Arc;

use crate::{FetchError, FetchFn, ObserverId, OpenError, ResourceKey, SourceEvent,
            SourceRegistry};

#[derive(Debug, Clone, PartialEq, thiserror::Error, miette::Diagnostic)]
pub enum ResolveError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Open(#[from] OpenError),

    #[error("Fetch failed: {0}")]
    #[diagnostic(code(r3bl_data_source::resolve::fetch))]
    Fetch(Arc<FetchError>),

    #[error("Source for {key} was closed before it produced a value")]
    #[diagnostic(code(r3bl_data_source::resolve::closed))]
    Closed { key: ResourceKey },
}

/// Opens `key` with a fresh observer and returns the first value it delivers. A replay
/// (a value already held by a live loop, or seeded from the cache) counts, in which case
/// this returns without waiting on the network.
///
/// The observer's reference is always closed when this future completes or is dropped
/// (eg: by a `timeout` or `select!`), so the loop is torn down if nobody else is watching
/// it.
///
/// # Errors
///
/// - [`ResolveError::Open`] if the source can't be opened.
/// - [`ResolveError::Fetch`] if the loop fails with a terminal error first.
/// - [`ResolveError::Closed`] if the loop is closed by someone else first.
pub async fn resolve_first<V>(
    registry: &SourceRegistry<V>,
    key: impl Into<ResourceKey>,
    fetch: FetchFn<V>,
) -> Result<V, ResolveError>
where
    V: Clone + Send + Sync + 'static,
{
    let key = key.into();
    let observer = ObserverId::new();
    let mut subscription = registry.open(&key, fetch, observer)?;
    let _guard = CloseOnDrop {
        registry,
        key: &key,
        observer,
    };

    match subscription.recv().await {
        Some(SourceEvent::Message(value)) => Ok(value),
        Some(SourceEvent::Error(error)) => Err(ResolveError::Fetch(error)),
        None => Err(ResolveError::Closed { key: key.clone() }),
    }
}

/// Releases one observer's reference when dropped.
struct CloseOnDrop<'a, V>
where
    V: Clone + Send + Sync + 'static,
{
    registry: &'a SourceRegistry<V>,
    key: &'a ResourceKey,
    observer: ObserverId,
}

impl<V> Drop for CloseOnDrop<'_, V>
where
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) { self.registry.close(self.key, self.observer); }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AutorefreshSetting, Cursor, DataSourceConfig, RetryPolicy, TransportMonitor,
                controlled_fetch};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const KEY: &str = "dc1/node/*";

    fn registry() -> SourceRegistry<u32> {
        SourceRegistry::new(
            DataSourceConfig::default(),
            RetryPolicy::new(
                Arc::new(TransportMonitor::default()),
                Arc::new(AutorefreshSetting::default()),
            ),
        )
    }

    #[tokio::test]
    async fn test_first_value_then_closed() {
        let registry = registry();
        let (fetch, mut calls) = controlled_fetch();

        let responder = tokio::spawn(async move {
            calls.recv().await.unwrap().respond_ok(42, Cursor(3));
            calls
        });

        assert_eq!(resolve_first(&registry, KEY, fetch).await, Ok(42));
        assert!(!registry.is_live(KEY));
        assert_eq!(registry.cache_snapshot(KEY).unwrap().cursor, Cursor(3));
        drop(responder.await.unwrap());
    }

    #[tokio::test]
    async fn test_replay_counts_as_first_value() {
        let registry = registry();
        let (fetch, mut calls) = controlled_fetch();

        // Someone else keeps the loop open with a value in it.
        let other = ObserverId::new();
        let mut subscription = registry.open(KEY, fetch.clone(), other).unwrap();
        calls.recv().await.unwrap().respond_ok(7, Cursor(1));
        assert_eq!(subscription.recv().await, Some(SourceEvent::Message(7)));

        assert_eq!(resolve_first(&registry, KEY, fetch).await, Ok(7));
        assert_eq!(registry.observer_count(KEY), 1);

        registry.close(KEY, other);
    }

    #[tokio::test]
    async fn test_cancelled_resolve_releases_reference() {
        let registry = registry();
        let (fetch, _calls) = controlled_fetch::<u32>();

        // The fetch is never answered, so only the timeout ends the future.
        let result = tokio::time::timeout(
            Duration::from_millis(50),
            resolve_first(&registry, KEY, fetch),
        )
        .await;
        assert!(result.is_err());

        assert_eq!(registry.observer_count(KEY), 0);
        assert!(!registry.is_live(KEY));
    }

    #[tokio::test]
    async fn test_terminal_error() {
        let registry = registry();
        let (fetch, mut calls) = controlled_fetch();

        tokio::spawn(async move {
            calls
                .recv()
                .await
                .unwrap()
                .respond_err(FetchError::status(404, "no such node"));
        });

        assert_eq!(
            resolve_first(&registry, KEY, fetch).await,
            Err(ResolveError::Fetch(Arc::new(FetchError::status(404, "no such node"))))
        );
    }
}
