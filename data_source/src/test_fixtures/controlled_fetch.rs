// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use std::sync::{Arc,
                atomic::{AtomicU64, Ordering}};

use tokio::sync::{mpsc, oneshot};

use crate::{Cursor, FetchError, FetchFn, Fetched, fetch_fn};

type Responder<V> = oneshot::Sender<Result<Fetched<V>, FetchError>>;

/// One call made through a [`controlled_fetch()`] function. The fetch stays pending
/// until the test answers it. Dropping it unanswered leaves the fetch pending forever,
/// which is how a blocking query that never returns looks.
#[derive(Debug)]
pub struct FetchCall<V> {
    cursor: Cursor,
    responder: Responder<V>,
}

impl<V> FetchCall<V> {
    /// The cursor the loop passed to the fetch.
    #[must_use]
    pub fn cursor(&self) -> Cursor { self.cursor }

    /// Returns `false` if the fetch was already cancelled.
    pub fn respond_ok(self, value: V, cursor: Cursor) -> bool {
        self.responder.send(Ok(Fetched { value, cursor })).is_ok()
    }

    /// Returns `false` if the fetch was already cancelled.
    pub fn respond_err(self, error: FetchError) -> bool {
        self.responder.send(Err(error)).is_ok()
    }
}

/// A [`FetchFn`] that hands every call to the test as a [`FetchCall`], plus the counter
/// of calls made so far.
#[derive(Debug, Clone, Default)]
pub struct FetchCallCounter(Arc<AtomicU64>);

impl FetchCallCounter {
    #[must_use]
    pub fn get(&self) -> u64 { self.0.load(Ordering::SeqCst) }
}

/// Deterministic fetch function for tests. Every call is delivered on the returned
/// receiver, in order, and is answered explicitly.
///
/// ```
/// # use r3bl_data_source::{controlled_fetch, Cursor};
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let (fetch, mut calls) = controlled_fetch::<&str>();
/// let pending = tokio::spawn(fetch(Cursor(3)));
///
/// let call = calls.recv().await.unwrap();
/// assert_eq!(call.cursor(), Cursor(3));
/// call.respond_ok("v1", Cursor(4));
///
/// assert_eq!(pending.await.unwrap().unwrap().value, "v1");
/// # }
/// ```
pub fn controlled_fetch<V>() -> (FetchFn<V>, mpsc::UnboundedReceiver<FetchCall<V>>)
where
    V: Send + 'static,
{
    let (fetch, calls, _counter) = controlled_fetch_with_counter();
    (fetch, calls)
}

pub fn controlled_fetch_with_counter<V>()
-> (FetchFn<V>, mpsc::UnboundedReceiver<FetchCall<V>>, FetchCallCounter)
where
    V: Send + 'static,
{
    let (call_sender, call_receiver) = mpsc::unbounded_channel();
    let counter = FetchCallCounter::default();
    let counter_for_fetch = counter.clone();

    let fetch = fetch_fn(move |cursor: Cursor| {
        counter_for_fetch.0.fetch_add(1, Ordering::SeqCst);
        let (responder, response) = oneshot::channel();
        let is_delivered = call_sender.send(FetchCall { cursor, responder }).is_ok();
        async move {
            if !is_delivered {
                return std::future::pending().await;
            }
            match response.await {
                Ok(result) => result,
                Err(_) => std::future::pending().await,
            }
        }
    });

    (fetch, call_receiver, counter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[tokio::test]
    async fn test_calls_are_delivered_in_order_and_counted() {
        let (fetch, mut calls, counter) = controlled_fetch_with_counter::<u32>();

        let first = tokio::spawn(fetch(Cursor(1)));
        let second = tokio::spawn(fetch(Cursor(2)));

        let call_1 = calls.recv().await.unwrap();
        let call_2 = calls.recv().await.unwrap();
        assert_eq!(counter.get(), 2);

        let mut cursors = vec![call_1.cursor(), call_2.cursor()];
        cursors.sort();
        assert_eq!(cursors, vec![Cursor(1), Cursor(2)]);

        call_1.respond_err(FetchError::Aborted);
        call_2.respond_ok(7, Cursor(8));

        let mut results = vec![first.await.unwrap(), second.await.unwrap()];
        results.sort_by_key(Result::is_ok);
        assert_eq!(results[0], Err(FetchError::Aborted));
        assert_eq!(results[1], Ok(Fetched { value: 7, cursor: Cursor(8) }));
    }

    #[tokio::test]
    async fn test_unanswered_call_stays_pending() {
        let (fetch, mut calls) = controlled_fetch::<u32>();
        let pending = tokio::spawn(fetch(Cursor::NONE));
        drop(calls.recv().await.unwrap());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!pending.is_finished());
        pending.abort();
    }
}
