// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Injected collaborators that the [`RetryPolicy`](crate::RetryPolicy) reads but never
//! mutates: [`TransportAvailability`] and [`AutorefreshPreference`]. Stock
//! implementations are provided by [`TransportMonitor`] and [`AutorefreshSetting`].

use std::sync::{Arc,
                atomic::{AtomicBool, Ordering}};

use futures_util::{FutureExt, future::BoxFuture};
use tokio::sync::watch;

use crate::FetchError;

/// Tells a loop when it may retry a fetch that was aborted by the transport.
pub trait TransportAvailability: Send + Sync + 'static {
    /// Resolves once the transport can accept new requests again (eg: after a
    /// reconnect). `error` is the abort that triggered the wait.
    fn when_available(&self, error: &FetchError) -> BoxFuture<'static, ()>;
}

impl<F> TransportAvailability for F
where
    F: Fn(&FetchError) -> BoxFuture<'static, ()> + Send + Sync + 'static,
{
    fn when_available(&self, error: &FetchError) -> BoxFuture<'static, ()> { self(error) }
}

/// The user preference that decides between streaming (refetch immediately after every
/// response) and one-shot (fetch once, then wait) behavior.
pub trait AutorefreshPreference: Send + Sync + 'static {
    fn is_autorefresh_enabled(&self) -> BoxFuture<'static, bool>;
}

/// Transport availability driven by whoever owns the connection. Starts out available.
///
/// ```
/// use r3bl_data_source::TransportMonitor;
///
/// let monitor = TransportMonitor::default();
/// monitor.set_available(false);
/// assert!(!monitor.is_available());
/// ```
#[derive(Debug)]
pub struct TransportMonitor {
    sender: watch::Sender<bool>,
}

impl Default for TransportMonitor {
    fn default() -> Self { Self::new(true) }
}

impl TransportMonitor {
    #[must_use]
    pub fn new(is_available: bool) -> Self {
        let (sender, _) = watch::channel(is_available);
        Self { sender }
    }

    pub fn set_available(&self, is_available: bool) {
        self.sender.send_if_modified(|current| {
            let changed = *current != is_available;
            *current = is_available;
            changed
        });
    }

    #[must_use]
    pub fn is_available(&self) -> bool { *self.sender.borrow() }
}

impl TransportAvailability for TransportMonitor {
    fn when_available(&self, _error: &FetchError) -> BoxFuture<'static, ()> {
        let mut receiver = self.sender.subscribe();
        async move {
            // An error means the monitor was dropped, and nothing will ever mark the
            // transport available again. Let the loop retry rather than hang forever.
            drop(receiver.wait_for(|is_available| *is_available).await);
        }
        .boxed()
    }
}

/// Autorefresh preference backed by a shared flag. Enabled by default.
#[derive(Debug, Clone)]
pub struct AutorefreshSetting {
    enabled: Arc<AtomicBool>,
}

impl Default for AutorefreshSetting {
    fn default() -> Self { Self::new(true) }
}

impl AutorefreshSetting {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(enabled)),
        }
    }

    pub fn set(&self, enabled: bool) { self.enabled.store(enabled, Ordering::SeqCst); }

    #[must_use]
    pub fn get(&self) -> bool { self.enabled.load(Ordering::SeqCst) }
}

impl AutorefreshPreference for AutorefreshSetting {
    fn is_autorefresh_enabled(&self) -> BoxFuture<'static, bool> {
        let enabled = self.get();
        async move { enabled }.boxed()
    }
}
