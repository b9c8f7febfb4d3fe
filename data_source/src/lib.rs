// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// cspell:words longpoll

// Skip rustfmt for rest of file.
// https://stackoverflow.com/a/75910283/2085356
#![cfg_attr(rustfmt, rustfmt_skip)]
#![cfg_attr(not(test), deny(clippy::unwrap_in_result))]

//! # Blocking query data sources
//!
//! Many independent observers (widgets, panes, background tasks) often want to watch the
//! "current state" of the same server-side resource. When that resource is read with a
//! long-poll ("blocking") query, the request is held open by the server until the
//! resource version (the cursor, or index) advances past the one supplied by the client.
//!
//! Opening one long-poll per observer duplicates server load and desynchronizes views.
//! This crate provides the multiplexer that sits between observers and the transport:
//!
//! 1. Concurrent observers of the same [`ResourceKey`] share exactly **one** long-poll
//!    loop ([`BlockingLoop`]).
//! 2. Observers are tracked in a reference set per loop, and the loop is torn down only
//!    when the last observer calls [`SourceRegistry::close()`].
//! 3. The last value and cursor of a torn down loop are kept in an LRU [`ResultCache`],
//!    so the next observer gets an immediate replay and the next request resumes from
//!    the cached cursor.
//! 4. Transport aborts (status marker `"0"`) are retried on the same loop with the same
//!    cursor once the transport reports it is available again. Any other failure is
//!    delivered once to every observer as [`SourceEvent::Error`] and ends the loop. See
//!    [`RetryPolicy`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use r3bl_data_source::{AutorefreshSetting, DataSourceConfig, ObserverId,
//!                        RetryPolicy, SourceRegistry, TransportMonitor,
//!                        fetch_fn, Cursor, FetchError, Fetched};
//!
//! # async fn example() -> miette::Result<()> {
//! let policy = RetryPolicy::new(
//!     Arc::new(TransportMonitor::default()),
//!     Arc::new(AutorefreshSetting::default()),
//! );
//! let registry = SourceRegistry::<Vec<String>>::new(DataSourceConfig::default(), policy);
//!
//! let fetch = fetch_fn(|cursor: Cursor| async move {
//!     // Call the backend here, passing `cursor` as the blocking index.
//!     Ok::<_, FetchError>(Fetched { value: vec!["web".to_string()], cursor: Cursor(cursor.0 + 1) })
//! });
//!
//! let observer = ObserverId::new();
//! let mut subscription = registry.open("dc1/service/*", fetch, observer)?;
//! while let Some(event) = subscription.recv().await {
//!     println!("{event:?}");
//! }
//! registry.close("dc1/service/*", observer);
//! # Ok(())
//! # }
//! ```

// Attach sources.
pub mod blocking;
pub mod config;
pub mod core;
pub mod test_fixtures;

// Re-export.
pub use blocking::*;
pub use config::*;
pub use core::*;
pub use test_fixtures::*;
