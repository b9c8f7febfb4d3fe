// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! The blocking-query multiplexer. Leaves first:
//!
//! ```text
//! ResultCache ─┐
//!              ├──► BlockingLoop ──► SourceRegistry ──► Subscription (per observer)
//! RetryPolicy ─┘        │
//!   │                   └── fetch(cursor) (injected FetchFn)
//!   ├── TransportAvailability (injected)
//!   └── AutorefreshPreference (injected)
//! ```
//!
//! - [`ResultCache`] remembers `{value, cursor}` for closed loops.
//! - [`RetryPolicy`] classifies failures and decides whether to refetch after a success.
//! - [`BlockingLoop`] drives one long-poll for one [`ResourceKey`] with an explicit
//!   [`LoopPhase`] state machine.
//! - [`SourceRegistry`] deduplicates observers onto loops and reference counts them.
//! - [`FetchRouter`] maps resource types to fetch constructors, and [`resolve_first()`]
//!   waits for a single value.

// Attach sources.
pub mod blocking_loop;
pub mod collaborators;
pub mod cursor;
pub mod fetch_error;
pub mod fetch_router;
pub mod loop_state;
pub mod registry;
pub mod resolver;
pub mod resource_key;
pub mod result_cache;
pub mod retry_policy;
pub mod subscription;

// Re-export.
pub use blocking_loop::*;
pub use collaborators::*;
pub use cursor::*;
pub use fetch_error::*;
pub use fetch_router::*;
pub use loop_state::*;
pub use registry::*;
pub use resolver::*;
pub use resource_key::*;
pub use result_cache::*;
pub use retry_policy::*;
pub use subscription::*;
