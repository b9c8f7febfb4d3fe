// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Low level building blocks that are not specific to blocking queries: a bounded LRU
//! map, `tracing` subscriber setup, and the `miette` report handler.

// Attach sources.
pub mod common;
pub mod log;

// Re-export.
pub use common::*;
pub use log::*;
