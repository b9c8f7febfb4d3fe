// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

// Attach sources.
pub mod controlled_fetch;
pub mod ticking_backend;

// Re-export.
pub use controlled_fetch::*;
pub use ticking_backend::*;
