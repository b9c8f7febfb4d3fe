// Copyright (c) 2024-2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Installs a [`miette::ErrorHook`] for binaries that return `miette::Result<()>` from
//! `main()`.
//!
//! The hook is lazy: it only runs when a report is actually rendered, so the output width
//! is read at that time (from the `COLUMNS` env var, falling back to
//! [`DEFAULT_REPORT_WIDTH`]).

use miette::MietteHandlerOpts;
use tracing::debug;

pub const DEFAULT_REPORT_WIDTH: usize = 100;

/// Reads the width to render reports at.
#[must_use]
pub fn get_report_width() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|it| it.trim().parse::<usize>().ok())
        .filter(|it| *it > 0)
        .unwrap_or(DEFAULT_REPORT_WIDTH)
}

pub fn setup_default_miette_global_report_handler(issues_url: &'static str) {
    // Ignore the error if a hook was already installed (eg: by another binary entry
    // point in the same process).
    let _unused = miette::set_hook(Box::new(|_report| {
        let report_width = get_report_width();
        debug!(message = "miette::set_hook", report_width = %report_width);
        Box::new(
            MietteHandlerOpts::new()
                .width(report_width)
                .wrap_lines(true)
                .unicode(true)
                .context_lines(3)
                .tab_width(4)
                .break_words(true)
                .with_cause_chain()
                .footer(issues_url.to_string())
                .build(),
        )
    }));
}
