// Copyright (c) 2024-2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! File writer for the `tracing` file layer. The log file is never rotated; the
//! `tracing_log_file_path` is split into its parent folder and file name.

use std::path::PathBuf;

use miette::miette;

/// # Errors
///
/// Returns an error if `path_str` has no parent folder or no file name.
pub fn try_create(
    path_str: &str,
) -> miette::Result<tracing_appender::rolling::RollingFileAppender> {
    let path = PathBuf::from(path_str);

    let file_name = path.file_name().ok_or_else(|| {
        miette!("Can't use {} as a log file, it has no file name.", path.display())
    })?;

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        Some(_) => PathBuf::from("."),
        None => {
            return Err(miette!(
                "Can't access the folder for {}. It might not exist, or you don't have the required permissions.",
                path.display()
            ));
        }
    };

    Ok(tracing_appender::rolling::never(parent, file_name))
}
