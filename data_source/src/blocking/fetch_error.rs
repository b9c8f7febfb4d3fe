// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Failures reported by a [`FetchFn`](crate::FetchFn). See [`FetchError`].

/// The status marker transports use for a request that was cancelled before the server
/// responded (no real HTTP status exists).
pub const ABORT_STATUS_MARKER: &str = "0";

/// Why a fetch failed. Every variant must carry enough information for the
/// [`RetryPolicy`](crate::RetryPolicy) to tell an abort (status `"0"`) apart from a real
/// failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, miette::Diagnostic)]
pub enum FetchError {
    #[error("Request was aborted before the server responded")]
    #[diagnostic(
        code(r3bl_data_source::fetch::aborted),
        help("The request is retried with the same cursor once the transport is available")
    )]
    Aborted,

    #[error("Server responded with status {status}: {message}")]
    #[diagnostic(code(r3bl_data_source::fetch::status))]
    Status { status: u16, message: String },

    #[error("Transport failed: {message}")]
    #[diagnostic(code(r3bl_data_source::fetch::transport))]
    Transport { message: String },

    #[error("Response could not be decoded: {message}")]
    #[diagnostic(code(r3bl_data_source::fetch::decode))]
    Decode { message: String },
}

impl FetchError {
    /// Builds an error from the status marker a transport reports. `"0"` is an abort,
    /// any other number is a server status, and anything unparsable is a transport
    /// failure.
    pub fn from_status_marker(marker: &str, message: impl Into<String>) -> Self {
        let marker = marker.trim();
        if marker == ABORT_STATUS_MARKER {
            return FetchError::Aborted;
        }
        match marker.parse::<u16>() {
            Ok(status) => FetchError::Status {
                status,
                message: message.into(),
            },
            Err(_) => FetchError::Transport {
                message: format!("{} (status marker {marker:?})", message.into()),
            },
        }
    }

    /// The status marker for this error, if it has one.
    #[must_use]
    pub fn status_marker(&self) -> Option<String> {
        match self {
            FetchError::Aborted => Some(ABORT_STATUS_MARKER.to_string()),
            FetchError::Status { status, .. } => Some(status.to_string()),
            FetchError::Transport { .. } | FetchError::Decode { .. } => None,
        }
    }

    pub fn status(status: u16, message: impl Into<String>) -> Self {
        FetchError::Status {
            status,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case("0", FetchError::Aborted ; "abort")]
    #[test_case(" 0 ", FetchError::Aborted ; "abort with whitespace")]
    #[test_case("500", FetchError::status(500, "boom") ; "server error")]
    #[test_case("404", FetchError::status(404, "boom") ; "not found")]
    fn test_from_status_marker(marker: &str, expected: FetchError) {
        assert_eq!(FetchError::from_status_marker(marker, "boom"), expected);
    }

    #[test]
    fn test_unparsable_marker_is_transport_failure() {
        let error = FetchError::from_status_marker("timeout", "boom");
        assert!(matches!(error, FetchError::Transport { .. }));
        assert_eq!(error.status_marker(), None);
    }

    #[test]
    fn test_status_marker_round_trip_for_abort() {
        assert_eq!(FetchError::Aborted.status_marker().as_deref(), Some("0"));
        assert_eq!(
            FetchError::status(503, "unavailable").status_marker().as_deref(),
            Some("503")
        );
    }
}
