// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! The lifecycle of one [`BlockingLoop`](crate::BlockingLoop), as an explicit state
//! machine. See [`LoopPhase::apply()`] for the transition table.

use std::fmt::{self, Display};

/// Where a loop is in its lifecycle.
///
/// ```text
/// Idle ──Start──► Fetching ──FetchSucceeded{keep_polling: true}──► Fetching
///                    │ ├─────FetchAborted─────────────────────────► Fetching
///                    │ ├─────FetchSucceeded{keep_polling: false}──► Waiting
///                    │ └─────FetchFailed──────────────────────────► Closing
///                    │
/// Idle | Fetching | Waiting ──RequestClose──► Closing ──CloseCompleted──► Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopPhase {
    /// Created, not started yet.
    Idle,
    /// A blocking request is outstanding (or about to be reissued after an abort).
    Fetching,
    /// Autorefresh is off. No request is outstanding, and the last value stays current
    /// until the loop is closed.
    Waiting,
    /// Tearing down.
    Closing,
    /// Terminal. Nothing is emitted from here on.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopEvent {
    Start,
    FetchSucceeded { keep_polling: bool },
    FetchAborted,
    FetchFailed,
    RequestClose,
    CloseCompleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error, miette::Diagnostic)]
#[error("Invalid loop transition: {event:?} is not allowed in phase {from}")]
#[diagnostic(code(r3bl_data_source::loop_state::invalid_transition))]
pub struct InvalidTransition {
    pub from: LoopPhase,
    pub event: LoopEvent,
}

impl LoopPhase {
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] if `event` is not allowed in this phase. The phase
    /// is left unchanged in that case, since `self` is [`Copy`].
    pub fn apply(self, event: LoopEvent) -> Result<LoopPhase, InvalidTransition> {
        use LoopEvent as E;
        use LoopPhase as P;

        match (self, event) {
            (P::Idle, E::Start) => Ok(P::Fetching),
            (P::Fetching, E::FetchSucceeded { keep_polling: true }) => Ok(P::Fetching),
            (P::Fetching, E::FetchSucceeded { keep_polling: false }) => Ok(P::Waiting),
            (P::Fetching, E::FetchAborted) => Ok(P::Fetching),
            (P::Fetching, E::FetchFailed) => Ok(P::Closing),
            (P::Idle | P::Fetching | P::Waiting | P::Closing, E::RequestClose) => {
                Ok(P::Closing)
            }
            (P::Closing, E::CloseCompleted) => Ok(P::Closed),
            (P::Closed, E::RequestClose) => Ok(P::Closed),
            (from, event) => Err(InvalidTransition { from, event }),
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool { matches!(self, LoopPhase::Closing | LoopPhase::Closed) }
}

impl Display for LoopPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let it = match self {
            LoopPhase::Idle => "idle",
            LoopPhase::Fetching => "fetching",
            LoopPhase::Waiting => "waiting",
            LoopPhase::Closing => "closing",
            LoopPhase::Closed => "closed",
        };
        f.write_str(it)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(LoopPhase::Idle, LoopEvent::Start, LoopPhase::Fetching ; "start")]
    #[test_case(
        LoopPhase::Fetching, LoopEvent::FetchSucceeded { keep_polling: true }, LoopPhase::Fetching ;
        "success with autorefresh"
    )]
    #[test_case(
        LoopPhase::Fetching, LoopEvent::FetchSucceeded { keep_polling: false }, LoopPhase::Waiting ;
        "success without autorefresh"
    )]
    #[test_case(LoopPhase::Fetching, LoopEvent::FetchAborted, LoopPhase::Fetching ; "abort")]
    #[test_case(LoopPhase::Fetching, LoopEvent::FetchFailed, LoopPhase::Closing ; "failure")]
    #[test_case(LoopPhase::Idle, LoopEvent::RequestClose, LoopPhase::Closing ; "close idle")]
    #[test_case(LoopPhase::Fetching, LoopEvent::RequestClose, LoopPhase::Closing ; "close fetching")]
    #[test_case(LoopPhase::Waiting, LoopEvent::RequestClose, LoopPhase::Closing ; "close waiting")]
    #[test_case(LoopPhase::Closing, LoopEvent::RequestClose, LoopPhase::Closing ; "close closing")]
    #[test_case(LoopPhase::Closing, LoopEvent::CloseCompleted, LoopPhase::Closed ; "close completed")]
    #[test_case(LoopPhase::Closed, LoopEvent::RequestClose, LoopPhase::Closed ; "close closed")]
    fn test_valid_transitions(from: LoopPhase, event: LoopEvent, expected: LoopPhase) {
        assert_eq!(from.apply(event), Ok(expected));
    }

    #[test_case(LoopPhase::Fetching, LoopEvent::Start ; "double start")]
    #[test_case(LoopPhase::Closed, LoopEvent::Start ; "restart closed")]
    #[test_case(LoopPhase::Waiting, LoopEvent::FetchAborted ; "abort while waiting")]
    #[test_case(LoopPhase::Idle, LoopEvent::FetchFailed ; "failure before start")]
    #[test_case(LoopPhase::Closed, LoopEvent::FetchSucceeded { keep_polling: true } ; "late result")]
    #[test_case(LoopPhase::Fetching, LoopEvent::CloseCompleted ; "complete without close")]
    fn test_invalid_transitions(from: LoopPhase, event: LoopEvent) {
        assert_eq!(from.apply(event), Err(InvalidTransition { from, event }));
    }

    #[test]
    fn test_error_message() {
        let error = LoopPhase::Closed.apply(LoopEvent::Start).unwrap_err();
        assert_eq!(
            error.to_string(),
            "Invalid loop transition: Start is not allowed in phase closed"
        );
    }
}
