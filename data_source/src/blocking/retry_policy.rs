// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Failure classification and refetch decisions: [`RetryPolicy`].

use std::{sync::Arc, time::Duration};

use crate::{AutorefreshPreference, FetchError, TransportAvailability};

/// How the loop reacts to a [`FetchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The request was cancelled by the transport (status marker `"0"`). Retried on the
    /// same loop with the same cursor, never surfaced to observers.
    Abort,
    /// Anything else. Surfaced once to every observer, then the loop ends.
    Terminal,
}

/// What the loop does after a successful fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterFetch {
    /// Issue the next blocking request right away with the advanced cursor.
    Refetch,
    /// Stop fetching and stay alive until closed.
    Idle,
}

#[must_use]
pub fn classify(error: &FetchError) -> ErrorClass {
    match error {
        FetchError::Aborted | FetchError::Status { status: 0, .. } => ErrorClass::Abort,
        FetchError::Status { .. } | FetchError::Transport { .. } | FetchError::Decode { .. } => {
            ErrorClass::Terminal
        }
    }
}

/// Extra delay between consecutive abort retries, applied after the transport reports
/// it is available again.
///
/// Works like a restart policy with exponential backoff: attempt `n` (1 based) waits
/// `initial_delay * backoff_multiplier^(n-1)`, capped at `max_delay`. The default has no
/// delay at all, so the availability signal alone gates the retry.
///
/// ```text
/// initial 100ms, multiplier 2.0, max 300ms
/// Attempt 1: 100ms
/// Attempt 2: 200ms
/// Attempt 3: 300ms (capped)
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AbortBackoff {
    /// Delay before the first retry. [`None`] means no delay.
    pub initial_delay: Option<Duration>,

    /// [`None`] means constant delay (no growth).
    pub backoff_multiplier: Option<f64>,

    /// Cap on delay growth. [`None`] means unbounded growth.
    pub max_delay: Option<Duration>,
}

impl AbortBackoff {
    /// Delay for the `attempt`th consecutive abort (1 based). Attempt `0` is treated as
    /// attempt `1`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        let mut delay = self.initial_delay?;
        for _ in 1..attempt {
            delay = self.advance_delay(delay);
            if self.max_delay.is_some_and(|max| delay >= max) {
                break;
            }
        }
        Some(self.cap(delay))
    }

    fn advance_delay(&self, delay: Duration) -> Duration {
        match self.backoff_multiplier {
            Some(multiplier) if multiplier.is_finite() && multiplier > 0.0 => {
                self.cap(delay.mul_f64(multiplier))
            }
            _ => delay,
        }
    }

    fn cap(&self, delay: Duration) -> Duration {
        match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }
}

/// Shared by every loop of a registry. Holds the injected collaborators, which it reads
/// but never mutates.
#[derive(Clone)]
pub struct RetryPolicy {
    transport: Arc<dyn TransportAvailability>,
    autorefresh: Arc<dyn AutorefreshPreference>,
    backoff: AbortBackoff,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    pub fn new(
        transport: Arc<dyn TransportAvailability>,
        autorefresh: Arc<dyn AutorefreshPreference>,
    ) -> Self {
        Self {
            transport,
            autorefresh,
            backoff: AbortBackoff::default(),
        }
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: AbortBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn backoff(&self) -> &AbortBackoff { &self.backoff }

    #[must_use]
    pub fn classify(&self, error: &FetchError) -> ErrorClass { classify(error) }

    /// Resolves when the loop may reissue the fetch that failed with `error`, which is
    /// the `attempt`th consecutive abort.
    ///
    /// # Errors
    ///
    /// Returns `error` unchanged if it is [`ErrorClass::Terminal`].
    pub async fn recover(&self, error: FetchError, attempt: u32) -> Result<(), FetchError> {
        if classify(&error) == ErrorClass::Terminal {
            return Err(error);
        }

        self.transport.when_available(&error).await;

        if let Some(delay) = self.backoff.delay_for_attempt(attempt) {
            tracing::debug!(message = "Abort backoff", attempt, delay = ?delay);
            tokio::time::sleep(delay).await;
        }

        Ok(())
    }

    /// Reads the autorefresh preference fresh every time.
    pub async fn after_success(&self) -> AfterFetch {
        if self.autorefresh.is_autorefresh_enabled().await {
            AfterFetch::Refetch
        } else {
            AfterFetch::Idle
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AutorefreshSetting, TransportMonitor};
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(FetchError::Aborted, ErrorClass::Abort ; "aborted")]
    #[test_case(FetchError::status(0, "cancelled"), ErrorClass::Abort ; "status zero")]
    #[test_case(FetchError::status(500, "boom"), ErrorClass::Terminal ; "server error")]
    #[test_case(FetchError::status(403, "acl"), ErrorClass::Terminal ; "forbidden")]
    #[test_case(FetchError::Transport { message: "reset".into() }, ErrorClass::Terminal ; "transport")]
    #[test_case(FetchError::Decode { message: "bad json".into() }, ErrorClass::Terminal ; "decode")]
    fn test_classify(error: FetchError, expected: ErrorClass) {
        assert_eq!(classify(&error), expected);
    }

    #[test]
    fn test_default_backoff_has_no_delay() {
        let backoff = AbortBackoff::default();
        assert_eq!(backoff.delay_for_attempt(1), None);
        assert_eq!(backoff.delay_for_attempt(10), None);
    }

    #[test]
    fn test_backoff_exponential_with_cap() {
        let backoff = AbortBackoff {
            initial_delay: Some(Duration::from_millis(100)),
            backoff_multiplier: Some(2.0),
            max_delay: Some(Duration::from_millis(300)),
        };
        assert_eq!(backoff.delay_for_attempt(0), Some(Duration::from_millis(100)));
        assert_eq!(backoff.delay_for_attempt(1), Some(Duration::from_millis(100)));
        assert_eq!(backoff.delay_for_attempt(2), Some(Duration::from_millis(200)));
        assert_eq!(backoff.delay_for_attempt(3), Some(Duration::from_millis(300)));
        assert_eq!(backoff.delay_for_attempt(50), Some(Duration::from_millis(300)));
    }

    #[test]
    fn test_backoff_constant_delay() {
        let backoff = AbortBackoff {
            initial_delay: Some(Duration::from_millis(50)),
            backoff_multiplier: None,
            max_delay: None,
        };
        assert_eq!(backoff.delay_for_attempt(4), Some(Duration::from_millis(50)));
    }

    #[test]
    fn test_backoff_unbounded_growth() {
        let backoff = AbortBackoff {
            initial_delay: Some(Duration::from_millis(100)),
            backoff_multiplier: Some(3.0),
            max_delay: None,
        };
        assert_eq!(backoff.delay_for_attempt(3), Some(Duration::from_millis(900)));
    }

    #[tokio::test]
    async fn test_recover_returns_terminal_error_unchanged() {
        let policy = RetryPolicy::new(
            Arc::new(TransportMonitor::default()),
            Arc::new(AutorefreshSetting::default()),
        );
        let error = FetchError::status(500, "boom");
        assert_eq!(policy.recover(error.clone(), 1).await, Err(error));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recover_waits_for_transport_then_backoff() {
        let monitor = Arc::new(TransportMonitor::new(false));
        let policy = RetryPolicy::new(monitor.clone(), Arc::new(AutorefreshSetting::default()))
            .with_backoff(AbortBackoff {
                initial_delay: Some(Duration::from_millis(100)),
                backoff_multiplier: None,
                max_delay: None,
            });

        let start = tokio::time::Instant::now();
        let recover = tokio::spawn(async move { policy.recover(FetchError::Aborted, 1).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!recover.is_finished());
        monitor.set_available(true);

        assert_eq!(recover.await.unwrap(), Ok(()));
        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_after_success_follows_setting() {
        let setting = AutorefreshSetting::default();
        let policy =
            RetryPolicy::new(Arc::new(TransportMonitor::default()), Arc::new(setting.clone()));
        assert_eq!(policy.after_success().await, AfterFetch::Refetch);

        setting.set(false);
        assert_eq!(policy.after_success().await, AfterFetch::Idle);
    }
}
