//! Bounded retries around one unit of work.
//!
//! Every attempt end writes exactly one record to the [`History`]. Errors that can never succeed
//! (see [`Error::is_retryable`]) end the loop at once, and cancellation is honoured both during an
//! attempt and during the delay between attempts.

use crate::error::Error;
use crate::history::{AttemptRecord, AttemptStatus, History};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How many times and how often a unit of work is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// The maximum number of attempts, at least 1.
    pub max_attempts: u32,
    /// The fixed delay between two attempts.
    #[serde(with = "duration_secs")]
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Where a unit of work stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Not started.
    Idle,
    /// Running the given 1-based attempt, or waiting before it.
    Attempting(u32),
    /// An attempt succeeded.
    Succeeded,
    /// Every allowed attempt failed, or the failure was permanent.
    FailedExhausted,
}

/// How a unit of work ended.
#[derive(Debug)]
pub enum RetryOutcome<T> {
    /// An attempt succeeded.
    Succeeded {
        /// The value produced.
        value: T,
        /// The number of attempts made.
        attempts: u32,
    },
    /// Every allowed attempt failed.
    Exhausted {
        /// The number of attempts made.
        attempts: u32,
        /// The error of the last attempt.
        error: Error,
    },
    /// An attempt failed with an error that no retry can fix.
    Rejected {
        /// The number of attempts made.
        attempts: u32,
        /// The permanent error.
        error: Error,
    },
    /// The work was cancelled.
    Interrupted {
        /// The number of attempts started.
        attempts: u32,
    },
}

impl<T> RetryOutcome<T> {
    /// The number of attempts made.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Succeeded { attempts, .. }
            | RetryOutcome::Exhausted { attempts, .. }
            | RetryOutcome::Rejected { attempts, .. }
            | RetryOutcome::Interrupted { attempts } => *attempts,
        }
    }
}

/// Runs one unit of work under a [`RetryPolicy`].
#[derive(Debug)]
pub struct RetryCoordinator {
    policy: RetryPolicy,
    history: Arc<History>,
    cancel: CancellationToken,
    state: RetryState,
}

impl RetryCoordinator {
    /// Creates a coordinator recording into `history` and stopping when `cancel` fires.
    pub fn new(policy: RetryPolicy, history: Arc<History>, cancel: CancellationToken) -> Self {
        Self {
            policy,
            history,
            cancel,
            state: RetryState::Idle,
        }
    }

    /// The current state.
    pub fn state(&self) -> RetryState {
        self.state
    }

    /// Runs `operation` until it succeeds, fails permanently, runs out of attempts, or is cancelled.
    ///
    /// # Arguments
    ///
    /// * `source` - The source reference written in the history.
    /// * `operation` - Called with the 1-based attempt number.
    pub async fn run<T, F, Fut>(&mut self, source: &str, operation: F) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = crate::error::Result<T>>,
    {
        self.run_with(source, |_| AttemptStatus::Success, operation)
            .await
    }

    /// Same as [`RetryCoordinator::run`], but the record of a successful attempt carries the status
    /// returned by `success_status` for the produced value.
    pub async fn run_with<T, S, F, Fut>(
        &mut self,
        source: &str,
        success_status: S,
        mut operation: F,
    ) -> RetryOutcome<T>
    where
        S: Fn(&T) -> AttemptStatus,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = crate::error::Result<T>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.state = RetryState::Attempting(attempt);

            if self.cancel.is_cancelled() {
                return self.interrupted(source, attempt - 1).await;
            }

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(Error::Interrupted),
                result = operation(attempt) => result,
            };

            let error = match result {
                Ok(value) => {
                    self.record(source, attempt, success_status(&value), None)
                        .await;
                    if attempt > 1 {
                        log::info!("{} succeeded after {} attempts", source, attempt);
                    }

                    self.state = RetryState::Succeeded;
                    return RetryOutcome::Succeeded {
                        value,
                        attempts: attempt,
                    };
                }
                Err(Error::Interrupted) => return self.interrupted(source, attempt).await,
                Err(error) => error,
            };

            if !error.is_retryable() {
                let status = match &error {
                    Error::AccessRestricted(_) => AttemptStatus::FailedAccessRestricted,
                    _ => AttemptStatus::Failed,
                };
                self.record(source, attempt, status, Some(error.to_string()))
                    .await;
                log::error!("{} cannot be downloaded: {}", source, error);

                self.state = RetryState::FailedExhausted;
                return RetryOutcome::Rejected {
                    attempts: attempt,
                    error,
                };
            }

            self.record(source, attempt, AttemptStatus::Failed, Some(error.to_string()))
                .await;

            if attempt >= max_attempts {
                log::error!(
                    "Maximum retries reached, {} failed after {} attempts: {}",
                    source,
                    attempt,
                    error
                );

                self.state = RetryState::FailedExhausted;
                return RetryOutcome::Exhausted {
                    attempts: attempt,
                    error,
                };
            }

            log::warn!(
                "Attempt {} for {} failed: {}. Retrying in {:?}...",
                attempt,
                source,
                error,
                self.policy.delay
            );

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return self.interrupted(source, attempt).await,
                _ = tokio::time::sleep(self.policy.delay) => {}
            }
        }
    }

    async fn interrupted<T>(&mut self, source: &str, attempts: u32) -> RetryOutcome<T> {
        self.record(source, attempts.max(1), AttemptStatus::Interrupted, None)
            .await;
        log::warn!("{} interrupted", source);

        self.state = RetryState::FailedExhausted;
        RetryOutcome::Interrupted { attempts }
    }

    async fn record(
        &self,
        source: &str,
        attempt: u32,
        status: AttemptStatus,
        error: Option<String>,
    ) {
        self.history
            .record(&AttemptRecord::new(source, attempt, status, error))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HISTORY_FILE_NAME;
    use std::sync::atomic::{AtomicU32, Ordering};

    const SOURCE: &str = "https://youtu.be/abc";

    async fn history() -> (tempfile::TempDir, Arc<History>) {
        let dir = tempfile::tempdir().unwrap();
        let history = Arc::new(History::open(dir.path()).await);
        (dir, history)
    }

    async fn statuses(dir: &tempfile::TempDir) -> Vec<String> {
        tokio::fs::read_to_string(dir.path().join(HISTORY_FILE_NAME))
            .await
            .unwrap()
            .lines()
            .map(|line| {
                let status = line.split("Status: ").nth(1).unwrap();
                status.split(", Error").next().unwrap().to_string()
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn success_on_third_attempt_records_three_attempts() {
        let (dir, history) = history().await;
        let policy = RetryPolicy::default();
        let mut coordinator = RetryCoordinator::new(policy, history, CancellationToken::new());

        let started = tokio::time::Instant::now();
        let outcome = coordinator
            .run(SOURCE, |attempt| async move {
                if attempt < 3 {
                    Err(Error::Provider(format!("HTTP Error 503 on {}", attempt)))
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert!(started.elapsed() >= policy.delay * 2);
        assert!(matches!(
            outcome,
            RetryOutcome::Succeeded {
                value: 3,
                attempts: 3
            }
        ));
        assert_eq!(coordinator.state(), RetryState::Succeeded);
        assert_eq!(
            statuses(&dir).await,
            vec!["Failed - Attempt 1", "Failed - Attempt 2", "Success"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn access_restricted_is_not_retried() {
        let (dir, history) = history().await;
        let calls = AtomicU32::new(0);
        let mut coordinator =
            RetryCoordinator::new(RetryPolicy::default(), history, CancellationToken::new());

        let outcome: RetryOutcome<()> = coordinator
            .run(SOURCE, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::AccessRestricted("Sign in to confirm your age".into())) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            outcome,
            RetryOutcome::Rejected {
                attempts: 1,
                error: Error::AccessRestricted(_)
            }
        ));
        assert_eq!(coordinator.state(), RetryState::FailedExhausted);
        assert_eq!(statuses(&dir).await, vec!["Failed - Age Restricted"]);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_stops_at_max_attempts() {
        let (dir, history) = history().await;
        let policy = RetryPolicy {
            max_attempts: 2,
            delay: Duration::from_secs(1),
        };
        let mut coordinator = RetryCoordinator::new(policy, history, CancellationToken::new());

        let outcome: RetryOutcome<()> = coordinator
            .run(SOURCE, |_| async { Err(Error::Command("exit 1".into())) })
            .await;

        assert!(matches!(
            outcome,
            RetryOutcome::Exhausted {
                attempts: 2,
                error: Error::Command(_)
            }
        ));
        assert_eq!(
            statuses(&dir).await,
            vec!["Failed - Attempt 1", "Failed - Attempt 2"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_delay_stops_retrying() {
        let (dir, history) = history().await;
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let mut coordinator = RetryCoordinator::new(RetryPolicy::default(), history, cancel.clone());

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let outcome: RetryOutcome<()> = coordinator
            .run(SOURCE, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::Provider("reset".into())) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(outcome, RetryOutcome::Interrupted { attempts: 1 }));
        assert_eq!(
            statuses(&dir).await,
            vec!["Failed - Attempt 1", "Interrupted"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_abandons_running_attempt() {
        let (dir, history) = history().await;
        let cancel = CancellationToken::new();
        let mut coordinator = RetryCoordinator::new(RetryPolicy::default(), history, cancel.clone());

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let outcome: RetryOutcome<()> = coordinator
            .run(SOURCE, |_| std::future::pending())
            .await;

        assert!(matches!(outcome, RetryOutcome::Interrupted { attempts: 1 }));
        assert_eq!(statuses(&dir).await, vec!["Interrupted"]);
    }

    #[tokio::test]
    async fn already_cancelled_runs_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = AtomicU32::new(0);
        let mut coordinator = RetryCoordinator::new(
            RetryPolicy::default(),
            Arc::new(History::console_only()),
            cancel,
        );

        let outcome: RetryOutcome<()> = coordinator
            .run(SOURCE, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(matches!(outcome, RetryOutcome::Interrupted { attempts: 0 }));
    }

    #[tokio::test]
    async fn success_status_follows_the_value() {
        let (dir, history) = history().await;
        let mut coordinator =
            RetryCoordinator::new(RetryPolicy::default(), history, CancellationToken::new());

        let outcome = coordinator
            .run_with(
                SOURCE,
                |kept: &bool| {
                    if *kept {
                        AttemptStatus::Success
                    } else {
                        AttemptStatus::Skipped
                    }
                },
                |_| async { Ok(false) },
            )
            .await;

        assert!(matches!(
            outcome,
            RetryOutcome::Succeeded {
                value: false,
                attempts: 1
            }
        ));
        assert_eq!(statuses(&dir).await, vec!["Skipped"]);
    }
}
