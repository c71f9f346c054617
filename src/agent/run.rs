//! Run lifecycle state machine and the poll loop that drives it.
//!
//! [`transition`] is a pure function over elapsed time and the last
//! observed remote status, so the lifecycle rules are testable without a
//! clock. [`wait_for_terminal`] drives it with `tokio::time` sleeps and a
//! cancellation token.

use std::fmt;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::service::{AgentService, RemoteRunStatus, RunHandle};
use crate::error::TriageError;

/// Local view of a run's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunPhase {
    /// Accepted but not started.
    Queued,
    /// Executing (includes transient and unknown remote states).
    Running,
    /// Finished successfully.
    Completed,
    /// Ended unsuccessfully.
    Failed {
        /// Remote status that caused the failure.
        status: String,
        /// Error detail.
        message: String,
    },
    /// Cancelled on the service side.
    Cancelled,
    /// Expired on the service side.
    Expired,
    /// No terminal status within the local bound.
    TimedOut,
}

impl RunPhase {
    /// Whether polling should stop.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Queued | Self::Running)
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => f.write_str("queued"),
            Self::Running => f.write_str("running"),
            Self::Completed => f.write_str("completed"),
            Self::Failed { status, .. } => f.write_str(status),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Expired => f.write_str("expired"),
            Self::TimedOut => f.write_str("timed out"),
        }
    }
}

/// Computes the next phase from elapsed time and the observed remote status.
///
/// A terminal remote status always wins, even past the timeout. Statuses
/// this client cannot act on (`requires_action`, `incomplete`) are
/// failures. Transient and unknown statuses keep the run going until
/// `elapsed` reaches `timeout`.
#[must_use]
pub fn transition(elapsed: Duration, timeout: Duration, observed: &RemoteRunStatus) -> RunPhase {
    let pending = match observed {
        RemoteRunStatus::Completed => return RunPhase::Completed,
        RemoteRunStatus::Cancelled => return RunPhase::Cancelled,
        RemoteRunStatus::Expired => return RunPhase::Expired,
        RemoteRunStatus::Failed { message } => {
            return RunPhase::Failed {
                status: observed.as_str().to_string(),
                message: if message.is_empty() {
                    "no error detail from service".to_string()
                } else {
                    message.clone()
                },
            };
        }
        RemoteRunStatus::RequiresAction => {
            return RunPhase::Failed {
                status: observed.as_str().to_string(),
                message: "agent requested tool outputs, which this client does not provide"
                    .to_string(),
            };
        }
        RemoteRunStatus::Incomplete => {
            return RunPhase::Failed {
                status: observed.as_str().to_string(),
                message: "agent stopped before finishing its answer".to_string(),
            };
        }
        RemoteRunStatus::Queued => RunPhase::Queued,
        RemoteRunStatus::InProgress
        | RemoteRunStatus::Cancelling
        | RemoteRunStatus::Unknown(_) => RunPhase::Running,
    };

    if elapsed >= timeout {
        RunPhase::TimedOut
    } else {
        pending
    }
}

/// Result of driving a run to a terminal phase.
#[derive(Debug, Clone)]
pub struct PollOutcome {
    /// Terminal phase reached.
    pub phase: RunPhase,
    /// Time spent polling.
    pub elapsed: Duration,
    /// Number of status reads performed.
    pub polls: u32,
}

/// Polls `run` every `interval` until a terminal phase.
///
/// Sleeps never overshoot the timeout. Cancellation is checked while
/// sleeping and while a status read is in flight; a cancelled wait returns
/// [`TriageError::Cancelled`] without touching the remote run.
pub async fn wait_for_terminal(
    service: &dyn AgentService,
    run: &RunHandle,
    interval: Duration,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<PollOutcome, TriageError> {
    let start = Instant::now();
    let mut polls: u32 = 0;

    loop {
        let status = tokio::select! {
            () = cancel.cancelled() => return Err(TriageError::Cancelled),
            status = service.poll_run(run) => status?,
        };
        polls = polls.saturating_add(1);

        let elapsed = start.elapsed();
        let phase = transition(elapsed, timeout, &status);
        debug!(
            thread_id = %run.thread_id,
            run_id = %run.run_id,
            remote_status = %status,
            phase = %phase,
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "polled run"
        );

        if phase.is_terminal() {
            return Ok(PollOutcome {
                phase,
                elapsed,
                polls,
            });
        }

        let remaining = timeout.saturating_sub(elapsed);
        tokio::select! {
            () = cancel.cancelled() => return Err(TriageError::Cancelled),
            () = sleep(interval.min(remaining)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(120);

    #[test]
    fn test_pending_states_before_timeout() {
        let early = Duration::from_secs(1);
        assert_eq!(transition(early, TIMEOUT, &RemoteRunStatus::Queued), RunPhase::Queued);
        assert_eq!(
            transition(early, TIMEOUT, &RemoteRunStatus::InProgress),
            RunPhase::Running
        );
        assert_eq!(
            transition(early, TIMEOUT, &RemoteRunStatus::Cancelling),
            RunPhase::Running
        );
        assert_eq!(
            transition(early, TIMEOUT, &RemoteRunStatus::Unknown("paused".into())),
            RunPhase::Running
        );
    }

    #[test]
    fn test_pending_states_time_out() {
        assert_eq!(
            transition(TIMEOUT, TIMEOUT, &RemoteRunStatus::Queued),
            RunPhase::TimedOut
        );
        assert_eq!(
            transition(TIMEOUT * 2, TIMEOUT, &RemoteRunStatus::InProgress),
            RunPhase::TimedOut
        );
    }

    #[test]
    fn test_terminal_status_wins_over_timeout() {
        let late = TIMEOUT * 3;
        assert_eq!(transition(late, TIMEOUT, &RemoteRunStatus::Completed), RunPhase::Completed);
        assert_eq!(transition(late, TIMEOUT, &RemoteRunStatus::Expired), RunPhase::Expired);
        assert_eq!(transition(late, TIMEOUT, &RemoteRunStatus::Cancelled), RunPhase::Cancelled);
    }

    #[test]
    fn test_failures_carry_detail() {
        let phase = transition(
            Duration::ZERO,
            TIMEOUT,
            &RemoteRunStatus::Failed {
                message: "rate_limit_exceeded".into(),
            },
        );
        assert_eq!(
            phase,
            RunPhase::Failed {
                status: "failed".into(),
                message: "rate_limit_exceeded".into()
            }
        );

        let phase = transition(Duration::ZERO, TIMEOUT, &RemoteRunStatus::RequiresAction);
        assert!(matches!(phase, RunPhase::Failed { ref status, .. } if status == "requires_action"));
        assert!(phase.is_terminal());
    }

    #[test]
    fn test_terminal_flags() {
        assert!(!RunPhase::Queued.is_terminal());
        assert!(!RunPhase::Running.is_terminal());
        assert!(RunPhase::Completed.is_terminal());
        assert!(RunPhase::TimedOut.is_terminal());
    }
}
