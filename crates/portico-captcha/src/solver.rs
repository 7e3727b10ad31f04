//! Remote captcha solving.
//!
//! The hosted provider solves challenges server-side; the client only issues
//! `Captcha.waitForSolve` and interprets the reply. The call can hang past
//! its own detection timeout, so every invocation runs under a slightly
//! longer wrapper timeout.

use crate::error::{Result, SolverError};
use async_trait::async_trait;
use portico_browser::{Page, RawCdpCommand};
use serde_json::json;
use std::time::Duration;

/// Extra headroom on top of the requested detection timeout.
pub const WRAPPER_TIMEOUT_MARGIN_MS: u64 = 5_000;

/// How much each retry widens the detection window.
pub const SOLVE_TIMEOUT_INCREMENT_MS: u64 = 15_000;

/// Fixed pause between solve retries.
pub const SOLVE_RETRY_SLEEP_MS: u64 = 3_000;

/// Tri-state result of one solve pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolveStatus {
    /// Challenge solved. `tentative` marks a wrapper timeout upgraded to
    /// success after the validation settle delay.
    Solved {
        /// Whether success was assumed rather than confirmed by the provider
        tentative: bool,
    },
    /// No challenge was present to solve
    Skipped,
    /// The solver gave up on this pass
    Failed {
        /// Provider status or timeout description
        reason: String,
    },
}

impl SolveStatus {
    /// Whether a token should now exist on the page.
    #[must_use]
    pub fn is_solved(&self) -> bool {
        matches!(self, Self::Solved { .. })
    }

    /// Whether this pass failed and a retry makes sense.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// A pluggable captcha solving strategy.
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    /// Run one solve pass with the given detection window.
    async fn solve(&self, detect_timeout: Duration) -> Result<SolveStatus>;

    /// Run solve passes until one does not fail, widening the detection
    /// window arithmetically and sleeping a fixed delay between passes.
    ///
    /// `max_retries` is the total number of passes; zero is clamped to one.
    /// Returns the first non-failed status, or the last failure.
    async fn solve_with_retry(
        &self,
        base_timeout: Duration,
        max_retries: u32,
    ) -> Result<SolveStatus> {
        let tries = max_retries.max(1);
        let mut last = SolveStatus::Failed {
            reason: "solver not invoked".to_string(),
        };

        for pass in 0..tries {
            if pass > 0 {
                tokio::time::sleep(Duration::from_millis(SOLVE_RETRY_SLEEP_MS)).await;
            }
            let window = base_timeout + Duration::from_millis(SOLVE_TIMEOUT_INCREMENT_MS) * pass;
            tracing::info!(
                "Solve pass {}/{} (detection window {:?})",
                pass + 1,
                tries,
                window
            );

            let status = self.solve(window).await?;
            if status.is_failed() {
                tracing::warn!("Solve pass {} failed: {:?}", pass + 1, status);
                last = status;
            } else {
                return Ok(status);
            }
        }

        Ok(last)
    }
}

/// Policy knobs for the provider-backed solver.
#[derive(Debug, Clone)]
pub struct SolvePolicy {
    /// Ask the provider to auto-submit the form once solved
    pub auto_submit: bool,
    /// Treat a wrapper-level timeout as tentative success
    pub tentative_success_on_timeout: bool,
    /// Validation settle delay applied before assuming tentative success
    pub post_timeout_settle: Duration,
}

/// Solver backed by the hosted provider's wait-for-solve primitive.
pub struct RemoteSolver {
    page: Page,
    policy: SolvePolicy,
}

impl RemoteSolver {
    /// Bind a solver to one page session.
    #[must_use]
    pub fn new(page: Page, policy: SolvePolicy) -> Self {
        Self { page, policy }
    }
}

#[async_trait]
impl CaptchaSolver for RemoteSolver {
    async fn solve(&self, detect_timeout: Duration) -> Result<SolveStatus> {
        let wrapper = detect_timeout + Duration::from_millis(WRAPPER_TIMEOUT_MARGIN_MS);
        let detect_ms = u64::try_from(detect_timeout.as_millis()).unwrap_or(u64::MAX);
        let command = RawCdpCommand::new(
            "Captcha.waitForSolve",
            json!({
                "detectTimeout": detect_ms,
                "autoSubmit": self.policy.auto_submit,
            }),
        );

        tracing::info!("Waiting for provider solve ({}ms window)", detect_ms);
        match tokio::time::timeout(wrapper, self.page.execute(command)).await {
            Ok(Ok(reply)) => {
                let status = status_from_reply(&reply.result)?;
                tracing::info!("Provider solve finished: {:?}", status);
                Ok(status)
            }
            Ok(Err(e)) => Err(SolverError::Protocol(e.to_string())),
            Err(_) if self.policy.tentative_success_on_timeout => {
                // A token may already exist even though the wait call never
                // returned; give backend validation time to catch up, then
                // let token resolution decide.
                tracing::warn!(
                    "Solve wait exceeded {:?}; settling {:?} before assuming tentative success",
                    wrapper,
                    self.policy.post_timeout_settle
                );
                tokio::time::sleep(self.policy.post_timeout_settle).await;
                Ok(SolveStatus::Solved { tentative: true })
            }
            Err(_) => Ok(SolveStatus::Failed {
                reason: format!("solve wait timed out after {wrapper:?}"),
            }),
        }
    }
}

/// Map a provider reply to the tri-state status.
fn status_from_reply(reply: &serde_json::Value) -> Result<SolveStatus> {
    let status = reply
        .get("status")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| SolverError::MalformedReply(reply.to_string()))?;

    Ok(match status {
        "solve_finished" => SolveStatus::Solved { tentative: false },
        "solve_skipped" | "not_detected" => SolveStatus::Skipped,
        other => SolveStatus::Failed {
            reason: format!("unexpected solver status: {other}"),
        },
    })
}
