//! Login-completion state machine.
//!
//! One machine run drives one page session through challenge detection,
//! solving, token placement, readiness gating, submission, and outcome
//! classification. The loop is strictly bounded: it either reaches a
//! terminal outcome or gives a best-effort verdict when the step budget
//! runs out.

use crate::classifier::{OutcomeClassifier, Verdict};
use crate::error::{LoginError, Result};
use crate::page::LoginPage;
use crate::state::{AttemptState, ProofToken, TokenSource, TOKEN_MIN_SUBMIT_LEN};
use crate::token;
use portico_captcha::{CaptchaSolver, SolveStatus};
use portico_core::{SolverConfig, TimingConfig};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on step-loop iterations per machine run.
pub const MAX_STEPS: u32 = 15;

/// Solve invocations allowed per page instance.
pub const MAX_SOLVE_ATTEMPTS: u32 = 3;

/// Injection tries before escalating to direct form-data submission.
const INJECTION_RETRIES: u32 = 3;

/// Backoff between injection tries.
const INJECTION_RETRY_DELAY: Duration = Duration::from_millis(500);

/// The raw-markup detection signal runs every n-th iteration only.
const MARKUP_SCAN_INTERVAL: u32 = 3;

/// Wait after a submission before reading the outcome.
const POST_SUBMIT_WAIT: Duration = Duration::from_millis(2_000);

/// Idle delay between step iterations.
const STEP_IDLE_DELAY: Duration = Duration::from_millis(1_000);

/// Result of one loop iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Nothing terminal happened; keep iterating
    Continue,
    /// Terminal positive outcome
    Success {
        /// False when the loop completed without explicit confirmation
        authenticated: bool,
        /// Human-readable outcome description
        detail: String,
    },
    /// The challenge state was reset in place; keep iterating
    RetryableFailure {
        /// Why this iteration failed
        reason: String,
    },
    /// Terminal negative outcome for this machine run
    FatalFailure {
        /// Why the run cannot proceed
        reason: String,
    },
}

/// Terminal verdict of one machine run.
#[derive(Debug, Clone)]
pub struct AttemptVerdict {
    /// Whether authentication was explicitly confirmed
    pub authenticated: bool,
    /// Human-readable outcome description
    pub detail: String,
}

/// The step loop over one page session.
pub struct LoginMachine<P, S> {
    page: P,
    solver: S,
    classifier: Arc<dyn OutcomeClassifier>,
    state: Arc<AttemptState>,
    detect_timeout: Duration,
    post_solve_settle: Duration,
    pre_submit_delay: Duration,
    solver_retries: u32,
    solve_attempts: u32,
    cert_button_suppressed: bool,
    resolved_token: Option<ProofToken>,
}

impl<P: LoginPage, S: CaptchaSolver> LoginMachine<P, S> {
    /// Assemble a machine over a page, a solver, and shared attempt state.
    pub fn new(
        page: P,
        solver: S,
        classifier: Arc<dyn OutcomeClassifier>,
        state: Arc<AttemptState>,
        timing: &TimingConfig,
        solver_cfg: &SolverConfig,
    ) -> Self {
        Self {
            page,
            solver,
            classifier,
            state,
            detect_timeout: Duration::from_millis(solver_cfg.detect_timeout_ms),
            post_solve_settle: Duration::from_millis(timing.post_solve_settle_ms),
            pre_submit_delay: Duration::from_millis(timing.pre_submit_delay_ms),
            solver_retries: solver_cfg.max_retries,
            solve_attempts: 0,
            cert_button_suppressed: false,
            resolved_token: None,
        }
    }

    /// Drive the loop to a terminal outcome.
    ///
    /// When the step budget runs out, one final text/URL check decides: a
    /// positive classification still counts, anything else fails the attempt.
    pub async fn run(mut self) -> Result<AttemptVerdict> {
        for step_number in 1..=MAX_STEPS {
            tracing::debug!("Step {}/{}", step_number, MAX_STEPS);
            match self.step(step_number).await {
                StepOutcome::Continue => {}
                StepOutcome::RetryableFailure { reason } => {
                    tracing::warn!("Step {} looping back: {}", step_number, reason);
                }
                StepOutcome::Success {
                    authenticated,
                    detail,
                } => {
                    return Ok(AttemptVerdict {
                        authenticated,
                        detail,
                    });
                }
                StepOutcome::FatalFailure { reason } => {
                    return Err(LoginError::AttemptFailed(reason));
                }
            }
            tokio::time::sleep(STEP_IDLE_DELAY).await;
        }

        let url = self.page.current_url().await.unwrap_or_default();
        let text = self.page.page_text().await.unwrap_or_default();
        if self.classifier.classify(&url, &text) == Verdict::Authenticated {
            return Ok(AttemptVerdict {
                authenticated: true,
                detail: format!("authenticated at {url}"),
            });
        }
        Err(LoginError::StepBudgetExhausted(format!(
            "no terminal outcome after {MAX_STEPS} steps; last url {url}"
        )))
    }

    /// One loop iteration, in the fixed order: suppression, detection,
    /// solving, readiness, submission, classification.
    async fn step(&mut self, step_number: u32) -> StepOutcome {
        self.suppress_certificate_button().await;

        let include_markup = step_number % MARKUP_SCAN_INTERVAL == 1;
        let challenge = self.page.challenge_present(include_markup).await;

        if challenge && self.resolved_token.is_none() {
            if let Some(outcome) = self.solve_cycle().await {
                return outcome;
            }
        }

        let readiness = self.page.readiness().await;
        if let Some(id) = &readiness.authorization_id {
            tracing::debug!("Authorization identifier present: {}", id);
        }
        let ready = readiness.ready_for_submission(TOKEN_MIN_SUBMIT_LEN);
        self.state.set_ready(ready);

        if !ready {
            tracing::debug!(
                "Not ready to submit: token {} chars, anti-forgery {}",
                readiness.token_length,
                readiness.anti_forgery_present
            );
            return StepOutcome::Continue;
        }

        if !self.state.form_submitted() {
            tokio::time::sleep(self.pre_submit_delay).await;
            let Some(selector) = self.page.click_submit().await else {
                tracing::warn!("No submit control matched any selector");
                return StepOutcome::Continue;
            };
            tracing::info!("Clicked submit control {}", selector);
            self.state.mark_form_submitted();
            tokio::time::sleep(POST_SUBMIT_WAIT).await;
        }

        self.classify_submission_result().await
    }

    /// Notice the "use your certificate" control without ever clicking it.
    /// The certificate was installed out-of-band; clicking would raise a
    /// native certificate prompt nothing can dismiss.
    async fn suppress_certificate_button(&mut self) {
        if self.cert_button_suppressed {
            return;
        }
        if self.page.certificate_button_visible().await {
            tracing::info!("Certificate control visible; marking handled without clicking");
            self.cert_button_suppressed = true;
        }
    }

    /// One solve cycle. `None` means fall through to the readiness check.
    async fn solve_cycle(&mut self) -> Option<StepOutcome> {
        if self.solve_attempts >= MAX_SOLVE_ATTEMPTS {
            return Some(StepOutcome::FatalFailure {
                reason: format!(
                    "challenge unsolved after {} solve attempts",
                    self.solve_attempts
                ),
            });
        }
        self.solve_attempts += 1;
        tracing::info!("Solve attempt {}/{}", self.solve_attempts, MAX_SOLVE_ATTEMPTS);

        if let Some(challenge) = self.page.challenge_metadata().await {
            tracing::debug!(
                "Challenge metadata: site_key={:?} enterprise={} risk_data={}",
                challenge.site_key,
                challenge.is_enterprise,
                challenge.risk_data.is_some()
            );
        }

        // The provider can auto-submit the instant it solves; the observer
        // must already be watching when that happens.
        if !self.page.install_token_observer().await {
            tracing::debug!("Token observer installation unconfirmed");
        }

        let status = match self
            .solver
            .solve_with_retry(self.detect_timeout, self.solver_retries)
            .await
        {
            Ok(status) => status,
            Err(e) => {
                return Some(
                    self.failed_solve_outcome(format!("solver protocol failure: {e}"))
                        .await,
                );
            }
        };

        match status {
            SolveStatus::Failed { reason } => {
                Some(self.failed_solve_outcome(format!("solve failed: {reason}")).await)
            }
            SolveStatus::Skipped => {
                // The provider declining is not solve work; give the slot back.
                self.solve_attempts -= 1;
                tracing::info!("Provider found no challenge; proceeding to readiness check");
                None
            }
            SolveStatus::Solved { tentative } => {
                if !tentative {
                    // Backend validation lags the solve report.
                    tokio::time::sleep(self.post_solve_settle).await;
                }
                match token::resolve_token(&self.page, &self.state).await {
                    Some(token) => self.place_token(token).await,
                    None => {
                        tracing::warn!("Solve reported success but no token is discoverable yet");
                        None
                    }
                }
            }
        }
    }

    /// Inject the resolved token; on persistent failure try the escalated
    /// direct submission, then fall back to a widget reset.
    async fn place_token(&mut self, token: ProofToken) -> Option<StepOutcome> {
        if self.inject_with_retries(&token).await {
            self.resolved_token = Some(token);
            return None;
        }

        if let Some(outcome) = self.escalate_direct_submission().await {
            return Some(outcome);
        }

        Some(
            self.failed_solve_outcome("token injection failed".to_string())
                .await,
        )
    }

    /// Re-inject even if the field already held the value; capture may have
    /// consumed or cleared it. Verified against the field's reported length.
    async fn inject_with_retries(&self, token: &ProofToken) -> bool {
        for attempt in 1..=INJECTION_RETRIES {
            if self.page.inject_token(token.value()).await {
                let held = self.page.injected_token_len().await;
                if held >= token.len() {
                    tracing::debug!("Token injected and verified ({} chars)", held);
                    return true;
                }
                tracing::debug!(
                    "Injection attempt {}: field holds {} of {} chars",
                    attempt,
                    held,
                    token.len()
                );
            } else {
                tracing::debug!("Injection attempt {}: no response field found", attempt);
            }
            if attempt < INJECTION_RETRIES {
                tokio::time::sleep(INJECTION_RETRY_DELAY).await;
            }
        }
        false
    }

    /// Bypass field injection entirely: when a long token was captured off a
    /// blocked submission, submit the form's data with it directly instead
    /// of relying on the UI field ever reflecting the value.
    async fn escalate_direct_submission(&mut self) -> Option<StepOutcome> {
        let token = self.state.token()?;
        if token.source() != TokenSource::BlockedRequest || !token.usable_for_submission() {
            return None;
        }

        tracing::warn!(
            "Field injection failing; submitting form data directly ({} char token)",
            token.len()
        );
        if !self.page.submit_form_data(token.value()).await {
            return None;
        }
        self.state.mark_form_submitted();
        tokio::time::sleep(POST_SUBMIT_WAIT).await;
        Some(self.classify_submission_result().await)
    }

    /// Widget reset plus state rollback, then report retryable or fatal
    /// depending on the remaining solve budget.
    async fn failed_solve_outcome(&mut self, reason: String) -> StepOutcome {
        self.reset_challenge().await;
        if self.solve_attempts >= MAX_SOLVE_ATTEMPTS {
            StepOutcome::FatalFailure {
                reason: format!("{reason}; solve attempts exhausted"),
            }
        } else {
            StepOutcome::RetryableFailure { reason }
        }
    }

    async fn reset_challenge(&mut self) {
        if self.page.reset_widget().await {
            tracing::debug!("Challenge widget reset in place");
        }
        self.state.reset_for_new_challenge();
        self.resolved_token = None;
    }

    /// Read the page and classify. An HTTP error body captured off the wire
    /// is checked first: a 400-class invalid-captcha rejection loops back
    /// with a widget reset instead of counting as terminal.
    async fn classify_submission_result(&mut self) -> StepOutcome {
        if let Some((status, body)) = self.state.take_error_body() {
            if (400..500).contains(&status)
                && self.classifier.body_indicates_invalid_captcha(&body)
            {
                tracing::warn!("Submission rejected ({}): invalid captcha", status);
                return self.invalid_captcha_outcome().await;
            }
            tracing::warn!("Submission returned {}: {}", status, body);
        }

        let url = self.page.current_url().await;
        let text = self.page.page_text().await;
        if url.is_none() && text.is_none() {
            // Page unreadable, likely mid-navigation. Classify next step.
            return StepOutcome::Continue;
        }
        let url = url.unwrap_or_default();
        let text = text.unwrap_or_default();

        match self.classifier.classify(&url, &text) {
            Verdict::Authenticated => StepOutcome::Success {
                authenticated: true,
                detail: format!("authenticated at {url}"),
            },
            Verdict::InvalidCaptcha => self.invalid_captcha_outcome().await,
            Verdict::CertificateNotFound => StepOutcome::FatalFailure {
                reason: "portal did not recognize the client certificate".to_string(),
            },
            Verdict::Indeterminate => {
                // No failure marker and no success marker. Accept the
                // completion; the caller reports it as unconfirmed.
                StepOutcome::Success {
                    authenticated: false,
                    detail: format!("completed without explicit confirmation at {url}"),
                }
            }
        }
    }

    async fn invalid_captcha_outcome(&mut self) -> StepOutcome {
        if self.solve_attempts >= MAX_SOLVE_ATTEMPTS {
            return StepOutcome::FatalFailure {
                reason: format!(
                    "captcha rejected with {} solve attempts used",
                    self.solve_attempts
                ),
            };
        }
        self.reset_challenge().await;
        StepOutcome::RetryableFailure {
            reason: "portal rejected the captcha; widget reset".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_budgets() {
        // Every solve needs at least one follow-up step for readiness and
        // submission before the loop runs out.
        assert!(MAX_SOLVE_ATTEMPTS * 2 < MAX_STEPS);
        assert!(INJECTION_RETRIES >= 1);
    }

    #[test]
    fn test_markup_scan_runs_on_first_step() {
        assert!(MARKUP_SCAN_INTERVAL > 1);
        assert_eq!(1 % MARKUP_SCAN_INTERVAL, 1);
    }
}
