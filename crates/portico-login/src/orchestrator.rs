//! Attempt orchestration.
//!
//! Each attempt gets a fresh remote session, its own monitor and solver,
//! and one machine run. Failures tear the session down and, while budget
//! remains, back off before the next attempt. Exactly one session is open
//! at any time.

use crate::classifier::{KeywordClassifier, OutcomeClassifier};
use crate::error::{LoginError, Result};
use crate::machine::{AttemptVerdict, LoginMachine};
use crate::page::CdpLoginPage;
use crate::state::AttemptState;
use chrono::{DateTime, Utc};
use portico_browser::{PageMonitor, RemoteSession, SessionOptions};
use portico_captcha::{RemoteSolver, SolvePolicy};
use portico_core::{AppConfig, AttemptId};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Final report for a login run.
#[derive(Debug, Clone, Serialize)]
pub struct LoginReport {
    /// Whether authentication was explicitly confirmed
    pub authenticated: bool,
    /// Attempts consumed, including the final one
    pub attempts_used: u32,
    /// Human-readable outcome description
    pub detail: String,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run finished
    pub finished_at: DateTime<Utc>,
}

/// Runs independent login attempts until one completes or the budget is gone.
pub struct LoginOrchestrator {
    config: AppConfig,
    classifier: Arc<dyn OutcomeClassifier>,
}

impl LoginOrchestrator {
    /// Build an orchestrator with the keyword classifier from the config.
    #[must_use]
    pub fn new(config: AppConfig) -> Self {
        let classifier = Arc::new(KeywordClassifier::new(config.classifier.clone()));
        Self { config, classifier }
    }

    /// Swap in a different outcome classification policy.
    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn OutcomeClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Run login attempts up to the configured budget.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error, or [`LoginError::AttemptsExhausted`]
    /// when every attempt failed retryably.
    pub async fn run(&self) -> Result<LoginReport> {
        let started_at = Utc::now();
        let max_attempts = self.config.attempts.max_attempts.max(1);
        let backoff = Duration::from_millis(self.config.attempts.backoff_ms);

        let (attempts_used, verdict) =
            run_attempts(max_attempts, backoff, |_| self.run_single_attempt()).await?;

        Ok(LoginReport {
            authenticated: verdict.authenticated,
            attempts_used,
            detail: verdict.detail,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// One attempt: bootstrap, monitor, machine run, teardown. The session
    /// is closed on every exit path.
    async fn run_single_attempt(&self) -> Result<AttemptVerdict> {
        let cfg = &self.config;
        let options = SessionOptions {
            ws_url: cfg.remote.websocket_url(),
            certificate_path: cfg.certificate.path.clone(),
            certificate_password: cfg.certificate.password.clone(),
            target_url: cfg.target.login_url.clone(),
            connect_timeout: Duration::from_millis(cfg.timing.connect_timeout_ms),
            navigation_timeout: Duration::from_millis(cfg.timing.navigation_timeout_ms),
            settle: Duration::from_millis(cfg.timing.page_settle_ms),
        };

        let session = RemoteSession::bootstrap(options).await?;
        let state = Arc::new(AttemptState::new());

        let pattern = interception_pattern(&cfg.target.login_url);
        let monitor = match PageMonitor::attach(session.page(), &pattern, state.clone()).await {
            Ok(monitor) => monitor,
            Err(e) => {
                session.close().await;
                return Err(e.into());
            }
        };

        let solver = RemoteSolver::new(
            session.page().clone(),
            SolvePolicy {
                auto_submit: cfg.solver.auto_submit,
                tentative_success_on_timeout: cfg.solver.tentative_success_on_timeout,
                post_timeout_settle: Duration::from_millis(cfg.timing.post_solve_settle_ms),
            },
        );
        let page = CdpLoginPage::new(session.page().clone());

        let machine = LoginMachine::new(
            page,
            solver,
            self.classifier.clone(),
            state.clone(),
            &cfg.timing,
            &cfg.solver,
        );
        let result = machine.run().await;

        tracing::debug!(
            "Attempt finished: {} submission(s) blocked for capture",
            state.blocked_requests()
        );
        monitor.detach().await;
        session.close().await;
        result
    }
}

/// Drive `attempt` until one completes, a fatal error ends the run, or the
/// budget is spent. Returns the verdict and the number of attempts used.
/// A completed attempt ends the run even when authentication was not
/// confirmed; only errors are retried.
async fn run_attempts<F, Fut>(
    max_attempts: u32,
    backoff: Duration,
    mut attempt: F,
) -> Result<(u32, AttemptVerdict)>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<AttemptVerdict>>,
{
    let mut last_error = String::from("no attempt was made");

    for number in 1..=max_attempts {
        let attempt_id = AttemptId::generate();
        tracing::info!("Login attempt {}/{} ({})", number, max_attempts, attempt_id);

        match attempt(number).await {
            Ok(verdict) => {
                if verdict.authenticated {
                    tracing::info!("Attempt {} authenticated: {}", number, verdict.detail);
                } else {
                    tracing::warn!(
                        "Attempt {} completed without confirmation: {}",
                        number,
                        verdict.detail
                    );
                }
                return Ok((number, verdict));
            }
            Err(e) if e.is_fatal() => {
                tracing::error!("Attempt {} hit a fatal error: {}", number, e);
                return Err(e);
            }
            Err(e) => {
                tracing::warn!("Attempt {} failed: {}", number, e);
                last_error = e.to_string();
                if number < max_attempts {
                    tracing::info!("Backing off {:?} before the next attempt", backoff);
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    Err(LoginError::AttemptsExhausted {
        attempts: max_attempts,
        last_error,
    })
}

/// Intercept only traffic for the login host; everything else flows freely.
fn interception_pattern(login_url: &str) -> String {
    match url::Url::parse(login_url) {
        Ok(parsed) => match parsed.host_str() {
            Some(host) => format!("*{host}*"),
            None => "*".to_string(),
        },
        Err(_) => "*".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portico_browser::BrowserError;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_interception_pattern_scopes_to_host() {
        assert_eq!(
            interception_pattern("https://sso.acesso.gov.br/login"),
            "*sso.acesso.gov.br*"
        );
    }

    #[test]
    fn test_interception_pattern_falls_back_to_wildcard() {
        assert_eq!(interception_pattern("not a url"), "*");
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_attempts_retries_then_succeeds() {
        let calls = AtomicU32::new(0);
        let backoff = Duration::from_secs(3);
        let clock = tokio::time::Instant::now();

        let (used, verdict) = run_attempts(3, backoff, |number| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if number < 3 {
                    Err(LoginError::AttemptFailed("widget refused the token".into()))
                } else {
                    Ok(AttemptVerdict {
                        authenticated: true,
                        detail: "landed on the account page".to_string(),
                    })
                }
            }
        })
        .await
        .expect("third attempt completes");

        assert_eq!(used, 3);
        assert!(verdict.authenticated);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // One backoff between each failed attempt and the next.
        assert_eq!(clock.elapsed(), backoff * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_attempts_fatal_error_short_circuits() {
        let calls = AtomicU32::new(0);
        let result = run_attempts(3, Duration::from_secs(3), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err::<AttemptVerdict, _>(LoginError::Browser(BrowserError::CertificateMissing(
                    PathBuf::from("/etc/portico/cert.pfx"),
                )))
            }
        })
        .await;

        match result {
            Err(LoginError::Browser(BrowserError::CertificateMissing(_))) => {}
            other => panic!("expected the fatal error back, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_attempts_exhaustion_carries_last_error() {
        let backoff = Duration::from_secs(3);
        let clock = tokio::time::Instant::now();

        let result = run_attempts(2, backoff, |number| async move {
            Err::<AttemptVerdict, _>(LoginError::AttemptFailed(format!(
                "attempt {number} never settled"
            )))
        })
        .await;

        match result {
            Err(LoginError::AttemptsExhausted {
                attempts,
                last_error,
            }) => {
                assert_eq!(attempts, 2);
                assert_eq!(last_error, "attempt failed: attempt 2 never settled");
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        // No backoff after the final attempt.
        assert_eq!(clock.elapsed(), backoff);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_attempts_unconfirmed_completion_is_not_retried() {
        let calls = AtomicU32::new(0);
        let (used, verdict) = run_attempts(3, Duration::from_secs(3), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Ok(AttemptVerdict {
                    authenticated: false,
                    detail: "still on the login page after submission".to_string(),
                })
            }
        })
        .await
        .expect("completed attempt ends the run");

        assert_eq!(used, 1);
        assert!(!verdict.authenticated);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
