//! Shared state for one login attempt.
//!
//! Network callbacks and the step loop communicate through a single owned
//! [`AttemptState`]. Callbacks only perform additive writes: the token slot
//! is set-once and the counters only grow. The step loop is the only actor
//! that reads, branches, and (on widget reset) rolls state back.

use portico_browser::MonitorSink;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

/// Minimum token length the readiness gate accepts for submission.
pub const TOKEN_MIN_SUBMIT_LEN: usize = 1500;

/// Minimum length for a scanned field value to count as a token candidate.
pub const TOKEN_MIN_CANDIDATE_LEN: usize = 100;

/// Where a proof token was discovered. Earlier variants outrank later ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    /// Read out of a blocked outbound submission
    BlockedRequest,
    /// Captured by the pre-installed page observer
    Observer,
    /// Read from the widget's response accessor
    Api,
    /// Scraped by the last-resort field scan
    TextareaScan,
}

impl TokenSource {
    /// Resolution order; the first source yielding a value wins.
    pub const PRIORITY: [TokenSource; 4] = [
        TokenSource::BlockedRequest,
        TokenSource::Observer,
        TokenSource::Api,
        TokenSource::TextareaScan,
    ];
}

impl fmt::Display for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BlockedRequest => "blocked-request",
            Self::Observer => "observer",
            Self::Api => "api",
            Self::TextareaScan => "textarea-scan",
        };
        write!(f, "{name}")
    }
}

/// A captured proof token and its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofToken {
    value: String,
    source: TokenSource,
}

impl ProofToken {
    /// Wrap a non-empty token value. Empty values yield `None`.
    #[must_use]
    pub fn new(value: impl Into<String>, source: TokenSource) -> Option<Self> {
        let value = value.into();
        if value.is_empty() {
            None
        } else {
            Some(Self { value, source })
        }
    }

    /// The raw token value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Where the token came from.
    #[must_use]
    pub fn source(&self) -> TokenSource {
        self.source
    }

    /// Token length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.value.len()
    }

    /// Always false; empty tokens cannot be constructed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Whether the token alone is long enough for the submission gate.
    #[must_use]
    pub fn usable_for_submission(&self) -> bool {
        self.len() >= TOKEN_MIN_SUBMIT_LEN
    }
}

/// Mutable status of one login try.
#[derive(Debug, Default)]
pub struct AttemptState {
    ready_to_submit: AtomicBool,
    form_submitted: AtomicBool,
    first_submission_delayed: AtomicBool,
    blocked_requests: AtomicU32,
    captured_token: Mutex<Option<ProofToken>>,
    last_error_body: Mutex<Option<(u16, String)>>,
}

impl AttemptState {
    /// Fresh state for a new attempt.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a token unless one is already held. Returns whether it stuck.
    pub fn offer_token(&self, token: ProofToken) -> bool {
        let mut slot = self
            .captured_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            tracing::debug!("Captured token from {} ({} chars)", token.source(), token.len());
            *slot = Some(token);
            true
        } else {
            false
        }
    }

    /// The captured token, if any.
    #[must_use]
    pub fn token(&self) -> Option<ProofToken> {
        self.captured_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drop the captured token. Called on widget reset; a stale token must
    /// never survive into the next challenge instance.
    pub fn clear_token(&self) {
        *self
            .captured_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Record the readiness gate's latest verdict.
    pub fn set_ready(&self, ready: bool) {
        self.ready_to_submit.store(ready, Ordering::SeqCst);
    }

    /// Whether the readiness gate last passed.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready_to_submit.load(Ordering::SeqCst)
    }

    /// Mark that the form was deliberately submitted.
    pub fn mark_form_submitted(&self) {
        self.form_submitted.store(true, Ordering::SeqCst);
    }

    /// Whether a deliberate submission has happened.
    #[must_use]
    pub fn form_submitted(&self) -> bool {
        self.form_submitted.load(Ordering::SeqCst)
    }

    /// Whether the first outbound submission was held back.
    #[must_use]
    pub fn first_submission_delayed(&self) -> bool {
        self.first_submission_delayed.load(Ordering::SeqCst)
    }

    /// How many outbound submissions were blocked.
    #[must_use]
    pub fn blocked_requests(&self) -> u32 {
        self.blocked_requests.load(Ordering::SeqCst)
    }

    /// Take the most recent captured error body, clearing it.
    #[must_use]
    pub fn take_error_body(&self) -> Option<(u16, String)> {
        self.last_error_body
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Roll submission state back for a fresh challenge instance.
    ///
    /// Only the step loop calls this, and only as part of a widget reset.
    /// The delayed flag and block counter are history and stay; a page only
    /// gets its first submission held once.
    pub fn reset_for_new_challenge(&self) {
        self.clear_token();
        self.ready_to_submit.store(false, Ordering::SeqCst);
        self.form_submitted.store(false, Ordering::SeqCst);
        *self
            .last_error_body
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl MonitorSink for AttemptState {
    fn intercepted_token(&self, value: String) {
        if let Some(token) = ProofToken::new(value, TokenSource::BlockedRequest) {
            self.offer_token(token);
        }
    }

    fn hold_submission(&self) -> bool {
        !self.form_submitted() && !self.first_submission_delayed()
    }

    fn submission_blocked(&self) {
        self.first_submission_delayed.store(true, Ordering::SeqCst);
        self.blocked_requests.fetch_add(1, Ordering::SeqCst);
    }

    fn error_body(&self, status: u16, body: String) {
        *self
            .last_error_body
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some((status, body));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proof_token_rejects_empty() {
        assert!(ProofToken::new("", TokenSource::Observer).is_none());
        assert!(ProofToken::new("tok", TokenSource::Observer).is_some());
    }

    #[test]
    fn test_proof_token_submission_threshold() {
        let short = ProofToken::new("P0_abc", TokenSource::Api).unwrap();
        assert!(!short.usable_for_submission());

        let long = ProofToken::new("x".repeat(TOKEN_MIN_SUBMIT_LEN), TokenSource::Api).unwrap();
        assert!(long.usable_for_submission());
    }

    #[test]
    fn test_token_slot_is_set_once() {
        let state = AttemptState::new();
        let first = ProofToken::new("first", TokenSource::Observer).unwrap();
        let second = ProofToken::new("second", TokenSource::Api).unwrap();

        assert!(state.offer_token(first));
        assert!(!state.offer_token(second));
        assert_eq!(state.token().unwrap().value(), "first");
    }

    #[test]
    fn test_clear_token_reopens_slot() {
        let state = AttemptState::new();
        let token = ProofToken::new("tok", TokenSource::Observer).unwrap();
        state.offer_token(token.clone());
        state.clear_token();
        assert!(state.token().is_none());
        assert!(state.offer_token(token));
    }

    #[test]
    fn test_sink_holds_only_first_submission() {
        let state = AttemptState::new();
        assert!(state.hold_submission());

        state.submission_blocked();
        assert!(!state.hold_submission());
        assert!(state.first_submission_delayed());
        assert_eq!(state.blocked_requests(), 1);
    }

    #[test]
    fn test_sink_never_holds_after_deliberate_submission() {
        let state = AttemptState::new();
        state.mark_form_submitted();
        assert!(!state.hold_submission());
    }

    #[test]
    fn test_sink_intercepted_token_lands_as_blocked_request() {
        let state = AttemptState::new();
        state.intercepted_token("P0_tok".to_string());
        let token = state.token().unwrap();
        assert_eq!(token.source(), TokenSource::BlockedRequest);

        // Empty values never occupy the slot
        let fresh = AttemptState::new();
        fresh.intercepted_token(String::new());
        assert!(fresh.token().is_none());
    }

    #[test]
    fn test_reset_for_new_challenge() {
        let state = AttemptState::new();
        state.intercepted_token("tok".to_string());
        state.set_ready(true);
        state.mark_form_submitted();
        state.submission_blocked();
        state.error_body(400, "Captcha inválido".to_string());

        state.reset_for_new_challenge();

        assert!(state.token().is_none());
        assert!(!state.is_ready());
        assert!(!state.form_submitted());
        assert!(state.take_error_body().is_none());
        // History survives the reset
        assert!(state.first_submission_delayed());
        assert_eq!(state.blocked_requests(), 1);
    }

    #[test]
    fn test_error_body_take_clears() {
        let state = AttemptState::new();
        state.error_body(422, "bad".to_string());
        assert_eq!(state.take_error_body(), Some((422, "bad".to_string())));
        assert!(state.take_error_body().is_none());
    }

    #[test]
    fn test_source_priority_order() {
        assert_eq!(TokenSource::PRIORITY[0], TokenSource::BlockedRequest);
        assert_eq!(TokenSource::PRIORITY[3], TokenSource::TextareaScan);
        assert_eq!(TokenSource::Observer.to_string(), "observer");
    }
}
