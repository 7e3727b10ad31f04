//! Proof-token resolution.
//!
//! Four overlapping discovery paths can surface a token, and which one fires
//! first depends on provider timing. They are tried in strict priority order
//! and the first non-empty value wins: a token read off an actual outbound
//! submission is ground truth, the observer saw the value the moment it
//! appeared, the accessor reads live widget state, and the field scan is a
//! shape-matched last resort.

use crate::page::LoginPage;
use crate::state::{AttemptState, ProofToken, TokenSource, TOKEN_MIN_CANDIDATE_LEN};
use std::sync::OnceLock;

static TOKEN_SHAPE: OnceLock<regex::Regex> = OnceLock::new();

fn token_shape() -> &'static regex::Regex {
    TOKEN_SHAPE.get_or_init(|| {
        regex::Regex::new(r"^(P0_|P1_|ey)[A-Za-z0-9_.\-]+$").expect("valid regex")
    })
}

/// Whether a scanned value is plausibly a proof token.
#[must_use]
pub fn looks_like_token(value: &str) -> bool {
    value.len() >= TOKEN_MIN_CANDIDATE_LEN && token_shape().is_match(value)
}

/// Resolve the effective token by walking the source priority list.
pub async fn resolve_token<P: LoginPage + ?Sized>(
    page: &P,
    state: &AttemptState,
) -> Option<ProofToken> {
    for source in TokenSource::PRIORITY {
        let candidate = match source {
            TokenSource::BlockedRequest => state.token().map(|t| t.value().to_string()),
            TokenSource::Observer => page.observer_token().await,
            TokenSource::Api => page.accessor_token().await,
            TokenSource::TextareaScan => page
                .scan_fields_for_token()
                .await
                .filter(|value| looks_like_token(value)),
        };

        if let Some(token) = candidate.and_then(|value| ProofToken::new(value, source)) {
            tracing::info!("Resolved token via {} ({} chars)", source, token.len());
            return Some(token);
        }
    }

    tracing::debug!("No token discoverable from any source");
    None
}
