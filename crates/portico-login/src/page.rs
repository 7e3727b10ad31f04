//! Page interaction surface for the step loop.
//!
//! [`LoginPage`] abstracts every DOM touch the state machine performs, so
//! the loop's branching can be tested against scripted pages. All methods
//! are best-effort: a probe that cannot run reports a plain negative, per
//! the swallow-and-continue policy of the browser probes.

use crate::state::TOKEN_MIN_CANDIDATE_LEN;
use async_trait::async_trait;
use portico_browser::{probe, Page};
use portico_captcha::{detect, widget, CaptchaChallenge};
use serde::Deserialize;

/// Submit controls in preference order. The portal renders its design-system
/// button most of the time; the tail entries cover older form variants.
const SUBMIT_SELECTORS: [&str; 5] = [
    "form button[type='submit']",
    "input[type='submit']",
    "button.br-button.primary",
    "button[type='submit']",
    "form button",
];

const CERT_BUTTON_JS: &str = r"(() => {
    const nodes = document.querySelectorAll('button, a, .br-button');
    for (const node of nodes) {
        const text = (node.innerText || '').toLowerCase();
        if (text.includes('seu certificado digital')) {
            const style = window.getComputedStyle(node);
            return style.display !== 'none'
                && style.visibility !== 'hidden'
                && node.offsetParent !== null;
        }
    }
    return false;
})()";

const READINESS_JS: &str = r#"(() => {
    const tokenField = document.querySelector('[name="h-captcha-response"]');
    const tokenLength = tokenField && tokenField.value ? tokenField.value.length : 0;
    const antiForgery = document.querySelector(
        'input[name="_csrf"], input[name="csrf"], ' +
        'input[name="__RequestVerificationToken"], input[name="authenticity_token"]');
    const antiForgeryPresent = !!(antiForgery && antiForgery.value
        && antiForgery.value.length > 0);
    const authField = document.querySelector(
        'input[name="authorization_id"], input[name="client_id"]');
    const authorizationId = authField && authField.value ? authField.value : null;
    return {
        tokenLength: tokenLength,
        antiForgeryPresent: antiForgeryPresent,
        authorizationId: authorizationId
    };
})()"#;

/// `__MIN_LEN__` is substituted before evaluation.
const FIELD_SCAN_JS: &str = r#"(() => {
    const fields = document.querySelectorAll(
        'textarea, input[type="text"], input[type="hidden"]');
    for (const field of fields) {
        const v = field.value || '';
        if (v.length >= __MIN_LEN__
            && (v.startsWith('P0_') || v.startsWith('P1_') || v.startsWith('ey'))) {
            return v;
        }
    }
    return '';
})()"#;

/// `__TOKEN__` is substituted with a quoted JS string literal.
const SUBMIT_FORM_DATA_JS: &str = r#"(() => {
    const form = document.querySelector('form');
    if (!form) { return false; }
    const token = __TOKEN__;
    const ensure = (name, value) => {
        let field = form.querySelector('[name="' + name + '"]');
        if (!field) {
            field = document.createElement('input');
            field.type = 'hidden';
            field.name = name;
            form.appendChild(field);
        }
        field.value = value;
    };
    ensure('h-captcha-response', token);
    // The anti-forgery input sometimes renders outside the form element,
    // and submission only serializes fields inside it.
    const antiForgery = document.querySelector(
        'input[name="_csrf"], input[name="csrf"], ' +
        'input[name="__RequestVerificationToken"], input[name="authenticity_token"]');
    if (antiForgery && antiForgery.value && !form.contains(antiForgery)) {
        ensure(antiForgery.name, antiForgery.value);
    }
    // requestSubmit runs the page's submit handlers; form.submit() would
    // bypass them and the portal depends on them.
    if (typeof form.requestSubmit === 'function') {
        form.requestSubmit();
        return true;
    }
    const control = form.querySelector('button[type="submit"], input[type="submit"]');
    if (control) { control.click(); return true; }
    return false;
})()"#;

/// Snapshot of the form's submission preconditions.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessProbe {
    /// Length of the value in the captcha response field
    pub token_length: usize,
    /// Whether a non-empty anti-forgery field exists
    pub anti_forgery_present: bool,
    /// Authorization identifier, when the form carries one
    pub authorization_id: Option<String>,
}

impl ReadinessProbe {
    /// The joint submission gate: long-enough token plus anti-forgery field.
    /// Authorization identifiers are logged upstream but never required.
    #[must_use]
    pub fn ready_for_submission(&self, min_token_len: usize) -> bool {
        self.token_length >= min_token_len && self.anti_forgery_present
    }
}

/// Everything the step loop does to a page.
#[async_trait]
pub trait LoginPage: Send + Sync {
    /// Whether the "use your certificate" control is currently rendered.
    async fn certificate_button_visible(&self) -> bool;

    /// OR-combined challenge detection; the flag gates the markup scan.
    async fn challenge_present(&self, include_markup_scan: bool) -> bool;

    /// Challenge metadata for diagnostics.
    async fn challenge_metadata(&self) -> Option<CaptchaChallenge>;

    /// Install the token-capture observer. Idempotent.
    async fn install_token_observer(&self) -> bool;

    /// Token captured by the observer, if any.
    async fn observer_token(&self) -> Option<String>;

    /// Token read from the widget accessor, if any.
    async fn accessor_token(&self) -> Option<String>;

    /// Last-resort scan of text-input-like fields for a token-shaped value.
    async fn scan_fields_for_token(&self) -> Option<String>;

    /// Write the token into the response field. False when no field exists.
    async fn inject_token(&self, token: &str) -> bool;

    /// Length of the value the response field currently holds.
    async fn injected_token_len(&self) -> usize;

    /// Snapshot the submission preconditions.
    async fn readiness(&self) -> ReadinessProbe;

    /// Click the first matching submit control; returns the selector used.
    async fn click_submit(&self) -> Option<String>;

    /// Escalated submission: write the token into the form and submit its
    /// data through the page's own handlers.
    async fn submit_form_data(&self, token: &str) -> bool;

    /// Reset the challenge widget in place.
    async fn reset_widget(&self) -> bool;

    /// Current URL, when readable.
    async fn current_url(&self) -> Option<String>;

    /// Rendered body text, when readable.
    async fn page_text(&self) -> Option<String>;
}

/// [`LoginPage`] backed by a live CDP page.
pub struct CdpLoginPage {
    page: Page,
}

impl CdpLoginPage {
    /// Wrap a live page.
    #[must_use]
    pub fn new(page: Page) -> Self {
        Self { page }
    }
}

#[async_trait]
impl LoginPage for CdpLoginPage {
    async fn certificate_button_visible(&self) -> bool {
        probe::try_eval_bool(&self.page, CERT_BUTTON_JS).await
    }

    async fn challenge_present(&self, include_markup_scan: bool) -> bool {
        detect::challenge_present(&self.page, include_markup_scan).await
    }

    async fn challenge_metadata(&self) -> Option<CaptchaChallenge> {
        detect::challenge_metadata(&self.page).await
    }

    async fn install_token_observer(&self) -> bool {
        widget::install_token_observer(&self.page).await
    }

    async fn observer_token(&self) -> Option<String> {
        widget::observer_token(&self.page).await
    }

    async fn accessor_token(&self) -> Option<String> {
        widget::accessor_token(&self.page).await
    }

    async fn scan_fields_for_token(&self) -> Option<String> {
        let js = FIELD_SCAN_JS.replace("__MIN_LEN__", &TOKEN_MIN_CANDIDATE_LEN.to_string());
        probe::try_eval_string(&self.page, &js).await
    }

    async fn inject_token(&self, token: &str) -> bool {
        widget::inject_token(&self.page, token).await
    }

    async fn injected_token_len(&self) -> usize {
        widget::injected_token_len(&self.page).await
    }

    async fn readiness(&self) -> ReadinessProbe {
        probe::try_eval::<ReadinessProbe>(&self.page, READINESS_JS)
            .await
            .unwrap_or_default()
    }

    async fn click_submit(&self) -> Option<String> {
        probe::click_first_match(&self.page, &SUBMIT_SELECTORS).await
    }

    async fn submit_form_data(&self, token: &str) -> bool {
        let js = SUBMIT_FORM_DATA_JS.replace("__TOKEN__", &probe::js_string(token));
        probe::try_eval_bool(&self.page, &js).await
    }

    async fn reset_widget(&self) -> bool {
        widget::reset_widget(&self.page).await
    }

    async fn current_url(&self) -> Option<String> {
        probe::current_url(&self.page).await
    }

    async fn page_text(&self) -> Option<String> {
        probe::page_text(&self.page).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readiness_gate() {
        let ready = ReadinessProbe {
            token_length: 2000,
            anti_forgery_present: true,
            authorization_id: None,
        };
        assert!(ready.ready_for_submission(1500));
    }

    #[test]
    fn test_readiness_gate_requires_both() {
        let short_token = ReadinessProbe {
            token_length: 800,
            anti_forgery_present: true,
            authorization_id: None,
        };
        assert!(!short_token.ready_for_submission(1500));

        let no_anti_forgery = ReadinessProbe {
            token_length: 2000,
            anti_forgery_present: false,
            authorization_id: None,
        };
        assert!(!no_anti_forgery.ready_for_submission(1500));
    }

    #[test]
    fn test_readiness_gate_ignores_authorization_id() {
        let without_auth = ReadinessProbe {
            token_length: 2000,
            anti_forgery_present: true,
            authorization_id: None,
        };
        let with_auth = ReadinessProbe {
            authorization_id: Some("client-123".to_string()),
            ..without_auth.clone()
        };
        assert_eq!(
            without_auth.ready_for_submission(1500),
            with_auth.ready_for_submission(1500)
        );
    }

    #[test]
    fn test_readiness_probe_parses_page_reply() {
        let value = serde_json::json!({
            "tokenLength": 1742,
            "antiForgeryPresent": true,
            "authorizationId": null
        });
        let parsed: ReadinessProbe = serde_json::from_value(value).expect("parse probe");
        assert_eq!(parsed.token_length, 1742);
        assert!(parsed.anti_forgery_present);
        assert!(parsed.authorization_id.is_none());
    }

    #[test]
    fn test_field_scan_template_substitution() {
        let js = FIELD_SCAN_JS.replace("__MIN_LEN__", &TOKEN_MIN_CANDIDATE_LEN.to_string());
        assert!(js.contains("v.length >= 100"));
        assert!(!js.contains("__MIN_LEN__"));
    }

    #[test]
    fn test_submit_form_data_template_quotes_token() {
        let js = SUBMIT_FORM_DATA_JS.replace("__TOKEN__", &probe::js_string("P0_ab\"c"));
        assert!(js.contains(r#"const token = "P0_ab\"c";"#));
        assert!(!js.contains("__TOKEN__"));
    }

    #[test]
    fn test_submit_form_data_carries_anti_forgery_field() {
        // Same names the readiness probe checks for.
        for name in ["_csrf", "csrf", "__RequestVerificationToken", "authenticity_token"] {
            assert!(
                SUBMIT_FORM_DATA_JS.contains(name),
                "escalated submission misses {name}"
            );
        }
        assert!(SUBMIT_FORM_DATA_JS.contains("form.contains(antiForgery)"));
    }
}
