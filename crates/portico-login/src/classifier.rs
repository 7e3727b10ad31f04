//! Outcome classification.
//!
//! The portal exposes no structured result contract; outcomes are inferred
//! from the rendered page text and the URL. The keyword lists live in
//! configuration so the policy can be re-targeted (other locales, portal
//! copy changes) without touching the control loop.

use portico_core::ClassifierRules;

/// What the current page state says about the attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Authentication completed
    Authenticated,
    /// The portal rejected the captcha; reset the widget and retry in place
    InvalidCaptcha,
    /// The portal did not see the client certificate
    CertificateNotFound,
    /// Nothing recognizable; the caller decides what that means
    Indeterminate,
}

/// Pluggable classification policy.
pub trait OutcomeClassifier: Send + Sync {
    /// Classify the page by its current URL and rendered text.
    fn classify(&self, url: &str, page_text: &str) -> Verdict;

    /// Whether an HTTP error body names the invalid-captcha condition.
    fn body_indicates_invalid_captcha(&self, body: &str) -> bool;
}

/// Case-insensitive substring matching against configured keyword lists.
///
/// Check order mirrors the portal's failure modes: explicit rejections
/// first, then the off-login-URL signal, then positive keywords. Brittle by
/// construction, which is exactly why the lists are configuration.
pub struct KeywordClassifier {
    rules: ClassifierRules,
}

impl KeywordClassifier {
    /// Build a classifier over the given keyword lists.
    #[must_use]
    pub fn new(rules: ClassifierRules) -> Self {
        Self { rules }
    }
}

impl OutcomeClassifier for KeywordClassifier {
    fn classify(&self, url: &str, page_text: &str) -> Verdict {
        let url = url.to_lowercase();
        let text = page_text.to_lowercase();

        if contains_any(&text, &self.rules.invalid_captcha_keywords) {
            return Verdict::InvalidCaptcha;
        }
        if contains_any(&text, &self.rules.certificate_missing_keywords) {
            return Verdict::CertificateNotFound;
        }
        // Leaving the login URL entirely is the strongest success signal. An
        // empty URL means the probe failed, not that we navigated away.
        if !url.is_empty()
            && !self.rules.login_url_markers.is_empty()
            && !contains_any(&url, &self.rules.login_url_markers)
        {
            return Verdict::Authenticated;
        }
        if contains_any(&text, &self.rules.success_keywords) {
            return Verdict::Authenticated;
        }
        Verdict::Indeterminate
    }

    fn body_indicates_invalid_captcha(&self, body: &str) -> bool {
        contains_any(&body.to_lowercase(), &self.rules.invalid_captcha_keywords)
    }
}

fn contains_any(haystack: &str, needles: &[String]) -> bool {
    needles
        .iter()
        .filter(|needle| !needle.is_empty())
        .any(|needle| haystack.contains(&needle.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> KeywordClassifier {
        KeywordClassifier::new(ClassifierRules::default())
    }

    #[test]
    fn test_invalid_captcha_beats_everything() {
        let verdict = classifier().classify(
            "https://servicos.example.gov.br/painel",
            "Captcha inválido. Tente novamente.",
        );
        assert_eq!(verdict, Verdict::InvalidCaptcha);
    }

    #[test]
    fn test_invalid_captcha_is_case_insensitive() {
        let verdict = classifier().classify(
            "https://sso.acesso.gov.br/login",
            "CAPTCHA INVÁLIDO",
        );
        assert_eq!(verdict, Verdict::InvalidCaptcha);
    }

    #[test]
    fn test_certificate_not_found() {
        let verdict = classifier().classify(
            "https://sso.acesso.gov.br/login",
            "Certificado digital não encontrado no navegador",
        );
        assert_eq!(verdict, Verdict::CertificateNotFound);
    }

    #[test]
    fn test_leaving_login_url_is_authenticated() {
        let verdict = classifier().classify("https://servicos.example.org/painel", "Painel");
        assert_eq!(verdict, Verdict::Authenticated);
    }

    #[test]
    fn test_success_keyword_on_login_url() {
        let verdict = classifier().classify(
            "https://sso.acesso.gov.br/login?next=x",
            "Seja bem-vindo ao portal",
        );
        assert_eq!(verdict, Verdict::Authenticated);
    }

    #[test]
    fn test_still_on_login_page_is_indeterminate() {
        let verdict = classifier().classify(
            "https://sso.acesso.gov.br/login",
            "Identifique-se no gov.br",
        );
        assert_eq!(verdict, Verdict::Indeterminate);
    }

    #[test]
    fn test_empty_url_never_counts_as_navigation() {
        let verdict = classifier().classify("", "Identifique-se no gov.br");
        assert_eq!(verdict, Verdict::Indeterminate);
    }

    #[test]
    fn test_body_marker_check() {
        let c = classifier();
        assert!(c.body_indicates_invalid_captcha("{\"error\": \"Captcha inválido\"}"));
        assert!(!c.body_indicates_invalid_captcha("{\"error\": \"internal\"}"));
    }
}
