//! Challenge detection signals.
//!
//! No single probe is reliable: the widget iframe may not exist yet, may be
//! hosted under a varying origin, or may be injected into markup before any
//! frame mounts. Detection therefore OR-combines independent signals, and
//! callers run the expensive raw-markup scan at reduced frequency.

use portico_browser::{probe, Page};
use serde::Deserialize;

const FRAME_SELECTOR_JS: &str =
    r#"document.querySelector("iframe[src*='hcaptcha.com']") !== null"#;

const IFRAME_SCAN_JS: &str = r"(() => {
    const frames = document.querySelectorAll('iframe');
    for (const frame of frames) {
        const src = (frame.src || '').toLowerCase();
        const title = (frame.title || '').toLowerCase();
        if (src.includes('hcaptcha') || src.includes('captcha')
            || title.includes('hcaptcha') || title.includes('captcha')) {
            return true;
        }
    }
    return false;
})()";

const MARKUP_SCAN_JS: &str = r"(() => {
    const html = document.documentElement.outerHTML.toLowerCase();
    return html.includes('newassets.hcaptcha.com')
        || html.includes('hcaptcha.com')
        || html.includes('h-captcha')
        || html.includes('captcha');
})()";

const METADATA_JS: &str = r"(() => {
    const widget = document.querySelector('.h-captcha, [data-sitekey]');
    const frame = document.querySelector(`iframe[src*='hcaptcha.com']`);
    let siteKey = widget ? widget.getAttribute('data-sitekey') : null;
    const riskData = widget ? widget.getAttribute('data-s') : null;
    let isEnterprise = false;
    if (frame && frame.src) {
        isEnterprise = frame.src.includes('/enterprise/');
        if (!siteKey) {
            const match = frame.src.match(/sitekey=([a-f0-9-]+)/i);
            if (match) siteKey = match[1];
        }
    }
    return { siteKey: siteKey, isEnterprise: isEnterprise, riskData: riskData };
})()";

/// Metadata scraped off a detected challenge.
///
/// Diagnostic only; the provider solves without any of it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptchaChallenge {
    /// The widget's site key, if exposed
    pub site_key: Option<String>,
    /// Whether the enterprise variant is serving the challenge
    pub is_enterprise: bool,
    /// Opaque risk payload some deployments attach to the widget
    pub risk_data: Option<String>,
}

/// The known challenge-iframe selector matched.
pub async fn frame_signal(page: &Page) -> bool {
    probe::try_eval_bool(page, FRAME_SELECTOR_JS).await
}

/// Some iframe carries a captcha-flavored src or title.
pub async fn iframe_scan_signal(page: &Page) -> bool {
    probe::try_eval_bool(page, IFRAME_SCAN_JS).await
}

/// The raw markup mentions a captcha vendor.
///
/// Serializes the whole document, so callers should not run it every
/// iteration.
pub async fn markup_signal(page: &Page) -> bool {
    probe::try_eval_bool(page, MARKUP_SCAN_JS).await
}

/// OR-combined challenge presence check.
///
/// `include_markup_scan` gates the expensive signal; the two cheap signals
/// always run.
pub async fn challenge_present(page: &Page, include_markup_scan: bool) -> bool {
    if frame_signal(page).await {
        tracing::debug!("Challenge detected via frame selector");
        return true;
    }
    if iframe_scan_signal(page).await {
        tracing::debug!("Challenge detected via iframe attribute scan");
        return true;
    }
    if include_markup_scan && markup_signal(page).await {
        tracing::debug!("Challenge detected via markup scan");
        return true;
    }
    false
}

/// Scrape challenge metadata for diagnostics.
pub async fn challenge_metadata(page: &Page) -> Option<CaptchaChallenge> {
    let value = probe::try_eval::<serde_json::Value>(page, METADATA_JS).await?;
    challenge_from_value(&value)
}

/// Parse the metadata probe's reply.
fn challenge_from_value(value: &serde_json::Value) -> Option<CaptchaChallenge> {
    serde_json::from_value(value.clone()).ok()
}
