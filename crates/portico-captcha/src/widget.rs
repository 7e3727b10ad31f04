//! Challenge widget scripting.
//!
//! Token capture, injection, and in-place resets all happen through page
//! JavaScript. The observer must be installed before solving starts: the
//! provider may auto-submit the instant it solves, and the token has to be
//! caught at the earliest moment regardless of which path surfaces it first.

use portico_browser::{probe, Page};

/// Placeholder substituted into script templates.
const TOKEN_SLOT: &str = "__TOKEN__";

/// Installs the write-once capture slot at `window.__porticoWatch`.
///
/// Three hooks feed it: a wrap of the widget's completion callback, a
/// mutation watch on the response field, and a periodic poll of both the
/// field and the widget's response accessor.
const INSTALL_OBSERVER_JS: &str = r#"(() => {
    if (window.__porticoWatch) { return true; }
    const watch = { value: null };
    window.__porticoWatch = watch;
    const offer = (v) => {
        if (v && v.length > 0 && !watch.value) { watch.value = v; }
    };

    const holder = document.querySelector('[data-callback]');
    if (holder) {
        const name = holder.getAttribute('data-callback');
        const original = window[name];
        if (typeof original === 'function' && !original.__porticoWrapped) {
            const wrapped = function(token) {
                offer(token);
                return original.apply(this, arguments);
            };
            wrapped.__porticoWrapped = true;
            window[name] = wrapped;
        }
    }

    const field = document.querySelector('[name="h-captcha-response"]');
    if (field) {
        offer(field.value);
        new MutationObserver(() => offer(field.value)).observe(field, {
            attributes: true, childList: true, subtree: true, characterData: true
        });
    }

    setInterval(() => {
        const f = document.querySelector('[name="h-captcha-response"]');
        if (f) { offer(f.value); }
        try {
            if (window.hcaptcha && typeof window.hcaptcha.getResponse === 'function') {
                offer(window.hcaptcha.getResponse());
            }
        } catch (e) {}
    }, 250);
    return true;
})()"#;

const OBSERVER_TOKEN_JS: &str =
    "window.__porticoWatch && window.__porticoWatch.value ? window.__porticoWatch.value : ''";

const ACCESSOR_TOKEN_JS: &str = r#"(() => {
    try {
        if (window.hcaptcha && typeof window.hcaptcha.getResponse === 'function') {
            const v = window.hcaptcha.getResponse();
            if (v) { return v; }
        }
    } catch (e) {}
    const field = document.querySelector('[name="h-captcha-response"]');
    return field && field.value ? field.value : '';
})()"#;

const INJECT_TOKEN_JS: &str = r#"(() => {
    const token = '__TOKEN__';
    const fields = document.querySelectorAll('[name="h-captcha-response"]');
    if (fields.length === 0) { return false; }
    for (const field of fields) {
        field.value = token;
        if (field.tagName === 'TEXTAREA') { field.innerHTML = token; }
        field.dispatchEvent(new Event('input', { bubbles: true }));
        field.dispatchEvent(new Event('change', { bubbles: true }));
    }
    return true;
})()"#;

const INJECTED_LEN_JS: &str = r#"(() => {
    const field = document.querySelector('[name="h-captcha-response"]');
    return field && field.value ? field.value.length : 0;
})()"#;

const RESET_WIDGET_JS: &str = r#"(() => {
    let reset = false;
    try {
        if (window.hcaptcha && typeof window.hcaptcha.reset === 'function') {
            window.hcaptcha.reset();
            reset = true;
        }
    } catch (e) {}
    for (const field of document.querySelectorAll('[name="h-captcha-response"]')) {
        field.value = '';
    }
    if (window.__porticoWatch) { window.__porticoWatch.value = null; }
    return reset;
})()"#;

/// Install the token-capture observer. Idempotent.
pub async fn install_token_observer(page: &Page) -> bool {
    probe::try_eval_bool(page, INSTALL_OBSERVER_JS).await
}

/// Read the observer's captured token, if any.
pub async fn observer_token(page: &Page) -> Option<String> {
    probe::try_eval_string(page, OBSERVER_TOKEN_JS).await
}

/// Read the token straight from the widget accessor or response field.
pub async fn accessor_token(page: &Page) -> Option<String> {
    probe::try_eval_string(page, ACCESSOR_TOKEN_JS).await
}

/// Write the token into every response field, firing input/change events.
///
/// Returns false when no response field exists on the page.
pub async fn inject_token(page: &Page, token: &str) -> bool {
    let js = INJECT_TOKEN_JS.replace(TOKEN_SLOT, &escape_js(token));
    probe::try_eval_bool(page, &js).await
}

/// Length of the value currently held by the response field.
pub async fn injected_token_len(page: &Page) -> usize {
    probe::try_eval::<usize>(page, INJECTED_LEN_JS)
        .await
        .unwrap_or(0)
}

/// Reset the widget in place and drop any captured token.
///
/// Returns whether the widget's own reset ran; fields and the capture slot
/// are cleared regardless.
pub async fn reset_widget(page: &Page) -> bool {
    probe::try_eval_bool(page, RESET_WIDGET_JS).await
}

/// Escape a value for placement inside a single-quoted JS string.
fn escape_js(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_js_passthrough() {
        assert_eq!(escape_js("P0_eyJhbGciOiJIUzI1NiJ9"), "P0_eyJhbGciOiJIUzI1NiJ9");
    }

    #[test]
    fn test_escape_js_special_chars() {
        assert_eq!(escape_js(r"a\b"), r"a\\b");
        assert_eq!(escape_js("it's"), r"it\'s");
        assert_eq!(escape_js("a\nb"), r"a\nb");
    }

    #[test]
    fn test_inject_template_substitution() {
        let js = INJECT_TOKEN_JS.replace(TOKEN_SLOT, &escape_js("tok'en"));
        assert!(js.contains(r"const token = 'tok\'en';"));
        assert!(!js.contains(TOKEN_SLOT));
    }
}
