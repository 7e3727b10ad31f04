//! Best-effort DOM probes.
//!
//! Login pages rebuild their DOM constantly while challenge widgets load, so
//! any probe can race a mutation and fail spuriously. Probes therefore never
//! propagate protocol errors: a failed read means "not observable right now"
//! and callers treat it as a plain negative.

use chromiumoxide::Page;
use serde::de::DeserializeOwned;

/// Evaluate an expression and deserialize its value.
///
/// Returns `None` on protocol errors, serialization mismatches, or
/// `undefined` results.
pub async fn try_eval<T: DeserializeOwned>(page: &Page, js: &str) -> Option<T> {
    match page.evaluate(js).await {
        Ok(result) => result.into_value().ok(),
        Err(e) => {
            tracing::trace!("Probe evaluation failed: {}", e);
            None
        }
    }
}

/// Evaluate a boolean expression, treating failure as `false`.
pub async fn try_eval_bool(page: &Page, js: &str) -> bool {
    try_eval::<bool>(page, js).await.unwrap_or(false)
}

/// Evaluate a string expression, mapping empty results to `None`.
pub async fn try_eval_string(page: &Page, js: &str) -> Option<String> {
    try_eval::<String>(page, js)
        .await
        .filter(|s| !s.is_empty())
}

/// Whether a selector matches an element that is actually rendered.
pub async fn element_visible(page: &Page, selector: &str) -> bool {
    let js = format!(
        r"(() => {{
            const el = document.querySelector({sel});
            if (!el) return false;
            const style = window.getComputedStyle(el);
            return style.display !== 'none'
                && style.visibility !== 'hidden'
                && el.offsetParent !== null;
        }})()",
        sel = js_string(selector)
    );
    try_eval_bool(page, &js).await
}

/// The rendered text of the page body.
pub async fn page_text(page: &Page) -> Option<String> {
    try_eval_string(page, "document.body ? document.body.innerText : ''").await
}

/// The page's current URL.
pub async fn current_url(page: &Page) -> Option<String> {
    match page.url().await {
        Ok(url) => url,
        Err(e) => {
            tracing::trace!("URL probe failed: {}", e);
            None
        }
    }
}

/// Click the first selector from a prioritized list that resolves.
///
/// Returns the selector that was clicked, or `None` if nothing matched.
pub async fn click_first_match(page: &Page, selectors: &[&str]) -> Option<String> {
    for selector in selectors {
        let Ok(element) = page.find_element(*selector).await else {
            continue;
        };
        match element.click().await {
            Ok(_) => {
                tracing::debug!("Clicked {}", selector);
                return Some((*selector).to_string());
            }
            Err(e) => {
                tracing::trace!("Click on {} failed: {}", selector, e);
            }
        }
    }
    None
}

/// Quote a string as a JS string literal.
pub fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_string_plain() {
        assert_eq!(js_string("button[type=submit]"), "\"button[type=submit]\"");
    }

    #[test]
    fn test_js_string_escapes_quotes() {
        assert_eq!(js_string(r#"a[title="x"]"#), r#""a[title=\"x\"]""#);
    }
}
