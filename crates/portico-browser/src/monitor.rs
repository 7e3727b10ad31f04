//! Page-level network and console monitoring.
//!
//! Attaches fetch interception to outbound login submissions so the captcha
//! token can be read (and the first submission held back) before the page
//! navigates away, plus console and dialog watchers for diagnostics.

use crate::error::{BrowserError, Result};
use base64::Engine;
use chromiumoxide::cdp::browser_protocol::fetch::{
    self, EventRequestPaused, RequestPattern, RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::{self, ErrorReason};
use chromiumoxide::cdp::browser_protocol::page::{
    EventJavascriptDialogOpening, HandleJavaScriptDialogParams,
};
use chromiumoxide::cdp::js_protocol::runtime;
use chromiumoxide::Page;
use futures_util::stream::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Form field carrying the captcha response token.
const TOKEN_FIELD: &str = "h-captcha-response";

/// Cap on captured error bodies; enough for any server-rendered error text.
const ERROR_BODY_MAX: usize = 2048;

/// Write-only observer for events captured off the page.
///
/// Implementations must be cheap and non-blocking; callbacks run on the
/// event-drain task and a slow sink stalls request interception.
pub trait MonitorSink: Send + Sync + 'static {
    /// A captcha token was seen in an outbound submission body.
    fn intercepted_token(&self, value: String);

    /// Whether an outbound submission should be held back at the network
    /// layer instead of being allowed through.
    fn hold_submission(&self) -> bool;

    /// A submission was blocked; its token (if any) was already offered.
    fn submission_blocked(&self);

    /// An error response body was captured for a matching request.
    fn error_body(&self, status: u16, body: String);
}

/// Live monitoring of one page.
///
/// Dropping the monitor stops all watcher tasks.
pub struct PageMonitor {
    page: Page,
    fetch_task: JoinHandle<()>,
    console_task: JoinHandle<()>,
    dialog_task: JoinHandle<()>,
}

impl PageMonitor {
    /// Enable interception for `url_pattern` and start the watcher tasks.
    pub async fn attach<S: MonitorSink>(
        page: &Page,
        url_pattern: &str,
        sink: Arc<S>,
    ) -> Result<Self> {
        let patterns = vec![
            RequestPattern {
                url_pattern: Some(url_pattern.to_string()),
                resource_type: None,
                request_stage: Some(RequestStage::Request),
            },
            RequestPattern {
                url_pattern: Some(url_pattern.to_string()),
                resource_type: None,
                request_stage: Some(RequestStage::Response),
            },
        ];
        page.execute(fetch::EnableParams {
            patterns: Some(patterns),
            handle_auth_requests: None,
        })
        .await
        .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;

        page.execute(runtime::EnableParams::default())
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;

        let fetch_task = spawn_fetch_watcher(page, sink).await?;
        let console_task = spawn_console_watcher(page).await?;
        let dialog_task = spawn_dialog_watcher(page).await?;

        Ok(Self {
            page: page.clone(),
            fetch_task,
            console_task,
            dialog_task,
        })
    }

    /// Stop watching and release interception.
    pub async fn detach(self) {
        if let Err(e) = self.page.execute(fetch::DisableParams::default()).await {
            tracing::debug!("Fetch disable failed: {}", e);
        }
        self.fetch_task.abort();
        self.console_task.abort();
        self.dialog_task.abort();
    }
}

impl Drop for PageMonitor {
    fn drop(&mut self) {
        self.fetch_task.abort();
        self.console_task.abort();
        self.dialog_task.abort();
    }
}

async fn spawn_fetch_watcher<S: MonitorSink>(
    page: &Page,
    sink: Arc<S>,
) -> Result<JoinHandle<()>> {
    let mut events = page
        .event_listener::<EventRequestPaused>()
        .await
        .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
    let page = page.clone();

    Ok(tokio::spawn(async move {
        while let Some(event) = events.next().await {
            handle_paused_request(&page, &sink, &event).await;
        }
    }))
}

/// Decide what to do with one paused request.
///
/// Request stage: capture the token from POST bodies and optionally hold the
/// submission back. Response stage: capture error bodies, then let the
/// response through. Protocol failures are logged and the request continued
/// if possible; a wedged request stalls the whole page.
async fn handle_paused_request<S: MonitorSink>(
    page: &Page,
    sink: &Arc<S>,
    event: &EventRequestPaused,
) {
    let at_response_stage =
        event.response_status_code.is_some() || event.response_error_reason.is_some();

    if at_response_stage {
        let status = event
            .response_status_code
            .and_then(|code| u16::try_from(code).ok())
            .unwrap_or(0);
        if status >= 400 {
            if let Ok(response) = page
                .execute(fetch::GetResponseBodyParams::new(event.request_id.clone()))
                .await
            {
                let body = decode_body(&response.body, response.base64_encoded);
                tracing::debug!("Captured {} response ({} bytes)", status, body.len());
                sink.error_body(status, truncate(body, ERROR_BODY_MAX));
            }
        }
        continue_request(page, event).await;
        return;
    }

    // Request stage
    let is_post = event.request.method.eq_ignore_ascii_case("POST");
    let token = assemble_post_data(&event.request)
        .as_deref()
        .and_then(extract_token_from_post_data);

    if let Some(token) = token {
        tracing::info!(
            "Intercepted submission token ({} chars) in POST to {}",
            token.len(),
            event.request.url
        );
        sink.intercepted_token(token);

        if sink.hold_submission() {
            tracing::info!("Holding first submission of {}", event.request.url);
            let failed = page
                .execute(fetch::FailRequestParams {
                    request_id: event.request_id.clone(),
                    error_reason: ErrorReason::Aborted,
                })
                .await;
            match failed {
                Ok(_) => {
                    sink.submission_blocked();
                    return;
                }
                Err(e) => tracing::warn!("Failed to block submission: {}", e),
            }
        }
    } else if is_post {
        tracing::trace!("POST without token field to {}", event.request.url);
    }

    continue_request(page, event).await;
}

async fn continue_request(page: &Page, event: &EventRequestPaused) {
    let result = page
        .execute(fetch::ContinueRequestParams {
            request_id: event.request_id.clone(),
            url: None,
            method: None,
            post_data: None,
            headers: None,
            intercept_response: None,
        })
        .await;
    if let Err(e) = result {
        tracing::trace!("Continue request failed: {}", e);
    }
}

async fn spawn_console_watcher(page: &Page) -> Result<JoinHandle<()>> {
    let mut events = page
        .event_listener::<runtime::EventConsoleApiCalled>()
        .await
        .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;

    Ok(tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let parts: Vec<String> = event
                .args
                .iter()
                .map(|arg| {
                    arg.value
                        .as_ref()
                        .map(ToString::to_string)
                        .or_else(|| arg.description.clone())
                        .unwrap_or_default()
                })
                .collect();
            tracing::debug!("Console [{:?}]: {}", event.r#type, parts.join(" "));
        }
    }))
}

async fn spawn_dialog_watcher(page: &Page) -> Result<JoinHandle<()>> {
    let mut events = page
        .event_listener::<EventJavascriptDialogOpening>()
        .await
        .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
    let page = page.clone();

    Ok(tokio::spawn(async move {
        while let Some(event) = events.next().await {
            // A native dialog freezes the page until answered. Nothing in
            // the login flow legitimately opens one, so always dismiss.
            tracing::warn!("Dismissing dialog [{:?}]: {}", event.r#type, event.message);
            if let Ok(params) = HandleJavaScriptDialogParams::builder()
                .accept(false)
                .build()
            {
                let _ = page.execute(params).await;
            }
        }
    }))
}

/// Reassemble the POST body from `postDataEntries`; the flat `postData`
/// field is deprecated in CDP and not exposed by this protocol version.
/// Entries carry base64-encoded chunks of the original body.
fn assemble_post_data(request: &network::Request) -> Option<String> {
    let entries = request.post_data_entries.as_ref()?;
    let mut bytes = Vec::new();
    for entry in entries {
        if let Some(chunk) = &entry.bytes {
            if let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(chunk) {
                bytes.extend_from_slice(&decoded);
            }
        }
    }
    if bytes.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }
}

fn decode_body(body: &str, base64_encoded: bool) -> String {
    if base64_encoded {
        base64::engine::general_purpose::STANDARD
            .decode(body)
            .map(|bytes| String::from_utf8_lossy(&bytes).to_string())
            .unwrap_or_else(|_| body.to_string())
    } else {
        body.to_string()
    }
}

fn truncate(mut text: String, max: usize) -> String {
    if text.len() > max {
        let mut cut = max;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}

/// Pull the captcha token out of a form-urlencoded body.
fn extract_token_from_post_data(post_data: &str) -> Option<String> {
    url::form_urlencoded::parse(post_data.as_bytes())
        .find(|(key, _)| key == TOKEN_FIELD)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_token() {
        let body = "authenticity_token=abc&h-captcha-response=P0_eyJhbGciOiJIUzI1NiJ9&submit=1";
        assert_eq!(
            extract_token_from_post_data(body).as_deref(),
            Some("P0_eyJhbGciOiJIUzI1NiJ9")
        );
    }

    #[test]
    fn test_extract_token_url_decodes() {
        let body = "h-captcha-response=a%2Bb%3Dc";
        assert_eq!(extract_token_from_post_data(body).as_deref(), Some("a+b=c"));
    }

    #[test]
    fn test_extract_token_absent_or_empty() {
        assert_eq!(extract_token_from_post_data("user=a&pass=b"), None);
        assert_eq!(extract_token_from_post_data("h-captcha-response="), None);
        assert_eq!(extract_token_from_post_data(""), None);
    }

    #[test]
    fn test_decode_body_base64() {
        assert_eq!(decode_body("Q2FwdGNoYSBpbnbDoWxpZG8=", true), "Captcha inválido");
        assert_eq!(decode_body("plain text", false), "plain text");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "inválido".to_string();
        // Truncation point lands inside the two-byte 'á'
        let cut = truncate(text, 4);
        assert!(cut.len() <= 4);
        assert!(cut.is_char_boundary(cut.len()));
    }
}
