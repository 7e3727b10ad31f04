//! Remote browser session lifecycle.
//!
//! A session covers one page on a hosted browser: connect over the
//! credentialed WebSocket, upload the client certificate so TLS client auth
//! works during navigation, then navigate to the target and wait for the DOM
//! to become usable.

use crate::commands::RawCdpCommand;
use crate::error::{BrowserError, CertRejection, Result};
use base64::Engine;
use chromiumoxide::browser::Browser;
use chromiumoxide::Page;
use futures_util::stream::StreamExt;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use zeroize::Zeroizing;

/// How often the DOM-ready poll re-checks `document.readyState`.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Everything needed to bring up one session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Credentialed WebSocket URL of the provider
    pub ws_url: String,
    /// Path to the PKCS#12 certificate bundle
    pub certificate_path: PathBuf,
    /// Password protecting the bundle
    pub certificate_password: String,
    /// URL to navigate to once the certificate is installed
    pub target_url: String,
    /// Hard limit on the WebSocket connect
    pub connect_timeout: Duration,
    /// Hard limit on reaching DOM ready after navigation
    pub navigation_timeout: Duration,
    /// Extra delay after DOM ready, for page script initialization
    pub settle: Duration,
}

/// A live page on the remote browser.
///
/// Dropping the session aborts the event-drain task; prefer [`close`] for a
/// graceful shutdown that also releases the remote browser.
///
/// [`close`]: RemoteSession::close
pub struct RemoteSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
    page: Page,
}

impl RemoteSession {
    /// Connect, install the certificate, and navigate to the target.
    ///
    /// The certificate is uploaded before navigation so the TLS handshake of
    /// the first request can already present it.
    pub async fn bootstrap(options: SessionOptions) -> Result<Self> {
        let cert = read_certificate(&options.certificate_path)?;
        let cert_b64 = encode_certificate(&cert);

        tracing::info!("Connecting to remote browser");
        let (browser, mut handler) =
            tokio::time::timeout(options.connect_timeout, Browser::connect(&options.ws_url))
                .await
                .map_err(|_| {
                    BrowserError::ConnectError(format!(
                        "connect timed out after {:?}",
                        options.connect_timeout
                    ))
                })?
                .map_err(|e| BrowserError::ConnectError(e.to_string()))?;

        // Drain browser events; chromiumoxide stalls without a consumer.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;

        tracing::info!("Installing client certificate");
        page.execute(RawCdpCommand::new(
            "Browser.addCertificate",
            json!({
                "cert": cert_b64,
                "pass": options.certificate_password,
            }),
        ))
        .await
        .map_err(|e| BrowserError::CertificateRejected(CertRejection::classify(&e.to_string())))?;

        let session = Self {
            browser,
            handler_task,
            page,
        };
        session
            .navigate(&options.target_url, options.navigation_timeout)
            .await?;

        if !options.settle.is_zero() {
            tracing::debug!("Settling for {:?} after navigation", options.settle);
            tokio::time::sleep(options.settle).await;
        }

        Ok(session)
    }

    /// The session's page.
    #[must_use]
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Navigate and wait for the DOM to reach `interactive` or `complete`.
    ///
    /// `goto` resolves on the load event, which heavy pages can delay past
    /// any reasonable budget; polling `readyState` against a deadline accepts
    /// the page as soon as it is scriptable.
    pub async fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        tracing::info!("Navigating to {}", url);
        let deadline = Instant::now() + timeout;

        self.page
            .goto(url)
            .await
            .map_err(|e| BrowserError::NavigationError(e.to_string()))?;

        loop {
            let state: Option<String> = match self.page.evaluate("document.readyState").await {
                Ok(result) => result.into_value().ok(),
                Err(_) => None,
            };
            if matches!(state.as_deref(), Some("interactive" | "complete")) {
                tracing::debug!("DOM ready at {}", url);
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::Timeout(format!(
                    "navigation to {url} did not reach DOM ready within {timeout:?}"
                )));
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    /// Gracefully shut down the session.
    ///
    /// Close failures are logged and swallowed; the remote side reaps
    /// abandoned sessions on its own either way.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            tracing::debug!("Browser close failed: {}", e);
        }
        self.handler_task.abort();
    }
}

impl Drop for RemoteSession {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

/// Read the certificate bundle, mapping a missing file to the fatal variant.
fn read_certificate(path: &Path) -> Result<Zeroizing<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Zeroizing::new(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(BrowserError::CertificateMissing(path.to_path_buf()))
        }
        Err(e) => Err(BrowserError::Io(e)),
    }
}

fn encode_certificate(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}
