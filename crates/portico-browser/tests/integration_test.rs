use portico_browser::{RemoteSession, SessionOptions};
use std::path::PathBuf;
use std::time::Duration;

fn options_from_env() -> Option<SessionOptions> {
    let ws_url = std::env::var("PORTICO_TEST_WS_URL").ok()?;
    let cert = std::env::var("PORTICO_TEST_CERT_PATH").ok()?;
    Some(SessionOptions {
        ws_url,
        certificate_path: PathBuf::from(cert),
        certificate_password: std::env::var("PORTICO_TEST_CERT_PASSWORD").unwrap_or_default(),
        target_url: "https://example.com".to_string(),
        connect_timeout: Duration::from_secs(20),
        navigation_timeout: Duration::from_secs(30),
        settle: Duration::from_secs(1),
    })
}

#[tokio::test]
#[ignore] // Requires provider credentials and a certificate bundle
async fn test_session_bootstrap() {
    let Some(options) = options_from_env() else {
        panic!("PORTICO_TEST_WS_URL and PORTICO_TEST_CERT_PATH must be set");
    };

    let session = RemoteSession::bootstrap(options).await;
    assert!(session.is_ok(), "Failed to bootstrap session");

    if let Ok(session) = session {
        session.close().await;
    }
}

#[tokio::test]
#[ignore] // Requires provider credentials and a certificate bundle
async fn test_navigation_reaches_dom_ready() {
    let Some(options) = options_from_env() else {
        panic!("PORTICO_TEST_WS_URL and PORTICO_TEST_CERT_PATH must be set");
    };

    let session = RemoteSession::bootstrap(options).await.unwrap();
    let result = session
        .navigate("https://example.org", Duration::from_secs(30))
        .await;
    assert!(result.is_ok(), "Navigation failed");
    session.close().await;
}
