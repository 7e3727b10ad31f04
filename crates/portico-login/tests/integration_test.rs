use portico_core::AppConfig;
use portico_login::LoginOrchestrator;

/// Build a config from the live-test environment, if present.
fn config_from_env() -> Option<AppConfig> {
    let mut config = AppConfig::default();
    config.remote.username = std::env::var("PORTICO_TEST_REMOTE_USERNAME").ok()?;
    config.remote.password = std::env::var("PORTICO_TEST_REMOTE_PASSWORD").ok()?;
    config.certificate.path = std::env::var("PORTICO_TEST_CERT_PATH").ok()?.into();
    config.certificate.password =
        std::env::var("PORTICO_TEST_CERT_PASSWORD").unwrap_or_default();
    if let Ok(url) = std::env::var("PORTICO_TEST_LOGIN_URL") {
        config.target.login_url = url;
    }
    Some(config)
}

#[tokio::test]
#[ignore] // Requires provider credentials and a certificate bundle
async fn test_full_login_run() {
    let Some(config) = config_from_env() else {
        panic!("PORTICO_TEST_REMOTE_USERNAME, PORTICO_TEST_REMOTE_PASSWORD and PORTICO_TEST_CERT_PATH must be set");
    };

    let report = LoginOrchestrator::new(config)
        .run()
        .await
        .expect("login run");

    assert!(report.attempts_used >= 1);
    assert!(!report.detail.is_empty());
    assert!(report.finished_at >= report.started_at);
}
