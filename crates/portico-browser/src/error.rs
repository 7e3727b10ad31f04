use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("certificate bundle not found: {0}")]
    CertificateMissing(PathBuf),

    #[error("certificate rejected by provider: {0}")]
    CertificateRejected(CertRejection),

    #[error("provider connection failed: {0}")]
    ConnectError(String),

    #[error("chromium error: {0}")]
    ChromiumError(String),

    #[error("navigation failed: {0}")]
    NavigationError(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BrowserError {
    /// True for errors no amount of retrying can recover from.
    ///
    /// A missing certificate bundle fails every future attempt the same way,
    /// so the orchestrator aborts instead of burning the attempt budget.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::CertificateMissing(_))
    }
}

/// Why the provider refused an uploaded certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertRejection {
    BadPassword,
    Expired,
    Malformed,
    Other(String),
}

impl CertRejection {
    /// Classify a provider error message by substring.
    ///
    /// The provider reports rejections as free-form text; only a few stable
    /// markers are recognized, everything else is passed through verbatim.
    #[must_use]
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("password") {
            Self::BadPassword
        } else if lower.contains("expired") {
            Self::Expired
        } else if lower.contains("malformed") || lower.contains("invalid") || lower.contains("parse") {
            Self::Malformed
        } else {
            Self::Other(message.to_string())
        }
    }
}

impl fmt::Display for CertRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadPassword => write!(f, "wrong bundle password"),
            Self::Expired => write!(f, "certificate expired"),
            Self::Malformed => write!(f, "malformed bundle"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BrowserError::NavigationError("page not found".to_string());
        assert_eq!(err.to_string(), "navigation failed: page not found");
    }

    #[test]
    fn test_missing_certificate_is_fatal() {
        let err = BrowserError::CertificateMissing(PathBuf::from("/tmp/cert.pfx"));
        assert!(err.is_fatal());
        assert!(!BrowserError::ConnectError("refused".to_string()).is_fatal());
    }

    #[test]
    fn test_rejection_classify() {
        assert_eq!(
            CertRejection::classify("Invalid PKCS12 password provided"),
            CertRejection::BadPassword
        );
        assert_eq!(
            CertRejection::classify("certificate has EXPIRED"),
            CertRejection::Expired
        );
        assert_eq!(
            CertRejection::classify("failed to parse bundle"),
            CertRejection::Malformed
        );
        assert_eq!(
            CertRejection::classify("quota exceeded"),
            CertRejection::Other("quota exceeded".to_string())
        );
    }

    #[test]
    fn test_rejection_display() {
        let err = BrowserError::CertificateRejected(CertRejection::Expired);
        assert!(err.to_string().contains("certificate expired"));
    }
}
