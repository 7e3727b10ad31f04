//! Remote browser session management over the Chrome DevTools Protocol.
//!
//! Connects to a hosted browser provider, installs a client certificate
//! into the session, and exposes monitoring hooks for request interception.

pub mod commands;
pub mod error;
pub mod monitor;
pub mod probe;
pub mod session;

pub use commands::RawCdpCommand;
pub use error::{BrowserError, CertRejection, Result};
pub use monitor::{MonitorSink, PageMonitor};
pub use session::{RemoteSession, SessionOptions};

// Downstream crates script pages without depending on chromiumoxide directly.
pub use chromiumoxide::Page;
