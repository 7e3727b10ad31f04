//! Portico Login - Login-completion orchestration.
//!
//! This crate drives a single-sign-on login from page load to verdict. It
//! coordinates session bootstrap, captcha solving, proof-token capture and
//! injection, readiness gating, form submission, and outcome classification,
//! with bounded retry at both the step and the attempt level.
//!
//! # Features
//!
//! - Bounded step loop with explicit per-iteration outcomes
//! - Prioritized proof-token discovery (intercepted request, observer,
//!   accessor, field scan)
//! - Readiness gating on token length plus anti-forgery field presence
//! - Keyword-driven outcome classification, swappable per deployment
//! - Attempt-level retry with fixed backoff and fresh sessions
//!
//! # Example
//!
//! ```rust,ignore
//! use portico_core::AppConfig;
//! use portico_login::LoginOrchestrator;
//!
//! let config = AppConfig::load_with_env()?;
//! let report = LoginOrchestrator::new(config).run().await?;
//!
//! println!("authenticated: {}", report.authenticated);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod classifier;
pub mod error;
pub mod machine;
pub mod orchestrator;
pub mod page;
pub mod state;
pub mod token;

pub use classifier::{KeywordClassifier, OutcomeClassifier, Verdict};
pub use error::{LoginError, Result};
pub use machine::{AttemptVerdict, LoginMachine, StepOutcome, MAX_SOLVE_ATTEMPTS, MAX_STEPS};
pub use orchestrator::{LoginOrchestrator, LoginReport};
pub use page::{CdpLoginPage, LoginPage, ReadinessProbe};
pub use state::{AttemptState, ProofToken, TokenSource, TOKEN_MIN_SUBMIT_LEN};
pub use token::{looks_like_token, resolve_token};
