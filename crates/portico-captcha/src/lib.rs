//! Portico Captcha - challenge detection and remote solving.
//!
//! This crate wraps the hosted provider's managed captcha solver and the
//! page-side challenge widget. Detection combines several independent DOM
//! signals; solving goes through the provider's wait-for-solve primitive with
//! a wrapper timeout and retry policy; the widget module handles token
//! capture, injection, and in-place resets.
//!
//! # Architecture
//!
//! - **Detection** ([`detect`]): OR-combined DOM signals plus challenge metadata
//! - **Solver** ([`solver`]): the [`CaptchaSolver`] trait and its provider-backed implementation
//! - **Widget** ([`widget`]): token observer, injection, and reset scripts
//! - **Errors** ([`error`]): solver-specific error types

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod detect;
pub mod error;
pub mod solver;
pub mod widget;

// Re-export commonly used types
pub use detect::CaptchaChallenge;
pub use error::{Result, SolverError};
pub use solver::{CaptchaSolver, RemoteSolver, SolvePolicy, SolveStatus};
