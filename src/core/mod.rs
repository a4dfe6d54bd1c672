//! Core types for numng
//!
//! This module holds the error taxonomy shared by every layer of the engine and the
//! helpers the CLI uses to turn failures into readable, colored reports with exit codes.
//!
//! # Error Handling Pattern
//!
//! Pure components (version parsing, declaration adapters, the resolver) return
//! `Result<T, NumngError>`. IO-heavy orchestration returns `anyhow::Result` and adds
//! context, keeping the [`NumngError`] downcastable so the binary can still pick the
//! right exit code:
//!
//! ```rust,no_run
//! use numng::core::{NumngError, exit_code_for, user_friendly_error};
//! use anyhow::Context;
//!
//! fn fetch() -> anyhow::Result<()> {
//!     Err(NumngError::Fetch {
//!         source_uri: "https://example.com/pkg".to_string(),
//!         reason: "could not resolve host".to_string(),
//!     })
//!     .context("Failed to prepare package 'pkg'")
//! }
//!
//! if let Err(e) = fetch() {
//!     let code = exit_code_for(&e);
//!     user_friendly_error(e).display();
//!     std::process::exit(code);
//! }
//! ```

pub mod error;

pub use error::{
    EXIT_BUILD, EXIT_FETCH, EXIT_LINK, EXIT_OTHER, EXIT_RESOLUTION, EXIT_SUCCESS, ErrorContext,
    FailureStage, NumngError, exit_code_for, find_numng_error, user_friendly_error,
};
