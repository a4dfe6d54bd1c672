//! Integration test suite for numng
//!
//! Runs the engine and the `numng` binary against local git repositories
//! referenced through `file://` URLs. Every test gets its own store, home and
//! config directory; nothing touches the user's numng state.
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! - **pipeline**: fetch, build and link through the engine
//! - **store**: content store sharing, offsets, failure resets and gc
//! - **cli**: subcommands, flags and exit codes

#[path = "../common/mod.rs"]
mod common;

mod cli;
mod pipeline;
mod store;
