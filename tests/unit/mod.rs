//! Unit test suite for numng
//!
//! Exercises the public API across module boundaries without git or the
//! network: registry lookups feeding the resolver, and package metadata
//! feeding the link planner.
//!
//! ```bash
//! cargo test --test unit
//! ```

mod materialization;
mod resolution;
