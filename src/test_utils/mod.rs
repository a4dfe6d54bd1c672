//! Test utilities for numng
//!
//! Available to unit tests and, through the `test-utils` feature, to the
//! integration test suites.
//!
//! - [`TestGit`] builds local git repositories that packages can be fetched from
//! - [`init_test_logging`] installs a tracing subscriber once per test binary
//!
//! # Example
//!
//! ```rust,no_run
//! use numng::test_utils::TestGit;
//!
//! let temp = tempfile::TempDir::new().unwrap();
//! let repo = TestGit::create_package(temp.path().join("pkg"), &[("mod.nu", "export def hi [] {}")])
//!     .unwrap();
//! println!("fetch from {}", repo.file_url());
//! ```

pub mod git_helper;

pub use git_helper::TestGit;

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` when given, otherwise `RUST_LOG`; does nothing when neither is
/// set. Only the first call in a test binary has an effect.
///
/// ```rust,no_run
/// use tracing::Level;
/// numng::test_utils::init_test_logging(Some(Level::DEBUG));
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}
