//! Cross-platform utilities and helpers
//!
//! # Modules
//!
//! - [`fs`] - Atomic writes, path confinement and symlink helpers
//! - [`platform`] - Path expansion and executable lookup
//! - [`progress`] - Progress bar for the fetch phase

pub mod fs;
pub mod platform;
pub mod progress;

pub use fs::{atomic_write, ensure_dir, filesystem_safe, safe_join};
pub use platform::{absolutize, resolve_path};
pub use progress::ProgressBar;
