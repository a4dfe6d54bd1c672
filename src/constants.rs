//! Global constants used throughout the numng codebase.
//!
//! File names, well-known keys, retry parameters and parallelism defaults live here
//! so magic values stay discoverable.

use std::time::Duration;

/// Ref used when a declaration names none.
pub const DEFAULT_GIT_REF: &str = "main";

/// Default root declaration file name.
pub const PACKAGE_FILE_NAME: &str = "numng.json";

/// nupm in-package metadata file name.
pub const NUPM_METADATA_FILE: &str = "nupm.nuon";

/// packer in-package metadata file name.
pub const PACKER_METADATA_FILE: &str = "meta.nuon";

/// Registry index file of a nupm registry, relative to the registry root.
pub const NUPM_REGISTRY_INDEX: &str = "registry/registry.nuon";

/// Registry version key that holds the fallback declaration.
pub const FALLBACK_VERSION_KEY: &str = "_";

/// Maximum number of alias hops followed inside one registry entry.
pub const MAX_ALIAS_DEPTH: usize = 16;

/// Keys accepted inside `shell_config`.
pub const VALID_SHELL_CONFIG_KEYS: &[&str] = &["source", "use", "use_all", "source_env"];

/// Build command that `do_cargo_build: true` stands for; run as cargo directly.
pub const CARGO_BUILD_COMMAND: &str = "cargo build --release";

/// Record of the links numng owns in a managed home, relative to the home.
pub const LINK_RECORD_FILE: &str = ".numng-links.json";

/// Maximum number of resolve-and-fetch rounds spent following dependencies
/// declared inside fetched packages.
pub const MAX_DISCOVERY_ROUNDS: usize = 16;

/// Registry every scaffolded declaration starts with.
pub const DEFAULT_REGISTRY_URI: &str = "https://github.com/nushell/nupm";

/// Repository of numng itself, added as a dependency by `init --nu-config`.
pub const NUMNG_SOURCE_URI: &str = "https://github.com/jan9103/numng";

/// Directory kept by `git clean` when refreshing a stale worktree.
pub const PRESERVED_BUILD_DIR: &str = "/target";

/// Name of the persisted store index.
pub const STORE_INDEX_FILE: &str = "index.json";

/// Timeout for waiting on another task's pending store entry (10 seconds).
///
/// After it elapses the waiter re-checks the entry and takes over if the
/// original task went away.
pub const PENDING_STATE_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum backoff delay for retried worktree operations (200ms).
pub const MAX_BACKOFF_DELAY_MS: u64 = 200;

/// Starting delay for exponential backoff (10ms).
pub const STARTING_BACKOFF_DELAY_MS: u64 = 10;

/// Minimum number of parallel fetches regardless of CPU count.
pub const MIN_PARALLELISM: usize = 4;

/// Multiplier applied to CPU core count for default parallelism.
pub const PARALLELISM_CORE_MULTIPLIER: usize = 2;

/// Default CPU core count when detection fails.
pub const FALLBACK_CORE_COUNT: usize = 4;

/// Default fetch parallelism: `max(MIN_PARALLELISM, cores × PARALLELISM_CORE_MULTIPLIER)`.
#[must_use]
pub fn default_max_parallel() -> usize {
    let cores = std::thread::available_parallelism().map_or(FALLBACK_CORE_COUNT, usize::from);
    std::cmp::max(MIN_PARALLELISM, cores * PARALLELISM_CORE_MULTIPLIER)
}
