//! Default configuration values

/// Project configuration file name
pub const CONFIG_FILE: &str = "pkgforge.toml";

/// Recipe file name inside a package directory
pub const RECIPE_FILE: &str = "package.toml";

/// Default build script inside a package directory
pub const BUILD_SCRIPT: &str = "build.sh";

/// Default packages directory (relative to the project)
pub const PACKAGES_DIR: &str = "packages";

/// Default state directory (relative to the project)
pub const STATE_DIR: &str = "build";

/// Default builder root template (relative to the project)
pub const ROOT_TEMPLATE: &str = "build/roots/root";

/// Placeholder substituted with the builder slot index
pub const ROOT_PLACEHOLDER: &str = "{n}";

/// Default number of builder slots
pub const DEFAULT_BUILDERS: usize = 1;

/// Hard ceiling on builder slots
pub const MAX_BUILDERS: usize = 32;

/// Passes without progress before a dependency cycle is given up for the run
pub const MAX_CYCLE_PASSES: u32 = 3;

/// Lastcheck entries this short or shorter are treated as corrupt
pub const MIN_FINGERPRINT_LEN: usize = 64;

/// Result Store file name (inside the state directory)
pub const RESULT_FILE: &str = "_result";

/// Lastcheck cache file name (inside the state directory)
pub const LASTCHECK_FILE: &str = "_lastcheck";

/// Local repository directory (inside the state directory)
pub const REPO_DIR: &str = "repo";

/// Local repository index file (inside the repository directory)
pub const REPO_INDEX_FILE: &str = "_index.json";

/// Build history directory (inside the state directory)
pub const HISTORY_DIR: &str = "history";

/// Build log directory (inside the state directory)
pub const LOGS_DIR: &str = "logs";

/// Result directory name inside a builder root
pub const RESULT_SUBDIR: &str = ".out";

/// Build log file name inside a builder root
pub const BUILD_LOG: &str = ".build.log";

/// Failure marker left in the result directory by a failed build
pub const FAILED_MARKER: &str = "_failed";

/// Index file served by remote package repositories
pub const REPO_INDEX_REMOTE: &str = "index.json";

/// Index file served by container registries
pub const REGISTRY_INDEX_REMOTE: &str = "containers.json";

/// Maximum remote fetch attempts
pub const MAX_FETCH_RETRIES: u32 = 3;

/// Default container image for sandboxed builds
pub const CONTAINER_IMAGE: &str = "alpine:latest";
