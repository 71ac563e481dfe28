/// Name of the optional configuration file looked up at the workspace root.
pub const CONFIG_FILE_NAME: &str = "depbot.toml";

/// Default directory (relative to the root) holding dependency checkouts.
pub const DEFAULT_DEPS_DIR: &str = "deps";

/// Default directory (relative to the root) holding downloaded tools.
pub const DEFAULT_TOOLS_DIR: &str = "tools";

/// Default bound for short tool invocations (git, bootstrap, environment capture).
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30 * 60;

/// Name of the session lock file placed at the workspace root.
pub const SESSION_LOCK_FILE: &str = ".depbot.lock";

/// Version of the lock metadata format.
pub const LOCK_FORMAT_VERSION: u32 = 1;
