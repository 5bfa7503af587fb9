//! Crate-wide constants.

pub const APP_NAME: &str = "cfgrpm";

/// Environment variable naming the configuration file.
pub const CONFIG_FILE_ENV: &str = "CFGRPM_CONFIG_FILE";

/// Configuration file looked up in the working directory when nothing else is given.
pub const DEFAULT_CONFIG_FILE: &str = "cfgrpm.yaml";

/// Environment variable that keeps the work directory after a run, whatever its value.
pub const KEEP_WORK_DIR_ENV: &str = "KEEPWORKDIR";

/// Suffix of a marker file that removes the same path from lower-priority segments.
pub const TOMBSTONE_SUFFIX: &str = ".tombstone";

/// Directory below the config viewer where merged trees are staged before they
/// replace the old ones. Host ids never start with a dot, so it cannot clash
/// with a host directory.
pub const STAGING_DIR: &str = ".cfgrpm-staging";

/// Extension of a failed host's error log file.
pub const ERROR_LOG_EXTENSION: &str = "txt";

/// Upper bound of captured error output kept in a build failure.
pub const MAX_ERROR_TEXT_LEN: usize = 2000;
