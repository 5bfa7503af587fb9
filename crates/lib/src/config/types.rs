//! Configuration value types and their defaults.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::layout::SegmentId;

pub const DEFAULT_RPM_PREFIX: &str = "yadt-config-";
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024;
pub const DEFAULT_UPLOAD_CHUNK_SIZE: usize = 10;
pub const DEFAULT_SVN_PATH_TO_CONFIG: &str = "/config";
pub const DEFAULT_THREAD_COUNT: usize = 1;
pub const DEFAULT_REPO_PACKAGES_REGEX: &str = "^yadt-.*-repos?$";
pub const DEFAULT_HOST_PATTERN: &str = r"^(?P<location>[a-z]{3})(?P<business_unit>[a-z]+)\d+$";

/// Log verbosity accepted in the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LogLevel {
  Error,
  Warn,
  Info,
  #[default]
  Debug,
  Trace,
}

impl LogLevel {
  pub fn as_str(self) -> &'static str {
    match self {
      LogLevel::Error => "error",
      LogLevel::Warn => "warn",
      LogLevel::Info => "info",
      LogLevel::Debug => "debug",
      LogLevel::Trace => "trace",
    }
  }
}

impl fmt::Display for LogLevel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for LogLevel {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "error" => Ok(LogLevel::Error),
      "warn" | "warning" => Ok(LogLevel::Warn),
      "info" => Ok(LogLevel::Info),
      "debug" => Ok(LogLevel::Debug),
      "trace" => Ok(LogLevel::Trace),
      other => Err(format!(
        "invalid log level \"{}\", expected one of error, warn, info, debug, trace",
        other
      )),
    }
  }
}

impl TryFrom<String> for LogLevel {
  type Error = String;

  fn try_from(value: String) -> Result<Self, String> {
    value.parse()
  }
}

impl From<LogLevel> for String {
  fn from(level: LogLevel) -> Self {
    level.as_str().to_string()
  }
}

/// Directory names of the overlay segments below the config root, plus the
/// rule assigning shared segments to a host by its name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutConfig {
  pub global_dir: String,
  pub distribution_dir: String,
  pub location_dir: String,
  pub environment_dir: String,
  pub business_unit_dir: String,
  pub host_dir: String,
  /// Regex over the host name; the named groups `distribution`, `location`,
  /// `environment` and `business_unit` pick the host's shared segments.
  pub host_pattern: String,
  /// Shared segments assigned to a host on top of those its name selects.
  ///
  /// A host may end up with several segments of one kind this way; two of
  /// them defining the same file is a merge conflict.
  pub assignments: BTreeMap<String, Vec<SegmentId>>,
}

impl Default for LayoutConfig {
  fn default() -> Self {
    Self {
      global_dir: "all".to_string(),
      distribution_dir: "dist".to_string(),
      location_dir: "loc".to_string(),
      environment_dir: "env".to_string(),
      business_unit_dir: "bu".to_string(),
      host_dir: "host".to_string(),
      host_pattern: DEFAULT_HOST_PATTERN.to_string(),
      assignments: BTreeMap::new(),
    }
  }
}

/// Run configuration, built once and shared read-only by every component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
  pub log_level: LogLevel,
  /// Hosts whose name does not match the layout pattern get only the global
  /// and host segments instead of failing.
  pub allow_unknown_hosts: bool,
  pub config_rpm_prefix: String,
  /// Merged trees are materialized here, one directory per host.
  pub config_viewer_hosts_dir: PathBuf,
  /// Only materialize merged trees; skip packaging and upload.
  pub config_viewer_only: bool,
  /// Largest merged file accepted, in bytes.
  pub max_file_size: u64,
  /// Spec template; the built-in template is used when unset.
  pub path_to_spec_file: Option<PathBuf>,
  /// Built packages are kept here, one directory per host.
  pub artifact_dir: PathBuf,
  /// Artifacts per upload invocation; 0 uploads everything at once.
  pub rpm_upload_chunk_size: usize,
  pub rpm_upload_cmd: Option<String>,
  /// Path of the configuration tree inside the repository.
  pub svn_path_to_config: String,
  pub thread_count: usize,
  pub temp_dir: PathBuf,
  pub keep_work_dir: bool,
  /// Full error output of each failed host is written to `<dir>/<host>.txt`.
  pub error_log_dir: Option<PathBuf>,
  /// Base URL under which `error_log_dir` is served.
  pub error_log_url: Option<String>,
  /// Read for compatibility with existing configuration files; unused.
  pub repo_packages_regex: String,
  /// Read for compatibility with existing configuration files; unused.
  pub custom_dns_searchlist: Vec<String>,
  /// Read for compatibility with existing configuration files; the console
  /// format is fixed.
  pub log_format: Option<String>,
  pub layout: LayoutConfig,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      log_level: LogLevel::default(),
      allow_unknown_hosts: true,
      config_rpm_prefix: DEFAULT_RPM_PREFIX.to_string(),
      config_viewer_hosts_dir: PathBuf::from("/tmp/cfgrpm-viewer"),
      config_viewer_only: false,
      max_file_size: DEFAULT_MAX_FILE_SIZE,
      path_to_spec_file: None,
      artifact_dir: PathBuf::from("/tmp/cfgrpm-artifacts"),
      rpm_upload_chunk_size: DEFAULT_UPLOAD_CHUNK_SIZE,
      rpm_upload_cmd: None,
      svn_path_to_config: DEFAULT_SVN_PATH_TO_CONFIG.to_string(),
      thread_count: DEFAULT_THREAD_COUNT,
      temp_dir: PathBuf::from("/tmp"),
      keep_work_dir: false,
      error_log_dir: None,
      error_log_url: None,
      repo_packages_regex: DEFAULT_REPO_PACKAGES_REGEX.to_string(),
      custom_dns_searchlist: Vec::new(),
      log_format: None,
      layout: LayoutConfig::default(),
    }
  }
}

impl Config {
  /// `error_log_dir`, treating an empty value as unset.
  pub fn error_log_dir(&self) -> Option<&Path> {
    self.error_log_dir.as_deref().filter(|dir| !dir.as_os_str().is_empty())
  }

  /// `error_log_url` without a trailing slash, treating an empty value as unset.
  pub fn error_log_url(&self) -> Option<&str> {
    self
      .error_log_url
      .as_deref()
      .map(|url| url.trim_end_matches('/'))
      .filter(|url| !url.is_empty())
  }
}
