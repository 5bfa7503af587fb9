//! Loading and validating the run configuration.
//!
//! The configuration file is YAML. Lookup order for its location:
//!
//! 1. an explicit path (the CLI's `--config`)
//! 2. the `CFGRPM_CONFIG_FILE` environment variable
//! 3. `cfgrpm.yaml` in the working directory
//!
//! Every key is optional and falls back to the defaults in [`types`].

pub mod types;

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::consts::{CONFIG_FILE_ENV, DEFAULT_CONFIG_FILE, KEEP_WORK_DIR_ENV};
use crate::layout::{HostId, SegmentKind};

pub use types::{Config, LayoutConfig, LogLevel};

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error(
    "configuration file \"{path}\" not found; pass --config, set {env} or provide {default} in the working directory"
  )]
  NotFound {
    path: PathBuf,
    env: &'static str,
    default: &'static str,
  },

  #[error("failed to read configuration file {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("configuration file {0} is empty")]
  Empty(PathBuf),

  #[error("failed to parse configuration: {0}")]
  Parse(#[from] serde_yaml::Error),

  #[error("invalid value for {field}: {message}")]
  InvalidValue { field: &'static str, message: String },
}

/// Decide which configuration file to read.
pub fn config_file_path(explicit: Option<&Path>) -> PathBuf {
  if let Some(path) = explicit {
    return path.to_path_buf();
  }
  std::env::var_os(CONFIG_FILE_ENV)
    .map(PathBuf::from)
    .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

impl Config {
  /// Locate, parse and validate the configuration file.
  ///
  /// Returns the configuration together with the path it was read from.
  pub fn load(explicit: Option<&Path>) -> Result<(Config, PathBuf), ConfigError> {
    let path = config_file_path(explicit);
    if !path.exists() {
      return Err(ConfigError::NotFound {
        path,
        env: CONFIG_FILE_ENV,
        default: DEFAULT_CONFIG_FILE,
      });
    }

    let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
      path: path.clone(),
      source,
    })?;
    if content.trim().is_empty() {
      return Err(ConfigError::Empty(path));
    }

    let mut config = Config::from_yaml_str(&content)?;
    if std::env::var_os(KEEP_WORK_DIR_ENV).is_some() {
      config.keep_work_dir = true;
    }
    config.validate()?;

    debug!(path = %path.display(), "loaded configuration");
    Ok((config, path))
  }

  /// Parse configuration text without validating it.
  pub fn from_yaml_str(content: &str) -> Result<Config, ConfigError> {
    Ok(serde_yaml::from_str(content)?)
  }

  /// Check the invariants the pipeline relies on.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.thread_count == 0 {
      return Err(ConfigError::InvalidValue {
        field: "thread_count",
        message: "must be at least 1".to_string(),
      });
    }
    if self.config_rpm_prefix.trim().is_empty() {
      return Err(ConfigError::InvalidValue {
        field: "config_rpm_prefix",
        message: "must not be empty".to_string(),
      });
    }
    if self.config_rpm_prefix.chars().any(char::is_whitespace) {
      return Err(ConfigError::InvalidValue {
        field: "config_rpm_prefix",
        message: "must not contain whitespace".to_string(),
      });
    }
    if self.max_file_size == 0 {
      return Err(ConfigError::InvalidValue {
        field: "max_file_size",
        message: "must be greater than 0".to_string(),
      });
    }
    if !self.svn_path_to_config.starts_with('/') {
      return Err(ConfigError::InvalidValue {
        field: "svn_path_to_config",
        message: format!("\"{}\" is not an absolute repository path", self.svn_path_to_config),
      });
    }
    if let Some(cmd) = &self.rpm_upload_cmd
      && cmd.trim().is_empty()
    {
      return Err(ConfigError::InvalidValue {
        field: "rpm_upload_cmd",
        message: "must not be blank when set".to_string(),
      });
    }
    if self.error_log_url().is_some() && self.error_log_dir().is_none() {
      return Err(ConfigError::InvalidValue {
        field: "error_log_url",
        message: "requires error_log_dir".to_string(),
      });
    }
    Regex::new(&self.repo_packages_regex).map_err(|e| ConfigError::InvalidValue {
      field: "repo_packages_regex",
      message: e.to_string(),
    })?;
    self.validate_output_dirs()?;
    self.validate_layout()
  }

  /// Check that no per-host directory can land on another output root.
  ///
  /// Hosts own `<config_viewer_hosts_dir>/<host>` and `<artifact_dir>/<host>`,
  /// so those two roots must not contain each other, and neither may contain
  /// `temp_dir` or `error_log_dir`.
  pub fn validate_output_dirs(&self) -> Result<(), ConfigError> {
    let viewer = normalize(&self.config_viewer_hosts_dir);
    let artifacts = normalize(&self.artifact_dir);

    if viewer.starts_with(&artifacts) || artifacts.starts_with(&viewer) {
      return Err(ConfigError::InvalidValue {
        field: "artifact_dir",
        message: format!(
          "{} and config_viewer_hosts_dir {} must not contain each other",
          self.artifact_dir.display(),
          self.config_viewer_hosts_dir.display()
        ),
      });
    }

    let mut others = vec![("temp_dir", self.temp_dir.as_path())];
    if let Some(dir) = self.error_log_dir() {
      others.push(("error_log_dir", dir));
    }
    for (field, dir) in others {
      let normalized = normalize(dir);
      for (root_field, root) in [("config_viewer_hosts_dir", &viewer), ("artifact_dir", &artifacts)] {
        if normalized.starts_with(root) {
          return Err(ConfigError::InvalidValue {
            field,
            message: format!("{} must not be inside {}", dir.display(), root_field),
          });
        }
      }
    }
    Ok(())
  }

  fn validate_layout(&self) -> Result<(), ConfigError> {
    let layout = &self.layout;
    let dirs = [
      &layout.global_dir,
      &layout.distribution_dir,
      &layout.location_dir,
      &layout.environment_dir,
      &layout.business_unit_dir,
      &layout.host_dir,
    ];

    let mut seen = HashSet::new();
    for dir in dirs {
      if dir.is_empty() || dir.contains('/') {
        return Err(ConfigError::InvalidValue {
          field: "layout",
          message: format!("\"{}\" is not a single directory name", dir),
        });
      }
      if !seen.insert(dir.as_str()) {
        return Err(ConfigError::InvalidValue {
          field: "layout",
          message: format!("directory \"{}\" is used by more than one segment kind", dir),
        });
      }
    }

    Regex::new(&layout.host_pattern).map_err(|e| ConfigError::InvalidValue {
      field: "layout.host_pattern",
      message: e.to_string(),
    })?;

    for (host, segments) in &layout.assignments {
      HostId::new(host.as_str()).map_err(|e| ConfigError::InvalidValue {
        field: "layout.assignments",
        message: e.to_string(),
      })?;
      for segment in segments {
        if matches!(segment.kind, SegmentKind::Global | SegmentKind::Host) {
          return Err(ConfigError::InvalidValue {
            field: "layout.assignments",
            message: format!("host {} cannot be assigned a {} segment", host, segment.kind),
          });
        }
        if segment.name.is_empty() || segment.name.contains('/') {
          return Err(ConfigError::InvalidValue {
            field: "layout.assignments",
            message: format!("\"{}\" is not a single segment name", segment.name),
          });
        }
      }
    }

    Ok(())
  }
}

/// Lexically resolve `.` and `..` so prefix checks see through them.
fn normalize(path: &Path) -> PathBuf {
  let mut out = PathBuf::new();
  for component in path.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => {
        if !out.pop() {
          out.push(component);
        }
      }
      other => out.push(other),
    }
  }
  out
}
