//! Removing generated state of hosts deleted from the repository.

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::consts::{ERROR_LOG_EXTENSION, STAGING_DIR};
use crate::layout::HostId;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("failed to remove {path} of host {host}: {message}")]
pub struct JanitorFailure {
  pub host: HostId,
  pub path: PathBuf,
  pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupOutcome {
  pub removed: Vec<PathBuf>,
  pub bytes_freed: u64,
  pub failures: Vec<JanitorFailure>,
}

impl CleanupOutcome {
  pub fn is_success(&self) -> bool {
    self.failures.is_empty()
  }
}

pub struct HostDirectoryJanitor {
  viewer_dir: PathBuf,
  artifact_dir: PathBuf,
  error_log_dir: Option<PathBuf>,
}

impl HostDirectoryJanitor {
  pub fn new(viewer_dir: impl Into<PathBuf>, artifact_dir: impl Into<PathBuf>) -> Self {
    Self {
      viewer_dir: viewer_dir.into(),
      artifact_dir: artifact_dir.into(),
      error_log_dir: None,
    }
  }

  pub fn with_error_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.error_log_dir = Some(dir.into());
    self
  }

  pub fn from_config(config: &Config) -> Self {
    let janitor = Self::new(&config.config_viewer_hosts_dir, &config.artifact_dir);
    match config.error_log_dir() {
      Some(dir) => janitor.with_error_log_dir(dir),
      None => janitor,
    }
  }

  /// Every path generated for `host`.
  pub fn host_dirs(&self, host: &HostId) -> Vec<PathBuf> {
    let mut paths = vec![
      self.viewer_dir.join(host.as_str()),
      self.viewer_dir.join(STAGING_DIR).join(host.as_str()),
      self.artifact_dir.join(host.as_str()),
    ];
    if let Some(dir) = &self.error_log_dir {
      paths.push(dir.join(format!("{}.{}", host, ERROR_LOG_EXTENSION)));
    }
    paths
  }

  /// Remove the generated directories of each host. Absent directories are
  /// fine; a failure is recorded for its host and cleanup goes on.
  pub fn clean(&self, hosts: &[HostId]) -> Vec<(HostId, CleanupOutcome)> {
    let mut outcomes = Vec::with_capacity(hosts.len());

    for host in hosts {
      let mut outcome = CleanupOutcome::default();
      for dir in self.host_dirs(host) {
        let size = dir_size(&dir);
        match remove_dir(&dir) {
          Ok(true) => {
            debug!(host = %host, path = %dir.display(), "removed generated directory");
            outcome.bytes_freed += size;
            outcome.removed.push(dir);
          }
          Ok(false) => {}
          Err(e) => {
            warn!(host = %host, path = %dir.display(), error = %e, "failed to remove generated directory");
            outcome.failures.push(JanitorFailure {
              host: host.clone(),
              path: dir,
              message: e.to_string(),
            });
          }
        }
      }

      info!(
        host = %host,
        removed = outcome.removed.len(),
        bytes_freed = outcome.bytes_freed,
        failures = outcome.failures.len(),
        "cleaned up deleted host"
      );
      outcomes.push((host.clone(), outcome));
    }

    outcomes
  }
}

/// Returns whether something was removed.
fn remove_dir(path: &Path) -> io::Result<bool> {
  match std::fs::symlink_metadata(path) {
    Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path).map(|_| true),
    Ok(_) => std::fs::remove_file(path).map(|_| true),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
    Err(e) => Err(e),
  }
}

fn dir_size(path: &Path) -> u64 {
  WalkDir::new(path)
    .into_iter()
    .filter_map(|e| e.ok())
    .filter(|e| e.file_type().is_file())
    .filter_map(|e| e.metadata().ok())
    .map(|m| m.len())
    .sum()
}
