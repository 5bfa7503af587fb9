//! Error logs of failed hosts.
//!
//! With `error_log_dir` configured, the full error output of every failed
//! host is written to `<error_log_dir>/<host>.txt`. The report then points at
//! the file, or at `<error_log_url>/<host>.txt` when a URL is configured.

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::config::Config;
use crate::consts::ERROR_LOG_EXTENSION;
use crate::execute::JobResult;
use crate::layout::HostId;
use crate::revision::RevisionId;

#[derive(Debug, Clone)]
pub struct ErrorLog {
  dir: PathBuf,
  url: Option<String>,
}

impl ErrorLog {
  pub fn new(dir: impl Into<PathBuf>, url: Option<String>) -> Self {
    Self { dir: dir.into(), url }
  }

  /// `None` when no error log directory is configured.
  pub fn from_config(config: &Config) -> Option<Self> {
    let dir = config.error_log_dir()?;
    Some(Self::new(dir, config.error_log_url().map(str::to_string)))
  }

  fn file_name(host: &HostId) -> String {
    format!("{}.{}", host, ERROR_LOG_EXTENSION)
  }

  pub fn path_of(&self, host: &HostId) -> PathBuf {
    self.dir.join(Self::file_name(host))
  }

  /// Where a reader finds the log of `host`.
  pub fn location_of(&self, host: &HostId) -> String {
    match &self.url {
      Some(url) => format!("{}/{}", url, Self::file_name(host)),
      None => self.path_of(host).display().to_string(),
    }
  }

  /// Write the log of one failed host and return its location.
  pub async fn write(&self, host: &HostId, revision: RevisionId, detail: &str) -> io::Result<String> {
    tokio::fs::create_dir_all(&self.dir).await?;
    let content = format!("host: {}\nrevision: {}\n\n{}\n", host, revision, detail.trim_end());
    tokio::fs::write(self.path_of(host), content).await?;
    Ok(self.location_of(host))
  }

  /// Write the logs of every failed job. A host whose log cannot be written
  /// is left out of the result.
  pub async fn record(&self, revision: RevisionId, results: &[JobResult]) -> BTreeMap<HostId, String> {
    let mut locations = BTreeMap::new();
    for result in results {
      let Err(error) = &result.outcome else {
        continue;
      };
      match self.write(result.host(), revision, &error.detail()).await {
        Ok(location) => {
          debug!(host = %result.host(), location = %location, "wrote error log");
          locations.insert(result.host().clone(), location);
        }
        Err(e) => warn!(host = %result.host(), error = %e, "failed to write error log"),
      }
    }
    locations
  }
}
