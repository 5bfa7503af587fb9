//! Subversion adapter driving the `svn` command-line client.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{VcsError, VersionControl};
use crate::layout::HostId;
use crate::revision::{ChangeEntry, ChangeType, RevisionChangeSet, RevisionId};
use crate::util::process::{CommandError, run_command};

/// Error codes svn reports for a path that does not exist at a revision.
const MISSING_PATH_CODES: [&str; 3] = ["E170000", "E160013", "E200009"];

#[derive(Debug, Clone)]
pub struct SvnClient {
  url: String,
  program: String,
}

impl SvnClient {
  /// Client for the repository at `url` (`file://`, `svn://`, `https://`).
  pub fn new(url: impl Into<String>) -> Self {
    Self::with_program(url, "svn")
  }

  pub fn with_program(url: impl Into<String>, program: impl Into<String>) -> Self {
    let url: String = url.into();
    Self {
      url: url.trim_end_matches('/').to_string(),
      program: program.into(),
    }
  }

  /// Repository URL of `path`, pinned to `revision`.
  fn pinned_url(&self, path: &str, revision: RevisionId) -> String {
    format!("{}/{}@{}", self.url, path.trim_start_matches('/'), revision)
  }
}

impl VersionControl for SvnClient {
  async fn list_changes(&self, revision: RevisionId) -> Result<RevisionChangeSet, VcsError> {
    let rev = revision.to_string();
    let output = run_command(
      &self.program,
      ["log", "--verbose", "--quiet", "--non-interactive", "-r", rev.as_str(), self.url.as_str()],
      None,
    )
    .await?;
    parse_log(revision, &output.stdout)
  }

  async fn list_hosts(&self, revision: RevisionId, host_root: &str) -> Result<Vec<HostId>, VcsError> {
    let rev = revision.to_string();
    let url = self.pinned_url(host_root, revision);
    match run_command(&self.program, ["list", "--non-interactive", "-r", rev.as_str(), url.as_str()], None).await {
      Ok(output) => Ok(parse_host_list(&output.stdout)),
      Err(CommandError::CommandFailed { ref stderr, .. }) if is_missing_path(stderr) => {
        debug!(host_root, revision = %revision, "host directory does not exist at revision");
        Ok(Vec::new())
      }
      Err(e) => Err(e.into()),
    }
  }

  async fn export(&self, revision: RevisionId, path: &str, target: &Path) -> Result<Option<PathBuf>, VcsError> {
    if let Some(parent) = target.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }

    let rev = revision.to_string();
    let url = self.pinned_url(path, revision);
    let target_arg = target.as_os_str().to_owned();
    let args: [OsString; 8] = [
      "export".into(),
      "--force".into(),
      "--quiet".into(),
      "--non-interactive".into(),
      "-r".into(),
      rev.into(),
      url.into(),
      target_arg,
    ];

    match run_command(&self.program, &args, None).await {
      Ok(_) => Ok(Some(target.to_path_buf())),
      Err(CommandError::CommandFailed { ref stderr, .. }) if is_missing_path(stderr) => {
        debug!(path, revision = %revision, "path does not exist at revision");
        Ok(None)
      }
      Err(e) => Err(e.into()),
    }
  }
}

fn is_missing_path(stderr: &str) -> bool {
  MISSING_PATH_CODES.iter().any(|code| stderr.contains(code))
}

/// Parse `svn log --verbose --quiet` output of a single revision.
pub(crate) fn parse_log(revision: RevisionId, output: &str) -> Result<RevisionChangeSet, VcsError> {
  let mut seen_revision = false;
  let mut in_paths = false;
  let mut changes = Vec::new();

  for line in output.lines() {
    if line.starts_with("----") {
      in_paths = false;
      continue;
    }
    if let Some(header) = line.strip_prefix('r')
      && let Some((id, _)) = header.split_once(" |")
    {
      let reported: RevisionId = id.parse().map_err(|_| VcsError::Parse {
        operation: "svn log",
        message: format!("bad revision line \"{}\"", line),
      })?;
      if reported != revision {
        return Err(VcsError::Parse {
          operation: "svn log",
          message: format!("asked for revision {} but got {}", revision, reported),
        });
      }
      seen_revision = true;
      continue;
    }
    if line.trim() == "Changed paths:" {
      in_paths = true;
      continue;
    }
    if !in_paths || line.trim().is_empty() {
      continue;
    }

    let trimmed = line.trim_start();
    let mut chars = trimmed.chars();
    let action = chars.next().and_then(ChangeType::from_action);
    let rest = chars.as_str();
    let (Some(change), Some(path)) = (action, rest.strip_prefix(' ')) else {
      return Err(VcsError::Parse {
        operation: "svn log",
        message: format!("bad changed path line \"{}\"", line),
      });
    };
    changes.push(ChangeEntry::new(strip_copy_source(path), change));
  }

  if !seen_revision {
    return Err(VcsError::Parse {
      operation: "svn log",
      message: format!("no log entry for revision {}", revision),
    });
  }

  Ok(RevisionChangeSet::new(revision, changes))
}

/// Drop the ` (from /old/path:12)` suffix of a copied path.
fn strip_copy_source(path: &str) -> &str {
  match path.rfind(" (from ") {
    Some(idx) if path.ends_with(')') => &path[..idx],
    _ => path,
  }
}

/// Host names from `svn list` output; only directories count.
pub(crate) fn parse_host_list(output: &str) -> Vec<HostId> {
  let mut hosts = Vec::new();
  for line in output.lines() {
    let Some(name) = line.trim().strip_suffix('/') else {
      continue;
    };
    match HostId::new(name) {
      Ok(host) => hosts.push(host),
      Err(e) => warn!(error = %e, "ignoring host directory"),
    }
  }
  hosts
}
