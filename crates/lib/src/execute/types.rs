//! Build jobs, their outcomes and host-scoped errors.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::build::{Artifact, BuildFailure};
use crate::layout::{Host, HostId, SegmentId};
use crate::merge::{ConfigTooLarge, ConfigTree, MergeError};
use crate::util::hash::ContentHash;
use crate::vcs::VcsError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
  Pending,
  Running,
  Succeeded,
  Failed,
}

impl JobStatus {
  pub fn is_terminal(self) -> bool {
    matches!(self, JobStatus::Succeeded | JobStatus::Failed)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("job of {host} cannot move from {from:?} to {to:?}")]
pub struct TransitionError {
  pub host: HostId,
  pub from: JobStatus,
  pub to: JobStatus,
}

/// One host's way through the pipeline: pending, running, then exactly one
/// of succeeded or failed.
#[derive(Debug, Clone)]
pub struct BuildJob {
  host: Host,
  tree: Option<ConfigTree>,
  status: JobStatus,
  error: Option<String>,
}

impl BuildJob {
  pub fn new(host: Host) -> Self {
    Self {
      host,
      tree: None,
      status: JobStatus::Pending,
      error: None,
    }
  }

  pub fn host(&self) -> &Host {
    &self.host
  }

  pub fn status(&self) -> JobStatus {
    self.status
  }

  pub fn error(&self) -> Option<&str> {
    self.error.as_deref()
  }

  /// Merged tree, once the merge step has run.
  pub fn tree(&self) -> Option<&ConfigTree> {
    self.tree.as_ref()
  }

  pub(crate) fn attach_tree(&mut self, tree: ConfigTree) {
    self.tree = Some(tree);
  }

  pub fn start(&mut self) -> Result<(), TransitionError> {
    self.transition(JobStatus::Pending, JobStatus::Running)
  }

  /// Move a running job to its terminal state; `error` decides which one.
  pub fn finish(&mut self, error: Option<String>) -> Result<(), TransitionError> {
    let to = if error.is_some() {
      JobStatus::Failed
    } else {
      JobStatus::Succeeded
    };
    self.transition(JobStatus::Running, to)?;
    self.error = error;
    Ok(())
  }

  fn transition(&mut self, expected: JobStatus, to: JobStatus) -> Result<(), TransitionError> {
    if self.status != expected {
      return Err(TransitionError {
        host: self.host.id.clone(),
        from: self.status,
        to,
      });
    }
    self.status = to;
    Ok(())
  }
}

/// Failure of one host's pipeline. Never affects other hosts.
#[derive(Debug, Error)]
pub enum HostError {
  #[error("host {0} does not match the host naming pattern and unknown hosts are not allowed")]
  UnknownHost(HostId),

  #[error("failed to export segment {segment}: {source}")]
  Export {
    segment: SegmentId,
    #[source]
    source: VcsError,
  },

  #[error(transparent)]
  ConfigMerge(#[from] MergeError),

  #[error(transparent)]
  ConfigTooLarge(#[from] ConfigTooLarge),

  #[error(transparent)]
  Build(#[from] BuildFailure),

  #[error("i/o error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("materialized tree at {path} is not the merged tree: {message}")]
  Materialize { path: PathBuf, message: String },

  #[error("job panicked: {0}")]
  Panicked(String),
}

impl HostError {
  /// Build errors come from packaging; everything else means the host's
  /// configuration could not be produced.
  pub fn is_build_error(&self) -> bool {
    matches!(self, HostError::Build(_) | HostError::Panicked(_))
  }

  /// Untruncated description, as written to the host's error log.
  pub fn detail(&self) -> String {
    match self {
      HostError::Build(failure) => format!("build failed in {} stage:\n{}", failure.stage, failure.output),
      e => e.to_string(),
    }
  }

  pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    HostError::Io {
      path: path.into(),
      source,
    }
  }
}

/// What a successful job produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutput {
  /// Materialized merged tree.
  pub viewer_path: PathBuf,
  pub tree_digest: ContentHash,
  pub files: usize,
  /// `None` in config-viewer-only mode.
  pub artifact: Option<Artifact>,
}

/// Terminal job together with its outcome.
#[derive(Debug)]
pub struct JobResult {
  pub job: BuildJob,
  pub outcome: Result<JobOutput, HostError>,
}

impl JobResult {
  pub fn host(&self) -> &HostId {
    &self.job.host().id
  }
}
