use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::layout::HostId;
use crate::util::hash::ContentHash;
use crate::util::process::{CommandError, truncate_tail};

/// A built package of one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
  pub host: HostId,
  pub path: PathBuf,
  pub checksum: ContentHash,
  pub size: u64,
}

/// Step of the build a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStage {
  /// Writing the source directory and descriptor.
  Prepare,
  /// Running the packaging tool.
  Package,
  /// Hashing the produced package.
  Checksum,
  /// Copying the package into the artifact directory.
  Collect,
}

impl fmt::Display for BuildStage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      BuildStage::Prepare => "prepare",
      BuildStage::Package => "package",
      BuildStage::Checksum => "checksum",
      BuildStage::Collect => "collect",
    };
    f.write_str(s)
  }
}

/// Host-scoped build failure. `message` is truncated to its tail; the full
/// text stays in `output` for the host's error log.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("build of {host} failed in {stage} stage: {message}")]
pub struct BuildFailure {
  pub host: HostId,
  pub stage: BuildStage,
  pub message: String,
  #[serde(skip)]
  pub output: String,
}

impl BuildFailure {
  pub fn new(host: &HostId, stage: BuildStage, message: impl AsRef<str>) -> Self {
    let output = message.as_ref().trim();
    Self {
      host: host.clone(),
      stage,
      message: truncate_tail(output),
      output: output.to_string(),
    }
  }
}

/// Failure reported by a packaging tool, with its captured output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct PackagingError {
  pub message: String,
}

impl PackagingError {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
    }
  }
}

impl From<CommandError> for PackagingError {
  fn from(e: CommandError) -> Self {
    match &e {
      CommandError::CommandFailed { .. } if !e.output().is_empty() => Self::new(e.output()),
      _ => Self::new(e.to_string()),
    }
  }
}
