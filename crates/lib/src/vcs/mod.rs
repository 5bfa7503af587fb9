//! Version control collaborator.

mod svn;

use std::future::Future;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::layout::HostId;
use crate::revision::{RevisionChangeSet, RevisionId};
use crate::util::process::CommandError;

pub use svn::SvnClient;

#[derive(Debug, Error)]
pub enum VcsError {
  #[error(transparent)]
  Command(#[from] CommandError),

  #[error("unexpected output of {operation}: {message}")]
  Parse { operation: &'static str, message: String },

  #[error("i/o error: {0}")]
  Io(#[from] std::io::Error),
}

/// Read access to the configuration repository.
///
/// Shared by every worker task, so implementations must be `Send + Sync`.
pub trait VersionControl: Send + Sync {
  /// Changed paths of `revision`, in reported order.
  fn list_changes(&self, revision: RevisionId) -> impl Future<Output = Result<RevisionChangeSet, VcsError>> + Send;

  /// Host directories present below `host_root` at `revision`.
  fn list_hosts(
    &self,
    revision: RevisionId,
    host_root: &str,
  ) -> impl Future<Output = Result<Vec<HostId>, VcsError>> + Send;

  /// Export `path` at `revision` into `target`.
  ///
  /// Returns `None` when the path does not exist at that revision.
  fn export(
    &self,
    revision: RevisionId,
    path: &str,
    target: &Path,
  ) -> impl Future<Output = Result<Option<PathBuf>, VcsError>> + Send;
}
