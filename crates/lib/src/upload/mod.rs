//! Chunked, strictly sequential upload of built artifacts.

use std::ffi::OsString;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

use crate::build::Artifact;
use crate::layout::HostId;
use crate::util::process::{run_command, truncate_tail};

/// Artifacts uploaded by one invocation of the upload collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadBatch {
  pub index: usize,
  pub artifacts: Vec<Artifact>,
}

impl UploadBatch {
  pub fn paths(&self) -> Vec<PathBuf> {
    self.artifacts.iter().map(|a| a.path.clone()).collect()
  }

  pub fn hosts(&self) -> Vec<HostId> {
    self.artifacts.iter().map(|a| a.host.clone()).collect()
  }
}

/// Rejection reported by the upload collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct UploadError(pub String);

/// A whole chunk failed to upload.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("upload of chunk {chunk} ({} artifacts) failed: {message}", .artifacts.len())]
pub struct UploadFailure {
  pub chunk: usize,
  pub artifacts: Vec<PathBuf>,
  pub message: String,
}

/// Upload collaborator. Success or failure always covers the whole batch.
pub trait Uploader: Send + Sync {
  fn upload(&self, batch: &UploadBatch) -> impl Future<Output = Result<(), UploadError>> + Send;
}

/// Result of one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkOutcome {
  pub index: usize,
  pub hosts: Vec<HostId>,
  pub failure: Option<UploadFailure>,
}

impl ChunkOutcome {
  pub fn is_success(&self) -> bool {
    self.failure.is_none()
  }
}

/// Split artifacts into chunks of at most `chunk_size`, keeping their order.
///
/// A chunk size of 0 puts everything into one chunk.
pub fn chunk(artifacts: Vec<Artifact>, chunk_size: usize) -> Vec<UploadBatch> {
  if artifacts.is_empty() {
    return Vec::new();
  }
  let size = if chunk_size == 0 { artifacts.len() } else { chunk_size };
  artifacts
    .chunks(size)
    .enumerate()
    .map(|(index, chunk)| UploadBatch {
      index,
      artifacts: chunk.to_vec(),
    })
    .collect()
}

pub struct UploadDispatcher<U> {
  uploader: Arc<U>,
  chunk_size: usize,
}

impl<U: Uploader> UploadDispatcher<U> {
  pub fn new(uploader: Arc<U>, chunk_size: usize) -> Self {
    Self { uploader, chunk_size }
  }

  /// Upload chunk after chunk; a failed chunk does not stop the next one.
  pub async fn dispatch(&self, artifacts: Vec<Artifact>) -> Vec<ChunkOutcome> {
    let batches = chunk(artifacts, self.chunk_size);
    let total = batches.len();
    let mut outcomes = Vec::with_capacity(total);

    for batch in batches {
      info!(chunk = batch.index + 1, total, artifacts = batch.artifacts.len(), "uploading chunk");
      let failure = match self.uploader.upload(&batch).await {
        Ok(()) => None,
        Err(e) => {
          error!(chunk = batch.index + 1, total, error = %e, "chunk upload failed");
          Some(UploadFailure {
            chunk: batch.index,
            artifacts: batch.paths(),
            message: truncate_tail(&e.0),
          })
        }
      };
      outcomes.push(ChunkOutcome {
        index: batch.index,
        hosts: batch.hosts(),
        failure,
      });
    }

    outcomes
  }
}

/// Runs the configured upload command with the chunk's paths as arguments.
#[derive(Debug, Clone)]
pub struct CommandUploader {
  command: String,
}

impl CommandUploader {
  pub fn new(command: impl Into<String>) -> Self {
    Self {
      command: command.into(),
    }
  }
}

impl Uploader for CommandUploader {
  async fn upload(&self, batch: &UploadBatch) -> Result<(), UploadError> {
    // "$@" keeps every path a single argument, whatever it contains.
    let script = format!("{} \"$@\"", self.command);
    let mut args: Vec<OsString> = vec!["-c".into(), script.into(), "cfgrpm-upload".into()];
    args.extend(batch.artifacts.iter().map(|a| a.path.clone().into_os_string()));

    run_command("/bin/sh", &args, None)
      .await
      .map(|_| ())
      .map_err(|e| UploadError(e.to_string()))
  }
}
