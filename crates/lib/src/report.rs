//! Per-host outcomes of a run and the overall verdict.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use crate::build::{Artifact, BuildStage};
use crate::execute::{HostError, JobResult};
use crate::janitor::CleanupOutcome;
use crate::layout::HostId;
use crate::resolve::ResolutionWarning;
use crate::revision::RevisionId;
use crate::upload::ChunkOutcome;
use crate::util::hash::ContentHash;

/// Final state of one attempted host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum HostOutcome {
  Succeeded {
    files: usize,
    tree_digest: ContentHash,
    artifact: Option<Artifact>,
  },
  ConfigError {
    message: String,
    /// Location of the full error output, when error logs are configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    error_log: Option<String>,
  },
  BuildError {
    stage: Option<BuildStage>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_log: Option<String>,
  },
  UploadError {
    chunk: usize,
    message: String,
  },
}

impl HostOutcome {
  pub fn is_success(&self) -> bool {
    matches!(self, HostOutcome::Succeeded { .. })
  }

  pub fn label(&self) -> &'static str {
    match self {
      HostOutcome::Succeeded { .. } => "succeeded",
      HostOutcome::ConfigError { .. } => "config-error",
      HostOutcome::BuildError { .. } => "build-error",
      HostOutcome::UploadError { .. } => "upload-error",
    }
  }

  fn from_error(error: &HostError) -> Self {
    match error {
      HostError::Build(failure) => HostOutcome::BuildError {
        stage: Some(failure.stage),
        message: failure.message.clone(),
        error_log: None,
      },
      e if e.is_build_error() => HostOutcome::BuildError {
        stage: None,
        message: e.to_string(),
        error_log: None,
      },
      e => HostOutcome::ConfigError {
        message: e.to_string(),
        error_log: None,
      },
    }
  }

  /// Location of the host's error log, if one was written.
  pub fn error_log(&self) -> Option<&str> {
    match self {
      HostOutcome::ConfigError { error_log, .. } | HostOutcome::BuildError { error_log, .. } => error_log.as_deref(),
      _ => None,
    }
  }
}

/// Counts per outcome category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
  pub succeeded: usize,
  pub config_errors: usize,
  pub build_errors: usize,
  pub upload_errors: usize,
  pub cleaned: usize,
  pub cleanup_failures: usize,
}

impl ReportSummary {
  pub fn failed(&self) -> usize {
    self.config_errors + self.build_errors + self.upload_errors
  }
}

/// Everything a run did, ordered by host id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildReport {
  pub revision: RevisionId,
  pub viewer_only: bool,
  pub hosts: BTreeMap<HostId, HostOutcome>,
  pub cleaned: BTreeMap<HostId, CleanupOutcome>,
  pub uploads: Vec<ChunkOutcome>,
  pub warnings: Vec<ResolutionWarning>,
  pub elapsed_ms: u64,
}

impl BuildReport {
  pub fn new(revision: RevisionId, viewer_only: bool) -> Self {
    Self {
      revision,
      viewer_only,
      hosts: BTreeMap::new(),
      cleaned: BTreeMap::new(),
      uploads: Vec::new(),
      warnings: Vec::new(),
      elapsed_ms: 0,
    }
  }

  /// Record terminal jobs and return the built artifacts by host.
  pub fn record_jobs(&mut self, results: Vec<JobResult>) -> BTreeMap<HostId, Artifact> {
    let mut artifacts = BTreeMap::new();
    for result in results {
      let host = result.host().clone();
      let outcome = match result.outcome {
        Ok(output) => {
          if let Some(artifact) = &output.artifact {
            artifacts.insert(host.clone(), artifact.clone());
          }
          HostOutcome::Succeeded {
            files: output.files,
            tree_digest: output.tree_digest,
            artifact: output.artifact,
          }
        }
        Err(e) => HostOutcome::from_error(&e),
      };
      self.hosts.insert(host, outcome);
    }
    artifacts
  }

  /// Point failed hosts at their error logs.
  pub fn record_error_logs(&mut self, locations: BTreeMap<HostId, String>) {
    for (host, location) in locations {
      if let Some(HostOutcome::ConfigError { error_log, .. } | HostOutcome::BuildError { error_log, .. }) =
        self.hosts.get_mut(&host)
      {
        *error_log = Some(location);
      }
    }
  }

  /// Turn hosts of failed chunks into upload errors.
  pub fn record_uploads(&mut self, outcomes: Vec<ChunkOutcome>) {
    for chunk in &outcomes {
      let Some(failure) = &chunk.failure else {
        continue;
      };
      for host in &chunk.hosts {
        self.hosts.insert(
          host.clone(),
          HostOutcome::UploadError {
            chunk: chunk.index,
            message: failure.message.clone(),
          },
        );
      }
    }
    self.uploads = outcomes;
  }

  pub fn record_cleanup(&mut self, outcomes: Vec<(HostId, CleanupOutcome)>) {
    self.cleaned.extend(outcomes);
  }

  pub fn set_elapsed(&mut self, elapsed: Duration) {
    self.elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
  }

  /// True when every attempted host succeeded. Cleanup failures do not count.
  pub fn is_success(&self) -> bool {
    self.hosts.values().all(HostOutcome::is_success)
  }

  pub fn summary(&self) -> ReportSummary {
    let mut summary = ReportSummary::default();
    for outcome in self.hosts.values() {
      match outcome {
        HostOutcome::Succeeded { .. } => summary.succeeded += 1,
        HostOutcome::ConfigError { .. } => summary.config_errors += 1,
        HostOutcome::BuildError { .. } => summary.build_errors += 1,
        HostOutcome::UploadError { .. } => summary.upload_errors += 1,
      }
    }
    for outcome in self.cleaned.values() {
      if outcome.is_success() {
        summary.cleaned += 1;
      } else {
        summary.cleanup_failures += 1;
      }
    }
    summary
  }

  pub fn to_json(&self) -> serde_json::Result<String> {
    serde_json::to_string_pretty(self)
  }
}
