//! Orchestration of one revision.
//!
//! 1. Check the output directories, load the spec template and create the
//!    work directory
//! 2. List the revision's changes and the hosts present at it
//! 3. Resolve affected and deleted hosts
//! 4. Clean up deleted hosts
//! 5. Merge, materialize and build every affected host in parallel
//! 6. Write error logs of failed hosts
//! 7. Upload built packages chunk by chunk
//!
//! Any failure in steps 1 and 2 aborts the run before a host directory is
//! touched. Everything after that is recorded per host in the [`BuildReport`].

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{info, warn};

use crate::build::{Artifact, ArtifactBuilder, Packager, load_template};
use crate::config::{Config, ConfigError};
use crate::error_log::ErrorLog;
use crate::execute::{BuildScheduler, HostPipeline, InvalidWorkerCount};
use crate::janitor::HostDirectoryJanitor;
use crate::layout::{Host, HostId, Inventory, Layout};
use crate::report::BuildReport;
use crate::resolve::HostResolver;
use crate::revision::{RevisionChangeSet, RevisionId};
use crate::upload::{UploadDispatcher, Uploader};
use crate::vcs::{VcsError, VersionControl};

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum RunError {
  #[error("cannot {operation} of revision {revision}: {source}")]
  Vcs {
    operation: &'static str,
    revision: RevisionId,
    #[source]
    source: VcsError,
  },

  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error("cannot start the worker pool: {0}")]
  WorkerPool(#[from] InvalidWorkerCount),

  #[error("cannot prepare work directory {path}: {source}")]
  WorkDir {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid host pattern: {0}")]
  Layout(#[from] regex::Error),

  #[error("cannot read spec template {path}: {source}")]
  Template {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("run interrupted")]
  Interrupted,
}

/// One configured run over the given collaborators.
pub struct Run<V, P, U> {
  config: Arc<Config>,
  vcs: Arc<V>,
  packager: Arc<P>,
  uploader: Option<Arc<U>>,
}

impl<V, P, U> Run<V, P, U>
where
  V: VersionControl + 'static,
  P: Packager + 'static,
  U: Uploader,
{
  /// `uploader` is `None` when no upload command is configured.
  pub fn new(config: Arc<Config>, vcs: Arc<V>, packager: Arc<P>, uploader: Option<Arc<U>>) -> Self {
    Self {
      config,
      vcs,
      packager,
      uploader,
    }
  }

  /// Like [`Run::execute`], but give up as soon as `interrupt` completes.
  ///
  /// Dropping the run aborts its tasks, which kills the tools they started.
  /// Chunks already uploaded stay uploaded.
  pub async fn execute_until<F>(&self, revision: RevisionId, work_dir: &Path, interrupt: F) -> Result<BuildReport, RunError>
  where
    F: Future<Output = ()>,
  {
    tokio::select! {
      result = self.execute(revision, work_dir) => result,
      () = interrupt => {
        warn!(revision = %revision, "run interrupted, aborting");
        Err(RunError::Interrupted)
      }
    }
  }

  pub async fn execute(&self, revision: RevisionId, work_dir: &Path) -> Result<BuildReport, RunError> {
    let started = Instant::now();
    let config = &self.config;
    let viewer_only = config.config_viewer_only;
    info!(revision = %revision, viewer_only, workers = config.thread_count, "starting run");

    let layout = Layout::from_config(config)?;
    let scheduler = BuildScheduler::new(config.thread_count)?;
    config.validate_output_dirs()?;

    let builder = if viewer_only {
      None
    } else {
      let template = load_template(config.path_to_spec_file.as_deref()).map_err(|source| RunError::Template {
        path: config.path_to_spec_file.clone().unwrap_or_default(),
        source,
      })?;
      Some(ArtifactBuilder::new(self.packager.clone(), config, template))
    };

    tokio::fs::create_dir_all(work_dir).await.map_err(|source| RunError::WorkDir {
      path: work_dir.to_path_buf(),
      source,
    })?;

    let changes = self
      .vcs
      .list_changes(revision)
      .await
      .map_err(|source| RunError::Vcs {
        operation: "list changes",
        revision,
        source,
      })?;
    let host_ids = self
      .vcs
      .list_hosts(revision, &layout.host_root_path())
      .await
      .map_err(|source| RunError::Vcs {
        operation: "list hosts",
        revision,
        source,
      })?;
    let previous_hosts = self.previous_hosts(&layout, &changes).await?;

    let inventory = Inventory::build(&layout, host_ids);
    let resolution = HostResolver::new(&layout, &inventory)
      .with_previous_hosts(&previous_hosts)
      .resolve(&changes);

    let mut report = BuildReport::new(revision, viewer_only);
    report.warnings = resolution.warnings.clone();

    if !resolution.deleted.is_empty() {
      let janitor = HostDirectoryJanitor::from_config(config);
      report.record_cleanup(janitor.clean(&resolution.deleted));
    }

    if resolution.build.is_empty() {
      info!(revision = %revision, "no hosts to build");
      report.set_elapsed(started.elapsed());
      return Ok(report);
    }

    let hosts: Vec<Host> = resolution
      .build
      .iter()
      .filter_map(|id| inventory.get(id).cloned())
      .collect();
    let pipeline = Arc::new(HostPipeline::new(
      config,
      layout,
      self.vcs.clone(),
      builder,
      revision,
      work_dir.to_path_buf(),
    ));

    let results = scheduler.run(pipeline, hosts).await;
    let error_logs = match ErrorLog::from_config(config) {
      Some(log) => log.record(revision, &results).await,
      None => Default::default(),
    };
    let mut built = report.record_jobs(results);
    report.record_error_logs(error_logs);

    if !viewer_only {
      let artifacts: Vec<Artifact> = resolution.build.iter().filter_map(|id| built.remove(id)).collect();
      match &self.uploader {
        Some(_) if artifacts.is_empty() => info!("nothing to upload"),
        Some(uploader) => {
          let dispatcher = UploadDispatcher::new(uploader.clone(), config.rpm_upload_chunk_size);
          report.record_uploads(dispatcher.dispatch(artifacts).await);
        }
        None => info!(artifacts = artifacts.len(), "no upload command configured, skipping upload"),
      }
    }

    report.set_elapsed(started.elapsed());
    let summary = report.summary();
    info!(
      revision = %revision,
      succeeded = summary.succeeded,
      failed = summary.failed(),
      cleaned = summary.cleaned,
      elapsed_ms = report.elapsed_ms,
      "run finished"
    );
    Ok(report)
  }

  /// Hosts present before `changes` when they delete the whole host directory.
  async fn previous_hosts(&self, layout: &Layout, changes: &RevisionChangeSet) -> Result<Vec<HostId>, RunError> {
    let host_root = layout.host_root_path();
    let Some(previous) = changes.revision.previous().filter(|_| changes.deletes(&host_root)) else {
      return Ok(Vec::new());
    };
    info!(revision = %changes.revision, "host directory deleted, listing hosts of the previous revision");
    self
      .vcs
      .list_hosts(previous, &host_root)
      .await
      .map_err(|source| RunError::Vcs {
        operation: "list previous hosts",
        revision: previous,
        source,
      })
  }
}
