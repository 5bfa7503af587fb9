//! The per-host pipeline run by each worker.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::spawn_blocking;
use tracing::{debug, info};

use super::panic_message;
use super::types::{BuildJob, HostError, JobOutput};
use crate::build::{ArtifactBuilder, Packager};
use crate::config::Config;
use crate::consts::STAGING_DIR;
use crate::layout::{HostId, Layout};
use crate::merge::{ConfigMerger, ConfigTree, Segment};
use crate::revision::RevisionId;
use crate::util::hash::{ContentHash, hash_directory};
use crate::vcs::VersionControl;

/// Everything a worker needs to take one host from segments to package.
///
/// Read-only once built; every job writes below its own host directory only.
pub struct HostPipeline<V, P> {
  vcs: Arc<V>,
  builder: Option<ArtifactBuilder<P>>,
  layout: Layout,
  merger: ConfigMerger,
  revision: RevisionId,
  work_dir: PathBuf,
  viewer_dir: PathBuf,
  allow_unknown_hosts: bool,
}

impl<V: VersionControl, P: Packager> HostPipeline<V, P> {
  /// `builder` is `None` in config-viewer-only mode.
  pub fn new(
    config: &Config,
    layout: Layout,
    vcs: Arc<V>,
    builder: Option<ArtifactBuilder<P>>,
    revision: RevisionId,
    work_dir: PathBuf,
  ) -> Self {
    Self {
      vcs,
      builder,
      layout,
      merger: ConfigMerger::new(config.max_file_size),
      revision,
      work_dir,
      viewer_dir: config.config_viewer_hosts_dir.clone(),
      allow_unknown_hosts: config.allow_unknown_hosts,
    }
  }

  /// Export, merge, check, materialize and (unless viewer-only) build.
  pub async fn run(&self, job: &mut BuildJob) -> Result<JobOutput, HostError> {
    let host = job.host().clone();
    if !host.known && !self.allow_unknown_hosts {
      return Err(HostError::UnknownHost(host.id));
    }

    let host_work = self.work_dir.join(host.id.as_str());
    remove_if_present(&host_work)
      .await
      .map_err(|e| HostError::io(&host_work, e))?;
    tokio::fs::create_dir_all(&host_work)
      .await
      .map_err(|e| HostError::io(&host_work, e))?;

    let mut segments = Vec::with_capacity(host.segments.len());
    for segment in &host.segments {
      let target = host_work.join("segments").join(segment.work_dir_name());
      let repo_path = self.layout.segment_path(segment);
      let exported = self
        .vcs
        .export(self.revision, &repo_path, &target)
        .await
        .map_err(|source| HostError::Export {
          segment: segment.clone(),
          source,
        })?;

      let loaded = match exported {
        Some(dir) => {
          let id = segment.clone();
          spawn_blocking(move || Segment::load(id, &dir))
            .await
            .map_err(|e| HostError::Panicked(panic_message(e)))??
        }
        None => {
          debug!(host = %host.id, segment = %segment, "segment does not exist at revision");
          Segment::new(segment.clone())
        }
      };
      segments.push(loaded);
    }

    let tree = self.merger.merge(&segments)?;
    self.merger.check_size(&tree)?;
    let tree_digest = tree.digest();
    let files = tree.len();
    debug!(host = %host.id, files, digest = %tree_digest, "merged configuration");

    let viewer_dir = self.viewer_dir.clone();
    let id = host.id.clone();
    let digest = tree_digest.clone();
    let (tree, materialized) = spawn_blocking(move || {
      let result = materialize(&tree, &digest, &viewer_dir, &id);
      (tree, result)
    })
    .await
    .map_err(|e| HostError::Panicked(panic_message(e)))?;
    let viewer_path = materialized?;

    let built = match &self.builder {
      Some(builder) => Some(builder.build(&host.id, self.revision, &tree, &host_work).await),
      None => None,
    };
    job.attach_tree(tree);
    let artifact = built.transpose()?;

    info!(host = %host.id, files, packaged = artifact.is_some(), "host done");
    Ok(JobOutput {
      viewer_path,
      tree_digest,
      files,
      artifact,
    })
  }
}

/// Write the tree into the staging area, check it, then swap it in.
///
/// Only `<viewer_dir>/<host>` and the host's staging directory are touched.
fn materialize(tree: &ConfigTree, digest: &ContentHash, viewer_dir: &Path, host: &HostId) -> Result<PathBuf, HostError> {
  let target = viewer_dir.join(host.as_str());
  let staging = viewer_dir.join(STAGING_DIR).join(host.as_str());

  remove_dir(&staging).map_err(|e| HostError::io(&staging, e))?;
  tree.write_to(&staging).map_err(|e| HostError::io(&staging, e))?;

  let written = hash_directory(&staging).map_err(|e| HostError::Materialize {
    path: staging.clone(),
    message: e.to_string(),
  })?;
  if &written != digest {
    return Err(HostError::Materialize {
      path: staging,
      message: format!("written tree has digest {}, expected {}", written, digest),
    });
  }

  remove_dir(&target).map_err(|e| HostError::io(&target, e))?;
  std::fs::rename(&staging, &target).map_err(|e| HostError::io(&target, e))?;
  Ok(target)
}

fn remove_dir(path: &Path) -> io::Result<()> {
  match std::fs::remove_dir_all(path) {
    Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
    _ => Ok(()),
  }
}

async fn remove_if_present(path: &Path) -> io::Result<()> {
  match tokio::fs::remove_dir_all(path).await {
    Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
    _ => Ok(()),
  }
}
