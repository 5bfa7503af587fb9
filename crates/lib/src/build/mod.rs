//! Turning a merged tree into a package.
//!
//! The [`ArtifactBuilder`] writes the tree and a rendered descriptor into a
//! host-scoped source directory, hands both to a [`Packager`] and copies the
//! result into `<artifact_dir>/<host>/`, replacing whatever was cached there.

pub mod descriptor;
mod rpm;
mod types;

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::Config;
use crate::layout::HostId;
use crate::merge::ConfigTree;
use crate::revision::RevisionId;
use crate::util::hash::hash_file;

pub use descriptor::{DEFAULT_SPEC_TEMPLATE, Descriptor, FILES_DIR, FileEntry, load_template};
pub use rpm::RpmBuild;
pub use types::{Artifact, BuildFailure, BuildStage, PackagingError};

/// Packaging collaborator.
///
/// `source_dir` holds the merged files below [`FILES_DIR`] and the rendered
/// descriptor as `<name>.spec`. Returns the path of the built package.
pub trait Packager: Send + Sync {
  fn build(
    &self,
    source_dir: &Path,
    descriptor: &Descriptor,
  ) -> impl Future<Output = Result<PathBuf, PackagingError>> + Send;
}

pub struct ArtifactBuilder<P> {
  packager: Arc<P>,
  prefix: String,
  template: Arc<str>,
  artifact_dir: PathBuf,
}

impl<P: Packager> ArtifactBuilder<P> {
  pub fn new(packager: Arc<P>, config: &Config, template: Arc<str>) -> Self {
    Self {
      packager,
      prefix: config.config_rpm_prefix.clone(),
      template,
      artifact_dir: config.artifact_dir.clone(),
    }
  }

  /// Build the package of `host` inside its own `work_dir`.
  pub async fn build(
    &self,
    host: &HostId,
    revision: RevisionId,
    tree: &ConfigTree,
    work_dir: &Path,
  ) -> Result<Artifact, BuildFailure> {
    let descriptor = Descriptor::for_tree(&self.prefix, host, revision, tree);
    let source_dir = work_dir.join("source");

    self
      .prepare(&source_dir, &descriptor, tree)
      .await
      .map_err(|e| BuildFailure::new(host, BuildStage::Prepare, e.to_string()))?;

    info!(host = %host, package = %descriptor.name, version = %revision, files = tree.len(), "building package");
    let built = self
      .packager
      .build(&source_dir, &descriptor)
      .await
      .map_err(|e| BuildFailure::new(host, BuildStage::Package, &e.message))?;

    let package = built.clone();
    let checksum = tokio::task::spawn_blocking(move || hash_file(&package))
      .await
      .map_err(|e| BuildFailure::new(host, BuildStage::Checksum, e.to_string()))?
      .map_err(|e| BuildFailure::new(host, BuildStage::Checksum, e.to_string()))?;

    let path = self
      .collect(host, &built)
      .await
      .map_err(|e| BuildFailure::new(host, BuildStage::Collect, e.to_string()))?;
    let size = tokio::fs::metadata(&path)
      .await
      .map_err(|e| BuildFailure::new(host, BuildStage::Collect, e.to_string()))?
      .len();

    debug!(host = %host, path = %path.display(), checksum = %checksum, size, "package stored");
    Ok(Artifact {
      host: host.clone(),
      path,
      checksum,
      size,
    })
  }

  /// Write the merged files and the rendered descriptor into `source_dir`.
  async fn prepare(&self, source_dir: &Path, descriptor: &Descriptor, tree: &ConfigTree) -> io::Result<()> {
    match tokio::fs::remove_dir_all(source_dir).await {
      Ok(()) => {}
      Err(e) if e.kind() == io::ErrorKind::NotFound => {}
      Err(e) => return Err(e),
    }

    let files_dir = source_dir.join(FILES_DIR);
    tokio::fs::create_dir_all(&files_dir).await?;
    for (path, entry) in tree.iter() {
      let target = files_dir.join(path);
      if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
      }
      tokio::fs::write(&target, &entry.content).await?;
    }

    tokio::fs::write(
      source_dir.join(descriptor.spec_file_name()),
      descriptor.render(&self.template),
    )
    .await
  }

  /// Replace the cached package of `host` with `built`.
  async fn collect(&self, host: &HostId, built: &Path) -> io::Result<PathBuf> {
    let host_dir = self.artifact_dir.join(host.as_str());
    match tokio::fs::remove_dir_all(&host_dir).await {
      Ok(()) => {}
      Err(e) if e.kind() == io::ErrorKind::NotFound => {}
      Err(e) => return Err(e),
    }
    tokio::fs::create_dir_all(&host_dir).await?;

    let file_name = built
      .file_name()
      .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "package path has no file name"))?;
    let target = host_dir.join(file_name);
    tokio::fs::copy(built, &target).await?;
    Ok(target)
  }
}
