//! `rpmbuild` packaging adapter.

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use super::{Descriptor, Packager, PackagingError};
use crate::util::process::run_command;

#[derive(Debug, Clone)]
pub struct RpmBuild {
  program: String,
}

impl Default for RpmBuild {
  fn default() -> Self {
    Self {
      program: "rpmbuild".to_string(),
    }
  }
}

impl RpmBuild {
  pub fn with_program(program: impl Into<String>) -> Self {
    Self {
      program: program.into(),
    }
  }
}

impl Packager for RpmBuild {
  async fn build(&self, source_dir: &Path, descriptor: &Descriptor) -> Result<PathBuf, PackagingError> {
    let topdir = source_dir.join("rpmbuild");
    let spec = source_dir.join(descriptor.spec_file_name());

    let args = [
      "-bb".to_string(),
      "--define".to_string(),
      format!("_topdir {}", topdir.display()),
      "--define".to_string(),
      format!("_sourcedir {}", source_dir.display()),
      spec.display().to_string(),
    ];
    run_command(&self.program, &args, Some(source_dir)).await?;

    let rpm = find_package(&topdir.join("RPMS"))
      .ok_or_else(|| PackagingError::new(format!("{} produced no package below {}", self.program, topdir.display())))?;
    debug!(package = %descriptor.name, path = %rpm.display(), "rpmbuild finished");
    Ok(rpm)
  }
}

/// First `.rpm` below `dir`, in file name order.
fn find_package(dir: &Path) -> Option<PathBuf> {
  WalkDir::new(dir)
    .sort_by_file_name()
    .into_iter()
    .filter_map(|e| e.ok())
    .find(|e| e.file_type().is_file() && e.path().extension().is_some_and(|ext| ext == "rpm"))
    .map(|e| e.into_path())
}
