//! In-memory collaborators and an isolated directory tree for pipeline tests.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use cfgrpm_lib::build::{Descriptor, Packager, PackagingError};
use cfgrpm_lib::config::Config;
use cfgrpm_lib::layout::HostId;
use cfgrpm_lib::report::BuildReport;
use cfgrpm_lib::revision::{ChangeEntry, ChangeType, RevisionChangeSet, RevisionId};
use cfgrpm_lib::run::Run;
use cfgrpm_lib::upload::{UploadBatch, UploadError, Uploader};
use cfgrpm_lib::vcs::{VcsError, VersionControl};

pub fn host(name: &str) -> HostId {
  HostId::new(name).unwrap()
}

pub fn hosts(names: &[&str]) -> Vec<HostId> {
  names.iter().map(|n| host(n)).collect()
}

pub fn revision() -> RevisionId {
  RevisionId::new(42)
}

/// Repository content at a single revision, keyed by repository path.
#[derive(Default)]
pub struct FakeRepo {
  files: BTreeMap<String, Vec<u8>>,
  changes: Vec<ChangeEntry>,
  previous_hosts: Vec<HostId>,
  fail_listing: bool,
  listings: Mutex<Vec<RevisionId>>,
  exports: Mutex<Vec<String>>,
}

impl FakeRepo {
  pub fn new() -> Self {
    Self::default()
  }

  /// Four hosts matching the naming pattern plus `web01`, which does not.
  pub fn standard() -> Self {
    let mut repo = Self::new()
      .file("/config/all/etc/motd", "global motd")
      .file("/config/all/etc/ntp.conf", "server ntp.example.com")
      .file("/config/loc/ber/etc/resolv.conf", "nameserver 10.1.0.1")
      .file("/config/loc/ham/etc/resolv.conf", "nameserver 10.2.0.1")
      .file("/config/bu/web/etc/httpd.conf", "Listen 80")
      .file("/config/host/web01/etc/motd", "web01 motd");
    for name in ["berdb01", "berweb01", "berweb02", "hamweb01", "web01"] {
      repo = repo.file(&format!("/config/host/{}/etc/hostname", name), name);
    }
    repo
  }

  pub fn file(mut self, path: &str, content: &str) -> Self {
    self.files.insert(path.to_string(), content.as_bytes().to_vec());
    self
  }

  pub fn change(mut self, path: &str, change: ChangeType) -> Self {
    self.changes.push(ChangeEntry::new(path, change));
    self
  }

  /// Hosts listed for any revision other than [`revision`].
  pub fn previous_hosts(mut self, names: &[&str]) -> Self {
    self.previous_hosts = hosts(names);
    self
  }

  pub fn failing_listing(mut self) -> Self {
    self.fail_listing = true;
    self
  }

  pub fn exported(&self) -> Vec<String> {
    self.exports.lock().unwrap().clone()
  }

  /// Revisions whose hosts were listed, in call order.
  pub fn listings(&self) -> Vec<RevisionId> {
    self.listings.lock().unwrap().clone()
  }
}

impl VersionControl for FakeRepo {
  async fn list_changes(&self, revision: RevisionId) -> Result<RevisionChangeSet, VcsError> {
    if self.fail_listing {
      return Err(VcsError::Parse {
        operation: "svn log",
        message: "connection refused".to_string(),
      });
    }
    Ok(RevisionChangeSet::new(revision, self.changes.clone()))
  }

  async fn list_hosts(&self, revision: RevisionId, host_root: &str) -> Result<Vec<HostId>, VcsError> {
    self.listings.lock().unwrap().push(revision);
    if revision != self::revision() {
      return Ok(self.previous_hosts.clone());
    }
    let prefix = format!("{}/", host_root);
    let names: BTreeSet<&str> = self
      .files
      .keys()
      .filter_map(|path| path.strip_prefix(prefix.as_str()))
      .filter_map(|rest| rest.split('/').next())
      .collect();
    Ok(names.into_iter().map(host).collect())
  }

  async fn export(&self, _revision: RevisionId, path: &str, target: &Path) -> Result<Option<PathBuf>, VcsError> {
    self.exports.lock().unwrap().push(path.to_string());

    let prefix = format!("{}/", path);
    let mut found = false;
    for (repo_path, content) in &self.files {
      let Some(relative) = repo_path.strip_prefix(prefix.as_str()) else {
        continue;
      };
      let dest = target.join(relative);
      if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
      }
      std::fs::write(&dest, content)?;
      found = true;
    }
    Ok(found.then(|| target.to_path_buf()))
  }
}

/// Writes the rendered spec as the "package" and tracks concurrency.
#[derive(Default)]
pub struct FakePackager {
  failing: HashSet<String>,
  panicking: HashSet<String>,
  delay: Duration,
  running: AtomicUsize,
  peak: AtomicUsize,
  built: Mutex<Vec<String>>,
}

impl FakePackager {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn failing_for(mut self, host: &str) -> Self {
    self.failing.insert(host.to_string());
    self
  }

  pub fn panicking_for(mut self, host: &str) -> Self {
    self.panicking.insert(host.to_string());
    self
  }

  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = delay;
    self
  }

  /// Package names built so far, in call order.
  pub fn built(&self) -> Vec<String> {
    self.built.lock().unwrap().clone()
  }

  /// Highest number of packaging calls seen running at once.
  pub fn peak(&self) -> usize {
    self.peak.load(Ordering::SeqCst)
  }
}

impl Packager for FakePackager {
  async fn build(&self, source_dir: &Path, descriptor: &Descriptor) -> Result<PathBuf, PackagingError> {
    let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
    self.peak.fetch_max(now, Ordering::SeqCst);
    if !self.delay.is_zero() {
      tokio::time::sleep(self.delay).await;
    }
    self.running.fetch_sub(1, Ordering::SeqCst);

    let host = descriptor.host.as_str();
    if self.panicking.contains(host) {
      panic!("packager crashed on {}", host);
    }
    self.built.lock().unwrap().push(descriptor.name.clone());
    if self.failing.contains(host) {
      return Err(PackagingError::new("error: Bad exit status from /var/tmp/rpm-tmp.1234 (%install)"));
    }

    let spec = std::fs::read_to_string(source_dir.join(descriptor.spec_file_name()))
      .map_err(|e| PackagingError::new(e.to_string()))?;
    let package = source_dir.join(format!("{}-{}.noarch.rpm", descriptor.name, descriptor.version));
    std::fs::write(&package, spec).map_err(|e| PackagingError::new(e.to_string()))?;
    Ok(package)
  }
}

/// Records every batch it is handed.
#[derive(Default)]
pub struct RecordingUploader {
  failing: HashSet<usize>,
  calls: Mutex<Vec<UploadBatch>>,
}

impl RecordingUploader {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn failing_chunk(mut self, index: usize) -> Self {
    self.failing.insert(index);
    self
  }

  pub fn calls(&self) -> Vec<UploadBatch> {
    self.calls.lock().unwrap().clone()
  }
}

impl Uploader for RecordingUploader {
  async fn upload(&self, batch: &UploadBatch) -> Result<(), UploadError> {
    self.calls.lock().unwrap().push(batch.clone());
    if self.failing.contains(&batch.index) {
      return Err(UploadError("403 Forbidden".to_string()));
    }
    Ok(())
  }
}

/// Collaborators plus an isolated output tree.
pub struct Fixture {
  pub temp: TempDir,
  pub repo: Arc<FakeRepo>,
  pub packager: Arc<FakePackager>,
  pub uploader: Arc<RecordingUploader>,
  pub config: Config,
}

impl Fixture {
  pub fn new(repo: FakeRepo) -> Self {
    let temp = TempDir::new().unwrap();
    let config = Config {
      config_viewer_hosts_dir: temp.path().join("viewer"),
      artifact_dir: temp.path().join("artifacts"),
      temp_dir: temp.path().to_path_buf(),
      thread_count: 4,
      rpm_upload_chunk_size: 2,
      ..Config::default()
    };
    Self {
      temp,
      repo: Arc::new(repo),
      packager: Arc::new(FakePackager::new()),
      uploader: Arc::new(RecordingUploader::new()),
      config,
    }
  }

  pub fn with_packager(mut self, packager: FakePackager) -> Self {
    self.packager = Arc::new(packager);
    self
  }

  pub fn with_uploader(mut self, uploader: RecordingUploader) -> Self {
    self.uploader = Arc::new(uploader);
    self
  }

  pub fn configure(mut self, f: impl FnOnce(&mut Config)) -> Self {
    f(&mut self.config);
    self
  }

  pub fn with_error_logs(mut self, url: Option<&str>) -> Self {
    self.config.error_log_dir = Some(self.error_log_dir());
    self.config.error_log_url = url.map(str::to_string);
    self
  }

  pub fn error_log_dir(&self) -> PathBuf {
    self.temp.path().join("errors")
  }

  pub fn viewer(&self, host: &str) -> PathBuf {
    self.config.config_viewer_hosts_dir.join(host)
  }

  pub fn work_dir(&self) -> PathBuf {
    self.temp.path().join("work")
  }

  pub fn run(&self) -> Run<FakeRepo, FakePackager, RecordingUploader> {
    Run::new(
      Arc::new(self.config.clone()),
      self.repo.clone(),
      self.packager.clone(),
      Some(self.uploader.clone()),
    )
  }

  pub async fn execute(&self) -> BuildReport {
    self.run().execute(revision(), &self.work_dir()).await.unwrap()
  }
}
