use std::time::Duration;

use cfgrpm_lib::build::BuildStage;
use cfgrpm_lib::config::ConfigError;
use cfgrpm_lib::report::HostOutcome;
use cfgrpm_lib::revision::ChangeType;
use cfgrpm_lib::run::RunError;

use super::common::{FakePackager, FakeRepo, Fixture, host, hosts, revision};

fn global_change() -> FakeRepo {
  FakeRepo::standard().change("/config/all/etc/motd", ChangeType::Modify)
}

#[tokio::test]
async fn one_failing_build_is_contained() {
  let fixture = Fixture::new(global_change()).with_packager(FakePackager::new().failing_for("berweb02"));

  let report = fixture.execute().await;

  let summary = report.summary();
  assert_eq!(summary.succeeded, 4);
  assert_eq!(summary.build_errors, 1);
  assert_eq!(summary.failed(), 1);
  assert!(!report.is_success());

  let HostOutcome::BuildError { stage, message, .. } = &report.hosts[&host("berweb02")] else {
    panic!("berweb02 should have failed: {:?}", report.hosts);
  };
  assert_eq!(*stage, Some(BuildStage::Package));
  assert!(message.contains("Bad exit status"));

  // The failed host's merged tree is still there for inspection.
  assert!(fixture.viewer("berweb02").join("etc/motd").exists());

  let uploaded: Vec<_> = fixture.uploader.calls().iter().flat_map(|batch| batch.hosts()).collect();
  assert_eq!(uploaded, hosts(&["berdb01", "berweb01", "hamweb01", "web01"]));
}

#[tokio::test]
async fn panicking_build_fails_only_its_host() {
  let fixture = Fixture::new(global_change()).with_packager(FakePackager::new().panicking_for("hamweb01"));

  let report = fixture.execute().await;

  assert_eq!(report.hosts.len(), 5);
  assert_eq!(report.summary().succeeded, 4);
  let HostOutcome::BuildError { stage, message, .. } = &report.hosts[&host("hamweb01")] else {
    panic!("hamweb01 should have failed: {:?}", report.hosts);
  };
  assert_eq!(*stage, None);
  assert!(message.contains("packager crashed on hamweb01"));
}

#[tokio::test]
async fn unknown_hosts_fail_when_not_allowed() {
  let fixture = Fixture::new(global_change()).configure(|config| config.allow_unknown_hosts = false);

  let report = fixture.execute().await;

  let HostOutcome::ConfigError { message, .. } = &report.hosts[&host("web01")] else {
    panic!("web01 should have been rejected: {:?}", report.hosts);
  };
  assert!(message.contains("web01"));
  assert!(!fixture.viewer("web01").exists());
  assert_eq!(report.summary().succeeded, 4);
}

#[tokio::test]
async fn oversized_file_is_a_config_error() {
  let fixture = Fixture::new(
    FakeRepo::standard()
      .file("/config/host/berweb01/var/blob.bin", &"x".repeat(64))
      .change("/config/host/berweb01/var/blob.bin", ChangeType::Add),
  )
  .configure(|config| config.max_file_size = 32);

  let report = fixture.execute().await;

  let HostOutcome::ConfigError { message, .. } = &report.hosts[&host("berweb01")] else {
    panic!("berweb01 should have failed: {:?}", report.hosts);
  };
  assert!(message.contains("var/blob.bin"));
  assert!(fixture.packager.built().is_empty());
  assert!(fixture.uploader.calls().is_empty());
}

#[tokio::test]
async fn listing_failure_aborts_before_host_work() {
  let fixture = Fixture::new(global_change().failing_listing());

  let err = fixture.run().execute(revision(), &fixture.work_dir()).await.unwrap_err();

  assert!(matches!(err, RunError::Vcs { operation: "list changes", .. }));
  assert!(fixture.repo.exported().is_empty());
  assert!(!fixture.config.config_viewer_hosts_dir.exists());
}

#[tokio::test]
async fn zero_workers_abort_the_run() {
  let fixture = Fixture::new(global_change()).configure(|config| config.thread_count = 0);

  let err = fixture.run().execute(revision(), &fixture.work_dir()).await.unwrap_err();

  assert!(matches!(err, RunError::WorkerPool(_)));
}

#[tokio::test]
async fn interrupt_aborts_a_running_build() {
  let fixture = Fixture::new(global_change()).with_packager(FakePackager::new().with_delay(Duration::from_secs(30)));

  let result = fixture
    .run()
    .execute_until(revision(), &fixture.work_dir(), tokio::time::sleep(Duration::from_millis(100)))
    .await;

  assert!(matches!(result, Err(RunError::Interrupted)));
  assert!(fixture.packager.built().is_empty());
  assert!(fixture.uploader.calls().is_empty());
}

#[tokio::test]
async fn failed_hosts_get_an_error_log() {
  let fixture = Fixture::new(global_change())
    .with_packager(FakePackager::new().failing_for("berweb02"))
    .with_error_logs(Some("https://ci.example.com/errors/"));

  let report = fixture.execute().await;

  let outcome = &report.hosts[&host("berweb02")];
  assert_eq!(outcome.error_log(), Some("https://ci.example.com/errors/berweb02.txt"));
  let log = std::fs::read_to_string(fixture.error_log_dir().join("berweb02.txt")).unwrap();
  assert!(log.starts_with("host: berweb02\nrevision: 42\n"));
  assert!(log.contains("Bad exit status"));

  assert_eq!(report.hosts[&host("berweb01")].error_log(), None);
  assert!(!fixture.error_log_dir().join("berweb01.txt").exists());
}

#[tokio::test]
async fn error_log_without_url_points_at_the_file() {
  let fixture = Fixture::new(global_change())
    .configure(|config| config.allow_unknown_hosts = false)
    .with_error_logs(None);

  let report = fixture.execute().await;

  let path = fixture.error_log_dir().join("web01.txt");
  assert_eq!(report.hosts[&host("web01")].error_log(), Some(path.display().to_string().as_str()));
  assert!(std::fs::read_to_string(path).unwrap().contains("web01"));
}

#[tokio::test]
async fn missing_template_aborts_before_cleanup() {
  let repo = FakeRepo::standard()
    .change("/config/host/berweb09", ChangeType::Delete)
    .change("/config/loc/ber/etc/resolv.conf", ChangeType::Modify);
  let mut fixture = Fixture::new(repo);
  fixture.config.path_to_spec_file = Some(fixture.temp.path().join("missing.spec"));
  seed_viewer(&fixture, "berweb09");

  let err = fixture.run().execute(revision(), &fixture.work_dir()).await.unwrap_err();

  assert!(matches!(err, RunError::Template { .. }));
  assert!(fixture.viewer("berweb09").join("etc/motd").exists());
  assert!(fixture.repo.listings().is_empty());
}

#[tokio::test]
async fn unusable_work_dir_aborts_before_cleanup() {
  let fixture = Fixture::new(FakeRepo::standard().change("/config/host/berweb09", ChangeType::Delete));
  std::fs::write(fixture.work_dir(), "not a directory").unwrap();
  seed_viewer(&fixture, "berweb09");

  let err = fixture.run().execute(revision(), &fixture.work_dir()).await.unwrap_err();

  assert!(matches!(err, RunError::WorkDir { .. }));
  assert!(fixture.viewer("berweb09").join("etc/motd").exists());
}

#[tokio::test]
async fn overlapping_output_roots_abort_the_run() {
  // A host named after the artifact directory would otherwise be materialized into it.
  let repo = FakeRepo::standard()
    .file("/config/host/cfgrpm-artifacts/etc/motd", "collides")
    .change("/config/all/etc/motd", ChangeType::Modify);
  let mut fixture = Fixture::new(repo);
  fixture.config.artifact_dir = fixture.config.config_viewer_hosts_dir.join("cfgrpm-artifacts");
  let artifact = fixture.config.artifact_dir.join("berweb01/yadt-config-berweb01-41.noarch.rpm");
  std::fs::create_dir_all(artifact.parent().unwrap()).unwrap();
  std::fs::write(&artifact, "rpm").unwrap();

  let err = fixture.run().execute(revision(), &fixture.work_dir()).await.unwrap_err();

  assert!(matches!(
    err,
    RunError::Config(ConfigError::InvalidValue { field: "artifact_dir", .. })
  ));
  assert!(artifact.exists());
  assert!(fixture.repo.exported().is_empty());
}

fn seed_viewer(fixture: &Fixture, name: &str) {
  let etc = fixture.viewer(name).join("etc");
  std::fs::create_dir_all(&etc).unwrap();
  std::fs::write(etc.join("motd"), "old motd").unwrap();
}
