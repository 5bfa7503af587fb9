use std::time::Duration;

use cfgrpm_lib::report::HostOutcome;
use cfgrpm_lib::revision::ChangeType;
use cfgrpm_lib::util::hash::hash_directory;

use super::common::{FakePackager, FakeRepo, Fixture, host};

#[tokio::test]
async fn host_layer_overrides_global_layer() {
  let fixture = Fixture::new(FakeRepo::standard().change("/config/host/web01/etc/motd", ChangeType::Modify));

  let report = fixture.execute().await;

  let viewer = fixture.viewer("web01");
  assert_eq!(std::fs::read_to_string(viewer.join("etc/motd")).unwrap(), "web01 motd");
  assert_eq!(
    std::fs::read_to_string(viewer.join("etc/ntp.conf")).unwrap(),
    "server ntp.example.com"
  );
  assert!(!viewer.join("etc/resolv.conf").exists());

  let HostOutcome::Succeeded {
    files,
    artifact: Some(artifact),
    ..
  } = &report.hosts[&host("web01")]
  else {
    panic!("web01 should have been packaged: {:?}", report.hosts);
  };
  assert_eq!(*files, 3);
  assert_eq!(
    artifact.path,
    fixture.config.artifact_dir.join("web01/yadt-config-web01-42.noarch.rpm")
  );
  let spec = std::fs::read_to_string(&artifact.path).unwrap();
  assert!(spec.contains("Name:           yadt-config-web01"));
  assert!(spec.contains("Version:        42"));
  assert!(spec.contains("\"/etc/motd\""));
}

#[tokio::test]
async fn shared_layers_stack_in_rank_order() {
  let repo = FakeRepo::standard()
    .file("/config/loc/ber/etc/motd", "berlin motd")
    .file("/config/bu/web/etc/motd", "web motd")
    .change("/config/all/etc/motd", ChangeType::Modify);
  let fixture = Fixture::new(repo);

  fixture.execute().await;

  let motd = |name: &str| std::fs::read_to_string(fixture.viewer(name).join("etc/motd")).unwrap();
  assert_eq!(motd("berweb01"), "web motd");
  assert_eq!(motd("berdb01"), "berlin motd");
  assert_eq!(motd("web01"), "web01 motd");
}

#[tokio::test]
async fn tombstone_removes_lower_layer_file() {
  let repo = FakeRepo::standard()
    .file("/config/host/berweb01/etc/ntp.conf.tombstone", "")
    .change("/config/host/berweb01/etc/ntp.conf.tombstone", ChangeType::Add);
  let fixture = Fixture::new(repo);

  let report = fixture.execute().await;

  assert!(report.is_success());
  let viewer = fixture.viewer("berweb01");
  assert!(viewer.join("etc/motd").exists());
  assert!(!viewer.join("etc/ntp.conf").exists());
  assert!(!viewer.join("etc/ntp.conf.tombstone").exists());
}

#[tokio::test]
async fn viewer_only_materializes_without_packaging() {
  let fixture = Fixture::new(FakeRepo::standard().change("/config/all/etc/motd", ChangeType::Modify))
    .configure(|config| config.config_viewer_only = true);

  let report = fixture.execute().await;

  assert!(report.is_success());
  assert!(report.viewer_only);
  for name in ["berdb01", "berweb01", "berweb02", "hamweb01", "web01"] {
    assert!(fixture.viewer(name).join("etc/hostname").exists(), "{} not materialized", name);
    assert!(matches!(
      report.hosts[&host(name)],
      HostOutcome::Succeeded { artifact: None, .. }
    ));
  }
  assert!(fixture.packager.built().is_empty());
  assert!(fixture.uploader.calls().is_empty());
  assert!(report.uploads.is_empty());
  assert!(!fixture.config.artifact_dir.exists());
}

#[tokio::test]
async fn repeated_runs_produce_identical_trees() {
  let fixture = Fixture::new(FakeRepo::standard().change("/config/all/etc/motd", ChangeType::Modify));

  let first = fixture.execute().await;
  let first_hash = hash_directory(&fixture.viewer("berweb01")).unwrap();
  let second = fixture.execute().await;
  let second_hash = hash_directory(&fixture.viewer("berweb01")).unwrap();

  assert_eq!(first_hash, second_hash);
  for (host, outcome) in &first.hosts {
    let (
      HostOutcome::Succeeded { tree_digest: a, .. },
      HostOutcome::Succeeded { tree_digest: b, .. },
    ) = (outcome, &second.hosts[host])
    else {
      panic!("{} failed", host);
    };
    assert_eq!(a, b);
  }
}

#[tokio::test]
async fn rebuild_replaces_stale_viewer_files() {
  let fixture = Fixture::new(FakeRepo::standard().change("/config/host/berweb01/etc/motd", ChangeType::Add));
  let stale = fixture.viewer("berweb01").join("etc/removed.conf");
  std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
  std::fs::write(&stale, "old").unwrap();

  fixture.execute().await;

  assert!(!stale.exists());
  assert!(fixture.viewer("berweb01").join("etc/hostname").exists());
}

#[tokio::test]
async fn workers_bound_concurrent_builds() {
  let fixture = Fixture::new(FakeRepo::standard().change("/config/all/etc/motd", ChangeType::Modify))
    .with_packager(FakePackager::new().with_delay(Duration::from_millis(50)))
    .configure(|config| config.thread_count = 2);

  let report = fixture.execute().await;

  assert_eq!(report.summary().succeeded, 5);
  assert!(fixture.packager.peak() <= 2, "peak was {}", fixture.packager.peak());
  assert_eq!(fixture.packager.built().len(), 5);
}

#[tokio::test]
async fn single_worker_builds_one_at_a_time() {
  let fixture = Fixture::new(FakeRepo::standard().change("/config/bu/web/etc/httpd.conf", ChangeType::Modify))
    .with_packager(FakePackager::new().with_delay(Duration::from_millis(10)))
    .configure(|config| config.thread_count = 1);

  let report = fixture.execute().await;

  assert_eq!(report.summary().succeeded, 3);
  assert_eq!(fixture.packager.peak(), 1);
}
