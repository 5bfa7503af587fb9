use cfgrpm_lib::revision::ChangeType;

use cfgrpm_lib::revision::RevisionId;

use super::common::{FakeRepo, Fixture, host, hosts};

fn seed_outputs(fixture: &Fixture, name: &str) {
  let viewer = fixture.viewer(name).join("etc");
  std::fs::create_dir_all(&viewer).unwrap();
  std::fs::write(viewer.join("motd"), "old motd").unwrap();
  let artifacts = fixture.config.artifact_dir.join(name);
  std::fs::create_dir_all(&artifacts).unwrap();
  std::fs::write(artifacts.join(format!("yadt-config-{}-41.noarch.rpm", name)), "rpm").unwrap();
}

#[tokio::test]
async fn deleted_host_is_cleaned_and_never_built() {
  // berweb09 is gone at this revision but would match the ber location segment.
  let repo = FakeRepo::standard()
    .change("/config/host/berweb09", ChangeType::Delete)
    .change("/config/loc/ber/etc/resolv.conf", ChangeType::Modify);
  let fixture = Fixture::new(repo);
  seed_outputs(&fixture, "berweb09");

  let report = fixture.execute().await;

  assert_eq!(report.cleaned.keys().cloned().collect::<Vec<_>>(), hosts(&["berweb09"]));
  let cleanup = &report.cleaned[&host("berweb09")];
  assert!(cleanup.is_success());
  assert_eq!(cleanup.removed.len(), 2);
  assert_eq!(cleanup.bytes_freed, 11);
  assert!(!fixture.viewer("berweb09").exists());
  assert!(!fixture.config.artifact_dir.join("berweb09").exists());

  assert!(!report.hosts.contains_key(&host("berweb09")));
  assert!(!fixture.packager.built().contains(&"yadt-config-berweb09".to_string()));
  assert_eq!(report.hosts.keys().cloned().collect::<Vec<_>>(), hosts(&["berdb01", "berweb01", "berweb02"]));
  assert_eq!(report.summary().cleaned, 1);
}

#[tokio::test]
async fn host_deleted_alongside_its_own_changes_is_not_built() {
  let repo = FakeRepo::standard()
    .change("/config/host/berweb09/etc/motd", ChangeType::Delete)
    .change("/config/host/berweb09", ChangeType::Delete);
  let fixture = Fixture::new(repo);

  let report = fixture.execute().await;

  assert!(report.hosts.is_empty());
  assert!(fixture.repo.exported().is_empty());
  assert!(report.cleaned.contains_key(&host("berweb09")));
}

#[tokio::test]
async fn cleaning_a_host_without_outputs_is_a_noop() {
  let fixture = Fixture::new(FakeRepo::standard().change("/config/host/gone01", ChangeType::Delete));

  let report = fixture.execute().await;

  let cleanup = &report.cleaned[&host("gone01")];
  assert!(cleanup.is_success());
  assert!(cleanup.removed.is_empty());
  assert_eq!(cleanup.bytes_freed, 0);
  assert!(report.is_success());
}

#[tokio::test]
async fn surviving_hosts_keep_their_outputs() {
  let fixture = Fixture::new(FakeRepo::standard().change("/config/host/gone01", ChangeType::Delete));
  seed_outputs(&fixture, "berweb01");

  fixture.execute().await;

  assert!(fixture.viewer("berweb01").join("etc/motd").exists());
  assert!(fixture.config.artifact_dir.join("berweb01").exists());
}

#[tokio::test]
async fn deleting_the_host_directory_cleans_every_previous_host() {
  let repo = FakeRepo::new()
    .file("/config/all/etc/motd", "global motd")
    .previous_hosts(&["berweb01", "hamweb01"])
    .change("/config/host", ChangeType::Delete);
  let fixture = Fixture::new(repo);
  seed_outputs(&fixture, "berweb01");
  seed_outputs(&fixture, "hamweb01");

  let report = fixture.execute().await;

  assert_eq!(fixture.repo.listings(), vec![RevisionId::new(42), RevisionId::new(41)]);
  assert_eq!(report.cleaned.keys().cloned().collect::<Vec<_>>(), hosts(&["berweb01", "hamweb01"]));
  assert!(report.cleaned.values().all(|cleanup| cleanup.is_success()));
  assert!(!fixture.viewer("berweb01").exists());
  assert!(!fixture.config.artifact_dir.join("hamweb01").exists());
  assert!(report.hosts.is_empty());
}

#[tokio::test]
async fn previous_revision_is_only_listed_when_the_host_directory_goes() {
  let fixture = Fixture::new(FakeRepo::standard().change("/config/host/gone01", ChangeType::Delete));

  fixture.execute().await;

  assert_eq!(fixture.repo.listings(), vec![RevisionId::new(42)]);
}

#[tokio::test]
async fn error_log_of_a_deleted_host_is_removed() {
  let fixture = Fixture::new(FakeRepo::standard().change("/config/host/berweb09", ChangeType::Delete)).with_error_logs(None);
  std::fs::create_dir_all(fixture.error_log_dir()).unwrap();
  std::fs::write(fixture.error_log_dir().join("berweb09.txt"), "old failure").unwrap();

  let report = fixture.execute().await;

  assert!(report.cleaned[&host("berweb09")].is_success());
  assert!(!fixture.error_log_dir().join("berweb09.txt").exists());
}
