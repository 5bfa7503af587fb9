use std::sync::Arc;

use cfgrpm_lib::report::HostOutcome;
use cfgrpm_lib::revision::ChangeType;
use cfgrpm_lib::run::Run;

use super::common::{FakeRepo, Fixture, RecordingUploader, host, hosts, revision};

fn global_change() -> FakeRepo {
  FakeRepo::standard().change("/config/all/etc/motd", ChangeType::Modify)
}

#[tokio::test]
async fn artifacts_upload_in_ceil_chunks() {
  let fixture = Fixture::new(global_change());

  let report = fixture.execute().await;

  let calls = fixture.uploader.calls();
  assert_eq!(calls.len(), 3);
  let indices: Vec<_> = calls.iter().map(|batch| batch.index).collect();
  assert_eq!(indices, vec![0, 1, 2]);
  let sizes: Vec<_> = calls.iter().map(|batch| batch.artifacts.len()).collect();
  assert_eq!(sizes, vec![2, 2, 1]);

  let order: Vec<_> = calls.iter().flat_map(|batch| batch.hosts()).collect();
  assert_eq!(order, hosts(&["berdb01", "berweb01", "berweb02", "hamweb01", "web01"]));
  assert!(calls.iter().flat_map(|batch| batch.paths()).all(|path| path.exists()));
  assert_eq!(report.uploads.len(), 3);
  assert!(report.is_success());
}

#[tokio::test]
async fn chunk_size_zero_uploads_everything_at_once() {
  let fixture = Fixture::new(global_change()).configure(|config| config.rpm_upload_chunk_size = 0);

  fixture.execute().await;

  let calls = fixture.uploader.calls();
  assert_eq!(calls.len(), 1);
  assert_eq!(calls[0].artifacts.len(), 5);
}

#[tokio::test]
async fn failed_chunk_fails_its_hosts_and_dispatch_continues() {
  let fixture = Fixture::new(global_change()).with_uploader(RecordingUploader::new().failing_chunk(1));

  let report = fixture.execute().await;

  assert_eq!(fixture.uploader.calls().len(), 3);
  for name in ["berweb02", "hamweb01"] {
    assert_eq!(
      report.hosts[&host(name)],
      HostOutcome::UploadError {
        chunk: 1,
        message: "403 Forbidden".to_string()
      }
    );
  }
  for name in ["berdb01", "berweb01", "web01"] {
    assert!(report.hosts[&host(name)].is_success());
  }
  assert_eq!(report.summary().upload_errors, 2);
  assert!(!report.is_success());
  assert!(!report.uploads[1].is_success());
}

#[tokio::test]
async fn missing_upload_command_skips_upload() {
  let fixture = Fixture::new(global_change());
  let run: Run<_, _, RecordingUploader> = Run::new(
    Arc::new(fixture.config.clone()),
    fixture.repo.clone(),
    fixture.packager.clone(),
    None,
  );

  let report = run.execute(revision(), &fixture.work_dir()).await.unwrap();

  assert!(report.is_success());
  assert!(report.uploads.is_empty());
  assert_eq!(fixture.packager.built().len(), 5);
}
