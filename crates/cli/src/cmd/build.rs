//! Implementation of the `cfgrpm <repository> <revision>` run.
//!
//! Wires the Subversion client, rpmbuild and the configured upload command
//! into a run, executes it until it finishes or Ctrl-C arrives, and prints
//! the report.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use cfgrpm_lib::build::RpmBuild;
use cfgrpm_lib::config::Config;
use cfgrpm_lib::consts::APP_NAME;
use cfgrpm_lib::report::BuildReport;
use cfgrpm_lib::revision::RevisionId;
use cfgrpm_lib::run::{Run, RunError};
use cfgrpm_lib::upload::CommandUploader;
use cfgrpm_lib::vcs::SvnClient;

use crate::exit_code;
use crate::output::{
  OutputFormat, describe_outcome, format_bytes, format_duration, print_error, print_info, print_json, print_stat,
  print_success, print_warning,
};

pub struct BuildArgs {
  pub url: String,
  pub revision: RevisionId,
  pub output: OutputFormat,
}

/// Turn the repository argument into a URL Subversion accepts.
///
/// Anything with a scheme is taken as is; everything else must be an
/// existing local repository directory.
pub fn repository_url(repository: &str) -> Result<String> {
  if repository.contains("://") {
    return Ok(repository.trim_end_matches('/').to_string());
  }
  let path = std::fs::canonicalize(repository).with_context(|| format!("Repository {} not found", repository))?;
  if !path.is_dir() {
    anyhow::bail!("Repository {} is not a directory", path.display());
  }
  Ok(format!("file://{}", path.display()))
}

/// Execute one run and map its report to an exit code.
///
/// Errors returned here aborted the run before any host was processed.
pub fn cmd_build(args: &BuildArgs, config: Config) -> Result<ExitCode> {
  let config = Arc::new(config);

  let work_dir = tempfile::Builder::new()
    .prefix(&format!("{}-r{}-", APP_NAME, args.revision))
    .tempdir_in(&config.temp_dir)
    .with_context(|| format!("Failed to create work directory in {}", config.temp_dir.display()))?;

  let vcs = Arc::new(SvnClient::new(args.url.as_str()));
  let packager = Arc::new(RpmBuild::default());
  let uploader = config
    .rpm_upload_cmd
    .as_ref()
    .map(|cmd| Arc::new(CommandUploader::new(cmd.as_str())));
  let run = Run::new(config.clone(), vcs, packager, uploader);

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let result = rt.block_on(run.execute_until(args.revision, work_dir.path(), interrupted()));
  // Aborted tasks must be gone before the work directory is removed.
  drop(rt);

  if config.keep_work_dir {
    let kept = work_dir.keep();
    info!(path = %kept.display(), "keeping work directory");
  }

  let report = match result {
    Ok(report) => report,
    Err(RunError::Interrupted) => {
      print_warning("Interrupted, run aborted");
      return Ok(ExitCode::from(exit_code::INTERRUPTED));
    }
    Err(e) => return Err(e).context("Run aborted"),
  };

  if args.output.is_json() {
    print_json(&report)?;
  } else {
    print_report(&report);
  }

  if report.is_success() {
    Ok(ExitCode::SUCCESS)
  } else {
    Ok(ExitCode::from(exit_code::RUN_FAILED))
  }
}

async fn interrupted() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    warn!(error = %e, "cannot listen for ctrl-c");
    std::future::pending::<()>().await;
  }
}

fn print_report(report: &BuildReport) {
  println!();
  for warning in &report.warnings {
    print_warning(&warning.to_string());
  }

  for (host, outcome) in &report.hosts {
    let line = describe_outcome(host, outcome);
    if outcome.is_success() {
      print_success(&line);
    } else {
      print_error(&line);
    }
  }

  for chunk in &report.uploads {
    match &chunk.failure {
      None => print_info(&format!("Chunk {}: uploaded {} packages", chunk.index, chunk.hosts.len())),
      Some(failure) => print_error(&failure.to_string()),
    }
  }

  for (host, cleanup) in &report.cleaned {
    if cleanup.is_success() {
      print_info(&format!("{}: removed ({} freed)", host, format_bytes(cleanup.bytes_freed)));
    } else {
      for failure in &cleanup.failures {
        print_warning(&failure.to_string());
      }
    }
  }

  let summary = report.summary();
  println!();
  if report.is_success() {
    print_success("Run complete!");
  } else {
    print_error("Run finished with failures");
  }
  print_stat("Revision", &report.revision.to_string());
  print_stat("Hosts succeeded", &summary.succeeded.to_string());
  print_stat("Hosts failed", &summary.failed().to_string());
  print_stat("Hosts removed", &summary.cleaned.to_string());
  if !report.viewer_only {
    print_stat("Upload chunks", &report.uploads.len().to_string());
  }
  print_stat("Duration", &format_duration(Duration::from_millis(report.elapsed_ms)));
}
