//! Console output of a run: colored per-host lines, human-readable sizes and
//! durations, and the JSON report.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

use cfgrpm_lib::layout::HostId;
use cfgrpm_lib::report::HostOutcome;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
}

/// Short form of a tree digest for the per-host lines.
pub fn truncate_hash(hash: &str) -> &str {
  hash.get(..12).unwrap_or(hash)
}

/// One report line for a host, without the status symbol.
pub fn describe_outcome(host: &HostId, outcome: &HostOutcome) -> String {
  match outcome {
    HostOutcome::Succeeded {
      files,
      tree_digest,
      artifact: Some(artifact),
    } => format!(
      "{}: {} files, {}, {} ({})",
      host,
      files,
      truncate_hash(&tree_digest.0),
      artifact.path.display(),
      format_bytes(artifact.size)
    ),
    HostOutcome::Succeeded {
      files,
      tree_digest,
      artifact: None,
    } => format!("{}: {} files, {}", host, files, truncate_hash(&tree_digest.0)),
    HostOutcome::ConfigError { message, error_log } => {
      with_log(format!("{}: config error: {}", host, message), error_log)
    }
    HostOutcome::BuildError {
      stage: Some(stage),
      message,
      error_log,
    } => with_log(format!("{}: build error in {}: {}", host, stage, message), error_log),
    HostOutcome::BuildError {
      stage: None,
      message,
      error_log,
    } => with_log(format!("{}: build error: {}", host, message), error_log),
    HostOutcome::UploadError { chunk, message } => format!("{}: upload of chunk {} failed: {}", host, chunk, message),
  }
}

fn with_log(line: String, error_log: &Option<String>) -> String {
  match error_log {
    Some(location) => format!("{} (log: {})", line, location),
    None => line,
  }
}

pub fn format_bytes(bytes: u64) -> String {
  const KB: u64 = 1024;
  const MB: u64 = KB * 1024;
  const GB: u64 = MB * 1024;

  if bytes >= GB {
    format!("{:.1} GB", bytes as f64 / GB as f64)
  } else if bytes >= MB {
    format!("{:.1} MB", bytes as f64 / MB as f64)
  } else if bytes >= KB {
    format!("{:.1} KB", bytes as f64 / KB as f64)
  } else {
    format!("{} B", bytes)
  }
}

pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  let millis = duration.subsec_millis();

  if secs >= 60 {
    let mins = secs / 60;
    let remaining_secs = secs % 60;
    format!("{}m {}s", mins, remaining_secs)
  } else if secs > 0 {
    format!("{}.{:02}s", secs, millis / 10)
  } else {
    format!("{}ms", millis)
  }
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize report")?;
  println!("{}", json);
  Ok(())
}
