//! Running external tools (`svn`, `rpmbuild`, the upload command).

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::consts::MAX_ERROR_TEXT_LEN;

#[derive(Debug, Error)]
pub enum CommandError {
  #[error("failed to start {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  #[error("{program} exited with {}: {}", exit_text(.code), failure_text(.stderr))]
  CommandFailed {
    program: String,
    code: Option<i32>,
    stdout: String,
    stderr: String,
  },
}

impl CommandError {
  /// Captured output of a failed command, stderr first.
  pub fn output(&self) -> String {
    match self {
      CommandError::Spawn { source, .. } => source.to_string(),
      CommandError::CommandFailed { stdout, stderr, .. } => {
        let mut text = stderr.trim().to_string();
        if !stdout.trim().is_empty() {
          if !text.is_empty() {
            text.push('\n');
          }
          text.push_str(stdout.trim());
        }
        text
      }
    }
  }
}

fn exit_text(code: &Option<i32>) -> String {
  match code {
    Some(code) => format!("code {}", code),
    None => "a signal".to_string(),
  }
}

fn failure_text(stderr: &str) -> String {
  truncate_tail(stderr.trim())
}

/// Output of a successful command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
  pub stdout: String,
  pub stderr: String,
}

/// Run `program` with `args` and capture its output.
///
/// The child is killed when the returned future is dropped, so aborting a
/// run also stops the tools it started.
pub async fn run_command<I, S>(program: &str, args: I, cwd: Option<&Path>) -> Result<CommandOutput, CommandError>
where
  I: IntoIterator<Item = S>,
  S: AsRef<OsStr>,
{
  let mut command = Command::new(program);
  command
    .args(args)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true)
    .env("LANG", "C")
    .env("LC_ALL", "C");
  if let Some(dir) = cwd {
    command.current_dir(dir);
  }

  debug!(program, cwd = ?cwd, "spawning process");

  let output = command.output().await.map_err(|source| CommandError::Spawn {
    program: program.to_string(),
    source,
  })?;

  let stdout = String::from_utf8_lossy(&output.stdout).to_string();
  let stderr = String::from_utf8_lossy(&output.stderr).to_string();

  if !output.status.success() {
    if !stderr.is_empty() {
      debug!(stderr = %stderr, "command stderr");
    }
    if !stdout.is_empty() {
      debug!(stdout = %stdout, "command stdout");
    }
    return Err(CommandError::CommandFailed {
      program: program.to_string(),
      code: output.status.code(),
      stdout,
      stderr,
    });
  }

  Ok(CommandOutput { stdout, stderr })
}

/// Keep the last [`MAX_ERROR_TEXT_LEN`] bytes of `text`, on a char boundary.
///
/// Tools print the cause of a failure last, so the tail is what matters.
pub fn truncate_tail(text: &str) -> String {
  if text.len() <= MAX_ERROR_TEXT_LEN {
    return text.to_string();
  }
  let mut start = text.len() - MAX_ERROR_TEXT_LEN;
  while !text.is_char_boundary(start) {
    start += 1;
  }
  format!("...{}", &text[start..])
}
