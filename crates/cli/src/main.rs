mod cmd;
mod output;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cfgrpm_lib::config::{Config, LogLevel};
use cfgrpm_lib::revision::RevisionId;

use crate::cmd::{BuildArgs, cmd_build, repository_url};
use crate::output::{OutputFormat, print_error};

/// Process exit codes.
pub mod exit_code {
  /// Some hosts or upload chunks failed; the rest were still processed.
  pub const RUN_FAILED: u8 = 1;
  /// Rejected arguments. clap uses the same code for its own errors.
  pub const INVALID_ARGS: u8 = 2;
  pub const CONFIG_ERROR: u8 = 3;
  /// The run stopped before any host was processed.
  pub const ABORTED: u8 = 4;
  pub const INTERRUPTED: u8 = 7;
}

/// cfgrpm - build per-host configuration packages from a repository revision
#[derive(Parser)]
#[command(name = "cfgrpm")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Repository URL, or the path of a local repository
  repository: String,

  /// Revision whose changes are built
  revision: RevisionId,

  /// Configuration file (default: $CFGRPM_CONFIG_FILE, then ./cfgrpm.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Log at debug level regardless of the configuration
  #[arg(short, long)]
  debug: bool,

  /// Number of hosts built in parallel, overrides thread_count
  #[arg(short, long)]
  workers: Option<usize>,

  /// Only materialize merged trees, skip packaging and upload
  #[arg(long)]
  viewer_only: bool,

  /// Report format
  #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
  output: OutputFormat,
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let url = match repository_url(&cli.repository) {
    Ok(url) => url,
    Err(e) => {
      print_error(&format!("{e:#}"));
      return ExitCode::from(exit_code::INVALID_ARGS);
    }
  };

  let mut config = match Config::load(cli.config.as_deref()) {
    Ok((config, _)) => config,
    Err(e) => {
      print_error(&e.to_string());
      return ExitCode::from(exit_code::CONFIG_ERROR);
    }
  };
  if let Some(workers) = cli.workers {
    config.thread_count = workers;
  }
  config.config_viewer_only |= cli.viewer_only;
  if let Err(e) = config.validate() {
    print_error(&e.to_string());
    return ExitCode::from(exit_code::CONFIG_ERROR);
  }

  init_logging(config.log_level, cli.debug);

  let args = BuildArgs {
    url,
    revision: cli.revision,
    output: cli.output,
  };
  match cmd_build(&args, config) {
    Ok(code) => code,
    Err(e) => {
      print_error(&format!("{e:#}"));
      ExitCode::from(exit_code::ABORTED)
    }
  }
}

fn init_logging(level: LogLevel, debug: bool) {
  let filter = if debug {
    EnvFilter::new(LogLevel::Debug.as_str())
  } else {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()))
  };

  let builder = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr);
  if std::io::stderr().is_terminal() {
    builder.without_time().init();
  } else {
    builder.init();
  }
}
