//! Bounded parallel execution of per-host build jobs.
//!
//! Every host gets its own task; a semaphore caps how many run at once. A
//! failing or panicking job only ever produces a failed result for its own
//! host. [`BuildScheduler::run`] returns once every job is terminal.

mod job;
mod types;

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info};

use crate::build::Packager;
use crate::layout::Host;
use crate::vcs::VersionControl;

pub use job::HostPipeline;
pub use types::{BuildJob, HostError, JobOutput, JobResult, JobStatus, TransitionError};

#[derive(Debug, Error, PartialEq, Eq)]
#[error("worker count must be at least 1, got {0}")]
pub struct InvalidWorkerCount(pub usize);

#[derive(Debug, Clone, Copy)]
pub struct BuildScheduler {
  workers: usize,
}

impl BuildScheduler {
  pub fn new(workers: usize) -> Result<Self, InvalidWorkerCount> {
    if workers == 0 {
      return Err(InvalidWorkerCount(workers));
    }
    Ok(Self { workers })
  }

  pub fn workers(&self) -> usize {
    self.workers
  }

  /// Run every host's pipeline and wait for all of them.
  ///
  /// Results come back in completion order, one per host.
  pub async fn run<V, P>(&self, pipeline: Arc<HostPipeline<V, P>>, hosts: Vec<Host>) -> Vec<JobResult>
  where
    V: VersionControl + 'static,
    P: Packager + 'static,
  {
    info!(hosts = hosts.len(), workers = self.workers, "scheduling build jobs");

    let semaphore = Arc::new(Semaphore::new(self.workers));
    let mut join_set = JoinSet::new();
    let mut tasks = HashMap::new();

    for host in hosts {
      let pipeline = pipeline.clone();
      let semaphore = semaphore.clone();
      let task_host = host.clone();

      let handle = join_set.spawn(async move {
        let mut job = BuildJob::new(task_host);
        let _permit = match semaphore.acquire().await {
          Ok(permit) => permit,
          Err(_) => return JobResult::failed(job, HostError::Panicked("worker pool closed".to_string())),
        };

        if let Err(e) = job.start() {
          error!(error = %e, "illegal job transition");
        }
        let outcome = pipeline.run(&mut job).await;
        if let Err(e) = job.finish(outcome.as_ref().err().map(|e| e.to_string())) {
          error!(error = %e, "illegal job transition");
        }
        JobResult { job, outcome }
      });
      tasks.insert(handle.id(), host);
    }

    let mut results = Vec::with_capacity(tasks.len());
    while let Some(joined) = join_set.join_next_with_id().await {
      match joined {
        Ok((id, result)) => {
          tasks.remove(&id);
          log_result(&result);
          results.push(result);
        }
        Err(e) => {
          let Some(host) = tasks.remove(&e.id()) else {
            error!(error = %e, "build task failed for an unknown host");
            continue;
          };
          let message = panic_message(e);
          error!(host = %host.id, error = %message, "build job panicked");
          results.push(JobResult::failed(BuildJob::new(host), HostError::Panicked(message)));
        }
      }
    }

    results
  }
}

impl JobResult {
  /// A job that failed before or outside its pipeline.
  fn failed(mut job: BuildJob, error: HostError) -> Self {
    if job.status() == JobStatus::Pending
      && let Err(e) = job.start()
    {
      error!(error = %e, "illegal job transition");
    }
    if let Err(e) = job.finish(Some(error.to_string())) {
      error!(error = %e, "illegal job transition");
    }
    JobResult {
      job,
      outcome: Err(error),
    }
  }
}

fn log_result(result: &JobResult) {
  match &result.outcome {
    Ok(output) => debug!(host = %result.host(), files = output.files, "job succeeded"),
    Err(e) => error!(host = %result.host(), error = %e, "job failed"),
  }
}

fn panic_message(e: JoinError) -> String {
  if !e.is_panic() {
    return e.to_string();
  }
  let payload: Box<dyn Any + Send> = e.into_panic();
  if let Some(s) = payload.downcast_ref::<&str>() {
    s.to_string()
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.clone()
  } else {
    "unknown panic".to_string()
  }
}
