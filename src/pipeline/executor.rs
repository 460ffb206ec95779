//! runs a [`Dag`]: ready tasks in parallel waves, fixed-delay retries,
//! failure propagation and coarse cancellation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use tracing::{error, info, warn};

use super::dag::{Dag, Task};
use super::retry::RetryPolicy;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped, // some upstream task failed
}

/// stops tasks that haven't started; running ones finish
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// final state of one task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    pub id: String,
    pub state: TaskState,
    pub attempts: u32,
    pub error: Option<String>, // last error, if it failed
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub tasks: Vec<TaskOutcome>, // dag insertion order
    pub cancelled: bool,
}

impl RunReport {
    /// true unless a required task failed or the run was cancelled
    pub fn succeeded(&self) -> bool {
        !self.cancelled
            && self
                .tasks
                .iter()
                .all(|t| t.optional || t.state != TaskState::Failed)
    }

    pub fn outcome(&self, id: &str) -> Option<&TaskOutcome> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn state(&self, id: &str) -> Option<TaskState> {
        self.outcome(id).map(|t| t.state)
    }

    pub fn failed(&self) -> impl Iterator<Item = &TaskOutcome> {
        self.tasks.iter().filter(|t| t.state == TaskState::Failed)
    }
}

pub struct Executor {
    retry: RetryPolicy,
    cancel: CancelHandle,
}

impl Executor {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            retry,
            cancel: CancelHandle::default(),
        }
    }

    /// handle other threads (or tasks) can use to stop the run
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Run every task once its upstream tasks have all succeeded.
    ///
    /// Each wave collects all ready tasks and runs them on the rayon pool. A
    /// task that exhausts its attempts is Failed and everything downstream of
    /// it Skipped. Only an invalid graph is an `Err`; task failures are in the
    /// report.
    pub fn run(&self, dag: &Dag) -> Result<RunReport> {
        dag.topological_order()?;

        let n = dag.len();
        let mut states = vec![TaskState::Pending; n];
        let mut attempts = vec![0u32; n];
        let mut errors: Vec<Option<String>> = vec![None; n];
        let started = Instant::now();

        loop {
            if self.cancel.is_cancelled() {
                warn!("run cancelled, pending tasks will not start");
                break;
            }

            let ready: Vec<usize> = (0..n)
                .filter(|&i| states[i] == TaskState::Pending)
                .filter(|&i| dag.upstream_of(i).iter().all(|&u| states[u] == TaskState::Succeeded))
                .collect();
            if ready.is_empty() {
                break;
            }

            for &i in &ready {
                states[i] = TaskState::Running;
            }

            let results: Vec<(usize, u32, std::result::Result<(), String>)> = ready
                .par_iter()
                .map(|&i| {
                    let (tries, result) = self.run_task(&dag.tasks()[i]);
                    (i, tries, result)
                })
                .collect();

            for (i, tries, result) in results {
                attempts[i] = tries;
                match result {
                    Ok(()) => states[i] = TaskState::Succeeded,
                    Err(message) => {
                        states[i] = TaskState::Failed;
                        errors[i] = Some(message);
                        for d in dag.downstream_closure(i) {
                            if states[d] == TaskState::Pending {
                                states[d] = TaskState::Skipped;
                            }
                        }
                    }
                }
            }
        }

        let report = RunReport {
            tasks: dag
                .tasks()
                .iter()
                .enumerate()
                .map(|(i, task)| TaskOutcome {
                    id: task.id().to_string(),
                    state: states[i],
                    attempts: attempts[i],
                    error: errors[i].take(),
                    optional: task.is_optional(),
                })
                .collect(),
            cancelled: self.cancel.is_cancelled(),
        };

        info!(
            succeeded = report.succeeded(),
            cancelled = report.cancelled,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "pipeline run finished"
        );
        Ok(report)
    }

    /// attempts until success, a configuration error, or the retry budget runs out
    fn run_task(&self, task: &Task) -> (u32, std::result::Result<(), String>) {
        let mut attempt = 0;
        loop {
            attempt += 1;
            info!(task = task.id(), attempt, "starting task");

            let err = match task.run() {
                Ok(()) => {
                    info!(task = task.id(), attempt, "task succeeded");
                    return (attempt, Ok(()));
                }
                Err(e) => e,
            };

            let message = format!("{err:#}");
            let bad_input = err
                .downcast_ref::<Error>()
                .is_some_and(Error::is_configuration_error);
            if bad_input {
                error!(task = task.id(), error = %message, "task halted on bad input, not retrying");
                return (attempt, Err(message));
            }

            match self.retry.next_delay(attempt) {
                Some(delay) if !self.cancel.is_cancelled() => {
                    warn!(task = task.id(), attempt, error = %message, "task failed, retrying");
                    std::thread::sleep(delay);
                }
                _ => {
                    error!(task = task.id(), attempts = attempt, error = %message, "task failed");
                    return (attempt, Err(message));
                }
            }
        }
    }
}
