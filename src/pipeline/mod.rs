//! dag orchestration: dependencies, retries, parallel waves, daily schedule

pub mod dag;
pub mod executor;
pub mod retry;
pub mod schedule;

pub use dag::{Dag, Task, TaskAction};
pub use executor::{CancelHandle, Executor, RunReport, TaskOutcome, TaskState};
pub use retry::RetryPolicy;
pub use schedule::DailySchedule;
