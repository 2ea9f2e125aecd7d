//! Job submission contract.
//!
//! A phase controller hands each task to a `JobSubmitter` together with the
//! ids it must wait on. The dependency list is conjunctive: the job may only
//! start once every listed job has succeeded. An empty list means no
//! predecessor.

use std::path::PathBuf;

use serde::Serialize;

use crate::config::Resources;
use crate::core::JobId;
use crate::workflow::PhaseKind;
use crate::{tlog, Result};

/// Everything needed to submit one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandDescriptor {
    pub job_name: String,
    pub phase: PhaseKind,
    pub task: usize,
    /// Shell lines run by the job, already rendered.
    pub lines: Vec<String>,
    pub resources: Resources,
    /// Where the scheduler writes the job's stdout/stderr.
    pub log_path: PathBuf,
}

/// Scheduler-side state of a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Unknown,
}

impl JobState {
    /// Finished without producing its outputs.
    pub fn needs_resubmit(&self) -> bool {
        matches!(self, JobState::Failed | JobState::Cancelled)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::Running => write!(f, "running"),
            JobState::Completed => write!(f, "completed"),
            JobState::Failed => write!(f, "failed"),
            JobState::Cancelled => write!(f, "cancelled"),
            JobState::Unknown => write!(f, "unknown"),
        }
    }
}

pub trait JobSubmitter {
    /// Submit one task; returns the scheduler's job id.
    ///
    /// Errors are per-task: callers record them and move on to the next task.
    fn submit(&mut self, command: &CommandDescriptor, depends_on: &[JobId]) -> Result<JobId>;

    /// Whether ids returned by this submitter are fabricated.
    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Look up job states in the scheduler's accounting.
pub trait SchedulerStatus {
    fn state(&self, id: &JobId) -> Result<JobState>;
}

/// Records what would be submitted and fabricates placeholder ids.
///
/// Placeholder ids follow the real 8-digit convention so that every
/// downstream decision matches what a real run would make.
#[derive(Debug, Default)]
pub struct DryRunSubmitter {
    submitted: Vec<(CommandDescriptor, Vec<JobId>)>,
}

/// First fabricated id; real SLURM ids on our clusters are far below this.
const DRY_RUN_BASE: u64 = 90_000_000;

impl DryRunSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted(&self) -> &[(CommandDescriptor, Vec<JobId>)] {
        &self.submitted
    }
}

impl JobSubmitter for DryRunSubmitter {
    fn submit(&mut self, command: &CommandDescriptor, depends_on: &[JobId]) -> Result<JobId> {
        let id = JobId::parse(&format!("{:08}", DRY_RUN_BASE + self.submitted.len() as u64 + 1))?;
        tlog!(
            "[dry-run] {} -> {} (after {})",
            command.job_name,
            id,
            format_dependencies(depends_on).unwrap_or_else(|| "nothing".to_string())
        );
        self.submitted.push((command.clone(), depends_on.to_vec()));
        Ok(id)
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}

/// `afterok:<id>:<id>` or `None` when there is nothing to wait on.
pub fn format_dependencies(depends_on: &[JobId]) -> Option<String> {
    if depends_on.is_empty() {
        return None;
    }
    let ids: Vec<&str> = depends_on.iter().map(JobId::as_str).collect();
    Some(format!("afterok:{}", ids.join(":")))
}
