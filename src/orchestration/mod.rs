//! Orchestration layer: phases, the controller that runs them, job
//! submission, and the pipeline runner that sequences everything.

mod phase;
pub mod phases;
mod runner;
mod slurm;
mod status;
mod submitter;

pub use phase::{FanIn, Handoff, Phase, PhaseController, PhaseOutcome};
pub use phases::{phase_for, selected_checkpoint_path};
pub use runner::{IterationReport, PipelineRunner, RestartOverrides, RunReport};
pub use slurm::{parse_parsable, parse_sacct_state, SlurmSubmitter};
pub use status::{inspect, suggest_restart, RecordStatus, SlotStatus};
pub use submitter::{
    format_dependencies, CommandDescriptor, DryRunSubmitter, JobState, JobSubmitter,
    SchedulerStatus,
};
