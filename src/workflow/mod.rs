//! Curriculum position and phase sequencing for the retraining pipeline.

mod curriculum;
mod iteration;
mod state;
mod types;

pub use curriculum::Curriculum;
pub use iteration::{Iteration, RunFlags};
pub use state::{PhaseEntry, PhaseHistoryEntry, PipelineState};
pub use types::{GenomeRole, Mode, PhaseKind};
