//! Resumable phase engine primitives: identifiers, dependency vectors,
//! restart resolution and output existence checks.

pub mod dependency;
pub mod ids;
pub mod outputs;
pub mod restart;

pub use dependency::{DependencyVector, Slot, SlotState, TaskSlot};
pub use ids::{format_restart_spec, parse_restart_spec, Identifier, JobId};
pub use outputs::{CheckResult, Completeness, OutputChecker};
pub use restart::{Resolution, RestartResolver};
