//! Recorded vectors joined with live scheduler state.

use serde::Serialize;

use super::submitter::{JobState, SchedulerStatus};
use crate::core::{format_restart_spec, DependencyVector, Identifier, Slot};
use crate::state::JobLedger;
use crate::{tlog_warn, Result};

#[derive(Debug, Clone, Serialize)]
pub struct SlotStatus {
    pub index: usize,
    pub slot: Slot,
    /// Scheduler state for job slots; `None` for the rest.
    pub state: Option<JobState>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordStatus {
    /// `<genome>/<phase>/<role>` ledger key.
    pub key: String,
    pub slots: Vec<SlotStatus>,
    /// Restart spec that resubmits only what failed, if anything did.
    pub suggestion: Option<Vec<Identifier>>,
}

impl RecordStatus {
    /// The `--restart` argument for the suggestion.
    pub fn restart_arg(&self) -> Option<String> {
        let spec = self.suggestion.as_ref()?;
        let mut parts = self.key.rsplitn(3, '/');
        let role = parts.next()?;
        let phase = parts.next()?;
        let target = if role == "none" {
            phase.to_string()
        } else {
            format!("{}:{}", phase, role)
        };
        Some(format!("--restart {}={}", target, format_restart_spec(spec)))
    }
}

/// Restart spec for a recorded vector given each slot's scheduler state.
///
/// Failed submissions and jobs that ended without success become task
/// indices; live or finished jobs keep their ids. Returns `None` when
/// nothing needs resubmitting.
pub fn suggest_restart(vector: &DependencyVector, states: &[Option<JobState>]) -> Option<Vec<Identifier>> {
    let mut rerun = false;
    let spec: Vec<Identifier> = vector
        .slots()
        .iter()
        .enumerate()
        .map(|(i, slot)| match slot {
            Slot::Job { id } => {
                if states.get(i).copied().flatten().is_some_and(|s| s.needs_resubmit()) {
                    rerun = true;
                    Identifier::TaskIndex(i)
                } else {
                    Identifier::SchedulerId(id.clone())
                }
            }
            Slot::Failed { .. } => {
                rerun = true;
                Identifier::TaskIndex(i)
            }
            Slot::NotRequired => Identifier::NotRequired,
        })
        .collect();
    rerun.then_some(spec)
}

/// Status of every ledger record under `prefix`.
///
/// A failed `sacct` lookup is logged and reported as unknown.
pub fn inspect(
    ledger: &JobLedger,
    prefix: &str,
    scheduler: &dyn SchedulerStatus,
) -> Result<Vec<RecordStatus>> {
    let mut out = Vec::new();
    for (key, record) in ledger.records_with_prefix(prefix) {
        let states: Vec<Option<JobState>> = record
            .vector
            .slots()
            .iter()
            .map(|slot| {
                slot.job_id().map(|id| {
                    scheduler.state(id).unwrap_or_else(|e| {
                        tlog_warn!("{}: cannot query job {}: {}", key, id, e);
                        JobState::Unknown
                    })
                })
            })
            .collect();

        out.push(RecordStatus {
            key: key.clone(),
            suggestion: suggest_restart(&record.vector, &states),
            slots: record
                .vector
                .slots()
                .iter()
                .cloned()
                .zip(states)
                .enumerate()
                .map(|(index, (slot, state))| SlotStatus { index, slot, state })
                .collect(),
        });
    }
    Ok(out)
}
