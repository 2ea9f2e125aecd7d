//! Per-task slots and the dependency vector a phase hands to the next one.

use serde::{Deserialize, Serialize};

use super::ids::{Identifier, JobId};
use crate::{Error, Result};

/// Final state of one task slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum Slot {
    /// Submitted (now or by an earlier invocation) under this id.
    Job { id: JobId },
    /// Nothing to run and nothing to wait on.
    NotRequired,
    /// Submission failed; nothing to wait on, but downstream must not
    /// treat the task as done.
    Failed {
        /// Error message describing the failure.
        error: String,
    },
}

impl Slot {
    pub fn job(id: JobId) -> Self {
        Slot::Job { id }
    }

    pub fn failed(error: &str) -> Self {
        Slot::Failed {
            error: error.to_string(),
        }
    }

    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            Slot::Job { id } => Some(id),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Slot::Failed { .. })
    }

    /// How the slot at `position` reads back as a restart spec entry.
    ///
    /// Failed slots read back as their own task index so the next
    /// invocation retries them.
    pub fn as_identifier(&self, position: usize) -> Identifier {
        match self {
            Slot::Job { id } => Identifier::SchedulerId(id.clone()),
            Slot::NotRequired => Identifier::NotRequired,
            Slot::Failed { .. } => Identifier::TaskIndex(position),
        }
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Slot::Job { id } => write!(f, "{}", id),
            Slot::NotRequired => write!(f, "None"),
            Slot::Failed { .. } => write!(f, "Failed"),
        }
    }
}

/// Lifecycle of a slot while its phase is running.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SlotState {
    /// Not yet decided.
    #[default]
    Pending,
    /// Decided.
    Resolved(Slot),
}

/// One parallel unit of a phase.
#[derive(Debug, Clone)]
pub struct TaskSlot {
    /// 0-based task index.
    pub index: usize,
    /// Expected-output pattern for this task.
    pub pattern: String,
    pub state: SlotState,
}

impl TaskSlot {
    pub fn new(index: usize, pattern: String) -> Self {
        Self {
            index,
            pattern,
            state: SlotState::Pending,
        }
    }

    pub fn resolve(&mut self, slot: Slot) {
        self.state = SlotState::Resolved(slot);
    }

    /// Finalize into a slot; anything still pending was never asked to run.
    fn into_slot(self) -> Slot {
        match self.state {
            SlotState::Pending => Slot::NotRequired,
            SlotState::Resolved(slot) => slot,
        }
    }
}

/// Ordered per-task slots produced by one phase.
///
/// Either exactly as long as the phase's task count, or the single-element
/// collapsed sentinel meaning "the whole phase was satisfied by skipping".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencyVector {
    slots: Vec<Slot>,
}

impl DependencyVector {
    /// Vector of `len` "not required" slots (not collapsed).
    pub fn not_required(len: usize) -> Self {
        Self {
            slots: vec![Slot::NotRequired; len],
        }
    }

    /// The single-element "satisfied by skip" sentinel.
    pub fn collapsed() -> Self {
        Self::not_required(1)
    }

    pub fn from_slots(slots: Vec<Slot>) -> Self {
        Self { slots }
    }

    /// Finalize a phase's task slots, checking the length invariant.
    ///
    /// The result is always full length; see `collapse_if_idle`.
    pub fn finalize(phase: &str, expected: usize, tasks: Vec<TaskSlot>) -> Result<Self> {
        if tasks.len() != expected {
            return Err(Error::LengthMismatch {
                phase: phase.to_string(),
                expected,
                found: tasks.len(),
            });
        }
        Ok(Self {
            slots: tasks.into_iter().map(TaskSlot::into_slot).collect(),
        })
    }

    /// Collapse to the sentinel if every slot is "not required".
    pub fn collapse_if_idle(self) -> Self {
        if self.slots.iter().all(|s| *s == Slot::NotRequired) {
            Self::collapsed()
        } else {
            self
        }
    }

    /// Whether this is the single-element sentinel.
    pub fn is_collapsed(&self) -> bool {
        self.slots.len() == 1 && self.slots[0] == Slot::NotRequired
    }

    /// Whether downstream has nothing to wait on.
    pub fn is_idle(&self) -> bool {
        self.slots.iter().all(|s| *s == Slot::NotRequired)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Every job id in slot order.
    pub fn job_ids(&self) -> Vec<JobId> {
        self.slots.iter().filter_map(Slot::job_id).cloned().collect()
    }

    pub fn has_failures(&self) -> bool {
        self.slots.iter().any(Slot::is_failed)
    }

    /// Indices of failed slots.
    pub fn failed_indices(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_failed())
            .map(|(i, _)| i)
            .collect()
    }

    /// Check the length invariant against a declared task count.
    ///
    /// The collapsed sentinel is accepted for any count.
    pub fn check_len(&self, phase: &str, expected: usize) -> Result<()> {
        if self.is_collapsed() || self.slots.len() == expected {
            Ok(())
        } else {
            Err(Error::LengthMismatch {
                phase: phase.to_string(),
                expected,
                found: self.slots.len(),
            })
        }
    }

    /// Read back as a restart spec; the collapsed sentinel reads as absent.
    pub fn as_restart_spec(&self) -> Option<Vec<Identifier>> {
        if self.is_collapsed() {
            None
        } else {
            Some(
                self.slots
                    .iter()
                    .enumerate()
                    .map(|(i, s)| s.as_identifier(i))
                    .collect(),
            )
        }
    }
}

impl std::fmt::Display for DependencyVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.slots.iter().map(|s| s.to_string()).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}
