//! Restart interpretation.
//!
//! Turns a prior per-task identifier vector into the set of task indices to
//! (re)submit. The resolver is a pure function of its inputs, which is what
//! makes a run safe to re-invoke: the same spec and task count always yield
//! the same work-set.

use std::collections::BTreeSet;

use serde::Serialize;

use super::dependency::{DependencyVector, Slot};
use super::ids::Identifier;
use crate::{tlog_debug, Error, Result};

/// Outcome of interpreting a restart spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    /// Task indices to (re)submit.
    pub to_run: BTreeSet<usize>,
    /// Task indices already covered by a submitted job.
    pub to_skip: BTreeSet<usize>,
    /// Slots known before anything is submitted: ids for skipped tasks,
    /// "not required" elsewhere. Collapsed when the phase is complete.
    pub vector: DependencyVector,
}

impl Resolution {
    /// Nothing to submit and nothing to wait on downstream.
    pub fn is_complete(&self) -> bool {
        self.to_run.is_empty()
    }
}

/// Interprets restart specs for one phase.
#[derive(Debug, Clone)]
pub struct RestartResolver {
    phase: String,
}

impl RestartResolver {
    /// `phase` is only used to label errors and log lines.
    pub fn new(phase: &str) -> Self {
        Self {
            phase: phase.to_string(),
        }
    }

    pub fn resolve(&self, prior: Option<&[Identifier]>, expected: usize) -> Result<Resolution> {
        let Some(prior) = prior else {
            return Ok(Self::fresh(expected));
        };

        // Length is checked before any slot is looked at.
        if prior.len() != expected {
            return Err(Error::LengthMismatch {
                phase: self.phase.clone(),
                expected,
                found: prior.len(),
            });
        }

        if prior.iter().all(Identifier::is_not_required) {
            tlog_debug!("{}: restart spec is all None, treating as fresh", self.phase);
            return Ok(Self::fresh(expected));
        }

        let mut to_run = BTreeSet::new();
        let mut to_skip = BTreeSet::new();
        let mut slots = vec![Slot::NotRequired; expected];

        for (position, id) in prior.iter().enumerate() {
            match id {
                Identifier::SchedulerId(job) => {
                    to_skip.insert(position);
                    slots[position] = Slot::job(job.clone());
                }
                Identifier::TaskIndex(index) => {
                    if *index >= expected {
                        return Err(Error::TaskIndexOutOfRange {
                            phase: self.phase.clone(),
                            index: *index,
                            expected,
                        });
                    }
                    to_run.insert(*index);
                }
                Identifier::NotRequired => {}
            }
        }

        // A position holding a trusted id cannot also be resubmitted by index.
        if let Some(&index) = to_run.intersection(&to_skip).next() {
            return Err(Error::ConflictingRestart {
                phase: self.phase.clone(),
                index,
                job: prior[index].to_string(),
            });
        }

        if to_run.len() > expected {
            return Err(Error::TooManyTasks {
                phase: self.phase.clone(),
                requested: to_run.len(),
                expected,
            });
        }

        tlog_debug!(
            "{}: restart spec resolved run={:?} skip={:?}",
            self.phase,
            to_run,
            to_skip
        );

        if to_run.is_empty() {
            return Ok(Resolution {
                to_run,
                to_skip,
                vector: DependencyVector::collapsed(),
            });
        }

        Ok(Resolution {
            to_run,
            to_skip,
            vector: DependencyVector::from_slots(slots),
        })
    }

    fn fresh(expected: usize) -> Resolution {
        Resolution {
            to_run: (0..expected).collect(),
            to_skip: BTreeSet::new(),
            vector: DependencyVector::not_required(expected),
        }
    }
}
