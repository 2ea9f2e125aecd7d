//! Phase sequencing with transition validation.
//!
//! `PipelineState` tracks where one iteration is in its phase sequence and
//! rejects out-of-order entries, so a wiring mistake in the runner surfaces
//! as an error instead of as jobs chained on the wrong predecessors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::{GenomeRole, Mode, PhaseKind};

/// How a phase was left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseEntry {
    /// The phase controller ran.
    Ran,
    /// Bypassed by skip-ahead.
    Bypassed,
}

/// A record of a phase visit with timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseHistoryEntry {
    pub phase: PhaseKind,
    pub role: GenomeRole,
    pub entry: PhaseEntry,
    pub entered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    mode: Mode,
    current: Option<(PhaseKind, GenomeRole)>,
    phase_history: Vec<PhaseHistoryEntry>,
}

impl PipelineState {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            current: None,
            phase_history: Vec::new(),
        }
    }

    /// Check if entering `(phase, role)` is valid from the current position.
    ///
    /// The phase must belong to the mode, and positions only move forward:
    /// by phase order first, then train before eval for per-role phases.
    pub fn can_enter(&self, phase: PhaseKind, role: GenomeRole) -> bool {
        if !self.mode.phases().contains(&phase) {
            return false;
        }
        if phase.is_per_role() == (role == GenomeRole::None) {
            return false;
        }
        match self.current {
            None => true,
            Some(current) => (phase, role) > current,
        }
    }

    pub fn enter(&mut self, phase: PhaseKind, role: GenomeRole) -> Result<()> {
        self.push(phase, role, PhaseEntry::Ran)
    }

    /// Record a phase as bypassed by skip-ahead.
    pub fn bypass(&mut self, phase: PhaseKind, role: GenomeRole) -> Result<()> {
        self.push(phase, role, PhaseEntry::Bypassed)
    }

    fn push(&mut self, phase: PhaseKind, role: GenomeRole, entry: PhaseEntry) -> Result<()> {
        if !self.can_enter(phase, role) {
            return Err(Error::InvalidPhaseTransition {
                from: self
                    .current
                    .map(|(p, r)| format!("{}:{}", p, r))
                    .unwrap_or_else(|| "start".to_string()),
                to: format!("{}:{}", phase, role),
            });
        }
        self.current = Some((phase, role));
        self.phase_history.push(PhaseHistoryEntry {
            phase,
            role,
            entry,
            entered_at: Utc::now(),
        });
        Ok(())
    }

    pub fn current_phase(&self) -> Option<PhaseKind> {
        self.current.map(|(p, _)| p)
    }

    /// Whether the mode's last phase has been reached.
    pub fn is_complete(&self) -> bool {
        self.current_phase() == self.mode.phases().last().copied()
    }

    pub fn phase_history(&self) -> &[PhaseHistoryEntry] {
        &self.phase_history
    }

    pub fn bypassed(&self) -> impl Iterator<Item = &PhaseHistoryEntry> {
        self.phase_history
            .iter()
            .filter(|e| e.entry == PhaseEntry::Bypassed)
    }
}
