//! Curriculum position for one pipeline pass.
//!
//! An `Iteration` is never mutated once built. When a derived fact becomes
//! known mid-run (for example how many region files a genome was split
//! into) the runner builds a replacement with one of the `with_*` methods.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use super::types::{GenomeRole, Mode};
use crate::config::Config;
use crate::core::JobId;
use crate::{Error, Result};

/// Mode flags shared by every phase of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunFlags {
    pub debug: bool,
    pub dry_run: bool,
    pub overwrite: bool,
}

#[derive(Debug, Clone)]
pub struct Iteration {
    pub mode: Mode,
    /// Role of the phases currently being run.
    pub role: GenomeRole,
    pub trio_num: Option<u32>,
    /// 1-based position of this genome in the curriculum.
    pub current_genome_num: usize,
    pub next_genome_num: Option<usize>,
    pub total_genomes: usize,
    pub train_genome: Option<String>,
    pub eval_genome: Option<String>,
    /// Genome trained immediately before this one; its selected
    /// checkpoint warm-starts this iteration.
    pub prior_genome: Option<String>,
    pub train_num_regions: Option<usize>,
    pub eval_num_regions: Option<usize>,
    pub flags: RunFlags,
    /// Select-checkpoint job recorded outside this run; when present the
    /// training phases are skipped for this genome.
    pub satisfied_by: Option<JobId>,
    pub config: Arc<Config>,
}

impl Iteration {
    /// Baseline benchmarking pass, not tied to any training genome.
    pub fn baseline(config: Arc<Config>, flags: RunFlags) -> Self {
        Self {
            mode: Mode::Baseline,
            role: GenomeRole::None,
            trio_num: None,
            current_genome_num: 0,
            next_genome_num: None,
            total_genomes: 0,
            train_genome: None,
            eval_genome: None,
            prior_genome: None,
            train_num_regions: None,
            eval_num_regions: None,
            flags,
            satisfied_by: None,
            config,
        }
    }

    /// Short unique name used for ledger keys and log lines.
    pub fn label(&self) -> String {
        match (&self.trio_num, &self.train_genome) {
            (Some(trio), Some(genome)) => format!("trio{}-{}", trio, genome),
            _ => self.genome_label(GenomeRole::None),
        }
    }

    /// Sample name the given role's files are named after.
    pub fn genome_label(&self, role: GenomeRole) -> String {
        match role {
            GenomeRole::Train => self.train_genome.clone().unwrap_or_default(),
            GenomeRole::Eval => self.eval_genome.clone().unwrap_or_default(),
            GenomeRole::None => match (&self.mode, &self.train_genome) {
                (Mode::Baseline, _) | (_, None) => format!(
                    "baseline-{}",
                    self.config.baseline_checkpoint.as_deref().unwrap_or("default")
                ),
                (_, Some(genome)) => genome.clone(),
            },
        }
    }

    /// Directory everything for this genome lands in.
    pub fn genome_dir(&self) -> PathBuf {
        self.config.run_dir().join(self.genome_label(GenomeRole::None))
    }

    pub fn num_regions(&self, role: GenomeRole) -> Option<usize> {
        match role {
            GenomeRole::Train => self.train_num_regions,
            GenomeRole::Eval => self.eval_num_regions,
            GenomeRole::None => None,
        }
    }

    /// Region count for a role, failing if it has not been established.
    pub fn require_regions(&self, role: GenomeRole) -> Result<usize> {
        match self.num_regions(role) {
            Some(n) if n > 0 => Ok(n),
            _ => Err(Error::MissingUpstream(format!(
                "region count for {} genome '{}'",
                role,
                self.genome_label(role)
            ))),
        }
    }

    pub fn num_tests(&self) -> usize {
        self.config.tests.len()
    }

    pub fn with_role(&self, role: GenomeRole) -> Self {
        Self {
            role,
            ..self.clone()
        }
    }

    pub fn with_regions(&self, role: GenomeRole, count: usize) -> Self {
        let mut next = self.clone();
        match role {
            GenomeRole::Train => next.train_num_regions = Some(count),
            GenomeRole::Eval => next.eval_num_regions = Some(count),
            GenomeRole::None => {}
        }
        next
    }
}
