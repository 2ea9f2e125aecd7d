//! Expansion of the configured trios into an ordered list of iterations.

use std::sync::Arc;

use super::iteration::{Iteration, RunFlags};
use super::types::{GenomeRole, Mode, PhaseKind};
use crate::config::Config;
use crate::core::JobId;
use crate::{Error, Result};

/// Every training genome in curriculum order, two per trio.
#[derive(Debug, Clone)]
pub struct Curriculum {
    config: Arc<Config>,
}

impl Curriculum {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Number of training genomes (two parents per trio).
    pub fn total_genomes(&self) -> usize {
        self.config.curriculum.len() * 2
    }

    /// Build the iterations a mode walks through.
    ///
    /// Training iterations train on one parent and evaluate on the trio's
    /// child. Demo keeps only the first iteration, restricted to a single
    /// region.
    pub fn iterations(&self, mode: Mode, flags: RunFlags) -> Result<Vec<Iteration>> {
        // Benchmarking phases run one task per test genome.
        if mode.phases().contains(&PhaseKind::CallVariants) && self.config.tests.is_empty() {
            return Err(Error::Config(format!(
                "{} mode benchmarks on test genomes but no [[tests]] are configured",
                mode
            )));
        }

        if mode == Mode::Baseline {
            return Ok(vec![Iteration::baseline(self.config.clone(), flags)]);
        }

        if self.config.curriculum.is_empty() {
            return Err(Error::Config(format!(
                "{} mode needs at least one [[curriculum]] trio",
                mode
            )));
        }

        let total = self.total_genomes();
        let first = self.config.first_parent;
        let mut iterations = Vec::with_capacity(total);
        let mut prior_genome: Option<String> = None;

        for entry in &self.config.curriculum {
            for parent in [first, first.other()] {
                let genome = entry.parent(parent).to_string();
                let current = iterations.len() + 1;
                let satisfied_by = entry
                    .satisfied_by
                    .get(&genome)
                    .map(|raw| JobId::parse(raw))
                    .transpose()?;

                iterations.push(Iteration {
                    mode,
                    role: GenomeRole::Train,
                    trio_num: Some(entry.trio),
                    current_genome_num: current,
                    next_genome_num: (current < total).then_some(current + 1),
                    total_genomes: total,
                    train_genome: Some(genome.clone()),
                    eval_genome: Some(entry.child.clone()),
                    prior_genome: prior_genome.replace(genome),
                    train_num_regions: None,
                    eval_num_regions: None,
                    flags,
                    satisfied_by,
                    config: self.config.clone(),
                });
            }
        }

        if mode == Mode::Demo {
            iterations.truncate(1);
            return Ok(iterations
                .into_iter()
                .map(|itr| Iteration {
                    next_genome_num: None,
                    satisfied_by: None,
                    ..itr.with_regions(GenomeRole::Train, 1)
                })
                .collect());
        }

        Ok(iterations)
    }
}
