//! The eight pipeline phases.
//!
//! Each phase only knows its task count, where its outputs land, what they
//! are called, how it fans in, and which placeholders its command template
//! gets. Execution is shared through `PhaseController`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use super::phase::{FanIn, Phase};
use crate::config::Config;
use crate::workflow::{GenomeRole, Iteration, Mode, PhaseKind};
use crate::Result;

fn examples_dir(itr: &Iteration, role: GenomeRole) -> PathBuf {
    itr.config.run_dir().join(itr.genome_label(role)).join("examples")
}

fn train_dir(itr: &Iteration) -> PathBuf {
    let genome = itr.genome_label(GenomeRole::None);
    itr.genome_dir().join(format!("train_{}", genome))
}

fn compare_dir(itr: &Iteration) -> PathBuf {
    let genome = itr.genome_label(GenomeRole::None);
    itr.genome_dir().join(format!("compare_{}", genome))
}

/// Where select_ckpt writes the chosen checkpoint for a training genome.
pub fn selected_checkpoint_path(config: &Config, genome: &str) -> PathBuf {
    config
        .run_dir()
        .join(genome)
        .join(format!("train_{}", genome))
        .join(format!("{}.selected_checkpoint.txt", genome))
}

fn region_vars(itr: &Iteration, role: GenomeRole, task: usize) -> BTreeMap<&'static str, String> {
    let mut vars = BTreeMap::new();
    vars.insert("region", (task + 1).to_string());
    vars.insert(
        "num_regions",
        itr.num_regions(role).unwrap_or_default().to_string(),
    );
    vars
}

fn test_vars(itr: &Iteration, task: usize) -> BTreeMap<&'static str, String> {
    let mut vars = BTreeMap::new();
    vars.insert("test_num", (task + 1).to_string());
    vars.insert(
        "test_name",
        itr.config
            .tests
            .get(task)
            .map(|t| t.name.clone())
            .unwrap_or_default(),
    );
    vars
}

pub struct Examples {
    pub role: GenomeRole,
}

impl Phase for Examples {
    fn kind(&self) -> PhaseKind {
        PhaseKind::Examples
    }

    fn role(&self) -> GenomeRole {
        self.role
    }

    fn expected_task_count(&self, itr: &Iteration) -> Result<usize> {
        itr.require_regions(self.role)
    }

    fn output_location(&self, itr: &Iteration) -> PathBuf {
        examples_dir(itr, self.role)
    }

    fn output_pattern(&self, itr: &Iteration, task: usize) -> String {
        format!(
            "{}.region{}.labeled.tfrecords-?????-of-{:05}.gz",
            itr.genome_label(self.role),
            task + 1,
            itr.config.num_shards
        )
    }

    /// One file per shard.
    fn outputs_per_task(&self, itr: &Iteration) -> usize {
        itr.config.num_shards as usize
    }

    fn aggregate_pattern(&self, itr: &Iteration) -> Option<String> {
        Some(format!(
            "{}.region*.labeled.tfrecords-?????-of-{:05}.gz",
            itr.genome_label(self.role),
            itr.config.num_shards
        ))
    }

    // Examples has no upstream phase; the handoff it receives is always empty.
    fn fan_in(&self) -> FanIn {
        FanIn::PerTask
    }

    fn template_vars(&self, itr: &Iteration, task: usize) -> BTreeMap<&'static str, String> {
        let mut vars = region_vars(itr, self.role, task);
        vars.insert("num_shards", itr.config.num_shards.to_string());
        vars
    }
}

pub struct Shuffle {
    pub role: GenomeRole,
}

impl Phase for Shuffle {
    fn kind(&self) -> PhaseKind {
        PhaseKind::Shuffle
    }

    fn role(&self) -> GenomeRole {
        self.role
    }

    fn expected_task_count(&self, itr: &Iteration) -> Result<usize> {
        itr.require_regions(self.role)
    }

    fn output_location(&self, itr: &Iteration) -> PathBuf {
        examples_dir(itr, self.role)
    }

    fn output_pattern(&self, itr: &Iteration, task: usize) -> String {
        format!(
            "{}.region{}.labeled.shuffled.dataset_config.pbtxt",
            itr.genome_label(self.role),
            task + 1
        )
    }

    fn aggregate_pattern(&self, itr: &Iteration) -> Option<String> {
        Some(format!(
            "{}.region*.labeled.shuffled.dataset_config.pbtxt",
            itr.genome_label(self.role)
        ))
    }

    fn fan_in(&self) -> FanIn {
        FanIn::PerTask
    }

    fn template_vars(&self, itr: &Iteration, task: usize) -> BTreeMap<&'static str, String> {
        region_vars(itr, self.role, task)
    }
}

pub struct ReShuffle {
    pub role: GenomeRole,
}

impl Phase for ReShuffle {
    fn kind(&self) -> PhaseKind {
        PhaseKind::ReShuffle
    }

    fn role(&self) -> GenomeRole {
        self.role
    }

    fn expected_task_count(&self, _itr: &Iteration) -> Result<usize> {
        Ok(1)
    }

    fn output_location(&self, itr: &Iteration) -> PathBuf {
        examples_dir(itr, self.role)
    }

    fn output_pattern(&self, itr: &Iteration, _task: usize) -> String {
        format!(
            "{}.labeled.shuffled.merged.dataset_config.pbtxt",
            itr.genome_label(self.role)
        )
    }

    fn fan_in(&self) -> FanIn {
        FanIn::AllOf
    }

    fn template_vars(&self, itr: &Iteration, _task: usize) -> BTreeMap<&'static str, String> {
        let mut vars = BTreeMap::new();
        vars.insert(
            "num_regions",
            itr.num_regions(self.role).unwrap_or_default().to_string(),
        );
        vars
    }
}

pub struct TrainEval;

impl Phase for TrainEval {
    fn kind(&self) -> PhaseKind {
        PhaseKind::TrainEval
    }

    fn expected_task_count(&self, _itr: &Iteration) -> Result<usize> {
        Ok(1)
    }

    fn output_location(&self, itr: &Iteration) -> PathBuf {
        train_dir(itr)
    }

    fn output_pattern(&self, _itr: &Iteration, _task: usize) -> String {
        "best_checkpoint.txt".to_string()
    }

    fn fan_in(&self) -> FanIn {
        FanIn::AllOf
    }

    fn template_vars(&self, itr: &Iteration, _task: usize) -> BTreeMap<&'static str, String> {
        let mut vars = BTreeMap::new();
        vars.insert("train_genome", itr.genome_label(GenomeRole::Train));
        vars.insert("eval_genome", itr.genome_label(GenomeRole::Eval));
        vars.insert("train_dir", train_dir(itr).display().to_string());
        // First genome of the curriculum starts from the stock model.
        vars.insert(
            "warm_start",
            itr.prior_genome
                .as_deref()
                .map(|g| selected_checkpoint_path(&itr.config, g).display().to_string())
                .unwrap_or_default(),
        );
        vars
    }
}

pub struct SelectCkpt;

impl Phase for SelectCkpt {
    fn kind(&self) -> PhaseKind {
        PhaseKind::SelectCkpt
    }

    fn expected_task_count(&self, _itr: &Iteration) -> Result<usize> {
        Ok(1)
    }

    fn output_location(&self, itr: &Iteration) -> PathBuf {
        train_dir(itr)
    }

    fn output_pattern(&self, itr: &Iteration, _task: usize) -> String {
        format!("{}.selected_checkpoint.txt", itr.genome_label(GenomeRole::None))
    }

    fn fan_in(&self) -> FanIn {
        FanIn::AllOf
    }

    fn template_vars(&self, itr: &Iteration, _task: usize) -> BTreeMap<&'static str, String> {
        let mut vars = BTreeMap::new();
        vars.insert("train_dir", train_dir(itr).display().to_string());
        vars
    }
}

pub struct CallVariants;

impl Phase for CallVariants {
    fn kind(&self) -> PhaseKind {
        PhaseKind::CallVariants
    }

    fn expected_task_count(&self, itr: &Iteration) -> Result<usize> {
        Ok(itr.num_tests())
    }

    fn output_location(&self, itr: &Iteration) -> PathBuf {
        compare_dir(itr)
    }

    fn output_pattern(&self, itr: &Iteration, task: usize) -> String {
        format!("test{}.{}.vcf.gz", task + 1, itr.genome_label(GenomeRole::None))
    }

    fn aggregate_pattern(&self, itr: &Iteration) -> Option<String> {
        Some(format!("test*.{}.vcf.gz", itr.genome_label(GenomeRole::None)))
    }

    fn fan_in(&self) -> FanIn {
        FanIn::AllOf
    }

    fn template_vars(&self, itr: &Iteration, task: usize) -> BTreeMap<&'static str, String> {
        let mut vars = test_vars(itr, task);
        let checkpoint = match (itr.mode, &itr.train_genome) {
            (Mode::Baseline, _) | (_, None) => {
                itr.config.baseline_checkpoint.clone().unwrap_or_default()
            }
            (_, Some(genome)) => selected_checkpoint_path(&itr.config, genome)
                .display()
                .to_string(),
        };
        vars.insert("checkpoint", checkpoint);
        vars
    }
}

pub struct Compare;

impl Phase for Compare {
    fn kind(&self) -> PhaseKind {
        PhaseKind::Compare
    }

    fn expected_task_count(&self, itr: &Iteration) -> Result<usize> {
        Ok(itr.num_tests())
    }

    fn output_location(&self, itr: &Iteration) -> PathBuf {
        compare_dir(itr)
    }

    fn output_pattern(&self, itr: &Iteration, task: usize) -> String {
        format!("happy{}.{}.summary.csv", task + 1, itr.genome_label(GenomeRole::None))
    }

    fn aggregate_pattern(&self, itr: &Iteration) -> Option<String> {
        Some(format!("happy*.{}.summary.csv", itr.genome_label(GenomeRole::None)))
    }

    fn fan_in(&self) -> FanIn {
        FanIn::PerTask
    }

    fn template_vars(&self, itr: &Iteration, task: usize) -> BTreeMap<&'static str, String> {
        test_vars(itr, task)
    }
}

pub struct Convert;

impl Phase for Convert {
    fn kind(&self) -> PhaseKind {
        PhaseKind::Convert
    }

    fn expected_task_count(&self, itr: &Iteration) -> Result<usize> {
        Ok(itr.num_tests())
    }

    fn output_location(&self, itr: &Iteration) -> PathBuf {
        compare_dir(itr)
    }

    fn output_pattern(&self, itr: &Iteration, task: usize) -> String {
        format!(
            "happy{}.{}.total.metrics.csv",
            task + 1,
            itr.genome_label(GenomeRole::None)
        )
    }

    fn aggregate_pattern(&self, itr: &Iteration) -> Option<String> {
        Some(format!(
            "happy*.{}.total.metrics.csv",
            itr.genome_label(GenomeRole::None)
        ))
    }

    fn fan_in(&self) -> FanIn {
        FanIn::PerTask
    }

    fn template_vars(&self, itr: &Iteration, task: usize) -> BTreeMap<&'static str, String> {
        test_vars(itr, task)
    }
}

/// Instantiate the phase for a kind; `role` only matters for per-role phases.
pub fn phase_for(kind: PhaseKind, role: GenomeRole) -> Box<dyn Phase> {
    match kind {
        PhaseKind::Examples => Box::new(Examples { role }),
        PhaseKind::Shuffle => Box::new(Shuffle { role }),
        PhaseKind::ReShuffle => Box::new(ReShuffle { role }),
        PhaseKind::TrainEval => Box::new(TrainEval),
        PhaseKind::SelectCkpt => Box::new(SelectCkpt),
        PhaseKind::CallVariants => Box::new(CallVariants),
        PhaseKind::Compare => Box::new(Compare),
        PhaseKind::Convert => Box::new(Convert),
    }
}
