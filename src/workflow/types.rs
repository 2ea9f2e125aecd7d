//! Core pipeline type definitions.

use serde::{Deserialize, Serialize};

use crate::Error;

/// Phases of the retraining pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    /// Labeled example generation, one task per region.
    Examples,
    /// Per-region shuffle of the labeled examples.
    Shuffle,
    /// Merge of the per-region shuffles into one dataset config.
    ReShuffle,
    /// Model training with concurrent evaluation.
    TrainEval,
    /// Pick the best checkpoint from the evaluation metrics.
    SelectCkpt,
    /// Call variants on each test genome.
    CallVariants,
    /// Compare calls against truth, one task per test genome.
    Compare,
    /// Convert comparison summaries into metrics tables.
    Convert,
}

impl PhaseKind {
    pub const ALL: [PhaseKind; 8] = [
        PhaseKind::Examples,
        PhaseKind::Shuffle,
        PhaseKind::ReShuffle,
        PhaseKind::TrainEval,
        PhaseKind::SelectCkpt,
        PhaseKind::CallVariants,
        PhaseKind::Compare,
        PhaseKind::Convert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseKind::Examples => "examples",
            PhaseKind::Shuffle => "shuffle",
            PhaseKind::ReShuffle => "re_shuffle",
            PhaseKind::TrainEval => "train_eval",
            PhaseKind::SelectCkpt => "select_ckpt",
            PhaseKind::CallVariants => "call_variants",
            PhaseKind::Compare => "compare",
            PhaseKind::Convert => "convert",
        }
    }

    /// Phases that run once per genome role (train and eval).
    pub fn is_per_role(&self) -> bool {
        matches!(
            self,
            PhaseKind::Examples | PhaseKind::Shuffle | PhaseKind::ReShuffle
        )
    }
}

impl std::fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PhaseKind {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        PhaseKind::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s || p.as_str().replace('_', "-") == s)
            .ok_or_else(|| Error::Config(format!("unknown phase '{}'", s)))
    }
}

/// Role of the genome a phase works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GenomeRole {
    Train,
    Eval,
    /// Not tied to a training genome (baseline and test-genome phases).
    #[default]
    None,
}

impl GenomeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenomeRole::Train => "train",
            GenomeRole::Eval => "eval",
            GenomeRole::None => "none",
        }
    }
}

impl std::fmt::Display for GenomeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for GenomeRole {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "train" => Ok(GenomeRole::Train),
            "eval" => Ok(GenomeRole::Eval),
            "none" => Ok(GenomeRole::None),
            other => Err(Error::Config(format!("unknown genome role '{}'", other))),
        }
    }
}

/// What a pipeline invocation is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Full curriculum: build examples, train, select, then benchmark.
    #[default]
    Retrain,
    /// Benchmark the untrained baseline checkpoint on the test genomes.
    Baseline,
    /// Example generation for a single region of the first genome.
    Demo,
    /// Benchmark existing checkpoints without training.
    Benchmark,
}

impl Mode {
    /// Phases this mode runs, in order.
    pub fn phases(&self) -> &'static [PhaseKind] {
        match self {
            Mode::Retrain => &PhaseKind::ALL,
            Mode::Demo => &[PhaseKind::Examples, PhaseKind::Shuffle, PhaseKind::ReShuffle],
            Mode::Baseline | Mode::Benchmark => &[
                PhaseKind::CallVariants,
                PhaseKind::Compare,
                PhaseKind::Convert,
            ],
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "retrain" => Ok(Mode::Retrain),
            "baseline" => Ok(Mode::Baseline),
            "demo" => Ok(Mode::Demo),
            "benchmark" => Ok(Mode::Benchmark),
            other => Err(Error::Config(format!("unknown mode '{}'", other))),
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Retrain => write!(f, "retrain"),
            Mode::Baseline => write!(f, "baseline"),
            Mode::Demo => write!(f, "demo"),
            Mode::Benchmark => write!(f, "benchmark"),
        }
    }
}
