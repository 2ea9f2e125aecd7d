use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::JobId;
use crate::{tlog_debug, Error, Result};

/// Per-phase `#SBATCH` resource requests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Resources {
    #[serde(default = "default_time")]
    pub time: String,
    #[serde(default = "default_mem")]
    pub mem: String,
    #[serde(default = "default_cpus")]
    pub cpus_per_task: u32,
    pub gpus: Option<u32>,
}

fn default_time() -> String {
    "12:00:00".to_string()
}

fn default_mem() -> String {
    "16G".to_string()
}

fn default_cpus() -> u32 {
    4
}

impl Default for Resources {
    fn default() -> Self {
        Self {
            time: default_time(),
            mem: default_mem(),
            cpus_per_task: default_cpus(),
            gpus: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_sbatch")]
    pub sbatch: String,
    #[serde(default = "default_sacct")]
    pub sacct: String,
    pub partition: Option<String>,
    pub account: Option<String>,
    /// Passed through to every `sbatch` call.
    #[serde(default)]
    pub extra_args: Vec<String>,
    /// Keyed by phase name (`examples`, `train_eval`, ...).
    #[serde(default)]
    pub resources: BTreeMap<String, Resources>,
}

fn default_sbatch() -> String {
    "sbatch".to_string()
}

fn default_sacct() -> String {
    "sacct".to_string()
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sbatch: default_sbatch(),
            sacct: default_sacct(),
            partition: None,
            account: None,
            extra_args: Vec::new(),
            resources: BTreeMap::new(),
        }
    }
}

impl SchedulerConfig {
    pub fn resources_for(&self, phase: &str) -> Resources {
        self.resources.get(phase).cloned().unwrap_or_default()
    }
}

/// Which parent of a trio is trained on first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Parent {
    #[default]
    Mother,
    Father,
}

impl Parent {
    pub fn other(self) -> Self {
        match self {
            Parent::Mother => Parent::Father,
            Parent::Father => Parent::Mother,
        }
    }
}

/// One trio of the curriculum.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrioEntry {
    pub trio: u32,
    pub child: String,
    pub father: String,
    pub mother: String,
    /// Sample id -> select-checkpoint job id recorded outside this tool.
    /// Parents listed here skip straight to variant calling.
    #[serde(default)]
    pub satisfied_by: BTreeMap<String, String>,
}

impl TrioEntry {
    pub fn parent(&self, which: Parent) -> &str {
        match which {
            Parent::Mother => &self.mother,
            Parent::Father => &self.father,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestGenome {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_run_name")]
    pub run_name: String,
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,
    /// Directory holding `<genome>.region<r>.bed` partition files.
    pub region_dir: Option<PathBuf>,
    #[serde(default = "default_num_shards")]
    pub num_shards: u32,
    #[serde(default)]
    pub first_parent: Parent,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Phase name -> command lines with `{placeholders}`.
    #[serde(default)]
    pub commands: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub curriculum: Vec<TrioEntry>,
    #[serde(default)]
    pub tests: Vec<TestGenome>,
    pub baseline_checkpoint: Option<String>,
}

fn default_run_name() -> String {
    "trioctl_run".to_string()
}

fn default_output_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_num_shards() -> u32 {
    16
}

impl Default for Config {
    fn default() -> Self {
        Self {
            run_name: default_run_name(),
            output_root: default_output_root(),
            region_dir: None,
            num_shards: default_num_shards(),
            first_parent: Parent::default(),
            scheduler: SchedulerConfig::default(),
            commands: BTreeMap::new(),
            curriculum: Vec::new(),
            tests: Vec::new(),
            baseline_checkpoint: None,
        }
    }
}

impl Config {
    pub fn trioctl_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".trioctl"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::trioctl_dir()?.join("trioctl.toml"))
    }

    /// Root of everything this run writes.
    pub fn run_dir(&self) -> PathBuf {
        self.output_root.join(&self.run_name)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.run_dir().join("job_ledger.json")
    }

    pub fn env_path(&self) -> PathBuf {
        self.run_dir().join("run.env.toml")
    }

    pub fn script_dir(&self) -> PathBuf {
        self.run_dir().join("scripts")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.run_dir().join("logs")
    }

    pub fn effective_region_dir(&self) -> PathBuf {
        self.region_dir
            .clone()
            .unwrap_or_else(|| self.run_dir().join("regions"))
    }

    /// Command template for a phase, falling back to a generic task launcher.
    pub fn command_template(&self, phase: &str) -> Vec<String> {
        self.commands
            .get(phase)
            .cloned()
            .unwrap_or_else(|| vec![format!("trioctl-task {} --genome {{genome}} --task {{task}}", phase)])
    }

    /// Load from the default location, falling back to defaults when absent.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        tlog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            tlog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load from an explicit path; a missing file is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Config(format!("{} does not exist", path.display())));
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        tlog_debug!(
            "Config loaded: run_name={}, trios={}, tests={}",
            config.run_name,
            config.curriculum.len(),
            config.tests.len()
        );
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        tlog_debug!("Config saved to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.run_name.trim().is_empty() {
            return Err(Error::Config("run_name cannot be empty".to_string()));
        }
        if self.num_shards == 0 {
            return Err(Error::Config("num_shards must be at least 1".to_string()));
        }
        for entry in &self.curriculum {
            for sample in [&entry.child, &entry.father, &entry.mother] {
                if sample.trim().is_empty() {
                    return Err(Error::Config(format!("trio {} has an empty sample id", entry.trio)));
                }
            }
            for (sample, job) in &entry.satisfied_by {
                if sample != &entry.father && sample != &entry.mother {
                    return Err(Error::Config(format!(
                        "trio {}: satisfied_by names {}, which is not a parent",
                        entry.trio, sample
                    )));
                }
                JobId::parse(job)?;
            }
        }
        Ok(())
    }
}
