use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::SchedulerConfig;
use crate::core::JobId;
use crate::{tlog_debug, tlog_trace, tlog_warn, Error, Result};

use super::submitter::{format_dependencies, CommandDescriptor, JobState, JobSubmitter, SchedulerStatus};

/// Submits jobs with `sbatch` and reads their state back with `sacct`.
pub struct SlurmSubmitter {
    config: SchedulerConfig,
    script_dir: PathBuf,
}

impl SlurmSubmitter {
    /// Fails early if the submit program cannot be found.
    pub fn new(config: SchedulerConfig, script_dir: &Path) -> Result<Self> {
        let sbatch = which::which(&config.sbatch)
            .map_err(|e| Error::Scheduler(format!("cannot find '{}': {}", config.sbatch, e)))?;
        tlog_debug!("SlurmSubmitter::new sbatch={}", sbatch.display());
        Ok(Self::with_unchecked_program(config, script_dir))
    }

    /// Skip the PATH lookup (status queries only need `sacct`).
    pub fn with_unchecked_program(config: SchedulerConfig, script_dir: &Path) -> Self {
        Self {
            config,
            script_dir: script_dir.to_path_buf(),
        }
    }

    /// Render the batch script for one task.
    pub fn render_script(&self, command: &CommandDescriptor) -> String {
        let res = &command.resources;
        let mut script = vec![
            "#!/bin/bash".to_string(),
            format!("#SBATCH --job-name={}", command.job_name),
            format!("#SBATCH --output={}", command.log_path.display()),
            format!("#SBATCH --time={}", res.time),
            format!("#SBATCH --mem={}", res.mem),
            format!("#SBATCH --cpus-per-task={}", res.cpus_per_task),
        ];
        if let Some(gpus) = res.gpus {
            script.push(format!("#SBATCH --gres=gpu:{}", gpus));
        }
        if let Some(partition) = &self.config.partition {
            script.push(format!("#SBATCH --partition={}", partition));
        }
        if let Some(account) = &self.config.account {
            script.push(format!("#SBATCH --account={}", account));
        }
        script.push(String::new());
        script.push("set -euo pipefail".to_string());
        script.extend(command.lines.iter().cloned());
        script.push(String::new());
        script.join("\n")
    }

    fn write_script(&self, command: &CommandDescriptor) -> Result<PathBuf> {
        fs::create_dir_all(&self.script_dir)?;
        if let Some(parent) = command.log_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let path = self.script_dir.join(format!("{}.sh", command.job_name));
        fs::write(&path, self.render_script(command))?;
        Ok(path)
    }
}

impl JobSubmitter for SlurmSubmitter {
    fn submit(&mut self, command: &CommandDescriptor, depends_on: &[JobId]) -> Result<JobId> {
        let script = self
            .write_script(command)
            .map_err(|e| Error::Submission(format!("{}: cannot write script: {}", command.job_name, e)))?;

        let mut sbatch = Command::new(&self.config.sbatch);
        sbatch.arg("--parsable");
        if let Some(deps) = format_dependencies(depends_on) {
            sbatch.arg(format!("--dependency={}", deps));
        }
        sbatch.args(&self.config.extra_args).arg(&script);
        tlog_trace!("sbatch {:?}", sbatch.get_args().collect::<Vec<_>>());

        let output = sbatch
            .output()
            .map_err(|e| Error::Submission(format!("{}: {}", command.job_name, e)))?;

        if !output.status.success() {
            let err = format!(
                "{}: sbatch exited with {}: {}",
                command.job_name,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            tlog_warn!("{}", err);
            return Err(Error::Submission(err));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let id = parse_parsable(&stdout).ok_or_else(|| {
            Error::Submission(format!(
                "{}: unexpected sbatch output '{}'",
                command.job_name,
                stdout.trim()
            ))
        })?;
        tlog_debug!("Submitted {} as {}", command.job_name, id);
        Ok(id)
    }
}

impl SchedulerStatus for SlurmSubmitter {
    fn state(&self, id: &JobId) -> Result<JobState> {
        let output = Command::new(&self.config.sacct)
            .args(["-j", id.as_str(), "--noheader", "--parsable2", "--format=State"])
            .output()?;
        if !output.status.success() {
            return Err(Error::Scheduler(format!(
                "sacct -j {} failed: {}",
                id,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(parse_sacct_state(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// `sbatch --parsable` prints `<id>` or `<id>;<cluster>`.
pub fn parse_parsable(stdout: &str) -> Option<JobId> {
    let line = stdout.lines().map(str::trim).find(|l| !l.is_empty())?;
    let id = line.split(';').next()?;
    JobId::parse(id).ok()
}

/// The first line of `sacct` output is the allocation's own state; the
/// lines after it are job steps.
pub fn parse_sacct_state(stdout: &str) -> JobState {
    let Some(line) = stdout.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return JobState::Unknown;
    };
    let state = line.split_whitespace().next().unwrap_or("");
    match state {
        "PENDING" | "REQUEUED" | "SUSPENDED" => JobState::Pending,
        "RUNNING" | "CONFIGURING" | "COMPLETING" => JobState::Running,
        "COMPLETED" => JobState::Completed,
        "FAILED" | "TIMEOUT" | "OUT_OF_MEMORY" | "NODE_FAIL" | "BOOT_FAIL" | "DEADLINE" => {
            JobState::Failed
        }
        s if s.starts_with("CANCELLED") => JobState::Cancelled,
        _ => JobState::Unknown,
    }
}
