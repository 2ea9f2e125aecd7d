//! The shared phase contract and the controller that drives it.
//!
//! Every pipeline phase follows the same steps: check existing outputs,
//! interpret the restart spec, submit only what is missing with the right
//! predecessors, and hand a dependency vector to the next phase. Concrete
//! phases only describe their task count, naming convention, fan-in and
//! command; everything stateful lives in `PhaseController::run`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::{
    DependencyVector, Identifier, JobId, OutputChecker, RestartResolver, Slot, TaskSlot,
};
use crate::util::{render_template, sanitize_name};
use crate::workflow::{GenomeRole, Iteration, PhaseKind};
use crate::{tlog, tlog_debug, tlog_warn, Error, Result};

use super::submitter::{CommandDescriptor, JobSubmitter};

/// How a phase's tasks depend on the previous phase's tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanIn {
    /// Task `i` waits on upstream task `i`.
    PerTask,
    /// Every task waits on every upstream job.
    AllOf,
}

pub trait Phase {
    fn kind(&self) -> PhaseKind;

    fn role(&self) -> GenomeRole {
        GenomeRole::None
    }

    fn expected_task_count(&self, itr: &Iteration) -> Result<usize>;

    /// Directory the phase's outputs land in.
    fn output_location(&self, itr: &Iteration) -> PathBuf;

    /// File-name glob of one task's outputs.
    fn output_pattern(&self, itr: &Iteration, task: usize) -> String;

    /// How many files `output_pattern` matches when a task is done.
    fn outputs_per_task(&self, _itr: &Iteration) -> usize {
        1
    }

    /// Glob matching every task's outputs at once, for the find-all fast
    /// path. Phases without one are always checked task by task.
    fn aggregate_pattern(&self, _itr: &Iteration) -> Option<String> {
        None
    }

    fn fan_in(&self) -> FanIn;

    /// Phase-specific template placeholders.
    fn template_vars(&self, _itr: &Iteration, _task: usize) -> BTreeMap<&'static str, String> {
        BTreeMap::new()
    }

    fn label(&self) -> String {
        match self.role() {
            GenomeRole::None => self.kind().to_string(),
            role => format!("{}:{}", self.kind(), role),
        }
    }

    /// Render the job for one task from the configured command template.
    fn build_command(&self, itr: &Iteration, task: usize) -> CommandDescriptor {
        let kind = self.kind();
        let genome = itr.genome_label(self.role());
        let job_name = sanitize_name(&format!("{}-{}-{}", kind, genome, task + 1));

        let mut vars: BTreeMap<&str, String> = BTreeMap::new();
        vars.insert("phase", kind.to_string());
        vars.insert("role", self.role().to_string());
        vars.insert("genome", genome);
        vars.insert("task", task.to_string());
        vars.insert("run_dir", itr.config.run_dir().display().to_string());
        vars.insert("out_dir", self.output_location(itr).display().to_string());
        vars.extend(self.template_vars(itr, task));

        let lines = itr
            .config
            .command_template(kind.as_str())
            .iter()
            .map(|line| render_template(line, &vars))
            .collect();

        CommandDescriptor {
            log_path: itr.config.log_dir().join(format!("{}.out", job_name)),
            job_name,
            phase: kind,
            task,
            lines,
            resources: itr.config.scheduler.resources_for(kind.as_str()),
        }
    }
}

/// What one phase hands to the next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Handoff {
    pub vector: DependencyVector,
    /// Jobs outside `vector` to wait on, such as a select-ckpt job recorded
    /// by the curriculum or by an earlier invocation. Per-task consumers
    /// only use them when `vector` is collapsed.
    pub carried: Vec<JobId>,
}

impl Handoff {
    /// Nothing upstream.
    pub fn none() -> Self {
        Self {
            vector: DependencyVector::collapsed(),
            carried: Vec::new(),
        }
    }

    /// A whole phase satisfied by jobs recorded elsewhere.
    pub fn carried(jobs: Vec<JobId>) -> Self {
        Self {
            vector: DependencyVector::collapsed(),
            carried: jobs,
        }
    }

    /// Combine several upstream phases for an all-of consumer.
    pub fn all_of(sources: &[&Handoff]) -> Self {
        let mut slots = Vec::new();
        let mut carried = Vec::new();
        for source in sources {
            carried.extend(source.carried.iter().cloned());
            if !source.vector.is_collapsed() {
                slots.extend(source.vector.slots().iter().cloned());
            }
        }
        let vector = if slots.is_empty() {
            DependencyVector::collapsed()
        } else {
            DependencyVector::from_slots(slots).collapse_if_idle()
        };
        Self { vector, carried }
    }

    /// Every job downstream must wait on.
    pub fn all_jobs(&self) -> Vec<JobId> {
        let mut jobs = self.vector.job_ids();
        jobs.extend(self.carried.iter().cloned());
        jobs
    }

    /// Whether downstream can start without waiting on anything.
    pub fn is_satisfied(&self) -> bool {
        self.all_jobs().is_empty() && !self.vector.has_failures()
    }
}

/// Per-phase summary.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseOutcome {
    pub phase: PhaseKind,
    pub role: GenomeRole,
    pub task_count: usize,
    pub skipped: usize,
    pub submitted: usize,
    pub failed: usize,
    /// Full-length slots, as persisted for the next invocation.
    pub record: DependencyVector,
    pub handoff: Handoff,
    pub dry_run: bool,
}

impl PhaseOutcome {
    pub fn vector(&self) -> &DependencyVector {
        &self.handoff.vector
    }
}

/// Runs phases against a submitter.
pub struct PhaseController<'a> {
    checker: OutputChecker,
    submitter: &'a mut dyn JobSubmitter,
}

impl<'a> PhaseController<'a> {
    pub fn new(submitter: &'a mut dyn JobSubmitter) -> Self {
        Self {
            checker: OutputChecker::new(),
            submitter,
        }
    }

    /// Run one phase.
    ///
    /// `prior` is the previous phase's handoff; `restart` is the restart
    /// spec to trust (explicit or recorded by an earlier invocation).
    pub fn run(
        &mut self,
        phase: &dyn Phase,
        itr: &Iteration,
        prior: &Handoff,
        restart: Option<&[Identifier]>,
    ) -> Result<PhaseOutcome> {
        let label = phase.label();
        let expected = phase.expected_task_count(itr)?;
        if expected == 0 {
            return Err(Error::Config(format!("{}: phase declares zero tasks", label)));
        }
        let location = phase.output_location(itr);
        let per_task = phase.outputs_per_task(itr);
        let overwrite = itr.flags.overwrite;
        let dry_run = self.submitter.is_dry_run();

        tlog_debug!(
            "{} [{}]: {} tasks, outputs in {}",
            label,
            itr.label(),
            expected,
            location.display()
        );

        if !overwrite {
            if let Some(pattern) = phase.aggregate_pattern(itr) {
                // A stale or extra file can make up the count, so each
                // task's own outputs must be present too.
                let found = self.checker.check(&pattern, &location, expected * per_task)?;
                if !found.missing() && self.every_task_present(phase, itr, expected)? {
                    tlog!("{}: all {} tasks already have outputs, skipping", label, expected);
                    return Ok(PhaseOutcome {
                        phase: phase.kind(),
                        role: phase.role(),
                        task_count: expected,
                        skipped: expected,
                        submitted: 0,
                        failed: 0,
                        record: DependencyVector::not_required(expected),
                        handoff: Handoff::none(),
                        dry_run,
                    });
                }
            }
        }

        let resolution = RestartResolver::new(&label).resolve(restart, expected)?;

        let mut tasks: Vec<TaskSlot> = (0..expected)
            .map(|i| TaskSlot::new(i, phase.output_pattern(itr, i)))
            .collect();

        // Trusted ids are kept only while their outputs are still missing;
        // once outputs exist nothing downstream needs to wait on them.
        for &i in &resolution.to_skip {
            let Some(Identifier::SchedulerId(id)) = restart.and_then(|r| r.get(i)) else {
                continue;
            };
            if !overwrite && self.satisfied(&tasks[i], &location, per_task)? {
                tlog_debug!("{} task {}: job {} finished, outputs present", label, i, id);
                tasks[i].resolve(Slot::NotRequired);
            } else {
                tlog_debug!("{} task {}: trusting job {}", label, i, id);
                tasks[i].resolve(Slot::job(id.clone()));
            }
        }

        if resolution.is_complete() {
            let record = DependencyVector::finalize(&label, expected, tasks)?;
            tlog!(
                "{}: nothing to submit ({} tasks still covered by earlier jobs)",
                label,
                record.job_ids().len()
            );
            return Ok(PhaseOutcome {
                phase: phase.kind(),
                role: phase.role(),
                task_count: expected,
                skipped: expected,
                submitted: 0,
                failed: 0,
                handoff: Handoff {
                    vector: record.clone().collapse_if_idle(),
                    carried: Vec::new(),
                },
                record,
                dry_run,
            });
        }

        let mut submitted = 0;
        let mut failures: Vec<(usize, String)> = Vec::new();

        for &i in &resolution.to_run {
            if !overwrite && self.satisfied(&tasks[i], &location, per_task)? {
                tlog_debug!("{} task {}: outputs present, not required", label, i);
                tasks[i].resolve(Slot::NotRequired);
                continue;
            }

            let Some(depends_on) = self.dependencies(phase, prior, i, expected)? else {
                let reason = "upstream task failed to submit".to_string();
                tasks[i].resolve(Slot::failed(&reason));
                failures.push((i, reason));
                continue;
            };

            let command = phase.build_command(itr, i);
            match self.submitter.submit(&command, &depends_on) {
                Ok(id) => {
                    tlog_debug!("{} task {}: submitted {} as {}", label, i, command.job_name, id);
                    tasks[i].resolve(Slot::job(id));
                    submitted += 1;
                }
                Err(e) if !e.is_fatal() => {
                    tasks[i].resolve(Slot::failed(&e.to_string()));
                    failures.push((i, e.to_string()));
                }
                Err(e) => return Err(e),
            }
        }

        let record = DependencyVector::finalize(&label, expected, tasks)?;
        let failed = failures.len();
        if failed > 0 {
            let detail: Vec<String> = failures
                .iter()
                .map(|(i, e)| format!("task {}: {}", i, e))
                .collect();
            tlog_warn!(
                "{}: {} of {} tasks failed to submit ({})",
                label,
                failed,
                expected,
                detail.join("; ")
            );
        }
        tlog!(
            "{}: {} tasks, {} submitted, {} skipped, {} failed{}",
            label,
            expected,
            submitted,
            expected - submitted - failed,
            failed,
            if dry_run { " (dry run)" } else { "" }
        );

        Ok(PhaseOutcome {
            phase: phase.kind(),
            role: phase.role(),
            task_count: expected,
            skipped: expected - submitted - failed,
            submitted,
            failed,
            handoff: Handoff {
                vector: record.clone().collapse_if_idle(),
                carried: Vec::new(),
            },
            record,
            dry_run,
        })
    }

    fn satisfied(&self, task: &TaskSlot, location: &Path, per_task: usize) -> Result<bool> {
        Ok(!self.checker.check(&task.pattern, location, per_task)?.missing())
    }

    fn every_task_present(&self, phase: &dyn Phase, itr: &Iteration, expected: usize) -> Result<bool> {
        let location = phase.output_location(itr);
        let per_task = phase.outputs_per_task(itr);
        for i in 0..expected {
            let task = TaskSlot::new(i, phase.output_pattern(itr, i));
            if !self.satisfied(&task, &location, per_task)? {
                tlog_debug!("{}: task {} has no outputs despite aggregate match", phase.label(), i);
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Jobs task `task` must wait on; `None` when its upstream task failed.
    fn dependencies(
        &self,
        phase: &dyn Phase,
        prior: &Handoff,
        task: usize,
        expected: usize,
    ) -> Result<Option<Vec<JobId>>> {
        match phase.fan_in() {
            FanIn::PerTask => {
                if prior.vector.is_collapsed() {
                    return Ok(Some(prior.carried.clone()));
                }
                prior.vector.check_len(&phase.label(), expected)?;
                Ok(match prior.vector.get(task) {
                    Some(Slot::Job { id }) => Some(vec![id.clone()]),
                    Some(Slot::Failed { .. }) => None,
                    _ => Some(Vec::new()),
                })
            }
            FanIn::AllOf => {
                if prior.vector.has_failures() {
                    return Err(Error::UpstreamFailed {
                        phase: phase.label(),
                    });
                }
                Ok(Some(prior.all_jobs()))
            }
        }
    }
}
