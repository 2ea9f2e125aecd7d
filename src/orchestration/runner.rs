//! Pipeline runner: sequences phases per mode over the curriculum.
//!
//! The runner owns everything that crosses phase boundaries: the handoff
//! from one phase to the next, the job ledger that lets a later invocation
//! resume, the per-run key/value store, and the checkpoint dependency that
//! chains one training genome to the next.

use std::collections::BTreeMap;

use serde::Serialize;

use super::phase::{Handoff, PhaseController, PhaseOutcome};
use super::phases::{phase_for, selected_checkpoint_path};
use super::submitter::JobSubmitter;
use crate::core::{parse_restart_spec, Identifier, JobId, OutputChecker};
use crate::state::{EnvStore, JobLedger, RunId};
use crate::workflow::{GenomeRole, Iteration, Mode, PhaseHistoryEntry, PhaseKind, PipelineState};
use crate::{tlog, tlog_debug, tlog_warn, Error, Result};

/// Explicit restart specs given on the command line, per phase and role.
#[derive(Debug, Clone, Default)]
pub struct RestartOverrides {
    specs: BTreeMap<(PhaseKind, GenomeRole), Vec<Identifier>>,
}

impl RestartOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `<phase>[:<role>]=<ids>`.
    ///
    /// The role defaults to `train` for per-role phases and `none` for the
    /// rest.
    pub fn parse_arg(&mut self, raw: &str) -> Result<()> {
        let (target, ids) = raw.split_once('=').ok_or_else(|| {
            Error::Config(format!("restart '{}' must look like <phase>[:<role>]=<ids>", raw))
        })?;
        let (phase, role) = match target.split_once(':') {
            Some((phase, role)) => (
                phase.trim().parse::<PhaseKind>()?,
                Some(role.trim().parse::<GenomeRole>()?),
            ),
            None => (target.trim().parse::<PhaseKind>()?, None),
        };
        let role = role.unwrap_or(if phase.is_per_role() {
            GenomeRole::Train
        } else {
            GenomeRole::None
        });
        if phase.is_per_role() == (role == GenomeRole::None) {
            return Err(Error::Config(format!(
                "restart '{}': phase {} does not take role {}",
                raw, phase, role
            )));
        }
        self.insert(phase, role, parse_restart_spec(ids)?);
        Ok(())
    }

    pub fn insert(&mut self, phase: PhaseKind, role: GenomeRole, spec: Vec<Identifier>) {
        self.specs.insert((phase, role), spec);
    }

    pub fn get(&self, phase: PhaseKind, role: GenomeRole) -> Option<&[Identifier]> {
        self.specs.get(&(phase, role)).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IterationReport {
    pub label: String,
    pub mode: Mode,
    pub outcomes: Vec<PhaseOutcome>,
    pub history: Vec<PhaseHistoryEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub dry_run: bool,
    pub iterations: Vec<IterationReport>,
}

impl RunReport {
    pub fn submitted(&self) -> usize {
        self.outcomes().map(|o| o.submitted).sum()
    }

    pub fn failed(&self) -> usize {
        self.outcomes().map(|o| o.failed).sum()
    }

    pub fn outcomes(&self) -> impl Iterator<Item = &PhaseOutcome> {
        self.iterations.iter().flat_map(|i| i.outcomes.iter())
    }
}

pub struct PipelineRunner<S: JobSubmitter> {
    submitter: S,
    ledger: JobLedger,
    env: EnvStore,
    overrides: RestartOverrides,
    run_id: RunId,
    checker: OutputChecker,
}

/// Per-iteration bookkeeping threaded through the phase calls.
struct Pass {
    state: PipelineState,
    outcomes: Vec<PhaseOutcome>,
    /// Explicit restart specs apply to the first iteration of an invocation.
    use_overrides: bool,
}

impl<S: JobSubmitter> PipelineRunner<S> {
    pub fn new(submitter: S, ledger: JobLedger, env: EnvStore) -> Self {
        Self {
            submitter,
            ledger,
            env,
            overrides: RestartOverrides::new(),
            run_id: RunId::new(),
            checker: OutputChecker::new(),
        }
    }

    pub fn with_overrides(mut self, overrides: RestartOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn submitter(&self) -> &S {
        &self.submitter
    }

    pub fn ledger(&self) -> &JobLedger {
        &self.ledger
    }

    pub fn env(&self) -> &EnvStore {
        &self.env
    }

    /// Run iterations `start..=stop` (1-based) and stop.
    ///
    /// `stop` defaults to the last iteration.
    pub fn run(
        &mut self,
        iterations: &[Iteration],
        start: usize,
        stop: Option<usize>,
    ) -> Result<RunReport> {
        let stop = stop.unwrap_or(iterations.len());
        if start == 0 || start > stop || stop > iterations.len() {
            return Err(Error::Config(format!(
                "iteration range {}..={} is outside 1..={}",
                start,
                stop,
                iterations.len()
            )));
        }

        let dry_run = self.submitter.is_dry_run();
        tlog!(
            "Run {} starting: iterations {}..={} of {}{}",
            self.run_id.short(),
            start,
            stop,
            iterations.len(),
            if dry_run { " (dry run)" } else { "" }
        );

        let mut prior_ckpt = if start > 1 {
            self.recorded_checkpoint(&iterations[start - 2])
        } else {
            Handoff::none()
        };

        let mut reports = Vec::new();
        for (offset, itr) in iterations[start - 1..stop].iter().enumerate() {
            tlog!(
                "Iteration {} ({}/{}): {} mode",
                itr.label(),
                itr.current_genome_num,
                itr.total_genomes,
                itr.mode
            );
            let (report, ckpt) = self.run_iteration(itr, &prior_ckpt, offset == 0)?;
            reports.push(report);
            prior_ckpt = ckpt;

            if !dry_run {
                self.env.save()?;
            }
        }

        Ok(RunReport {
            run_id: self.run_id,
            dry_run,
            iterations: reports,
        })
    }

    /// Run every phase one iteration's mode calls for.
    ///
    /// Returns the report and the checkpoint handoff the next training
    /// iteration depends on.
    pub fn run_iteration(
        &mut self,
        itr: &Iteration,
        prior_ckpt: &Handoff,
        use_overrides: bool,
    ) -> Result<(IterationReport, Handoff)> {
        let mut pass = Pass {
            state: PipelineState::new(itr.mode),
            outcomes: Vec::new(),
            use_overrides: use_overrides && !self.overrides.is_empty(),
        };

        let ckpt = match itr.mode {
            Mode::Baseline => {
                self.evaluate(itr, &Handoff::none(), &mut pass)?;
                Handoff::none()
            }
            Mode::Benchmark => {
                let ckpt = match &itr.satisfied_by {
                    Some(job) => Handoff::carried(vec![job.clone()]),
                    None => Handoff::none(),
                };
                self.evaluate(itr, &ckpt, &mut pass)?;
                ckpt
            }
            Mode::Demo => {
                self.prepare_examples(itr, &[GenomeRole::Train], &mut pass)?;
                Handoff::none()
            }
            Mode::Retrain => {
                let ckpt = match &itr.satisfied_by {
                    Some(job) => {
                        tlog!(
                            "{}: satisfied by select-ckpt job {}, skipping training",
                            itr.label(),
                            job
                        );
                        for &kind in &PhaseKind::ALL[..5] {
                            for role in roles_for(kind, &[GenomeRole::Train, GenomeRole::Eval]) {
                                pass.state.bypass(kind, role)?;
                            }
                        }
                        Handoff::carried(vec![job.clone()])
                    }
                    None => self.train(itr, prior_ckpt, &mut pass)?,
                };
                self.evaluate(itr, &ckpt, &mut pass)?;
                ckpt
            }
        };

        let report = IterationReport {
            label: itr.label(),
            mode: itr.mode,
            outcomes: pass.outcomes,
            history: pass.state.phase_history().to_vec(),
        };
        Ok((report, ckpt))
    }

    /// Examples, shuffle and re-shuffle for each role, interleaved by phase.
    ///
    /// Returns the iteration with region counts filled in and the
    /// re-shuffle handoff per role.
    fn prepare_examples(
        &mut self,
        itr: &Iteration,
        roles: &[GenomeRole],
        pass: &mut Pass,
    ) -> Result<(Iteration, BTreeMap<GenomeRole, Handoff>)> {
        let mut current = itr.clone();
        for &role in roles {
            current = self.establish_regions(&current, role)?;
        }

        let mut handoffs: BTreeMap<GenomeRole, Handoff> =
            roles.iter().map(|&r| (r, Handoff::none())).collect();
        for kind in [PhaseKind::Examples, PhaseKind::Shuffle, PhaseKind::ReShuffle] {
            for &role in roles {
                let prior = handoffs.get(&role).cloned().unwrap_or_else(Handoff::none);
                let outcome = self.run_phase(kind, role, &current, &prior, pass)?;
                handoffs.insert(role, outcome.handoff.clone());
            }
        }
        Ok((current, handoffs))
    }

    fn train(&mut self, itr: &Iteration, prior_ckpt: &Handoff, pass: &mut Pass) -> Result<Handoff> {
        let (current, merged) =
            self.prepare_examples(itr, &[GenomeRole::Train, GenomeRole::Eval], pass)?;
        let none = Handoff::none();
        let train_rs = merged.get(&GenomeRole::Train).unwrap_or(&none);
        let eval_rs = merged.get(&GenomeRole::Eval).unwrap_or(&none);

        let upstream = Handoff::all_of(&[train_rs, eval_rs, prior_ckpt]);
        let trained = self
            .run_phase(PhaseKind::TrainEval, GenomeRole::None, &current, &upstream, pass)?
            .handoff;
        let selected = self
            .run_phase(PhaseKind::SelectCkpt, GenomeRole::None, &current, &trained, pass)?
            .handoff;

        if let Some(job) = selected.all_jobs().first() {
            self.env.set(
                &format!("{}_select_ckpt_job", current.genome_label(GenomeRole::None)),
                job,
            );
        }
        Ok(selected)
    }

    fn evaluate(&mut self, itr: &Iteration, ckpt: &Handoff, pass: &mut Pass) -> Result<()> {
        let called = self
            .run_phase(PhaseKind::CallVariants, GenomeRole::None, itr, ckpt, pass)?
            .handoff;
        let compared = self
            .run_phase(PhaseKind::Compare, GenomeRole::None, itr, &called, pass)?
            .handoff;
        self.run_phase(PhaseKind::Convert, GenomeRole::None, itr, &compared, pass)?;
        Ok(())
    }

    fn run_phase(
        &mut self,
        kind: PhaseKind,
        role: GenomeRole,
        itr: &Iteration,
        prior: &Handoff,
        pass: &mut Pass,
    ) -> Result<PhaseOutcome> {
        pass.state.enter(kind, role)?;

        let phase = phase_for(kind, role);
        let itr = itr.with_role(role);
        let key = JobLedger::key(&itr.genome_label(role), kind.as_str(), role.as_str());
        let restart = self.restart_spec(kind, role, &key, &itr, pass.use_overrides);

        let outcome = PhaseController::new(&mut self.submitter).run(
            phase.as_ref(),
            &itr,
            prior,
            restart.as_deref(),
        )?;

        if !outcome.dry_run {
            self.ledger.record(&key, &outcome.record, self.run_id);
            self.ledger.save()?;
        }
        pass.outcomes.push(outcome.clone());
        Ok(outcome)
    }

    /// Explicit override first, then the ledger unless overwriting.
    fn restart_spec(
        &self,
        kind: PhaseKind,
        role: GenomeRole,
        key: &str,
        itr: &Iteration,
        use_overrides: bool,
    ) -> Option<Vec<Identifier>> {
        if use_overrides {
            if let Some(spec) = self.overrides.get(kind, role) {
                tlog_debug!("{}: using restart spec from command line", key);
                return Some(spec.to_vec());
            }
        }
        if itr.flags.overwrite {
            return None;
        }
        let spec = self.ledger.get(key)?.vector.as_restart_spec();
        if spec.is_some() {
            tlog_debug!("{}: resuming from ledger", key);
        }
        spec
    }

    /// Count the role genome's region files, falling back to a count stored
    /// by an earlier invocation.
    fn establish_regions(&mut self, itr: &Iteration, role: GenomeRole) -> Result<Iteration> {
        if itr.num_regions(role).is_some() {
            return Ok(itr.clone());
        }
        let genome = itr.genome_label(role);
        let region_dir = itr.config.effective_region_dir();
        let found = self
            .checker
            .count(&format!("{}.region*.bed", genome), &region_dir)?;

        let count = if found > 0 {
            found
        } else {
            self.env
                .get_usize(&format!("{}_num_regions", genome))
                .ok_or_else(|| {
                    Error::MissingUpstream(format!(
                        "no {}.region*.bed files in {}",
                        genome,
                        region_dir.display()
                    ))
                })?
        };

        tlog_debug!("{} genome {}: {} regions", role, genome, count);
        self.env.set(&format!("{}_num_regions", genome), count);
        self.env.set(&format!("num_{}_regions", role), count);
        Ok(itr.with_regions(role, count))
    }

    /// Checkpoint dependency left behind by the iteration before `start`.
    fn recorded_checkpoint(&self, previous: &Iteration) -> Handoff {
        if previous.mode != Mode::Retrain {
            return Handoff::none();
        }
        if let Some(job) = &previous.satisfied_by {
            return Handoff::carried(vec![job.clone()]);
        }
        let genome = previous.genome_label(GenomeRole::None);
        if selected_checkpoint_path(&previous.config, &genome).exists() {
            return Handoff::none();
        }
        let key = JobLedger::key(&genome, PhaseKind::SelectCkpt.as_str(), GenomeRole::None.as_str());
        if let Some(record) = self.ledger.get(&key) {
            return Handoff::carried(record.vector.job_ids());
        }
        // The env store keeps the last select_ckpt job even if the ledger was cleared.
        let env_key = format!("{}_select_ckpt_job", genome);
        match self.env.get(&env_key).map(JobId::parse) {
            Some(Ok(job)) => {
                tlog_debug!("{}: waiting on select_ckpt job {} from {}", previous.label(), job, env_key);
                Handoff::carried(vec![job])
            }
            Some(Err(e)) => {
                tlog_warn!("{}: ignoring {}: {}", previous.label(), env_key, e);
                Handoff::none()
            }
            None => {
                tlog_warn!(
                    "{}: no selected checkpoint and no recorded select_ckpt job; \
                     training will not wait for it",
                    previous.label()
                );
                Handoff::none()
            }
        }
    }
}

fn roles_for(kind: PhaseKind, roles: &[GenomeRole]) -> Vec<GenomeRole> {
    if kind.is_per_role() {
        roles.to_vec()
    } else {
        vec![GenomeRole::None]
    }
}
