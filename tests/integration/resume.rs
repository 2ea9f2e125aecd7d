//! Resumption tests.
//!
//! These tests verify that a run picks up where outputs, explicit restart
//! specs and the job ledger say it should, and that re-invoking never
//! submits the same work twice.

use trioctl::core::{Identifier, Slot};
use trioctl::orchestration::{PipelineRunner, RestartOverrides};
use trioctl::workflow::{GenomeRole, Mode, PhaseKind, RunFlags};
use trioctl::Error;

use crate::fixtures::{job, MockSubmitter, TestRun, FRESH_MOTHER_SUBMISSIONS};

fn runner(run: &TestRun, submitter: MockSubmitter) -> PipelineRunner<MockSubmitter> {
    PipelineRunner::new(submitter, run.ledger(), run.env())
}

fn overrides(args: &[&str]) -> RestartOverrides {
    let mut overrides = RestartOverrides::new();
    for arg in args {
        overrides.parse_arg(arg).unwrap();
    }
    overrides
}

/// Test: Full resume
/// Given every output of the first iteration already on disk
/// When the iteration runs again
/// Then nothing is submitted and every handoff is collapsed
#[test]
fn test_full_resume_submits_nothing() {
    let run = TestRun::new();
    let iterations = run.iterations(Mode::Retrain);
    run.touch_iteration(&iterations[0]);

    let mut runner = runner(&run, MockSubmitter::new());
    let report = runner.run(&iterations, 1, Some(1)).unwrap();

    assert!(runner.submitter().submissions.is_empty());
    for outcome in report.outcomes() {
        assert_eq!(outcome.skipped, outcome.task_count, "{}", outcome.phase);
        assert!(outcome.vector().is_collapsed(), "{}", outcome.phase);
    }
}

/// Test: Partial resume
/// Given outputs for regions 1 and 3 of the train genome's examples
/// When the iteration runs
/// Then only region 2 is resubmitted and shuffle waits only on it
#[test]
fn test_partial_resume_submits_only_missing() {
    let run = TestRun::new();
    let iterations = run.iterations(Mode::Retrain);
    run.touch_outputs(&iterations[0], PhaseKind::Examples, GenomeRole::Train, &[0, 2]);

    let mut runner = runner(&run, MockSubmitter::new());
    let report = runner.run(&iterations, 1, Some(1)).unwrap();
    let mock = runner.submitter();

    let examples: Vec<&str> = mock
        .for_phase(PhaseKind::Examples)
        .iter()
        .filter(|s| s.job_name.contains("HG004"))
        .map(|s| s.job_name.as_str())
        .collect();
    assert_eq!(examples, vec!["examples-HG004-2"]);

    let region2 = mock.find("examples-HG004-2").unwrap().id.clone();
    let outcome = report
        .outcomes()
        .find(|o| o.phase == PhaseKind::Examples && o.role == GenomeRole::Train)
        .unwrap();
    assert_eq!(
        outcome.vector().slots(),
        &[Slot::NotRequired, Slot::job(region2.clone()), Slot::NotRequired]
    );

    assert!(mock.find("shuffle-HG004-1").unwrap().depends_on.is_empty());
    assert_eq!(mock.find("shuffle-HG004-2").unwrap().depends_on, vec![region2]);
    assert!(mock.find("shuffle-HG004-3").unwrap().depends_on.is_empty());
}

/// Test: Skip collapse
/// Given every train-genome example output on disk
/// When the iteration runs
/// Then the examples handoff collapses and shuffle has no predecessors
#[test]
fn test_skipped_phase_collapses() {
    let run = TestRun::new();
    let iterations = run.iterations(Mode::Retrain);
    run.touch_outputs(&iterations[0], PhaseKind::Examples, GenomeRole::Train, &[0, 1, 2]);

    let mut runner = runner(&run, MockSubmitter::new());
    let report = runner.run(&iterations, 1, Some(1)).unwrap();

    let outcome = report
        .outcomes()
        .find(|o| o.phase == PhaseKind::Examples && o.role == GenomeRole::Train)
        .unwrap();
    assert!(outcome.vector().is_collapsed());
    assert_eq!(outcome.vector().len(), 1);

    let mock = runner.submitter();
    for n in 1..=3 {
        assert!(mock.find(&format!("shuffle-HG004-{}", n)).unwrap().depends_on.is_empty());
    }
}

/// Test: Mixed restart vector
/// Given an explicit restart spec `12345678,1,None` for the train examples
/// When the iteration runs
/// Then only task 1 is submitted and the trusted id is passed downstream
#[test]
fn test_mixed_restart_vector() {
    let run = TestRun::new();
    let iterations = run.iterations(Mode::Retrain);
    let mut runner = runner(&run, MockSubmitter::new())
        .with_overrides(overrides(&["examples:train=12345678,1,None"]));
    let report = runner.run(&iterations, 1, Some(1)).unwrap();
    let mock = runner.submitter();

    assert!(mock.find("examples-HG004-1").is_none());
    assert!(mock.find("examples-HG004-3").is_none());
    let task1 = mock.find("examples-HG004-2").unwrap();
    assert_eq!(task1.task, 1);

    let outcome = report
        .outcomes()
        .find(|o| o.phase == PhaseKind::Examples && o.role == GenomeRole::Train)
        .unwrap();
    assert_eq!(outcome.vector().len(), 3);
    assert_eq!(
        outcome.vector().slots(),
        &[Slot::job(job("12345678")), Slot::job(task1.id.clone()), Slot::NotRequired]
    );
    assert_eq!(
        mock.find("shuffle-HG004-1").unwrap().depends_on,
        vec![job("12345678")]
    );
    assert_eq!(mock.submissions.len(), FRESH_MOTHER_SUBMISSIONS - 2);
}

/// Test: Trusted id with outputs already present
/// Given a restart spec naming a job whose outputs now exist
/// When the phase runs
/// Then the id is dropped and downstream does not wait on it
#[test]
fn test_trusted_id_dropped_once_outputs_exist() {
    let run = TestRun::new();
    let iterations = run.iterations(Mode::Retrain);
    run.touch_outputs(&iterations[0], PhaseKind::Examples, GenomeRole::Train, &[0]);

    let mut runner = runner(&run, MockSubmitter::new())
        .with_overrides(overrides(&["examples:train=12345678,1,None"]));
    runner.run(&iterations, 1, Some(1)).unwrap();

    assert!(runner.submitter().find("shuffle-HG004-1").unwrap().depends_on.is_empty());
}

/// Test: Length invariant
/// Given a restart spec shorter than the phase's task count
/// When the iteration runs
/// Then the run aborts before submitting anything for that phase
#[test]
fn test_restart_length_mismatch_is_fatal() {
    let run = TestRun::new();
    let iterations = run.iterations(Mode::Retrain);
    let mut runner = runner(&run, MockSubmitter::new())
        .with_overrides(overrides(&["examples:train=12345678,1"]));

    let err = runner.run(&iterations, 1, Some(1)).unwrap_err();
    assert!(matches!(err, Error::LengthMismatch { expected: 3, found: 2, .. }));
    assert!(runner.submitter().submissions.is_empty());
}

/// Test: Task index out of range
/// Given a restart spec naming task 5 of a three-task phase
/// When the iteration runs
/// Then the run aborts
#[test]
fn test_restart_index_out_of_range_is_fatal() {
    let run = TestRun::new();
    let iterations = run.iterations(Mode::Retrain);
    let mut runner = runner(&run, MockSubmitter::new())
        .with_overrides(overrides(&["examples:train=None,5,None"]));

    let err = runner.run(&iterations, 1, Some(1)).unwrap_err();
    assert!(matches!(err, Error::TaskIndexOutOfRange { index: 5, .. }));
}

/// Test: Idempotent re-invocation
/// Given a completed first invocation whose jobs are still queued
/// When the same iteration is invoked again
/// Then the ledger supplies every id and nothing is resubmitted
#[test]
fn test_reinvocation_submits_nothing() {
    let run = TestRun::new();
    let iterations = run.iterations(Mode::Retrain);

    let mut first = runner(&run, MockSubmitter::new());
    first.run(&iterations, 1, Some(1)).unwrap();
    let first_examples: Vec<_> = first
        .submitter()
        .for_phase(PhaseKind::Examples)
        .iter()
        .filter(|s| s.job_name.contains("HG004"))
        .map(|s| s.id.clone())
        .collect();

    let mut second = runner(&run, MockSubmitter::starting_at(20_000_001));
    let report = second.run(&iterations, 1, Some(1)).unwrap();

    assert!(second.submitter().submissions.is_empty());
    assert_eq!(report.submitted(), 0);
    let record = run.ledger();
    let record = record.get("HG004/examples/train").unwrap();
    assert_eq!(record.vector.job_ids(), first_examples);
    assert_eq!(record.run_id, second.run_id());
    assert!(run
        .config
        .ledger_path()
        .with_extension("json.bak")
        .exists());
}

/// Test: Shared evaluation genome
/// Given the mother's iteration already submitted the child's examples
/// When the father's iteration runs
/// Then the child's example preparation is not submitted again
#[test]
fn test_eval_genome_jobs_shared_between_parents() {
    let run = TestRun::new();
    let iterations = run.iterations(Mode::Retrain);
    let mut runner = runner(&run, MockSubmitter::new());
    runner.run(&iterations, 1, None).unwrap();

    let mock = runner.submitter();
    assert_eq!(mock.for_phase(PhaseKind::Examples).len(), 3 + 2 + 2);
    assert!(mock.find("re_shuffle-HG002-1").is_some());
    assert_eq!(
        mock.submissions.iter().filter(|s| s.job_name == "re_shuffle-HG002-1").count(),
        1
    );
}

/// Test: Overwrite
/// Given every output of the first iteration on disk and a ledger
/// When the iteration runs with overwrite
/// Then everything is submitted again
#[test]
fn test_overwrite_resubmits_everything() {
    let run = TestRun::new();
    let iterations = run.iterations(Mode::Retrain);
    run.touch_iteration(&iterations[0]);
    runner(&run, MockSubmitter::new()).run(&iterations, 1, Some(1)).unwrap();

    let flags = RunFlags {
        overwrite: true,
        ..RunFlags::default()
    };
    let mut runner = runner(&run, MockSubmitter::starting_at(20_000_001));
    runner
        .run(&run.iterations_with(Mode::Retrain, flags), 1, Some(1))
        .unwrap();
    assert_eq!(runner.submitter().submissions.len(), FRESH_MOTHER_SUBMISSIONS);
}

/// Test: Explicit spec wins over the ledger
/// Given a ledger recording the first invocation's jobs
/// When the next invocation names task 0 of compare explicitly
/// Then only that task is resubmitted, waiting on its recorded upstream job
#[test]
fn test_explicit_restart_overrides_ledger() {
    let run = TestRun::new();
    let iterations = run.iterations(Mode::Retrain);
    let mut first = runner(&run, MockSubmitter::new());
    first.run(&iterations, 1, Some(1)).unwrap();
    let call1 = first.submitter().find("call_variants-HG004-1").unwrap().id.clone();
    let compare2 = first.submitter().find("compare-HG004-2").unwrap().id.clone();

    let spec = format!("compare=0,{}", compare2);
    let mut second = runner(&run, MockSubmitter::starting_at(20_000_001))
        .with_overrides(overrides(&[&spec]));
    second.run(&iterations, 1, Some(1)).unwrap();

    let names = second.submitter().job_names();
    assert_eq!(names, vec!["compare-HG004-1"]);
    assert_eq!(
        second.submitter().find("compare-HG004-1").unwrap().depends_on,
        vec![call1]
    );
    assert_eq!(
        run.ledger().get("HG004/compare/none").unwrap().vector.as_restart_spec().unwrap()[1],
        Identifier::SchedulerId(compare2)
    );
}

/// Test: Stale output filling the count
/// Given the first test genome's calls plus a leftover file from a third
///       test genome that is no longer configured
/// When baseline mode runs
/// Then the second test genome's calls are still submitted
#[test]
fn test_stale_output_does_not_satisfy_phase() {
    let run = TestRun::new();
    let iterations = run.iterations(Mode::Baseline);
    run.touch_outputs(&iterations[0], PhaseKind::CallVariants, GenomeRole::None, &[0, 2]);

    let mut runner = runner(&run, MockSubmitter::new());
    runner.run(&iterations, 1, None).unwrap();
    let mock = runner.submitter();

    let calls: Vec<&str> = mock
        .for_phase(PhaseKind::CallVariants)
        .iter()
        .map(|s| s.job_name.as_str())
        .collect();
    assert_eq!(calls, vec!["call_variants-baseline-wgs_v1-2"]);
    let call2 = mock.find("call_variants-baseline-wgs_v1-2").unwrap().id.clone();
    assert!(mock.find("compare-baseline-wgs_v1-1").unwrap().depends_on.is_empty());
    assert_eq!(mock.find("compare-baseline-wgs_v1-2").unwrap().depends_on, vec![call2]);
    assert_eq!(mock.submissions.len(), 5);
}

/// Test: Task both trusted and listed
/// Given a restart spec `12345678,0` that trusts task 0 and also names it
/// When the iteration reaches that phase
/// Then the run aborts without submitting it
#[test]
fn test_restart_id_and_index_overlap_is_fatal() {
    let run = TestRun::new();
    let iterations = run.iterations(Mode::Retrain);
    let mut runner = runner(&run, MockSubmitter::new())
        .with_overrides(overrides(&["compare=12345678,0"]));

    let err = runner.run(&iterations, 1, Some(1)).unwrap_err();
    assert!(matches!(err, Error::ConflictingRestart { index: 0, ref job, .. } if job == "12345678"));
    assert!(runner.submitter().for_phase(PhaseKind::Compare).is_empty());
    assert!(runner.submitter().find("call_variants-HG004-1").is_some());
}
