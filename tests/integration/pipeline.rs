//! End-to-end pipeline sequencing tests.
//!
//! These tests drive `PipelineRunner` against a mock submitter in a
//! temporary run directory and check what gets submitted, in what order,
//! and with which predecessors.

use trioctl::orchestration::{DryRunSubmitter, PipelineRunner};
use trioctl::state::{EnvStore, JobLedger};
use trioctl::workflow::{Curriculum, GenomeRole, Mode, PhaseEntry, PhaseKind, RunFlags};
use trioctl::Error;

use crate::fixtures::{job, MockSubmitter, TestRun, FRESH_MOTHER_SUBMISSIONS, MOTHER};

fn runner(run: &TestRun, submitter: MockSubmitter) -> PipelineRunner<MockSubmitter> {
    PipelineRunner::new(submitter, run.ledger(), run.env())
}

/// Test: Fresh retraining iteration
/// Given a run directory with region files and no outputs
/// When the first iteration runs
/// Then every task of every phase is submitted, in pipeline order
#[test]
fn test_fresh_iteration_submits_everything_in_order() {
    let run = TestRun::new();
    let iterations = run.iterations(Mode::Retrain);
    let mut runner = runner(&run, MockSubmitter::new());

    let report = runner.run(&iterations, 1, Some(1)).unwrap();

    let mock = runner.submitter();
    assert_eq!(mock.submissions.len(), FRESH_MOTHER_SUBMISSIONS);
    assert_eq!(report.submitted(), FRESH_MOTHER_SUBMISSIONS);
    assert_eq!(report.failed(), 0);

    let visited: Vec<String> = report.iterations[0]
        .history
        .iter()
        .map(|h| format!("{}:{}", h.phase, h.role))
        .collect();
    assert_eq!(
        visited,
        vec![
            "examples:train",
            "examples:eval",
            "shuffle:train",
            "shuffle:eval",
            "re_shuffle:train",
            "re_shuffle:eval",
            "train_eval:none",
            "select_ckpt:none",
            "call_variants:none",
            "compare:none",
            "convert:none",
        ]
    );

    // Eval examples are named after the child.
    assert!(mock.find("examples-HG002-2").is_some());
    assert!(mock.find("examples-HG002-3").is_none());
}

/// Test: Dependency wiring
/// Given a fresh iteration
/// When it is submitted
/// Then per-task phases wait on the matching upstream task and all-of
///      phases wait on every upstream job
#[test]
fn test_dependencies_follow_fan_in() {
    let run = TestRun::new();
    let iterations = run.iterations(Mode::Retrain);
    let mut runner = runner(&run, MockSubmitter::new());
    runner.run(&iterations, 1, Some(1)).unwrap();
    let mock = runner.submitter();

    let ex = |n: usize| mock.find(&format!("examples-{}-{}", MOTHER, n)).unwrap().id.clone();
    for n in 1..=3 {
        let shuffle = mock.find(&format!("shuffle-{}-{}", MOTHER, n)).unwrap();
        assert_eq!(shuffle.depends_on, vec![ex(n)]);
    }

    let rs_train = mock.find("re_shuffle-HG004-1").unwrap();
    assert_eq!(rs_train.depends_on.len(), 3);
    let rs_eval = mock.find("re_shuffle-HG002-1").unwrap();
    assert_eq!(rs_eval.depends_on.len(), 2);

    let train = mock.find("train_eval-HG004-1").unwrap();
    assert_eq!(train.depends_on, vec![rs_train.id.clone(), rs_eval.id.clone()]);

    let select = mock.find("select_ckpt-HG004-1").unwrap();
    assert_eq!(select.depends_on, vec![train.id.clone()]);

    for call in mock.for_phase(PhaseKind::CallVariants) {
        assert_eq!(call.depends_on, vec![select.id.clone()]);
    }
    for n in 1..=2 {
        let call = mock.find(&format!("call_variants-HG004-{}", n)).unwrap();
        let compare = mock.find(&format!("compare-HG004-{}", n)).unwrap();
        let convert = mock.find(&format!("convert-HG004-{}", n)).unwrap();
        assert_eq!(compare.depends_on, vec![call.id.clone()]);
        assert_eq!(convert.depends_on, vec![compare.id.clone()]);
    }
}

/// Test: Checkpoint chaining
/// Given a two-genome curriculum
/// When both iterations run in one invocation
/// Then the second genome's training waits on the first genome's
///      checkpoint selection
#[test]
fn test_second_genome_waits_on_first_checkpoint() {
    let run = TestRun::new();
    let iterations = run.iterations(Mode::Retrain);
    assert_eq!(iterations.len(), 2);
    let mut runner = runner(&run, MockSubmitter::new());
    runner.run(&iterations, 1, None).unwrap();
    let mock = runner.submitter();

    let first_select = mock.find("select_ckpt-HG004-1").unwrap().id.clone();
    let second_train = mock.find("train_eval-HG003-1").unwrap();
    assert!(second_train.depends_on.contains(&first_select));
    assert_eq!(second_train.depends_on.len(), 3);

    assert_eq!(
        runner.env().get("HG004_select_ckpt_job"),
        Some(first_select.as_str())
    );
    assert_eq!(runner.env().get_usize("HG004_num_regions"), Some(3));
}

/// Test: Resuming mid-curriculum
/// Given a first invocation that ran only the first genome
/// When a second invocation starts at the second genome
/// Then its training waits on the select_ckpt job recorded by the first
#[test]
fn test_start_itr_uses_recorded_checkpoint() {
    let run = TestRun::new();
    let iterations = run.iterations(Mode::Retrain);

    let mut first = runner(&run, MockSubmitter::new());
    first.run(&iterations, 1, Some(1)).unwrap();
    let select = first.submitter().find("select_ckpt-HG004-1").unwrap().id.clone();

    let mut second = runner(&run, MockSubmitter::starting_at(20_000_001));
    second.run(&iterations, 2, Some(2)).unwrap();
    let train = second.submitter().find("train_eval-HG003-1").unwrap();
    assert!(train.depends_on.contains(&select));
}

/// Test: Skip-ahead
/// Given a curriculum entry that records the mother's select_ckpt job
/// When the mother's iteration runs
/// Then training phases are bypassed and benchmarking waits on that job
#[test]
fn test_satisfied_by_bypasses_training() {
    let run = TestRun::with_config(|config| {
        config.curriculum[0]
            .satisfied_by
            .insert(MOTHER.to_string(), "12345678".to_string());
    });
    let iterations = run.iterations(Mode::Retrain);
    let mut runner = runner(&run, MockSubmitter::new());
    let report = runner.run(&iterations, 1, None).unwrap();
    let mock = runner.submitter();

    assert!(mock.find("examples-HG004-1").is_none());
    assert!(mock.find("train_eval-HG004-1").is_none());
    for call in mock.for_phase(PhaseKind::CallVariants).iter().filter(|s| s.job_name.contains(MOTHER)) {
        assert_eq!(call.depends_on, vec![job("12345678")]);
    }

    let history = &report.iterations[0].history;
    let bypassed = history.iter().filter(|h| h.entry == PhaseEntry::Bypassed).count();
    assert_eq!(bypassed, 8);

    // The father's training still chains onto the recorded job.
    let father_train = mock.find("train_eval-HG003-1").unwrap();
    assert!(father_train.depends_on.contains(&job("12345678")));
}

/// Test: Demo mode
/// Given the demo mode
/// When it runs
/// Then only example preparation for a single train region is submitted
#[test]
fn test_demo_runs_single_region() {
    let run = TestRun::new();
    let iterations = run.iterations(Mode::Demo);
    let mut runner = runner(&run, MockSubmitter::new());
    runner.run(&iterations, 1, None).unwrap();

    assert_eq!(
        runner.submitter().job_names(),
        vec!["examples-HG004-1", "shuffle-HG004-1", "re_shuffle-HG004-1"]
    );
}

/// Test: Baseline mode
/// Given a configured baseline checkpoint
/// When baseline mode runs
/// Then only benchmarking is submitted, under the baseline label
#[test]
fn test_baseline_benchmarks_checkpoint() {
    let run = TestRun::new();
    let iterations = run.iterations(Mode::Baseline);
    let mut runner = runner(&run, MockSubmitter::new());
    runner.run(&iterations, 1, None).unwrap();
    let mock = runner.submitter();

    assert_eq!(mock.submissions.len(), 6);
    let call = mock.find("call_variants-baseline-wgs_v1-1").unwrap();
    assert!(call.depends_on.is_empty());
    assert!(run
        .ledger()
        .get("baseline-wgs_v1/call_variants/none")
        .is_some());
}

/// Test: Missing region files
/// Given no region files and no recorded region count for the genome
/// When the iteration runs
/// Then the run aborts before anything is submitted
#[test]
fn test_missing_regions_is_fatal() {
    let run = TestRun::with_config(|config| {
        config.curriculum[0].mother = "NA12878".to_string();
    });
    let iterations = run.iterations(Mode::Retrain);
    let mut runner = runner(&run, MockSubmitter::new());

    let err = runner.run(&iterations, 1, Some(1)).unwrap_err();
    assert!(matches!(err, Error::MissingUpstream(_)));
    assert!(runner.submitter().submissions.is_empty());
}

/// Test: Iteration range validation
/// Given a two-genome curriculum
/// When the requested range falls outside it
/// Then the run is rejected
#[test]
fn test_iteration_range_is_validated() {
    let run = TestRun::new();
    let iterations = run.iterations(Mode::Retrain);
    let mut runner = runner(&run, MockSubmitter::new());
    assert!(matches!(runner.run(&iterations, 0, None), Err(Error::Config(_))));
    assert!(matches!(runner.run(&iterations, 2, Some(3)), Err(Error::Config(_))));
    assert!(runner.submitter().submissions.is_empty());
}

/// Test: Dry-run parity
/// Given two identical runs with the same partial outputs
/// When one runs dry and the other submits
/// Then both make the same decisions and the dry run persists nothing
#[test]
fn test_dry_run_matches_real_run() {
    let real = TestRun::new();
    let dry = TestRun::new();
    for run in [&real, &dry] {
        let itr = &run.iterations(Mode::Retrain)[0];
        run.touch_outputs(itr, PhaseKind::Examples, GenomeRole::Train, &[0, 2]);
        run.touch_outputs(itr, PhaseKind::Examples, GenomeRole::Eval, &[0, 1]);
    }

    let mut real_runner = runner(&real, MockSubmitter::new());
    let real_report = real_runner.run(&real.iterations(Mode::Retrain), 1, Some(1)).unwrap();

    let flags = RunFlags {
        dry_run: true,
        ..RunFlags::default()
    };
    let mut dry_runner = PipelineRunner::new(
        DryRunSubmitter::new(),
        JobLedger::load(&dry.config.ledger_path()).unwrap(),
        EnvStore::load(&dry.config.env_path()).unwrap(),
    );
    let dry_report = dry_runner
        .run(&dry.iterations_with(Mode::Retrain, flags), 1, Some(1))
        .unwrap();

    let real_jobs: Vec<(String, usize)> = real_runner
        .submitter()
        .submissions
        .iter()
        .map(|s| (s.job_name.clone(), s.depends_on.len()))
        .collect();
    let dry_jobs: Vec<(String, usize)> = dry_runner
        .submitter()
        .submitted()
        .iter()
        .map(|(cmd, deps)| (cmd.job_name.clone(), deps.len()))
        .collect();
    assert_eq!(real_jobs, dry_jobs);

    for (r, d) in real_report.outcomes().zip(dry_report.outcomes()) {
        assert_eq!((r.phase, r.role), (d.phase, d.role));
        assert_eq!((r.submitted, r.skipped, r.failed), (d.submitted, d.skipped, d.failed));
    }
    assert!(dry_report.dry_run);
    assert!(!dry.config.ledger_path().exists());
    assert!(!dry.config.env_path().exists());
    assert!(real.config.ledger_path().exists());
}

/// Test: Benchmark mode
/// Given a curriculum whose mother entry records a select_ckpt job
/// When benchmark mode runs
/// Then each genome gets benchmarking only, waiting on the recorded job
///      where there is one
#[test]
fn test_benchmark_evaluates_each_genome_without_training() {
    let run = TestRun::with_config(|config| {
        config.curriculum[0]
            .satisfied_by
            .insert(MOTHER.to_string(), "12345678".to_string());
    });
    let iterations = run.iterations(Mode::Benchmark);
    let mut runner = runner(&run, MockSubmitter::new());
    let report = runner.run(&iterations, 1, None).unwrap();
    let mock = runner.submitter();

    assert_eq!(report.iterations.len(), 2);
    assert_eq!(mock.submissions.len(), 2 * 6);
    assert!(mock.for_phase(PhaseKind::Examples).is_empty());
    assert!(mock.for_phase(PhaseKind::TrainEval).is_empty());

    assert_eq!(
        mock.find("call_variants-HG004-1").unwrap().depends_on,
        vec![job("12345678")]
    );
    assert!(mock.find("call_variants-HG003-2").unwrap().depends_on.is_empty());
    assert!(run.ledger().get("HG003/convert/none").is_some());
}

/// Test: No test genomes
/// Given a config without test genomes
/// When a mode that benchmarks builds its iterations
/// Then it is rejected before anything can be submitted
#[test]
fn test_missing_test_genomes_rejected_up_front() {
    let run = TestRun::with_config(|config| config.tests.clear());
    let curriculum = Curriculum::new(run.config.clone());
    for mode in [Mode::Retrain, Mode::Baseline, Mode::Benchmark] {
        assert!(matches!(
            curriculum.iterations(mode, RunFlags::default()),
            Err(Error::Config(_))
        ));
    }
    assert_eq!(run.iterations(Mode::Demo).len(), 1);
}

/// Test: Checkpoint job from the env store
/// Given no ledger but an env store naming the mother's select_ckpt job
/// When the father's iteration runs on its own
/// Then its training waits on that job
#[test]
fn test_start_itr_falls_back_to_env_checkpoint_job() {
    let run = TestRun::new();
    let iterations = run.iterations(Mode::Retrain);
    let mut env = run.env();
    env.set("HG004_select_ckpt_job", "12345678");

    let mut runner = PipelineRunner::new(MockSubmitter::new(), run.ledger(), env);
    runner.run(&iterations, 2, Some(2)).unwrap();

    let train = runner.submitter().find("train_eval-HG003-1").unwrap();
    assert!(train.depends_on.contains(&job("12345678")));
}
