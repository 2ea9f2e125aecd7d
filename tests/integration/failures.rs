//! Submission failure tests.
//!
//! A failed `sbatch` must only affect the task it belongs to and whatever
//! depends on it; the next invocation resubmits exactly that slice.

use std::collections::HashMap;

use trioctl::core::{JobId, Slot};
use trioctl::orchestration::{inspect, JobState, PipelineRunner, SchedulerStatus};
use trioctl::workflow::{Mode, PhaseKind};
use trioctl::{Error, Result};

use crate::fixtures::{MockSubmitter, TestRun};

fn runner(run: &TestRun, submitter: MockSubmitter) -> PipelineRunner<MockSubmitter> {
    PipelineRunner::new(submitter, run.ledger(), run.env())
}

/// Scheduler that knows a fixed set of jobs.
struct FixedScheduler(HashMap<String, JobState>);

impl SchedulerStatus for FixedScheduler {
    fn state(&self, id: &JobId) -> Result<JobState> {
        Ok(self.0.get(id.as_str()).copied().unwrap_or(JobState::Completed))
    }
}

/// Test: Failure isolation
/// Given sbatch rejecting the second train region's examples job
/// When the iteration runs
/// Then sibling tasks are submitted, the per-task successor is marked
///      failed, and the all-of re-shuffle aborts the run
#[test]
fn test_failed_task_isolated_then_aborts_at_fan_in() {
    let run = TestRun::new();
    let iterations = run.iterations(Mode::Retrain);
    let mut runner = runner(&run, MockSubmitter::new().failing_on("examples-HG004-2"));

    let err = runner.run(&iterations, 1, Some(1)).unwrap_err();
    assert!(matches!(err, Error::UpstreamFailed { ref phase } if phase == "re_shuffle:train"));

    let mock = runner.submitter();
    assert!(mock.find("examples-HG004-1").is_some());
    assert!(mock.find("examples-HG004-3").is_some());
    assert!(mock.find("shuffle-HG004-2").is_none());
    assert_eq!(mock.for_phase(PhaseKind::Shuffle).len(), 2 + 2);
    assert!(mock.for_phase(PhaseKind::ReShuffle).is_empty());

    let ledger = run.ledger();
    let examples = &ledger.get("HG004/examples/train").unwrap().vector;
    assert_eq!(examples.failed_indices(), vec![1]);
    let shuffle = &ledger.get("HG004/shuffle/train").unwrap().vector;
    assert_eq!(shuffle.failed_indices(), vec![1]);
    assert!(ledger.get("HG004/re_shuffle/train").is_none());
}

/// Test: Resubmitting after a failure
/// Given a ledger left by a run that failed at examples task 1
/// When the iteration is invoked again with a working scheduler
/// Then only the failed slice and everything after it is submitted
#[test]
fn test_rerun_resubmits_only_failed_slice() {
    let run = TestRun::new();
    let iterations = run.iterations(Mode::Retrain);
    let mut first = runner(&run, MockSubmitter::new().failing_on("examples-HG004-2"));
    assert!(first.run(&iterations, 1, Some(1)).is_err());
    let shuffle1 = first.submitter().find("shuffle-HG004-1").unwrap().id.clone();

    let mut second = runner(&run, MockSubmitter::starting_at(20_000_001));
    second.run(&iterations, 1, Some(1)).unwrap();
    let mock = second.submitter();

    // examples + shuffle for region 2, both re-shuffles, train, select,
    // and 2 x (call, compare, convert).
    assert_eq!(mock.submissions.len(), 12);
    let examples = mock.find("examples-HG004-2").unwrap();
    assert_eq!(examples.task, 1);
    assert_eq!(
        mock.find("shuffle-HG004-2").unwrap().depends_on,
        vec![examples.id.clone()]
    );
    assert!(mock.find("examples-HG002-1").is_none());

    let rs_train = mock.find("re_shuffle-HG004-1").unwrap();
    assert_eq!(rs_train.depends_on.len(), 3);
    assert!(rs_train.depends_on.contains(&shuffle1));

    let record = run.ledger();
    let record = &record.get("HG004/examples/train").unwrap().vector;
    assert!(!record.has_failures());
    assert_eq!(record.get(1), Some(&Slot::job(examples.id.clone())));
}

/// Test: Failure in a terminal phase
/// Given sbatch rejecting the first comparison job
/// When both iterations run
/// Then the run still completes, the conversion that depends on it is
///      marked failed, and the next genome is processed
#[test]
fn test_terminal_failure_does_not_abort() {
    let run = TestRun::new();
    let iterations = run.iterations(Mode::Retrain);
    let mut runner = runner(&run, MockSubmitter::new().failing_on("compare-HG004-1"));

    let report = runner.run(&iterations, 1, None).unwrap();
    assert_eq!(report.failed(), 2);
    assert_eq!(report.iterations.len(), 2);

    let mock = runner.submitter();
    assert!(mock.find("convert-HG004-1").is_none());
    assert!(mock.find("convert-HG004-2").is_some());
    assert!(mock.find("compare-HG003-1").is_some());

    let convert = report
        .outcomes()
        .find(|o| o.phase == PhaseKind::Convert)
        .unwrap();
    assert_eq!((convert.submitted, convert.failed), (1, 1));
    assert!(convert.record.get(0).unwrap().is_failed());
}

/// Test: Status suggestion
/// Given a ledger with a failed submission and a cancelled job
/// When the recorded jobs are inspected
/// Then the suggested restart arguments name exactly those tasks
#[test]
fn test_status_suggests_restart_for_failed_slots() {
    let run = TestRun::new();
    let iterations = run.iterations(Mode::Retrain);
    let mut runner = runner(&run, MockSubmitter::new().failing_on("compare-HG004-1"));
    runner.run(&iterations, 1, Some(1)).unwrap();

    let mock = runner.submitter();
    let call2 = mock.find("call_variants-HG004-2").unwrap().id.clone();
    let compare2 = mock.find("compare-HG004-2").unwrap().id.clone();
    let convert2 = mock.find("convert-HG004-2").unwrap().id.clone();

    let mut states = HashMap::new();
    states.insert(call2.as_str().to_string(), JobState::Cancelled);
    let statuses = inspect(&run.ledger(), "HG004/", &FixedScheduler(states)).unwrap();

    let arg = |key: &str| {
        statuses
            .iter()
            .find(|s| s.key == key)
            .and_then(|s| s.restart_arg())
    };
    assert_eq!(arg("HG004/compare/none"), Some(format!("--restart compare=0,{}", compare2)));
    assert_eq!(arg("HG004/convert/none"), Some(format!("--restart convert=0,{}", convert2)));
    assert!(arg("HG004/call_variants/none")
        .unwrap()
        .ends_with(&format!("{},1", mock.find("call_variants-HG004-1").unwrap().id)));
    assert_eq!(arg("HG004/examples/train"), None);
}
