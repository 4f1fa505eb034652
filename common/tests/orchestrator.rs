use std::{
    path::PathBuf,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use common::{
    error::ReportError,
    orchestrator::{Orchestrator, RunEvent},
    run::{CommandTemplate, Invocation, Launcher, RunParams, RunStatus},
};

/// Pretends to run the sort tester, failing for the outputs it is told to
#[derive(Default)]
struct FakeLauncher {
    fail: Vec<String>,
    unlaunchable: Vec<String>,
    slow: Vec<String>,
    active: AtomicUsize,
    peak: AtomicUsize,
    launched: Mutex<Vec<String>>,
}

impl FakeLauncher {
    fn failing(fail: &[&str]) -> Self {
        FakeLauncher {
            fail: fail.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }
}

#[async_trait::async_trait]
impl Launcher for FakeLauncher {
    async fn launch(&self, invocation: &Invocation) -> std::io::Result<Option<i32>> {
        let name = invocation.output.to_string_lossy().into_owned();
        if self.unlaunchable.contains(&name) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no such program",
            ));
        }
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.launched.lock().unwrap().push(name.clone());
        let delay = if self.slow.contains(&name) { 100 } else { 5 };
        tokio::time::sleep(Duration::from_millis(delay)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(Some(if self.fail.contains(&name) { 1 } else { 0 }))
    }
}

fn params(output: &str) -> RunParams {
    RunParams {
        trials: 3,
        initial_length: 10,
        length_increment: 10,
        max_length: 100,
        min_value: 0,
        max_value: 1000,
        mode: "q".to_owned(),
        output: PathBuf::from(output),
    }
}

fn template() -> CommandTemplate {
    CommandTemplate::new("./sort_tester", None)
}

fn batch(n: usize) -> Vec<RunParams> {
    (0..n).map(|i| params(&format!("run_{i}.csv"))).collect()
}

#[tokio::test]
async fn every_run_reports_in_submission_order() {
    let orchestrator = Orchestrator::new(FakeLauncher::default(), template(), 3);
    let result = orchestrator.run(batch(7)).await.unwrap();
    assert_eq!(result.results.len(), 7);
    for (i, r) in result.results.iter().enumerate() {
        assert_eq!(r.index, i);
        assert_eq!(r.params.output, PathBuf::from(format!("run_{i}.csv")));
        assert_eq!(r.status, RunStatus::Succeeded);
    }
    assert!(result.succeeded());
    assert!(result.check().is_ok());
}

#[tokio::test]
async fn peak_concurrency_is_bounded() {
    let launcher = std::sync::Arc::new(FakeLauncher::default());
    let orchestrator = Orchestrator::new(SharedLauncher(launcher.clone()), template(), 3);
    orchestrator.run(batch(12)).await.unwrap();
    let peak = launcher.peak.load(Ordering::SeqCst);
    assert!((1..=3).contains(&peak), "peak was {peak}");
    assert_eq!(launcher.launched.lock().unwrap().len(), 12);
}

struct SharedLauncher(std::sync::Arc<FakeLauncher>);

#[async_trait::async_trait]
impl Launcher for SharedLauncher {
    async fn launch(&self, invocation: &Invocation) -> std::io::Result<Option<i32>> {
        self.0.launch(invocation).await
    }
}

#[tokio::test]
async fn zero_workers_means_one() {
    let orchestrator = Orchestrator::new(FakeLauncher::default(), template(), 0);
    assert_eq!(orchestrator.workers(), 1);
}

#[tokio::test]
async fn failure_fails_the_batch_and_skips_later_runs() {
    let orchestrator = Orchestrator::new(FakeLauncher::failing(&["run_1.csv"]), template(), 1);
    let result = orchestrator.run(batch(4)).await.unwrap();

    assert!(!result.succeeded());
    assert_eq!(result.results[0].status, RunStatus::Succeeded);
    assert_eq!(result.results[1].status, RunStatus::Failed { code: Some(1) });
    assert_eq!(result.results[2].status, RunStatus::Skipped);
    assert_eq!(result.results[3].status, RunStatus::Skipped);
    assert_eq!(result.first_failure().unwrap().index, 1);
    match result.check() {
        Err(ReportError::Process { index, output, .. }) => {
            assert_eq!(index, 1);
            assert_eq!(output, PathBuf::from("run_1.csv"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn in_flight_runs_finish_after_a_failure() {
    let launcher = FakeLauncher {
        fail: vec!["run_0.csv".to_owned()],
        slow: vec!["run_1.csv".to_owned()],
        ..Default::default()
    };
    let orchestrator = Orchestrator::new(launcher, template(), 2);
    let result = orchestrator.run(batch(4)).await.unwrap();

    let statuses = result
        .results
        .iter()
        .map(|r| r.status.clone())
        .collect::<Vec<_>>();
    assert_eq!(
        statuses,
        vec![
            RunStatus::Failed { code: Some(1) },
            RunStatus::Succeeded,
            RunStatus::Skipped,
            RunStatus::Skipped,
        ]
    );
    assert_eq!(result.first_failure().unwrap().index, 0);
    assert!(result.results[1].elapsed_ms >= 100);
}

#[tokio::test]
async fn launch_errors_are_failures() {
    let launcher = FakeLauncher {
        unlaunchable: vec!["run_0.csv".to_owned()],
        ..Default::default()
    };
    let orchestrator = Orchestrator::new(launcher, template(), 1);
    let result = orchestrator.run(batch(2)).await.unwrap();
    assert!(matches!(
        result.results[0].status,
        RunStatus::LaunchFailed { .. }
    ));
    assert_eq!(result.results[1].status, RunStatus::Skipped);
    assert!(result.check().is_err());
}

#[tokio::test]
async fn duplicate_outputs_are_rejected_before_launch() {
    let launcher = std::sync::Arc::new(FakeLauncher::default());
    let orchestrator = Orchestrator::new(SharedLauncher(launcher.clone()), template(), 2);
    let runs = vec![params("same.csv"), params("other.csv"), params("same.csv")];
    assert!(matches!(
        orchestrator.run(runs).await,
        Err(ReportError::Config(_))
    ));
    assert!(launcher.launched.lock().unwrap().is_empty());
}

#[tokio::test]
async fn invalid_params_are_rejected_before_launch() {
    let orchestrator = Orchestrator::new(FakeLauncher::default(), template(), 2);
    let mut bad = params("bad.csv");
    bad.trials = 0;
    assert!(orchestrator.run(vec![params("ok.csv"), bad]).await.is_err());
}

#[tokio::test]
async fn empty_batch_succeeds() {
    let orchestrator = Orchestrator::new(FakeLauncher::default(), template(), 4);
    let result = orchestrator.run(vec![]).await.unwrap();
    assert!(result.results.is_empty());
    assert!(result.succeeded());
}

#[tokio::test]
async fn emits_progress_events() {
    let (tx, rx) = flume::unbounded();
    let orchestrator =
        Orchestrator::new(FakeLauncher::default(), template(), 2).with_events(tx);
    orchestrator.run(batch(3)).await.unwrap();
    drop(orchestrator);

    let events = rx.drain().collect::<Vec<_>>();
    let started = events
        .iter()
        .filter(|e| matches!(e, RunEvent::Started { .. }))
        .count();
    let finished = events
        .iter()
        .filter(|e| matches!(e, RunEvent::Finished { status: RunStatus::Succeeded, .. }))
        .count();
    assert_eq!((started, finished), (3, 3));
}

#[tokio::test]
async fn creates_output_directories() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("nested/data/run.csv");
    let orchestrator = Orchestrator::new(FakeLauncher::default(), template(), 1);
    orchestrator
        .run(vec![params(&output.to_string_lossy())])
        .await
        .unwrap();
    assert!(output.parent().unwrap().is_dir());
}
