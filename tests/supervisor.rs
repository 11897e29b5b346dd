#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::time::timeout;

use simvisor::diagnose::ExitCategory;
use simvisor::{
    Config, Event, EventKind, ProgressMonitor, RunError, RunLogFile, RunOutcome, RunRequest,
    Solver, Subscribe, Supervisor,
};

/// Project whose "solver" is `/bin/sh` and whose CompLaB.xml is the script it runs.
fn project(script: &str) -> (tempfile::TempDir, RunRequest) {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("CompLaB.xml"), script).unwrap();
    fs::create_dir(dir.path().join("input")).unwrap();
    let req = RunRequest::new("/bin/sh", dir.path());
    (dir, req)
}

fn config() -> Config {
    Config {
        grace: Duration::from_secs(2),
        ..Config::default()
    }
}

async fn until_finished(rx: &mut broadcast::Receiver<Event>) -> Vec<EventKind> {
    let mut out = Vec::new();
    loop {
        let ev = timeout(Duration::from_secs(20), rx.recv())
            .await
            .expect("no Finished within 20s")
            .expect("bus closed");
        if ev.run.is_none() {
            continue;
        }
        let done = ev.is_finished();
        out.push(ev.kind);
        if done {
            return out;
        }
    }
}

fn output_lines(events: &[EventKind]) -> Vec<String> {
    events
        .iter()
        .filter_map(|k| match k {
            EventKind::OutputLine { line } => Some(line.to_string()),
            _ => None,
        })
        .collect()
}

fn finished_outcome(events: &[EventKind]) -> RunOutcome {
    let finished: Vec<&RunOutcome> = events
        .iter()
        .filter_map(|k| match k {
            EventKind::Finished { outcome, .. } => Some(outcome),
            _ => None,
        })
        .collect();
    assert_eq!(finished.len(), 1, "exactly one Finished expected");
    finished[0].clone()
}

#[tokio::test]
async fn test_successful_run_streams_parsed_events() {
    let (_dir, req) = project(
        "echo 'ade_max_iT = 100'\n\
         echo '==== Phase 1: flow ===='\n\
         echo 'iT = 10'\n\
         echo 'NS residual = 1.5e-3'\n\
         echo 'iT = 50' >&2\n\
         exit 0\n",
    );
    let sup = Supervisor::builder(config()).build();
    let mut rx = sup.subscribe();

    let report = sup.start(req).await.unwrap().wait().await;
    let events = until_finished(&mut rx).await;

    assert!(matches!(events.first(), Some(EventKind::Started { .. })));
    assert_eq!(
        output_lines(&events),
        vec![
            "ade_max_iT = 100",
            "==== Phase 1: flow ====",
            "iT = 10",
            "NS residual = 1.5e-3",
            "iT = 50",
        ]
    );
    assert!(events.iter().any(|k| matches!(
        k,
        EventKind::Progress { iteration: 50, max_iteration: 100, .. }
    )));
    assert!(events.iter().any(|k| matches!(
        k,
        EventKind::Convergence { solver: Solver::Ns, residual, .. } if (*residual - 1.5e-3).abs() < 1e-12
    )));
    assert!(events.iter().any(|k| matches!(k, EventKind::PhaseChanged { .. })));
    assert_eq!(finished_outcome(&events), RunOutcome::Succeeded);

    assert!(report.outcome.is_success());
    assert!(report.diagnostic.is_none());
    assert!(report.summary.starts_with("Completed successfully in"));
    assert!(!sup.is_running());
}

#[tokio::test]
async fn test_failed_exit_publishes_diagnostic_before_finished() {
    let (_dir, req) = project("echo 'terminate called: std::bad_alloc'\nexit 3\n");
    let sup = Supervisor::builder(config()).build();
    let mut rx = sup.subscribe();

    let report = sup.start(req).await.unwrap().wait().await;
    let events = until_finished(&mut rx).await;

    let n = events.len();
    assert!(matches!(events[n - 2], EventKind::Diagnostic { .. }));
    assert_eq!(finished_outcome(&events), RunOutcome::Failed { exit_code: 3 });

    let diag = report.diagnostic.expect("diagnostic for a failed exit");
    assert_eq!(diag.exit_code(), 3);
    assert!(!diag.evidence.signatures.is_empty());
}

#[tokio::test]
async fn test_signal_death_is_reported_as_negative_code() {
    let (_dir, req) = project("kill -9 $$\n");
    let sup = Supervisor::builder(config()).build();

    let report = sup.start(req).await.unwrap().wait().await;

    assert_eq!(report.outcome, RunOutcome::Failed { exit_code: -9 });
    let diag = report.diagnostic.unwrap();
    assert_eq!(diag.classification.category(), ExitCategory::Killed);
}

#[tokio::test]
async fn test_cancel_stops_output_and_finishes_once() {
    let (_dir, req) = project("echo ready\nexec sleep 30\n");
    let sup = Supervisor::builder(config()).build();
    let mut rx = sup.subscribe();

    let run = sup.start(req).await.unwrap();
    loop {
        let ev = timeout(Duration::from_secs(10), rx.recv()).await.unwrap().unwrap();
        if matches!(&ev.kind, EventKind::OutputLine { line } if &**line == "ready") {
            break;
        }
    }
    sup.cancel();
    let report = timeout(Duration::from_secs(10), run.wait()).await.unwrap();
    let events = until_finished(&mut rx).await;

    let cancel_at = events
        .iter()
        .position(|k| matches!(k, EventKind::CancelRequested))
        .expect("CancelRequested");
    assert!(output_lines(&events[cancel_at..]).is_empty());
    assert_eq!(finished_outcome(&events), RunOutcome::Cancelled);
    assert!(report.outcome.is_cancelled());
    assert_eq!(report.outcome.exit_code(), None);
}

#[tokio::test]
async fn test_missing_executable_never_spawns() {
    let (dir, _) = project("exit 0\n");
    let req = RunRequest::new(dir.path().join("no-such-solver"), dir.path());
    let sup = Supervisor::builder(config()).build();
    let mut rx = sup.subscribe();

    let err = sup.start(req).await.unwrap_err();
    assert!(matches!(err, RunError::ExecutableNotFound { .. }));

    let events = until_finished(&mut rx).await;
    assert!(output_lines(&events).is_empty());
    assert!(!events.iter().any(|k| matches!(k, EventKind::Started { .. })));
    assert!(matches!(events[0], EventKind::Diagnostic { .. }));
    match finished_outcome(&events) {
        RunOutcome::NotStarted { label, .. } => assert_eq!(label, "executable_not_found"),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(!sup.is_running());
}

#[tokio::test]
async fn test_second_start_is_refused_while_running() {
    let (_dir, req) = project("exec sleep 30\n");
    let (_dir2, req2) = project("exit 0\n");
    let (_dir3, req3) = project("exit 0\n");
    let sup = Supervisor::builder(config()).build();

    let run = sup.start(req).await.unwrap();
    assert!(sup.is_running());
    assert_eq!(sup.active_run(), Some(run.id()));

    let err = sup.start(req2).await.unwrap_err();
    assert!(matches!(err, RunError::AlreadyRunning));

    run.cancel();
    run.wait().await;
    assert!(!sup.is_running());

    let report = sup.start(req3).await.unwrap().wait().await;
    assert!(report.outcome.is_success());
}

#[tokio::test]
async fn test_subscribers_see_the_whole_run() {
    let (dir, req) = project("echo 'ade_max_iT = 200'\necho 'iT = 200'\n");
    let monitor = Arc::new(ProgressMonitor::new());
    let log = Arc::new(RunLogFile::in_dir(req.output_dir()));
    let sup = Supervisor::builder(config())
        .with_subscribers(vec![
            monitor.clone() as Arc<dyn Subscribe>,
            log as Arc<dyn Subscribe>,
        ])
        .build();

    sup.start(req).await.unwrap().wait().await;
    sup.close().await;

    let snap = monitor.snapshot().await;
    assert_eq!(snap.outcome, Some(RunOutcome::Succeeded));
    assert_eq!(snap.iteration, 200);
    assert_eq!(snap.percent(), Some(100.0));

    let logs: Vec<_> = fs::read_dir(dir.path().join("output"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(logs.len(), 1);
    let text = fs::read_to_string(&logs[0]).unwrap();
    assert!(text.contains("iT = 200"));
    assert!(text.contains("Completed successfully"));
    assert!(Path::new(&logs[0]).extension().is_some_and(|e| e == "log"));
}

/// Counts what it sees, sleeping a little on every event.
#[derive(Default)]
struct Tally {
    delay: Duration,
    lines: AtomicUsize,
    finished: AtomicUsize,
    last_was_finished: AtomicUsize,
}

#[async_trait]
impl Subscribe for Tally {
    async fn on_event(&self, ev: &Event) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if ev.run.is_none() {
            return;
        }
        self.last_was_finished
            .store(usize::from(ev.is_finished()), Ordering::SeqCst);
        match ev.kind {
            EventKind::OutputLine { .. } => {
                self.lines.fetch_add(1, Ordering::SeqCst);
            }
            EventKind::Finished { .. } => {
                self.finished.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }
    }

    fn name(&self) -> &'static str {
        "tally"
    }

    fn queue_capacity(&self) -> usize {
        16
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_subscribers_get_every_line_and_one_finished() {
    let (_dir, req) = project(
        "echo 'ade_max_iT = 600'\n\
         i=1\n\
         while [ $i -le 600 ]; do echo \"iT = $i\"; i=$((i+1)); done\n",
    );
    let slow = Arc::new(Tally {
        delay: Duration::from_millis(1),
        ..Tally::default()
    });
    let fast = Arc::new(Tally::default());
    let monitor = Arc::new(ProgressMonitor::new());
    let sup = Supervisor::builder(Config {
        bus_capacity: 32,
        ..config()
    })
    .with_subscribers(vec![
        slow.clone() as Arc<dyn Subscribe>,
        fast.clone() as Arc<dyn Subscribe>,
        monitor.clone() as Arc<dyn Subscribe>,
    ])
    .build();

    let report = timeout(Duration::from_secs(60), sup.start(req).await.unwrap().wait())
        .await
        .expect("run did not finish");
    sup.close().await;

    assert!(report.outcome.is_success());
    for tally in [&slow, &fast] {
        assert_eq!(tally.lines.load(Ordering::SeqCst), 601);
        assert_eq!(tally.finished.load(Ordering::SeqCst), 1);
        assert_eq!(tally.last_was_finished.load(Ordering::SeqCst), 1);
    }
    let snap = monitor.snapshot().await;
    assert_eq!(snap.iteration, 600);
    assert_eq!(snap.outcome, Some(RunOutcome::Succeeded));
}
