//! # RunLogFile: one text log per run.
//!
//! Opens `simulation_<YYYYmmdd_HHMMSS>.log` in the configured directory on
//! `Started`, appends every output line and diagnostic, writes the summary on
//! `Finished` and closes the file.
//!
//! I/O failures are logged and disable the file for the rest of the run;
//! they never reach the run itself.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::events::{Event, EventKind, RunId};
use crate::subscribers::Subscribe;

struct OpenLog {
    run: RunId,
    path: PathBuf,
    file: File,
}

/// Subscriber writing a plain-text log per run.
pub struct RunLogFile {
    dir: PathBuf,
    current: Mutex<Option<OpenLog>>,
}

impl RunLogFile {
    /// Writes logs into `dir` (usually the project's `output/`), creating it if needed.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            current: Mutex::new(None),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_name() -> String {
        format!(
            "simulation_{}.log",
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        )
    }

    async fn open(&self, run: RunId, command: &str) -> std::io::Result<OpenLog> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(Self::file_name());
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let header = format!(
            "CompLaB3D simulation log\nStarted: {}\nRun: {run}\nCommand: {command}\n{}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            "=".repeat(60),
        );
        file.write_all(header.as_bytes()).await?;
        Ok(OpenLog { run, path, file })
    }

    async fn handle(&self, ev: &Event) -> std::io::Result<()> {
        let Some(run) = ev.run else {
            return Ok(());
        };
        let mut guard = self.current.lock().await;

        if let EventKind::Started { command, .. } = &ev.kind {
            if let Some(mut prev) = guard.take() {
                let _ = prev.file.flush().await;
            }
            *guard = Some(self.open(run, command).await?);
            return Ok(());
        }

        let Some(log) = guard.as_mut().filter(|l| l.run == run) else {
            return Ok(());
        };
        match &ev.kind {
            EventKind::OutputLine { line } => {
                log.file.write_all(line.as_bytes()).await?;
                log.file.write_all(b"\n").await?;
            }
            EventKind::Diagnostic { report } => {
                log.file.write_all(b"\n").await?;
                log.file.write_all(report.as_bytes()).await?;
                log.file.write_all(b"\n").await?;
            }
            EventKind::Finished { summary, .. } => {
                let footer = format!("{}\n{summary}\n", "=".repeat(60));
                log.file.write_all(footer.as_bytes()).await?;
                log.file.flush().await?;
                *guard = None;
            }
            _ => {}
        }
        Ok(())
    }
}

#[async_trait]
impl Subscribe for RunLogFile {
    async fn on_event(&self, ev: &Event) {
        if let Err(e) = self.handle(ev).await {
            let mut guard = self.current.lock().await;
            let path = guard.take().map(|l| l.path);
            tracing::warn!(error = %e, ?path, dir = %self.dir.display(), "run log disabled");
        }
    }

    fn name(&self) -> &'static str {
        "RunLogFile"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RunOutcome;
    use std::time::Duration;

    fn ev(run: u64, kind: EventKind) -> Event {
        Event::now(RunId::new(run), kind)
    }

    fn only_log(dir: &Path) -> PathBuf {
        let entries: Vec<_> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(entries.len(), 1, "{entries:?}");
        entries.into_iter().next().unwrap()
    }

    #[tokio::test]
    async fn test_writes_output_diagnostic_and_summary() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("output");
        let log = RunLogFile::in_dir(&out);

        log.on_event(&ev(
            1,
            EventKind::Started {
                pid: Some(7),
                command: "/opt/complab CompLaB.xml".into(),
            },
        ))
        .await;
        log.on_event(&ev(1, EventKind::OutputLine { line: "iT = 10".into() })).await;
        log.on_event(&ev(2, EventKind::OutputLine { line: "other run".into() })).await;
        log.on_event(&ev(1, EventKind::Diagnostic { report: "SIMULATION FAILED".into() }))
            .await;
        log.on_event(&ev(
            1,
            EventKind::Finished {
                outcome: RunOutcome::Failed { exit_code: 1 },
                summary: "Exited with code 1 (General Error) after 0h 0m 1s".into(),
                elapsed: Duration::from_secs(1),
            },
        ))
        .await;
        log.on_event(&ev(1, EventKind::OutputLine { line: "late".into() })).await;

        let path = only_log(&out);
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("simulation_") && name.ends_with(".log"));

        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("Command: /opt/complab CompLaB.xml"));
        assert!(text.contains("iT = 10\n"));
        assert!(text.contains("SIMULATION FAILED"));
        assert!(text.trim_end().ends_with("after 0h 0m 1s"));
        assert!(!text.contains("other run"));
        assert!(!text.contains("late"));
    }

    #[tokio::test]
    async fn test_events_before_start_are_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let log = RunLogFile::in_dir(tmp.path().join("output"));
        log.on_event(&ev(1, EventKind::OutputLine { line: "x".into() })).await;
        assert!(!log.dir().exists());
    }
}
