use std::path::Path;
use std::time::Instant;

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;

use super::{EngineWorker, OutputSink, WorkerShared};
use crate::core::models::{
    BackupMode, BackupSettings, BackupStatus, FileEntry, FileTree, RunReport,
};

/// Engine stand-in that produces plausible output without touching disk.
pub struct SimulatedWorker {
    shared: WorkerShared,
    step_delay: Duration,
}

impl SimulatedWorker {
    pub fn new(entry_id: &str) -> Self {
        Self::with_step_delay(entry_id, Duration::from_millis(500))
    }

    pub fn with_step_delay(entry_id: &str, step_delay: Duration) -> Self {
        Self {
            shared: WorkerShared::new(entry_id),
            step_delay,
        }
    }

    /// Emit `steps` progress lines, stopping early on cancellation.
    async fn simulate(&self, label: &str, steps: u32, cancel: &CancellationToken) -> Result<()> {
        for step in 1..=steps {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => bail!("Process cancelled"),
                _ = sleep(self.step_delay) => {
                    self.shared.emit(format!("{}: {}%", label, step * 100 / steps));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EngineWorker for SimulatedWorker {
    fn entry_id(&self) -> &str {
        self.shared.entry_id()
    }

    fn set_data(&self, settings: BackupSettings) {
        self.shared.set_settings(settings);
    }

    fn subscribe_output(&self, sink: OutputSink) {
        self.shared.set_sink(sink);
    }

    async fn run(&self, mode: BackupMode, cancel: CancellationToken) -> Result<RunReport> {
        let settings = self.shared.settings()?;
        let started = Instant::now();

        self.simulate(
            &format!("{} backup of {}", mode, settings.path.display()),
            10,
            &cancel,
        )
        .await?;

        Ok(RunReport {
            mode,
            duration_secs: started.elapsed().as_secs(),
            stats: vec!["SourceFiles 42".into(), "Errors 0".into()],
        })
    }

    async fn status(&self, cancel: CancellationToken) -> Result<BackupStatus> {
        let settings = self.shared.settings()?;
        self.simulate("Reading collection status", 2, &cancel).await?;

        Ok(BackupStatus {
            lines: vec![
                format!("Connecting with backend: {}", settings.url),
                "Found 1 backup chains without signatures".into(),
            ],
        })
    }

    async fn list_files(&self, cancel: CancellationToken) -> Result<FileTree> {
        self.shared.settings()?;
        self.simulate("Listing files", 2, &cancel).await?;

        Ok(["docs", "docs/notes.txt", "photos", "photos/2024.jpg"]
            .into_iter()
            .map(|path| FileEntry {
                path: path.to_string(),
                modified: "Tue Jan  9 10:12:01 2024".to_string(),
            })
            .collect())
    }

    async fn restore_file(
        &self,
        source: &str,
        destination: &Path,
        cancel: CancellationToken,
    ) -> Result<()> {
        self.shared.settings()?;
        self.simulate(
            &format!("Restoring {} to {}", source, destination.display()),
            4,
            &cancel,
        )
        .await
    }

    async fn restore_tree(&self, destination: &Path, cancel: CancellationToken) -> Result<()> {
        self.shared.settings()?;
        self.simulate(
            &format!("Restoring all files to {}", destination.display()),
            6,
            &cancel,
        )
        .await
    }
}
