//! Per-entry handles to the external backup engine.

pub mod duplicity;
pub mod simulated;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::models::{BackupMode, BackupSettings, BackupStatus, FileTree, RunReport};

/// A line of engine output tagged with the entry that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerOutput {
    pub entry_id: String,
    pub text: String,
}

pub type OutputSink = mpsc::UnboundedSender<WorkerOutput>;

/// Wraps the backup engine for a single entry.
///
/// Implementations are not required to support concurrent calls; the
/// coordinator never issues a second operation before the first completes.
///
/// Every operation receives the token of its own call. Cancelling it asks the
/// operation to stop; the operation still completes through its own future,
/// normally with a "Process cancelled" error.
#[async_trait]
pub trait EngineWorker: Send + Sync {
    fn entry_id(&self) -> &str;

    /// Replace the cached settings used for subsequent operations.
    fn set_data(&self, settings: BackupSettings);

    /// Register where progress output goes. Called once per worker.
    fn subscribe_output(&self, sink: OutputSink);

    async fn run(&self, mode: BackupMode, cancel: CancellationToken) -> Result<RunReport>;

    async fn status(&self, cancel: CancellationToken) -> Result<BackupStatus>;

    async fn list_files(&self, cancel: CancellationToken) -> Result<FileTree>;

    async fn restore_file(
        &self,
        source: &str,
        destination: &Path,
        cancel: CancellationToken,
    ) -> Result<()>;

    async fn restore_tree(&self, destination: &Path, cancel: CancellationToken) -> Result<()>;
}

pub trait WorkerFactory: Send + Sync {
    fn create(&self, entry_id: &str) -> Arc<dyn EngineWorker>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EngineType {
    #[default]
    Duplicity,
    Simulated,
}

/// Builds workers of the configured engine type.
pub struct EngineWorkerFactory {
    engine: EngineType,
    duplicity_binary: PathBuf,
}

impl EngineWorkerFactory {
    pub fn new(engine: EngineType, duplicity_binary: PathBuf) -> Self {
        Self {
            engine,
            duplicity_binary,
        }
    }
}

impl WorkerFactory for EngineWorkerFactory {
    fn create(&self, entry_id: &str) -> Arc<dyn EngineWorker> {
        match self.engine {
            EngineType::Duplicity => Arc::new(duplicity::DuplicityWorker::new(
                entry_id,
                self.duplicity_binary.clone(),
            )),
            EngineType::Simulated => Arc::new(simulated::SimulatedWorker::new(entry_id)),
        }
    }
}

/// State every worker implementation carries: cached settings and the
/// output sink.
pub(crate) struct WorkerShared {
    entry_id: String,
    settings: RwLock<Option<BackupSettings>>,
    sink: Mutex<Option<OutputSink>>,
}

impl WorkerShared {
    pub(crate) fn new(entry_id: &str) -> Self {
        Self {
            entry_id: entry_id.to_string(),
            settings: RwLock::new(None),
            sink: Mutex::new(None),
        }
    }

    pub(crate) fn entry_id(&self) -> &str {
        &self.entry_id
    }

    pub(crate) fn set_settings(&self, settings: BackupSettings) {
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = Some(settings);
    }

    pub(crate) fn settings(&self) -> Result<BackupSettings> {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| anyhow!("No settings loaded for backup {}", self.entry_id))
    }

    pub(crate) fn set_sink(&self, sink: OutputSink) {
        *self.sink.lock().unwrap_or_else(PoisonError::into_inner) = Some(sink);
    }

    pub(crate) fn emit(&self, text: impl Into<String>) {
        let sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(sink) = sink.as_ref() {
            let _ = sink.send(WorkerOutput {
                entry_id: self.entry_id.clone(),
                text: text.into(),
            });
        }
    }
}
