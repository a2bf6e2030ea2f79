//! Messages exchanged with the control panel.
//!
//! Commands flow in over an `mpsc` channel consumed only by the coordinator.
//! Messages flow out over a `broadcast` channel so any number of connected
//! panels see the same stream. A `watch` channel carries a snapshot of every
//! job for read-only consumers.

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, watch};

use super::models::{BackupSettings, BackupStatus, FileTree, JobSummary, Lifecycle, RunReport};

const OUTBOUND_CAPACITY: usize = 1024;
/// Commands queued for the coordinator before further ones are refused.
pub const COMMAND_CAPACITY: usize = 64;

/// Commands sent by the control panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum UiCommand {
    ControlPanelReady,
    CreateBackup {
        settings: BackupSettings,
    },
    StartBackup {
        entry_id: String,
    },
    CancelProcess {
        entry_id: String,
    },
    SelectDirectory {
        entry_id: String,
    },
    RefreshFileTree {
        entry_id: String,
    },
    RefreshStatus {
        entry_id: String,
    },
    SaveSettings {
        entry_id: String,
        settings: BackupSettings,
    },
    RequestBackupDeletion {
        entry_id: String,
    },
    RestoreFile {
        entry_id: String,
        source_path: String,
    },
    RestoreAll {
        entry_id: String,
    },
}

impl UiCommand {
    pub fn entry_id(&self) -> Option<&str> {
        match self {
            Self::ControlPanelReady | Self::CreateBackup { .. } => None,
            Self::StartBackup { entry_id }
            | Self::CancelProcess { entry_id }
            | Self::SelectDirectory { entry_id }
            | Self::RefreshFileTree { entry_id }
            | Self::RefreshStatus { entry_id }
            | Self::SaveSettings { entry_id, .. }
            | Self::RequestBackupDeletion { entry_id }
            | Self::RestoreFile { entry_id, .. }
            | Self::RestoreAll { entry_id } => Some(entry_id),
        }
    }
}

/// Payload of `set-backup-status`: either the report of a finished run or a
/// collection status snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StatusPayload {
    Run(RunReport),
    Collection(BackupStatus),
}

/// Messages pushed to the control panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum UiMessage {
    SetBackupOptions {
        entry_id: String,
        settings: BackupSettings,
        is_new: bool,
    },
    SetBackupStatus {
        entry_id: String,
        status: StatusPayload,
    },
    SetBackupFileTree {
        entry_id: String,
        tree: FileTree,
    },
    SetBackupPath {
        path: PathBuf,
        entry_id: String,
    },
    ConfirmBackupDeletion {
        entry_id: String,
    },
    SetBackupUi {
        entry_id: String,
        lifecycle: Lifecycle,
        message: String,
    },
    SetBackupHistory {
        entry_id: String,
        line: String,
    },
    CommandRejected {
        entry_id: Option<String>,
        message: String,
    },
    BackupCreationFailed {
        message: String,
    },
}

/// Panel-side handle: send commands, observe messages and job snapshots.
#[derive(Clone)]
pub struct PanelHandle {
    commands: mpsc::Sender<UiCommand>,
    outbound: broadcast::Sender<UiMessage>,
    jobs: watch::Receiver<Vec<JobSummary>>,
}

impl PanelHandle {
    pub async fn send(&self, command: UiCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| anyhow!("Coordinator is not running"))
    }

    /// Queue a command without waiting for space.
    pub fn try_send(&self, command: UiCommand) -> Result<(), TrySendError<UiCommand>> {
        self.commands.try_send(command)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiMessage> {
        self.outbound.subscribe()
    }

    pub fn jobs(&self) -> Vec<JobSummary> {
        self.jobs.borrow().clone()
    }
}

/// Coordinator-side end of the panel channel.
pub struct PanelEndpoint {
    pub(crate) commands: mpsc::Receiver<UiCommand>,
    outbound: broadcast::Sender<UiMessage>,
    jobs: watch::Sender<Vec<JobSummary>>,
}

impl PanelEndpoint {
    pub(crate) fn publish(&self, message: UiMessage) {
        // No subscribers just means no panel is open.
        let _ = self.outbound.send(message);
    }

    pub(crate) fn publish_jobs(&self, jobs: Vec<JobSummary>) {
        self.jobs.send_replace(jobs);
    }
}

pub fn channel() -> (PanelHandle, PanelEndpoint) {
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
    let (outbound, _) = broadcast::channel(OUTBOUND_CAPACITY);
    let (jobs_tx, jobs_rx) = watch::channel(Vec::new());

    (
        PanelHandle {
            commands: commands_tx,
            outbound: outbound.clone(),
            jobs: jobs_rx,
        },
        PanelEndpoint {
            commands: commands_rx,
            outbound,
            jobs: jobs_tx,
        },
    )
}
