use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::scheduler::Schedule;

/// Persisted configuration of one backup entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSettings {
    #[serde(default)]
    pub title: String,
    /// Local directory being backed up.
    pub path: PathBuf,
    /// Engine target URL, e.g. `sftp://host/backups` or `file:///mnt/disk`.
    pub url: String,
    #[serde(default)]
    pub schedule: Schedule,
    /// Extra engine flags passed through verbatim (`--name value`).
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackupMode {
    #[default]
    Incremental,
    Full,
}

impl BackupMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Incremental => "incremental",
            Self::Full => "full",
        }
    }
}

impl fmt::Display for BackupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    #[default]
    Idle,
    Processing,
}

impl Lifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Processing => "processing",
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One line of an entry's UI log, stored exactly as it was published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryLine {
    pub recorded_at: DateTime<Local>,
    pub text: String,
}

/// Outcome of a successful `run`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub mode: BackupMode,
    pub duration_secs: u64,
    /// Statistics block printed by the engine at the end of a run.
    pub stats: Vec<String>,
}

/// Collection status as reported by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupStatus {
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub modified: String,
}

pub type FileTree = Vec<FileEntry>;

/// Read-only view of a job, shared with the web surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub entry_id: String,
    pub title: String,
    pub lifecycle: Lifecycle,
    pub history_len: usize,
    pub last_message: Option<String>,
}
