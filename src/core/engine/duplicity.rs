use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{EngineWorker, OutputSink, WorkerShared};
use crate::core::models::{
    BackupMode, BackupSettings, BackupStatus, FileEntry, FileTree, RunReport,
};

/// Option key that is exported as `PASSPHRASE` instead of passed as a flag.
const PASSPHRASE_OPTION: &str = "passphrase";

const STATS_HEADER: &str = "[ Backup Statistics ]";

// "Tue Jan  9 10:12:01 2024 docs/report.odt"
static FILE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\w{3} \w{3}\s+\d{1,2} \d{2}:\d{2}:\d{2} \d{4}) (.+)$").unwrap()
});

pub struct DuplicityWorker {
    shared: WorkerShared,
    binary: PathBuf,
}

impl DuplicityWorker {
    pub fn new(entry_id: &str, binary: PathBuf) -> Self {
        Self {
            shared: WorkerShared::new(entry_id),
            binary,
        }
    }

    /// Run duplicity to completion, forwarding every output line.
    /// Returns the stdout lines.
    async fn execute(
        &self,
        args: Vec<String>,
        settings: &BackupSettings,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        if cancel.is_cancelled() {
            bail!("Process cancelled");
        }

        debug!(entry_id = self.shared.entry_id(), args = ?args, "Spawning duplicity");

        let mut command = Command::new(&self.binary);
        command
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(passphrase) = settings.options.get(PASSPHRASE_OPTION) {
            command.env("PASSPHRASE", passphrase);
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.binary.display()))?;

        let stdout = child.stdout.take().context("Failed to capture stdout")?;
        let stderr = child.stderr.take().context("Failed to capture stderr")?;
        let mut stdout = BufReader::new(stdout).lines();
        let mut stderr = BufReader::new(stderr).lines();

        let mut collected = Vec::new();
        let mut last_error = None;
        let mut stdout_done = false;
        let mut stderr_done = false;

        while !(stdout_done && stderr_done) {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let _ = child.kill().await;
                    bail!("Process cancelled");
                }
                line = stdout.next_line(), if !stdout_done => match line? {
                    Some(line) => {
                        self.shared.emit(line.clone());
                        collected.push(line);
                    }
                    None => stdout_done = true,
                },
                line = stderr.next_line(), if !stderr_done => match line? {
                    Some(line) => {
                        self.shared.emit(line.clone());
                        last_error = Some(line);
                    }
                    None => stderr_done = true,
                },
            }
        }

        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                bail!("Process cancelled");
            }
            status = child.wait() => status.context("Failed to wait for duplicity")?,
        };

        if !status.success() {
            warn!(entry_id = self.shared.entry_id(), %status, "duplicity failed");
            match last_error {
                Some(line) => bail!(line),
                None => bail!("duplicity exited with {}", status),
            }
        }

        Ok(collected)
    }
}

#[async_trait]
impl EngineWorker for DuplicityWorker {
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

        let mut args = vec![mode.as_str().to_string()];
        args.extend(option_args(&settings));
        args.push(settings.path.display().to_string());
        args.push(settings.url.clone());

        let lines = self.execute(args, &settings, &cancel).await?;

        Ok(RunReport {
            mode,
            duration_secs: started.elapsed().as_secs(),
            stats: parse_stats(&lines),
        })
    }

    async fn status(&self, cancel: CancellationToken) -> Result<BackupStatus> {
        let settings = self.shared.settings()?;

        let mut args = vec!["collection-status".to_string()];
        args.extend(option_args(&settings));
        args.push(settings.url.clone());

        let lines = self.execute(args, &settings, &cancel).await?;
        Ok(parse_status(&lines))
    }

    async fn list_files(&self, cancel: CancellationToken) -> Result<FileTree> {
        let settings = self.shared.settings()?;

        let mut args = vec!["list-current-files".to_string()];
        args.extend(option_args(&settings));
        args.push(settings.url.clone());

        let lines = self.execute(args, &settings, &cancel).await?;
        Ok(parse_file_list(&lines))
    }

    async fn restore_file(
        &self,
        source: &str,
        destination: &Path,
        cancel: CancellationToken,
    ) -> Result<()> {
        let settings = self.shared.settings()?;

        let mut args = vec![
            "restore".to_string(),
            "--file-to-restore".to_string(),
            source.to_string(),
        ];
        args.extend(option_args(&settings));
        args.push(settings.url.clone());
        args.push(destination.display().to_string());

        self.execute(args, &settings, &cancel).await.map(|_| ())
    }

    async fn restore_tree(&self, destination: &Path, cancel: CancellationToken) -> Result<()> {
        let settings = self.shared.settings()?;

        let mut args = vec!["restore".to_string()];
        args.extend(option_args(&settings));
        args.push(settings.url.clone());
        args.push(destination.display().to_string());

        self.execute(args, &settings, &cancel).await.map(|_| ())
    }
}

fn option_args(settings: &BackupSettings) -> Vec<String> {
    let mut args = Vec::new();
    for (name, value) in &settings.options {
        if name == PASSPHRASE_OPTION {
            continue;
        }
        args.push(format!("--{}", name));
        if !value.is_empty() {
            args.push(value.clone());
        }
    }
    args
}

fn parse_stats(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .skip_while(|line| !line.contains(STATS_HEADER))
        .skip(1)
        .take_while(|line| !line.trim_start().starts_with("----"))
        .map(|line| line.trim().to_string())
        .collect()
}

fn parse_status(lines: &[String]) -> BackupStatus {
    BackupStatus {
        lines: lines
            .iter()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect(),
    }
}

fn parse_file_list(lines: &[String]) -> FileTree {
    lines
        .iter()
        .filter_map(|line| FILE_LINE.captures(line))
        .filter(|caps| &caps[2] != ".")
        .map(|caps| FileEntry {
            modified: caps[1].to_string(),
            path: caps[2].to_string(),
        })
        .collect()
}
