//! The backup job coordinator.
//!
//! Owns one [`JobState`] per known backup entry and is the only writer of
//! that state. Everything that can change it arrives as an input on the
//! coordinator's own loop: panel commands, completions of spawned worker and
//! store calls, prompt answers, worker output and scheduler triggers.
//!
//! Every asynchronous operation goes through the same bracket:
//! [`Coordinator::dispatch`] validates the entry, flips it to `Processing`,
//! publishes the progress line and spawns exactly one call; the completion
//! re-enters through [`Coordinator::step`] and is finished by
//! `on_completed`, which flips the entry back to `Idle` and publishes the
//! terminal message.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Local};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::engine::{EngineWorker, OutputSink, WorkerFactory, WorkerOutput};
use super::error::{CoordinatorError, Result};
use super::models::{
    BackupMode, BackupSettings, BackupStatus, FileTree, HistoryLine, JobSummary, Lifecycle,
    RunReport,
};
use super::notifications::{BackupEvent, NotificationChannel};
use super::presentation::{PanelEndpoint, StatusPayload, UiCommand, UiMessage};
use super::prompt::Prompter;
use super::scheduler::Scheduler;
use super::store::ConfigStore;

const HISTORY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// External systems the coordinator talks to.
pub struct Collaborators {
    pub store: Arc<dyn ConfigStore>,
    pub workers: Arc<dyn WorkerFactory>,
    pub scheduler: Arc<dyn Scheduler>,
    pub prompter: Arc<dyn Prompter>,
    pub notifier: Option<Arc<dyn NotificationChannel>>,
}

struct JobState {
    settings: BackupSettings,
    worker: Arc<dyn EngineWorker>,
    lifecycle: Lifecycle,
    /// Ticket of the outstanding operation while `Processing`.
    ticket: Option<u64>,
    /// Handed to the outstanding call; `cancel-process` trips it.
    cancel: Option<CancellationToken>,
    history: Vec<HistoryLine>,
}

impl JobState {
    fn new(settings: BackupSettings, worker: Arc<dyn EngineWorker>) -> Self {
        Self {
            settings,
            worker,
            lifecycle: Lifecycle::Idle,
            ticket: None,
            cancel: None,
            history: Vec::new(),
        }
    }
}

enum Operation {
    Run { mode: BackupMode, scheduled: bool },
    RefreshStatus,
    RefreshFileTree,
    SaveSettings(BackupSettings),
    Delete,
    RestoreFile { source: String, destination: PathBuf },
    RestoreTree { destination: PathBuf },
}

impl Operation {
    fn progress_message(&self) -> &'static str {
        match self {
            Operation::Run {
                scheduled: true, ..
            } => "Scheduled backup in progress...",
            Operation::Run { .. } => "Backup in progress...",
            Operation::RefreshStatus => "Refreshing status...",
            Operation::RefreshFileTree => "Refreshing file tree...",
            Operation::SaveSettings(_) => "Saving settings...",
            Operation::Delete => "Deleting backup...",
            Operation::RestoreFile { .. } => "Restoring file...",
            Operation::RestoreTree { .. } => "Restoring all files...",
        }
    }
}

enum Outcome {
    Run {
        mode: BackupMode,
        result: anyhow::Result<RunReport>,
    },
    Status(anyhow::Result<BackupStatus>),
    FileTree(anyhow::Result<FileTree>),
    Saved {
        settings: BackupSettings,
        result: anyhow::Result<()>,
    },
    Deleted(anyhow::Result<()>),
    RestoredFile(anyhow::Result<()>),
    RestoredTree(anyhow::Result<()>),
}

type Call = Pin<Box<dyn Future<Output = Outcome> + Send>>;

enum Answer {
    BackupMode(Option<BackupMode>),
    Deletion(bool),
    RestoreFile {
        source: String,
        destination: Option<PathBuf>,
    },
    RestoreTree(Option<PathBuf>),
    Directory(Option<PathBuf>),
}

enum Event {
    Loaded(anyhow::Result<BTreeMap<String, BackupSettings>>),
    Created(anyhow::Result<(String, BackupSettings)>),
    Answered {
        entry_id: String,
        answer: Answer,
    },
    Completed {
        entry_id: String,
        ticket: u64,
        outcome: Outcome,
    },
}

enum Input {
    Command(UiCommand),
    Event(Event),
    Output(WorkerOutput),
    Trigger(String),
}

pub struct Coordinator {
    collab: Collaborators,
    panel: PanelEndpoint,
    jobs: HashMap<String, JobState>,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
    output_tx: OutputSink,
    output_rx: mpsc::UnboundedReceiver<WorkerOutput>,
    triggers: Option<mpsc::UnboundedReceiver<String>>,
    subscribed_to_scheduler: bool,
    next_ticket: u64,
}

impl Coordinator {
    pub fn new(collab: Collaborators, panel: PanelEndpoint) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (output_tx, output_rx) = mpsc::unbounded_channel();

        Self {
            collab,
            panel,
            jobs: HashMap::new(),
            events_tx,
            events_rx,
            output_tx,
            output_rx,
            triggers: None,
            subscribed_to_scheduler: false,
            next_ticket: 0,
        }
    }

    /// Process inputs until every panel handle has been dropped.
    pub async fn run(mut self) {
        info!("Coordinator started");
        while self.step().await {}
        info!("Coordinator stopped");
    }

    /// Wait for and process a single input. Returns `false` once the panel
    /// command channel is closed.
    pub async fn step(&mut self) -> bool {
        match self.next_input().await {
            Some(input) => {
                self.process(input);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, entry_id: &str) -> bool {
        self.jobs.contains_key(entry_id)
    }

    pub fn lifecycle(&self, entry_id: &str) -> Option<Lifecycle> {
        self.jobs.get(entry_id).map(|job| job.lifecycle)
    }

    /// The settings the coordinator and the entry's worker currently use.
    pub fn settings(&self, entry_id: &str) -> Option<&BackupSettings> {
        self.jobs.get(entry_id).map(|job| &job.settings)
    }

    pub fn history(&self, entry_id: &str) -> Option<&[HistoryLine]> {
        self.jobs.get(entry_id).map(|job| job.history.as_slice())
    }

    pub fn summaries(&self) -> Vec<JobSummary> {
        let mut summaries: Vec<JobSummary> = self
            .jobs
            .iter()
            .map(|(entry_id, job)| JobSummary {
                entry_id: entry_id.clone(),
                title: job.settings.title.clone(),
                lifecycle: job.lifecycle,
                history_len: job.history.len(),
                last_message: job.history.last().map(|line| line.text.clone()),
            })
            .collect();
        summaries.sort_by(|a, b| a.entry_id.cmp(&b.entry_id));
        summaries
    }

    async fn next_input(&mut self) -> Option<Input> {
        loop {
            // Output first, so lines a worker printed before finishing are
            // recorded before its completion.
            let input = tokio::select! {
                biased;
                Some(output) = self.output_rx.recv() => Input::Output(output),
                Some(event) = self.events_rx.recv() => Input::Event(event),
                command = self.panel.commands.recv() => match command {
                    Some(command) => Input::Command(command),
                    None => return None,
                },
                trigger = next_trigger(&mut self.triggers) => match trigger {
                    Some(entry_id) => Input::Trigger(entry_id),
                    None => {
                        warn!("Scheduler trigger stream closed");
                        self.triggers = None;
                        continue;
                    }
                },
            };
            return Some(input);
        }
    }

    fn process(&mut self, input: Input) {
        match input {
            Input::Command(command) => {
                let _ = self.handle_command(command);
            }
            Input::Event(event) => self.on_event(event),
            Input::Output(output) => self.on_output(output),
            Input::Trigger(entry_id) => self.on_trigger(&entry_id),
        }
    }

    /// Route a panel command. Rejections are published to the panel as
    /// well as returned.
    pub fn handle_command(&mut self, command: UiCommand) -> Result<()> {
        debug!(command = ?command, "Panel command");
        let entry_id = command.entry_id().map(str::to_string);

        let result = match command {
            UiCommand::ControlPanelReady => {
                self.load_backups();
                Ok(())
            }
            UiCommand::CreateBackup { settings } => {
                self.create_backup(settings);
                Ok(())
            }
            UiCommand::StartBackup { entry_id } => self.ensure_idle(&entry_id).map(|_| {
                let prompter = self.collab.prompter.clone();
                let id = entry_id.clone();
                self.ask(&entry_id, async move {
                    Answer::BackupMode(prompter.choose_backup_mode(&id).await)
                });
            }),
            UiCommand::CancelProcess { entry_id } => self.cancel(&entry_id),
            UiCommand::SelectDirectory { entry_id } => self.ensure_known(&entry_id).map(|_| {
                let prompter = self.collab.prompter.clone();
                let id = entry_id.clone();
                self.ask(&entry_id, async move {
                    Answer::Directory(prompter.choose_directory(&id).await)
                });
            }),
            UiCommand::RefreshFileTree { entry_id } => {
                self.dispatch(&entry_id, Operation::RefreshFileTree)
            }
            UiCommand::RefreshStatus { entry_id } => {
                self.dispatch(&entry_id, Operation::RefreshStatus)
            }
            UiCommand::SaveSettings { entry_id, settings } => {
                self.dispatch(&entry_id, Operation::SaveSettings(settings))
            }
            UiCommand::RequestBackupDeletion { entry_id } => {
                self.ensure_idle(&entry_id).map(|_| {
                    let prompter = self.collab.prompter.clone();
                    let id = entry_id.clone();
                    self.ask(&entry_id, async move {
                        Answer::Deletion(prompter.confirm_deletion(&id).await)
                    });
                })
            }
            UiCommand::RestoreFile {
                entry_id,
                source_path,
            } => self.ensure_idle(&entry_id).map(|default_dir| {
                let prompter = self.collab.prompter.clone();
                let id = entry_id.clone();
                self.ask(&entry_id, async move {
                    let destination = prompter
                        .choose_restore_file(&id, &source_path, &default_dir)
                        .await;
                    Answer::RestoreFile {
                        source: source_path,
                        destination,
                    }
                });
            }),
            UiCommand::RestoreAll { entry_id } => self.ensure_idle(&entry_id).map(|default_dir| {
                let prompter = self.collab.prompter.clone();
                let id = entry_id.clone();
                self.ask(&entry_id, async move {
                    Answer::RestoreTree(prompter.choose_restore_directory(&id, &default_dir).await)
                });
            }),
        };

        if let Err(err) = &result {
            self.reject(entry_id.as_deref(), err);
        }
        result
    }

    fn on_event(&mut self, event: Event) {
        match event {
            Event::Loaded(result) => self.on_loaded(result),
            Event::Created(result) => match result {
                Ok((entry_id, settings)) => {
                    info!(entry_id = %entry_id, "Backup created");
                    self.register(entry_id, settings, true);
                    self.publish_jobs();
                }
                Err(e) => {
                    let err = CoordinatorError::Store(format!("{:#}", e));
                    warn!(error = %err, "Failed to create backup");
                    self.panel.publish(UiMessage::BackupCreationFailed {
                        message: err.to_string(),
                    });
                }
            },
            Event::Answered { entry_id, answer } => {
                if let Err(err) = self.on_answer(&entry_id, answer) {
                    self.reject(Some(&entry_id), &err);
                }
            }
            Event::Completed {
                entry_id,
                ticket,
                outcome,
            } => self.on_completed(entry_id, ticket, outcome),
        }
    }

    fn on_loaded(&mut self, result: anyhow::Result<BTreeMap<String, BackupSettings>>) {
        match result {
            Ok(backups) => {
                info!(count = backups.len(), "Backups loaded");
                for (entry_id, settings) in backups {
                    self.register(entry_id, settings, false);
                }
                if !self.subscribed_to_scheduler {
                    self.triggers = self.collab.scheduler.subscribe();
                    self.subscribed_to_scheduler = true;
                }
                self.publish_jobs();
            }
            Err(e) => {
                error!(error = %format!("{:#}", e), "Failed to load backups");
                self.panel.publish(UiMessage::CommandRejected {
                    entry_id: None,
                    message: format!("Failed to load backups: {:#}", e),
                });
            }
        }
    }

    fn on_answer(&mut self, entry_id: &str, answer: Answer) -> Result<()> {
        match answer {
            Answer::BackupMode(Some(mode)) => self.dispatch(
                entry_id,
                Operation::Run {
                    mode,
                    scheduled: false,
                },
            ),
            Answer::Deletion(true) => self.dispatch(entry_id, Operation::Delete),
            Answer::RestoreFile {
                source,
                destination: Some(destination),
            } => self.dispatch(
                entry_id,
                Operation::RestoreFile {
                    source,
                    destination,
                },
            ),
            Answer::RestoreTree(Some(destination)) => {
                self.dispatch(entry_id, Operation::RestoreTree { destination })
            }
            Answer::Directory(Some(path)) => {
                self.ensure_known(entry_id)?;
                self.panel.publish(UiMessage::SetBackupPath {
                    path,
                    entry_id: entry_id.to_string(),
                });
                Ok(())
            }
            Answer::BackupMode(None)
            | Answer::Deletion(false)
            | Answer::RestoreFile {
                destination: None, ..
            }
            | Answer::RestoreTree(None)
            | Answer::Directory(None) => {
                debug!(entry_id, "Prompt dismissed");
                Ok(())
            }
        }
    }

    /// First half of the bracket: validate, mark `Processing`, issue one call.
    fn dispatch(&mut self, entry_id: &str, operation: Operation) -> Result<()> {
        let job = self
            .jobs
            .get_mut(entry_id)
            .ok_or_else(|| CoordinatorError::UnknownEntry(entry_id.to_string()))?;
        if job.lifecycle == Lifecycle::Processing {
            return Err(CoordinatorError::WorkerBusy(entry_id.to_string()));
        }

        self.next_ticket += 1;
        let ticket = self.next_ticket;
        let cancel = CancellationToken::new();
        job.lifecycle = Lifecycle::Processing;
        job.ticket = Some(ticket);
        job.cancel = Some(cancel.clone());
        let worker = job.worker.clone();
        let title = job.settings.title.clone();

        info!(entry_id, ticket, "{}", operation.progress_message());

        if let Operation::Run { mode, scheduled } = operation {
            self.notify(BackupEvent::Started {
                entry_id: entry_id.to_string(),
                title,
                mode,
                scheduled,
            });
        }
        self.set_ui(entry_id, Lifecycle::Processing, operation.progress_message());

        let call = self.issue(entry_id, worker, operation, cancel);
        let events = self.events_tx.clone();
        let entry_id = entry_id.to_string();
        tokio::spawn(async move {
            let outcome = call.await;
            let _ = events.send(Event::Completed {
                entry_id,
                ticket,
                outcome,
            });
        });

        self.publish_jobs();
        Ok(())
    }

    fn issue(
        &self,
        entry_id: &str,
        worker: Arc<dyn EngineWorker>,
        operation: Operation,
        cancel: CancellationToken,
    ) -> Call {
        let store = self.collab.store.clone();
        let entry_id = entry_id.to_string();

        match operation {
            Operation::Run { mode, .. } => Box::pin(async move {
                Outcome::Run {
                    mode,
                    result: worker.run(mode, cancel).await,
                }
            }),
            Operation::RefreshStatus => {
                Box::pin(async move { Outcome::Status(worker.status(cancel).await) })
            }
            Operation::RefreshFileTree => {
                Box::pin(async move { Outcome::FileTree(worker.list_files(cancel).await) })
            }
            Operation::SaveSettings(settings) => Box::pin(async move {
                let result = store.update_backup(&entry_id, &settings).await;
                Outcome::Saved { settings, result }
            }),
            Operation::Delete => {
                Box::pin(async move { Outcome::Deleted(store.delete_backup(&entry_id).await) })
            }
            Operation::RestoreFile {
                source,
                destination,
            } => Box::pin(async move {
                Outcome::RestoredFile(worker.restore_file(&source, &destination, cancel).await)
            }),
            Operation::RestoreTree { destination } => Box::pin(async move {
                Outcome::RestoredTree(worker.restore_tree(&destination, cancel).await)
            }),
        }
    }

    /// Second half of the bracket: back to `Idle`, publish the result.
    fn on_completed(&mut self, entry_id: String, ticket: u64, outcome: Outcome) {
        let Some(job) = self.jobs.get_mut(&entry_id) else {
            warn!(entry_id = %entry_id, ticket, "Completion for unknown backup dropped");
            return;
        };
        if job.ticket != Some(ticket) {
            warn!(entry_id = %entry_id, ticket, "Stale completion dropped");
            return;
        }
        job.lifecycle = Lifecycle::Idle;
        job.ticket = None;
        job.cancel = None;
        let title = job.settings.title.clone();

        match outcome {
            Outcome::Run { mode, result } => match result {
                Ok(report) => {
                    self.notify(BackupEvent::Completed {
                        entry_id: entry_id.clone(),
                        title,
                        mode,
                        duration_secs: report.duration_secs,
                    });
                    self.panel.publish(UiMessage::SetBackupStatus {
                        entry_id: entry_id.clone(),
                        status: StatusPayload::Run(report),
                    });
                    self.set_ui(&entry_id, Lifecycle::Idle, "Backup done.");
                    if let Err(err) = self.dispatch(&entry_id, Operation::RefreshStatus) {
                        self.reject(Some(&entry_id), &err);
                    }
                }
                Err(e) => {
                    let err = CoordinatorError::Worker(format!("{:#}", e));
                    self.notify(BackupEvent::Failed {
                        entry_id: entry_id.clone(),
                        title,
                        error: err.to_string(),
                    });
                    self.fail(&entry_id, err);
                }
            },
            Outcome::Status(result) => match result {
                Ok(status) => {
                    self.panel.publish(UiMessage::SetBackupStatus {
                        entry_id: entry_id.clone(),
                        status: StatusPayload::Collection(status),
                    });
                    self.set_ui(&entry_id, Lifecycle::Idle, "Status updated.");
                }
                Err(e) => self.fail(&entry_id, CoordinatorError::Worker(format!("{:#}", e))),
            },
            Outcome::FileTree(result) => match result {
                Ok(tree) => {
                    self.panel.publish(UiMessage::SetBackupFileTree {
                        entry_id: entry_id.clone(),
                        tree,
                    });
                    self.set_ui(&entry_id, Lifecycle::Idle, "Files refreshed.");
                }
                Err(e) => self.fail(&entry_id, CoordinatorError::Worker(format!("{:#}", e))),
            },
            Outcome::Saved { settings, result } => match result {
                Ok(()) => {
                    self.set_ui(&entry_id, Lifecycle::Idle, "Settings saved.");
                    self.apply_settings(&entry_id, settings);
                }
                // Scheduler and worker keep what is actually persisted.
                Err(e) => self.fail(&entry_id, CoordinatorError::Store(format!("{:#}", e))),
            },
            Outcome::Deleted(result) => match result {
                Ok(()) => {
                    self.set_ui(&entry_id, Lifecycle::Idle, "Backup deleted.");
                    self.panel.publish(UiMessage::ConfirmBackupDeletion {
                        entry_id: entry_id.clone(),
                    });
                    self.collab.scheduler.remove_backup(&entry_id);
                    self.jobs.remove(&entry_id);
                    info!(entry_id = %entry_id, "Backup removed");
                }
                Err(e) => self.fail(&entry_id, CoordinatorError::Store(format!("{:#}", e))),
            },
            Outcome::RestoredFile(result) => match result {
                Ok(()) => self.set_ui(&entry_id, Lifecycle::Idle, "File restored."),
                Err(e) => self.fail(&entry_id, CoordinatorError::Worker(format!("{:#}", e))),
            },
            Outcome::RestoredTree(result) => match result {
                Ok(()) => self.set_ui(&entry_id, Lifecycle::Idle, "Backup tree restored."),
                Err(e) => self.fail(&entry_id, CoordinatorError::Worker(format!("{:#}", e))),
            },
        }

        self.publish_jobs();
    }

    fn on_output(&mut self, output: WorkerOutput) {
        if !self.jobs.contains_key(&output.entry_id) {
            debug!(entry_id = %output.entry_id, "Output for unknown backup dropped");
            return;
        }
        self.append_history(&output.entry_id, Local::now(), output.text);
    }

    fn on_trigger(&mut self, entry_id: &str) {
        match self.jobs.get(entry_id).map(|job| job.lifecycle) {
            None => warn!(entry_id, "Trigger for unknown backup ignored"),
            Some(Lifecycle::Processing) => {
                info!(entry_id, "Backup already running, scheduled start skipped")
            }
            Some(Lifecycle::Idle) => {
                let run = Operation::Run {
                    mode: BackupMode::Incremental,
                    scheduled: true,
                };
                if let Err(err) = self.dispatch(entry_id, run) {
                    warn!(entry_id, error = %err, "Scheduled start failed");
                }
            }
        }
    }

    fn cancel(&mut self, entry_id: &str) -> Result<()> {
        let job = self
            .jobs
            .get(entry_id)
            .ok_or_else(|| CoordinatorError::UnknownEntry(entry_id.to_string()))?;
        if job.lifecycle != Lifecycle::Processing {
            return Err(CoordinatorError::NotProcessing(entry_id.to_string()));
        }

        info!(entry_id, ticket = ?job.ticket, "Cancellation requested");
        if let Some(cancel) = &job.cancel {
            cancel.cancel();
        }
        Ok(())
    }

    fn load_backups(&self) {
        let store = self.collab.store.clone();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = store.get_backups().await;
            let _ = events.send(Event::Loaded(result));
        });
    }

    fn create_backup(&self, settings: BackupSettings) {
        let store = self.collab.store.clone();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = store
                .create_backup(&settings)
                .await
                .map(|entry_id| (entry_id, settings));
            let _ = events.send(Event::Created(result));
        });
    }

    /// Allocate a worker for a newly known entry. Known entries are only
    /// re-published, with their history replayed.
    fn register(&mut self, entry_id: String, settings: BackupSettings, is_new: bool) {
        if let Some(job) = self.jobs.get(&entry_id) {
            self.panel.publish(UiMessage::SetBackupOptions {
                entry_id: entry_id.clone(),
                settings: job.settings.clone(),
                is_new: false,
            });
            for line in &job.history {
                self.panel.publish(UiMessage::SetBackupHistory {
                    entry_id: entry_id.clone(),
                    line: line.text.clone(),
                });
            }
            return;
        }

        let worker = self.collab.workers.create(&entry_id);
        worker.subscribe_output(self.output_tx.clone());
        worker.set_data(settings.clone());

        self.panel.publish(UiMessage::SetBackupOptions {
            entry_id: entry_id.clone(),
            settings: settings.clone(),
            is_new,
        });
        self.collab.scheduler.update_backup(&entry_id, &settings);

        debug!(entry_id = %entry_id, "Worker registered");
        self.jobs.insert(entry_id, JobState::new(settings, worker));
    }

    fn apply_settings(&mut self, entry_id: &str, settings: BackupSettings) {
        let Some(job) = self.jobs.get_mut(entry_id) else {
            return;
        };

        self.panel.publish(UiMessage::SetBackupOptions {
            entry_id: entry_id.to_string(),
            settings: settings.clone(),
            is_new: false,
        });
        self.collab.scheduler.update_backup(entry_id, &settings);
        job.worker.set_data(settings.clone());
        job.settings = settings;
    }

    fn ensure_known(&self, entry_id: &str) -> Result<&JobState> {
        self.jobs
            .get(entry_id)
            .ok_or_else(|| CoordinatorError::UnknownEntry(entry_id.to_string()))
    }

    /// Checks a command can start now; returns the entry's source path,
    /// used as the default location for restore prompts.
    fn ensure_idle(&self, entry_id: &str) -> Result<PathBuf> {
        let job = self.ensure_known(entry_id)?;
        if job.lifecycle == Lifecycle::Processing {
            return Err(CoordinatorError::WorkerBusy(entry_id.to_string()));
        }
        Ok(job.settings.path.clone())
    }

    fn ask<F>(&self, entry_id: &str, question: F)
    where
        F: Future<Output = Answer> + Send + 'static,
    {
        let events = self.events_tx.clone();
        let entry_id = entry_id.to_string();
        tokio::spawn(async move {
            let answer = question.await;
            let _ = events.send(Event::Answered { entry_id, answer });
        });
    }

    fn fail(&mut self, entry_id: &str, err: CoordinatorError) {
        warn!(entry_id, kind = ?err.kind(), error = %err, "Operation failed");
        self.set_ui(entry_id, Lifecycle::Idle, &err.to_string());
    }

    fn reject(&self, entry_id: Option<&str>, err: &CoordinatorError) {
        warn!(entry_id = ?entry_id, kind = ?err.kind(), error = %err, "Command rejected");
        self.panel.publish(UiMessage::CommandRejected {
            entry_id: entry_id.map(str::to_string),
            message: err.to_string(),
        });
    }

    /// Publish a lifecycle change and mirror it, timestamped, into history.
    fn set_ui(&mut self, entry_id: &str, lifecycle: Lifecycle, message: &str) {
        self.panel.publish(UiMessage::SetBackupUi {
            entry_id: entry_id.to_string(),
            lifecycle,
            message: message.to_string(),
        });

        let now = Local::now();
        let line = format!("{}\n{}", now.format(HISTORY_TIME_FORMAT), message);
        self.append_history(entry_id, now, line);
    }

    fn append_history(&mut self, entry_id: &str, recorded_at: DateTime<Local>, text: String) {
        let Some(job) = self.jobs.get_mut(entry_id) else {
            return;
        };
        job.history.push(HistoryLine {
            recorded_at,
            text: text.clone(),
        });
        self.panel.publish(UiMessage::SetBackupHistory {
            entry_id: entry_id.to_string(),
            line: text,
        });
    }

    fn publish_jobs(&self) {
        self.panel.publish_jobs(self.summaries());
    }

    fn notify(&self, event: BackupEvent) {
        let Some(notifier) = self.collab.notifier.clone() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(event).await {
                warn!(error = %e, "Failed to send notification");
            }
        });
    }
}

async fn next_trigger(triggers: &mut Option<mpsc::UnboundedReceiver<String>>) -> Option<String> {
    match triggers {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
