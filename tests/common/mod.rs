//! Stub collaborators and a step-driven harness for coordinator tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use bkjobs::core::engine::OutputSink;
use bkjobs::core::engine::simulated::SimulatedWorker;
use bkjobs::core::presentation;
use bkjobs::core::{
    BackupMode, BackupSettings, BackupStatus, Collaborators, ConfigStore, Coordinator,
    EngineWorker, FileEntry, FileTree, PanelHandle, Prompter, RunReport, Schedule, Scheduler,
    UiCommand, UiMessage, WorkerFactory, WorkerOutput,
};
use tokio::sync::{Semaphore, broadcast, mpsc};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

pub fn settings(title: &str) -> BackupSettings {
    BackupSettings {
        title: title.to_string(),
        path: PathBuf::from(format!("/home/user/{}", title)),
        url: format!("sftp://backup.example/{}", title),
        schedule: Schedule::Daily { hour: 2, minute: 0 },
        options: BTreeMap::new(),
    }
}

#[derive(Default)]
pub struct StubStore {
    pub backups: Mutex<BTreeMap<String, BackupSettings>>,
    pub fail_updates: AtomicBool,
    pub fail_deletes: AtomicBool,
    pub deletes: AtomicUsize,
}

#[async_trait]
impl ConfigStore for StubStore {
    async fn get_backups(&self) -> Result<BTreeMap<String, BackupSettings>> {
        Ok(self.backups.lock().unwrap().clone())
    }

    async fn get_backup(&self, entry_id: &str) -> Result<Option<BackupSettings>> {
        Ok(self.backups.lock().unwrap().get(entry_id).cloned())
    }

    async fn create_backup(&self, settings: &BackupSettings) -> Result<String> {
        let mut backups = self.backups.lock().unwrap();
        let entry_id = format!("new-{}", backups.len());
        backups.insert(entry_id.clone(), settings.clone());
        Ok(entry_id)
    }

    async fn update_backup(&self, entry_id: &str, settings: &BackupSettings) -> Result<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            bail!("disk full");
        }
        self.backups
            .lock()
            .unwrap()
            .insert(entry_id.to_string(), settings.clone());
        Ok(())
    }

    async fn delete_backup(&self, entry_id: &str) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.load(Ordering::SeqCst) {
            bail!("database is locked");
        }
        self.backups
            .lock()
            .unwrap()
            .remove(entry_id)
            .map(|_| ())
            .ok_or_else(|| anyhow!("Backup not found: {}", entry_id))
    }
}

/// Worker that records calls and can be held mid-operation.
pub struct StubWorker {
    entry_id: String,
    sink: Mutex<Option<OutputSink>>,
    pub data: Mutex<Vec<BackupSettings>>,
    pub calls: Mutex<Vec<String>>,
    pub subscriptions: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub hold: AtomicBool,
    pub fail: AtomicBool,
    gate: Semaphore,
}

impl StubWorker {
    fn new(entry_id: &str) -> Self {
        Self {
            entry_id: entry_id.to_string(),
            sink: Mutex::new(None),
            data: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            subscriptions: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            hold: AtomicBool::new(false),
            fail: AtomicBool::new(false),
            gate: Semaphore::new(0),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last_data(&self) -> Option<BackupSettings> {
        self.data.lock().unwrap().last().cloned()
    }

    /// Let one held operation finish.
    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    fn emit(&self, text: &str) {
        if let Some(sink) = self.sink.lock().unwrap().as_ref() {
            let _ = sink.send(WorkerOutput {
                entry_id: self.entry_id.clone(),
                text: text.to_string(),
            });
        }
    }

    async fn enter(&self, call: String, cancel: &CancellationToken) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if self.hold.load(Ordering::SeqCst) {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {}
                permit = self.gate.acquire() => permit.unwrap().forget(),
            }
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if cancel.is_cancelled() {
            bail!("Process cancelled");
        }
        if self.fail.load(Ordering::SeqCst) {
            bail!("Connection refused");
        }
        Ok(())
    }
}

#[async_trait]
impl EngineWorker for StubWorker {
    fn entry_id(&self) -> &str {
        &self.entry_id
    }

    fn set_data(&self, settings: BackupSettings) {
        self.data.lock().unwrap().push(settings);
    }

    fn subscribe_output(&self, sink: OutputSink) {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        *self.sink.lock().unwrap() = Some(sink);
    }

    async fn run(&self, mode: BackupMode, cancel: CancellationToken) -> Result<RunReport> {
        self.emit("progress 50%");
        self.enter(format!("run:{}", mode), &cancel).await?;
        Ok(RunReport {
            mode,
            duration_secs: 3,
            stats: vec!["Errors 0".into()],
        })
    }

    async fn status(&self, cancel: CancellationToken) -> Result<BackupStatus> {
        self.enter("status".into(), &cancel).await?;
        Ok(BackupStatus {
            lines: vec!["Found 1 backup chains".into()],
        })
    }

    async fn list_files(&self, cancel: CancellationToken) -> Result<FileTree> {
        self.enter("list_files".into(), &cancel).await?;
        Ok(vec![FileEntry {
            path: "docs/a.txt".into(),
            modified: "Tue Jan  9 10:12:01 2024".into(),
        }])
    }

    async fn restore_file(
        &self,
        source: &str,
        destination: &Path,
        cancel: CancellationToken,
    ) -> Result<()> {
        self.enter(
            format!("restore_file:{}:{}", source, destination.display()),
            &cancel,
        )
        .await
    }

    async fn restore_tree(&self, destination: &Path, cancel: CancellationToken) -> Result<()> {
        self.enter(format!("restore_tree:{}", destination.display()), &cancel)
            .await
    }
}

#[derive(Default)]
pub struct StubFactory {
    pub workers: Mutex<HashMap<String, Arc<StubWorker>>>,
    pub created: AtomicUsize,
    /// Hand out real simulated workers with this step delay instead.
    pub simulated_step: Option<Duration>,
}

impl WorkerFactory for StubFactory {
    fn create(&self, entry_id: &str) -> Arc<dyn EngineWorker> {
        self.created.fetch_add(1, Ordering::SeqCst);
        if let Some(step) = self.simulated_step {
            return Arc::new(SimulatedWorker::with_step_delay(entry_id, step));
        }
        let worker = Arc::new(StubWorker::new(entry_id));
        self.workers
            .lock()
            .unwrap()
            .insert(entry_id.to_string(), worker.clone());
        worker
    }
}

pub struct StubScheduler {
    pub updates: Mutex<Vec<(String, BackupSettings)>>,
    pub removals: Mutex<Vec<String>>,
    pub subscribe_calls: AtomicUsize,
    trigger_tx: mpsc::UnboundedSender<String>,
    trigger_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
}

impl Default for StubScheduler {
    fn default() -> Self {
        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
        Self {
            updates: Mutex::new(Vec::new()),
            removals: Mutex::new(Vec::new()),
            subscribe_calls: AtomicUsize::new(0),
            trigger_tx,
            trigger_rx: Mutex::new(Some(trigger_rx)),
        }
    }
}

impl StubScheduler {
    pub fn fire(&self, entry_id: &str) {
        self.trigger_tx.send(entry_id.to_string()).unwrap();
    }

    pub fn updates_for(&self, entry_id: &str) -> Vec<BackupSettings> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == entry_id)
            .map(|(_, settings)| settings.clone())
            .collect()
    }
}

impl Scheduler for StubScheduler {
    fn update_backup(&self, entry_id: &str, settings: &BackupSettings) {
        self.updates
            .lock()
            .unwrap()
            .push((entry_id.to_string(), settings.clone()));
    }

    fn remove_backup(&self, entry_id: &str) {
        self.removals.lock().unwrap().push(entry_id.to_string());
    }

    fn subscribe(&self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        self.trigger_rx.lock().unwrap().take()
    }
}

pub struct StubPrompter {
    pub mode: Mutex<Option<BackupMode>>,
    pub confirm: AtomicBool,
    pub destination: Mutex<Option<PathBuf>>,
    pub directory: Mutex<Option<PathBuf>>,
}

impl Default for StubPrompter {
    fn default() -> Self {
        Self {
            mode: Mutex::new(Some(BackupMode::Full)),
            confirm: AtomicBool::new(true),
            destination: Mutex::new(Some(PathBuf::from("/tmp/restore"))),
            directory: Mutex::new(Some(PathBuf::from("/home/user/picked"))),
        }
    }
}

#[async_trait]
impl Prompter for StubPrompter {
    async fn choose_backup_mode(&self, _entry_id: &str) -> Option<BackupMode> {
        *self.mode.lock().unwrap()
    }

    async fn confirm_deletion(&self, _entry_id: &str) -> bool {
        self.confirm.load(Ordering::SeqCst)
    }

    async fn choose_restore_file(
        &self,
        _entry_id: &str,
        _source_path: &str,
        _default_dir: &Path,
    ) -> Option<PathBuf> {
        self.destination.lock().unwrap().clone()
    }

    async fn choose_restore_directory(
        &self,
        _entry_id: &str,
        _default_dir: &Path,
    ) -> Option<PathBuf> {
        self.destination.lock().unwrap().clone()
    }

    async fn choose_directory(&self, _entry_id: &str) -> Option<PathBuf> {
        self.directory.lock().unwrap().clone()
    }
}

pub struct Harness {
    pub coordinator: Coordinator,
    pub panel: PanelHandle,
    pub messages: broadcast::Receiver<UiMessage>,
    pub store: Arc<StubStore>,
    pub workers: Arc<StubFactory>,
    pub scheduler: Arc<StubScheduler>,
    pub prompter: Arc<StubPrompter>,
}

impl Harness {
    pub fn new(entries: &[(&str, BackupSettings)]) -> Self {
        Self::with_factory(entries, StubFactory::default())
    }

    /// Harness whose entries run on simulated workers.
    pub fn simulated(entries: &[(&str, BackupSettings)], step: Duration) -> Self {
        Self::with_factory(
            entries,
            StubFactory {
                simulated_step: Some(step),
                ..Default::default()
            },
        )
    }

    fn with_factory(entries: &[(&str, BackupSettings)], workers: StubFactory) -> Self {
        let store = Arc::new(StubStore::default());
        {
            let mut backups = store.backups.lock().unwrap();
            for (entry_id, settings) in entries {
                backups.insert(entry_id.to_string(), settings.clone());
            }
        }
        let workers = Arc::new(workers);
        let scheduler = Arc::new(StubScheduler::default());
        let prompter = Arc::new(StubPrompter::default());

        let (panel, endpoint) = presentation::channel();
        let messages = panel.subscribe();
        let coordinator = Coordinator::new(
            Collaborators {
                store: store.clone(),
                workers: workers.clone(),
                scheduler: scheduler.clone(),
                prompter: prompter.clone(),
                notifier: None,
            },
            endpoint,
        );

        Self {
            coordinator,
            panel,
            messages,
            store,
            workers,
            scheduler,
            prompter,
        }
    }

    /// Announce the panel and wait until every entry is registered.
    pub async fn ready(&mut self) {
        self.coordinator
            .handle_command(UiCommand::ControlPanelReady)
            .unwrap();
        self.settle().await;
    }

    /// Process inputs until nothing arrives for a short while.
    pub async fn settle(&mut self) {
        while let Ok(true) = timeout(Duration::from_millis(50), self.coordinator.step()).await {}
    }

    pub fn worker(&self, entry_id: &str) -> Arc<StubWorker> {
        self.workers.lock_worker(entry_id)
    }

    pub fn drain_messages(&mut self) -> Vec<UiMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = self.messages.try_recv() {
            messages.push(message);
        }
        messages
    }

    pub fn history_texts(&self, entry_id: &str) -> Vec<String> {
        self.coordinator
            .history(entry_id)
            .unwrap_or_default()
            .iter()
            .map(|line| line.text.clone())
            .collect()
    }
}

impl StubFactory {
    fn lock_worker(&self, entry_id: &str) -> Arc<StubWorker> {
        self.workers
            .lock()
            .unwrap()
            .get(entry_id)
            .cloned()
            .unwrap_or_else(|| panic!("no worker for {}", entry_id))
    }
}
