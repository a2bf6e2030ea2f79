pub mod coordinator;
pub mod engine;
pub mod error;
pub mod models;
pub mod notifications;
pub mod presentation;
pub mod prompt;
pub mod scheduler;
pub mod store;

pub use coordinator::{Collaborators, Coordinator};
pub use engine::{EngineType, EngineWorker, WorkerFactory, WorkerOutput};
pub use error::{CoordinatorError, ErrorKind};
pub use models::{
    BackupMode, BackupSettings, BackupStatus, FileEntry, FileTree, HistoryLine, JobSummary,
    Lifecycle, RunReport,
};
pub use presentation::{PanelHandle, StatusPayload, UiCommand, UiMessage};
pub use prompt::{HeadlessPrompter, Prompter};
pub use scheduler::{ClockScheduler, Schedule, Scheduler};
pub use store::ConfigStore;
