use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("Unknown backup: {0}")]
    UnknownEntry(String),

    #[error("A task is already running for backup {0}")]
    WorkerBusy(String),

    #[error("No task is running for backup {0}")]
    NotProcessing(String),

    #[error("{0}")]
    Worker(String),

    #[error("{0}")]
    Store(String),
}

/// Coarse classification used when surfacing errors to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Busy,
    Worker,
    Store,
}

impl CoordinatorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownEntry(_) | Self::NotProcessing(_) => ErrorKind::Validation,
            Self::WorkerBusy(_) => ErrorKind::Busy,
            Self::Worker(_) => ErrorKind::Worker,
            Self::Store(_) => ErrorKind::Store,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
