use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;

use super::models::BackupSettings;

/// Persistence for backup entries.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get_backups(&self) -> Result<BTreeMap<String, BackupSettings>>;

    async fn get_backup(&self, entry_id: &str) -> Result<Option<BackupSettings>>;

    /// Persist a new entry and return its id.
    async fn create_backup(&self, settings: &BackupSettings) -> Result<String>;

    /// Fails if the entry does not exist.
    async fn update_backup(&self, entry_id: &str, settings: &BackupSettings) -> Result<()>;

    /// Fails if the entry does not exist.
    async fn delete_backup(&self, entry_id: &str) -> Result<()>;
}
