use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio_rusqlite::Connection;

use crate::core::{BackupSettings, ConfigStore};

pub mod backups;

pub async fn init(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let conn = Connection::open(path).await?;

    conn.call(|conn| {
        let schema = include_str!("schema.sql");
        conn.execute_batch(schema)?;
        Ok::<(), tokio_rusqlite::rusqlite::Error>(())
    })
    .await?;

    Ok(conn)
}

/// [`ConfigStore`] backed by the sqlite `backups` table.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl ConfigStore for SqliteStore {
    async fn get_backups(&self) -> Result<BTreeMap<String, BackupSettings>> {
        backups::list(&self.conn).await
    }

    async fn get_backup(&self, entry_id: &str) -> Result<Option<BackupSettings>> {
        backups::get(&self.conn, entry_id.to_string()).await
    }

    async fn create_backup(&self, settings: &BackupSettings) -> Result<String> {
        backups::create(&self.conn, settings).await
    }

    async fn update_backup(&self, entry_id: &str, settings: &BackupSettings) -> Result<()> {
        backups::update(&self.conn, entry_id.to_string(), settings).await
    }

    async fn delete_backup(&self, entry_id: &str) -> Result<()> {
        backups::delete(&self.conn, entry_id.to_string()).await
    }
}
