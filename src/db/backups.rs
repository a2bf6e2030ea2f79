use std::collections::BTreeMap;

use anyhow::{Context, Result, anyhow, bail};
use tokio_rusqlite::rusqlite::OptionalExtension;
use tokio_rusqlite::{Connection, params, rusqlite};
use uuid::Uuid;

use crate::core::BackupSettings;

fn decode(entry_id: &str, json: &str) -> Result<BackupSettings> {
    serde_json::from_str(json).with_context(|| format!("Corrupt settings for backup {}", entry_id))
}

pub async fn list(conn: &Connection) -> Result<BTreeMap<String, BackupSettings>> {
    let rows = conn
        .call(|c| {
            let mut stmt = c.prepare("SELECT id, settings FROM backups ORDER BY created_at, id")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok::<_, rusqlite::Error>(rows)
        })
        .await
        .map_err(|e| anyhow!("Failed to list backups: {}", e))?;

    rows.into_iter()
        .map(|(id, json)| {
            let settings = decode(&id, &json)?;
            Ok((id, settings))
        })
        .collect()
}

pub async fn get(conn: &Connection, entry_id: String) -> Result<Option<BackupSettings>> {
    let id = entry_id.clone();
    let json = conn
        .call(move |c| {
            c.query_row(
                "SELECT settings FROM backups WHERE id = ?1",
                params![id],
                |row| row.get::<_, String>(0),
            )
            .optional()
        })
        .await
        .map_err(|e| anyhow!("Failed to get backup: {}", e))?;

    json.map(|json| decode(&entry_id, &json)).transpose()
}

pub async fn create(conn: &Connection, settings: &BackupSettings) -> Result<String> {
    let id = Uuid::now_v7().to_string();
    let json = serde_json::to_string(settings).context("Failed to serialize settings")?;

    let entry_id = id.clone();
    conn.call(move |c| {
        c.execute(
            "INSERT INTO backups (id, settings) VALUES (?1, ?2)",
            params![entry_id, json],
        )?;
        Ok::<(), rusqlite::Error>(())
    })
    .await?;

    Ok(id)
}

pub async fn update(conn: &Connection, entry_id: String, settings: &BackupSettings) -> Result<()> {
    let json = serde_json::to_string(settings).context("Failed to serialize settings")?;

    let id = entry_id.clone();
    let changed = conn
        .call(move |c| {
            c.execute(
                "UPDATE backups SET settings = ?2, updated_at = CURRENT_TIMESTAMP WHERE id = ?1",
                params![id, json],
            )
        })
        .await?;

    if changed == 0 {
        bail!("Backup not found: {}", entry_id);
    }
    Ok(())
}

pub async fn delete(conn: &Connection, entry_id: String) -> Result<()> {
    let id = entry_id.clone();
    let changed = conn
        .call(move |c| c.execute("DELETE FROM backups WHERE id = ?1", params![id]))
        .await?;

    if changed == 0 {
        bail!("Backup not found: {}", entry_id);
    }
    Ok(())
}
