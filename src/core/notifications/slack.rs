use super::{BackupEvent, NotificationChannel};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Value, json};

pub struct SlackNotifier {
    webhook_url: String,
    client: reqwest::Client,
}

fn short(entry_id: &str) -> &str {
    entry_id.get(..8).unwrap_or(entry_id)
}

fn field(label: &str, value: impl std::fmt::Display) -> Value {
    json!({ "type": "mrkdwn", "text": format!("*{}:*\n{}", label, value) })
}

fn header(text: &str) -> Value {
    json!({
        "type": "header",
        "text": { "type": "plain_text", "text": text, "emoji": true }
    })
}

impl SlackNotifier {
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url,
            client: reqwest::Client::new(),
        }
    }

    fn format_message(&self, event: &BackupEvent) -> Value {
        match event {
            BackupEvent::Started {
                entry_id,
                title,
                mode,
                scheduled,
            } => {
                let trigger = if *scheduled { "schedule" } else { "manual" };
                json!({
                    "blocks": [
                        header("Backup Started"),
                        {
                            "type": "section",
                            "fields": [
                                field("Backup", title),
                                field("ID", format!("`{}`", short(entry_id))),
                                field("Mode", mode),
                                field("Trigger", trigger),
                            ]
                        }
                    ]
                })
            }
            BackupEvent::Completed {
                entry_id,
                title,
                mode,
                duration_secs,
            } => json!({
                "blocks": [
                    header("Backup Complete"),
                    {
                        "type": "section",
                        "fields": [
                            field("Backup", title),
                            field("ID", format!("`{}`", short(entry_id))),
                            field("Mode", mode),
                            field("Duration", format!("{}s", duration_secs)),
                        ]
                    }
                ]
            }),
            BackupEvent::Failed {
                entry_id,
                title,
                error,
            } => json!({
                "blocks": [
                    header("Backup Failed"),
                    {
                        "type": "section",
                        "fields": [
                            field("Backup", title),
                            field("ID", format!("`{}`", short(entry_id))),
                        ]
                    },
                    {
                        "type": "section",
                        "text": {
                            "type": "mrkdwn",
                            "text": format!("*Error:*\n```{}```", error)
                        }
                    }
                ]
            }),
        }
    }
}

#[async_trait]
impl NotificationChannel for SlackNotifier {
    async fn notify(&self, event: BackupEvent) -> Result<()> {
        let payload = self.format_message(&event);
        self.client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .context("Failed to reach Slack webhook")?
            .error_for_status()
            .context("Slack webhook rejected notification")?;
        Ok(())
    }
}
