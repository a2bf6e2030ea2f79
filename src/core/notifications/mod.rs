mod slack;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{NotificationChannelType, NotificationConfig};
use crate::core::models::BackupMode;

/// Backup runs worth telling someone about.
#[derive(Debug, Clone)]
pub enum BackupEvent {
    Started {
        entry_id: String,
        title: String,
        mode: BackupMode,
        scheduled: bool,
    },
    Completed {
        entry_id: String,
        title: String,
        mode: BackupMode,
        duration_secs: u64,
    },
    Failed {
        entry_id: String,
        title: String,
        error: String,
    },
}

/// Trait for notification channel implementations (Slack, Discord, etc.)
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn notify(&self, event: BackupEvent) -> Result<()>;
}

/// Factory function to create a notifier based on config
pub fn create_notifier(config: &NotificationConfig) -> Option<Arc<dyn NotificationChannel>> {
    match &config.channel {
        NotificationChannelType::None => None,
        NotificationChannelType::Slack => {
            let webhook = config.slack_webhook.as_ref()?;
            if webhook.is_empty() {
                return None;
            }
            Some(Arc::new(slack::SlackNotifier::new(webhook.clone())))
        }
    }
}
