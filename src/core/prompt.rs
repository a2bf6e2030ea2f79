use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::models::BackupMode;

/// Questions the coordinator needs answered before some commands.
/// `None` means the user dismissed the prompt.
#[async_trait]
pub trait Prompter: Send + Sync {
    async fn choose_backup_mode(&self, entry_id: &str) -> Option<BackupMode>;

    async fn confirm_deletion(&self, entry_id: &str) -> bool;

    /// Where a single restored file should be written.
    async fn choose_restore_file(
        &self,
        entry_id: &str,
        source_path: &str,
        default_dir: &Path,
    ) -> Option<PathBuf>;

    /// Directory the whole backup should be restored into.
    async fn choose_restore_directory(&self, entry_id: &str, default_dir: &Path)
    -> Option<PathBuf>;

    async fn choose_directory(&self, entry_id: &str) -> Option<PathBuf>;
}

/// Answers prompts from configuration, for running without an interactive
/// panel.
pub struct HeadlessPrompter {
    pub default_mode: BackupMode,
    pub auto_confirm_deletion: bool,
    pub restore_root: PathBuf,
}

#[async_trait]
impl Prompter for HeadlessPrompter {
    async fn choose_backup_mode(&self, _entry_id: &str) -> Option<BackupMode> {
        Some(self.default_mode)
    }

    async fn confirm_deletion(&self, _entry_id: &str) -> bool {
        self.auto_confirm_deletion
    }

    async fn choose_restore_file(
        &self,
        entry_id: &str,
        source_path: &str,
        _default_dir: &Path,
    ) -> Option<PathBuf> {
        let name = Path::new(source_path).file_name()?;
        Some(self.restore_root.join(entry_id).join(name))
    }

    async fn choose_restore_directory(
        &self,
        entry_id: &str,
        _default_dir: &Path,
    ) -> Option<PathBuf> {
        Some(self.restore_root.join(entry_id))
    }

    async fn choose_directory(&self, _entry_id: &str) -> Option<PathBuf> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompter() -> HeadlessPrompter {
        HeadlessPrompter {
            default_mode: BackupMode::Incremental,
            auto_confirm_deletion: false,
            restore_root: PathBuf::from("/var/restore"),
        }
    }

    #[tokio::test]
    async fn restores_land_under_restore_root() {
        let prompter = prompter();

        let file = prompter
            .choose_restore_file("e1", "docs/report.odt", Path::new("/home"))
            .await;
        assert_eq!(file, Some(PathBuf::from("/var/restore/e1/report.odt")));

        let dir = prompter.choose_restore_directory("e1", Path::new("/home")).await;
        assert_eq!(dir, Some(PathBuf::from("/var/restore/e1")));
    }

    #[tokio::test]
    async fn root_path_has_no_file_to_restore() {
        assert_eq!(
            prompter().choose_restore_file("e1", "/", Path::new("/home")).await,
            None
        );
    }

    #[tokio::test]
    async fn deletion_follows_config() {
        assert!(!prompter().confirm_deletion("e1").await);
        assert_eq!(
            prompter().choose_backup_mode("e1").await,
            Some(BackupMode::Incremental)
        );
    }
}
