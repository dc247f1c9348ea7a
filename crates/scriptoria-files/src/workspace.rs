//! Workspace coordinator
//!
//! [`Workspace`] wires the store, pattern editor, versioner and message log
//! over one root and exposes the operations front ends call. Several
//! workspaces can be open in the same process; none of them reads ambient
//! process state.

use std::path::Path;
use std::sync::Arc;

use scriptoria_config::{ConfigManager, ConfigManagerTrait, WorkspaceConfig};
use tokio::fs;
use tracing::info;

use crate::{
    error::FileError,
    guard::PathGuard,
    hooks::HookSet,
    messages::MessageLog,
    models::{EntryInfo, Message, WriteEvent},
    pattern::PatternEditor,
    store::WorkspaceStore,
    versions::DocVersioner,
};

/// Central coordinator for one sandboxed workspace
///
/// # Example
///
/// ```ignore
/// use scriptoria_config::WorkspaceConfig;
/// use scriptoria_files::Workspace;
///
/// let workspace = Workspace::open(&WorkspaceConfig::with_root("/srv/agent")).await?;
/// workspace.write("notes/todo.md", b"- [ ] draft").await?;
/// let replaced = workspace.apply_pattern("notes/todo.md", "draft", "draft v2").await?;
/// ```
#[derive(Debug, Clone)]
pub struct Workspace {
    config: WorkspaceConfig,
    store: Arc<WorkspaceStore>,
    editor: PatternEditor,
    versioner: DocVersioner,
    messages: MessageLog,
}

impl Workspace {
    /// Opens the workspace described by `config`
    pub async fn open(config: &WorkspaceConfig) -> Result<Self, FileError> {
        Self::open_with_hooks(config, HookSet::new()).await
    }

    /// Opens a workspace whose writes are reported to `hooks`
    ///
    /// # Arguments
    ///
    /// * `config` - Validated before anything touches the disk
    /// * `hooks` - Post-write hooks, run in order after every write
    pub async fn open_with_hooks(
        config: &WorkspaceConfig,
        hooks: HookSet,
    ) -> Result<Self, FileError> {
        ConfigManager::new().validate_config(config)?;
        if config.create_root {
            fs::create_dir_all(&config.root).await?;
        }
        let guard = PathGuard::new(&config.root, &config.metadata_dir).await?;
        info!(root = %guard.root().display(), "Opened workspace");

        let store = Arc::new(WorkspaceStore::new(guard, config).with_hooks(hooks));
        Ok(Workspace {
            config: config.clone(),
            editor: PatternEditor::new(store.clone(), config.limits.clone()),
            versioner: DocVersioner::new(store.clone(), config.materialize_documents),
            messages: MessageLog::new(store.clone(), config.default_log.clone()),
            store,
        })
    }

    /// Canonical workspace root
    pub fn root(&self) -> &Path {
        self.store.guard().root()
    }

    /// Configuration the workspace was opened with
    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    /// File and directory operations
    pub fn store(&self) -> &Arc<WorkspaceStore> {
        &self.store
    }

    /// Pattern edits
    pub fn editor(&self) -> &PatternEditor {
        &self.editor
    }

    /// Versioned documents
    pub fn versioner(&self) -> &DocVersioner {
        &self.versioner
    }

    /// Message logs
    pub fn messages(&self) -> &MessageLog {
        &self.messages
    }

    /// Writes a file atomically, replacing any existing content
    pub async fn write(&self, path: &str, content: &[u8]) -> Result<WriteEvent, FileError> {
        self.store.write(path, content).await
    }

    /// Reads a file
    pub async fn read(&self, path: &str) -> Result<Vec<u8>, FileError> {
        self.store.read(path).await
    }

    /// Deletes a file or directory
    pub async fn delete(&self, path: &str, recursive: bool) -> Result<(), FileError> {
        self.store.delete(path, recursive).await
    }

    /// Lists a directory, sorted by name
    pub async fn list(&self, path: &str) -> Result<Vec<EntryInfo>, FileError> {
        self.store.list_all(path).await
    }

    /// Moves a file or directory
    pub async fn move_file(&self, src: &str, dst: &str, overwrite: bool) -> Result<(), FileError> {
        self.store.move_path(src, dst, overwrite).await
    }

    /// Regex find/replace over one file
    pub async fn apply_pattern(
        &self,
        path: &str,
        pattern: &str,
        replacement: &str,
    ) -> Result<usize, FileError> {
        self.editor.apply_pattern(path, pattern, replacement).await
    }

    /// Records a new version of a document
    pub async fn append_version(&self, path: &str, content: &[u8]) -> Result<u64, FileError> {
        self.versioner.append_version(path, content).await
    }

    /// Content of one version of a document
    pub async fn get_version(&self, path: &str, version: u64) -> Result<Vec<u8>, FileError> {
        self.versioner.get_version(path, version).await
    }

    /// Appends to the default message log
    pub async fn append_message(
        &self,
        sender: &str,
        recipient: &str,
        body: &str,
    ) -> Result<Message, FileError> {
        self.messages.append(sender, recipient, body).await
    }

    /// Messages of `log`, optionally only those after `after_id`
    pub async fn read_messages(
        &self,
        log: &str,
        after_id: Option<u64>,
    ) -> Result<Vec<Message>, FileError> {
        self.messages.read_messages(log, after_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_creates_root() {
        let temp_dir = TempDir::new().unwrap();
        let config = WorkspaceConfig::with_root(temp_dir.path().join("nested/root"));

        let workspace = Workspace::open(&config).await.unwrap();
        assert!(workspace.root().is_dir());
        assert!(workspace.list("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_without_create_root_requires_existing_dir() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = WorkspaceConfig::with_root(temp_dir.path().join("absent"));
        config.create_root = false;

        assert!(matches!(
            Workspace::open(&config).await,
            Err(FileError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_config() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = WorkspaceConfig::with_root(temp_dir.path());
        config.metadata_dir = "a/b".to_string();

        assert!(matches!(
            Workspace::open(&config).await,
            Err(FileError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_workspaces_are_isolated() {
        let first_dir = TempDir::new().unwrap();
        let second_dir = TempDir::new().unwrap();
        let first = Workspace::open(&WorkspaceConfig::with_root(first_dir.path()))
            .await
            .unwrap();
        let second = Workspace::open(&WorkspaceConfig::with_root(second_dir.path()))
            .await
            .unwrap();

        first.write("shared.txt", b"first").await.unwrap();
        assert!(matches!(
            second.read("shared.txt").await,
            Err(FileError::NotFound(_))
        ));
        first.append_message("a", "b", "hi").await.unwrap();
        assert!(second.read_messages("main", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_boundary_operations() {
        let temp_dir = TempDir::new().unwrap();
        let workspace = Workspace::open(&WorkspaceConfig::with_root(temp_dir.path()))
            .await
            .unwrap();

        workspace.write("a/b.txt", b"draft").await.unwrap();
        assert_eq!(workspace.apply_pattern("a/b.txt", "draft", "final").await.unwrap(), 1);
        workspace.move_file("a/b.txt", "a/c.txt", false).await.unwrap();
        assert_eq!(workspace.read("a/c.txt").await.unwrap(), b"final");

        assert_eq!(workspace.append_version("CHANGELOG.md", b"v1").await.unwrap(), 1);
        assert_eq!(workspace.get_version("CHANGELOG.md", 1).await.unwrap(), b"v1");
        assert_eq!(workspace.read("CHANGELOG.md").await.unwrap(), b"v1");

        workspace.delete("a", true).await.unwrap();
        let names: Vec<_> = workspace
            .list("")
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.name)
            .collect();
        assert_eq!(names, vec!["CHANGELOG.md"]);
    }
}
