//! Regex-driven in-place edits
//!
//! Patterns are compiled with the `regex` crate, which matches in linear
//! time. Compilation is bounded by a pattern length limit and by the
//! compiled program size, so a hostile pattern fails with
//! [`FileError::Pattern`] instead of consuming the process.

use std::sync::Arc;

use regex::bytes::{NoExpand, Regex, RegexBuilder};
use scriptoria_config::EditLimits;
use tokio::fs;
use tracing::{debug, info};

use crate::{
    error::FileError,
    fsutil,
    models::{OperationType, PatternEdit, PatternOptions},
    store::WorkspaceStore,
};

/// Applies find/replace edits to workspace files
#[derive(Debug, Clone)]
pub struct PatternEditor {
    store: Arc<WorkspaceStore>,
    limits: EditLimits,
}

impl PatternEditor {
    /// Creates an editor writing through `store`
    pub fn new(store: Arc<WorkspaceStore>, limits: EditLimits) -> Self {
        PatternEditor { store, limits }
    }

    /// Replaces every match of `pattern` in the file at `path`
    ///
    /// `$1` and `${name}` in `replacement` expand to capture groups.
    ///
    /// # Returns
    ///
    /// Number of replacements made. When nothing matched the file is not
    /// rewritten.
    pub async fn apply_pattern(
        &self,
        path: &str,
        pattern: &str,
        replacement: &str,
    ) -> Result<usize, FileError> {
        let counts = self
            .apply_edits(
                path,
                &[PatternEdit::new(pattern, replacement)],
                PatternOptions::default(),
            )
            .await?;
        Ok(counts.into_iter().sum())
    }

    /// Applies several edits in order as one atomic update
    ///
    /// All patterns are compiled before the file is read; any invalid
    /// pattern fails the whole call without touching storage. Each edit
    /// sees the output of the previous one.
    ///
    /// # Arguments
    ///
    /// * `path` - File to edit
    /// * `edits` - Pattern/replacement pairs, applied in order
    /// * `options` - Matching and replacement options shared by all edits
    ///
    /// # Returns
    ///
    /// Replacement count per edit
    pub async fn apply_edits(
        &self,
        path: &str,
        edits: &[PatternEdit],
        options: PatternOptions,
    ) -> Result<Vec<usize>, FileError> {
        let compiled = edits
            .iter()
            .map(|edit| self.compile(&edit.pattern, &options))
            .collect::<Result<Vec<_>, _>>()?;

        let resolved = self.store.resolve_file(path).await?;
        let _lock = self.store.locks().acquire(resolved.absolute()).await;

        if !self.store.file_exists(&resolved).await? {
            return Err(FileError::NotFound(resolved.relative().to_path_buf()));
        }
        let size = fs::metadata(resolved.absolute())
            .await
            .map_err(|e| {
                if fsutil::is_missing(&e) {
                    FileError::NotFound(resolved.relative().to_path_buf())
                } else {
                    FileError::IoError(e)
                }
            })?
            .len();
        if size > self.limits.max_edit_bytes {
            return Err(FileError::InvalidContent(format!(
                "{} is {} bytes, pattern edits are limited to {}",
                resolved.relative().display(),
                size,
                self.limits.max_edit_bytes
            )));
        }

        let mut content = self.store.read_resolved(&resolved).await?;
        let mut counts = Vec::with_capacity(edits.len());
        for (edit, regex) in edits.iter().zip(&compiled) {
            let (updated, count) = replace(regex, &content, &edit.replacement, &options);
            debug!(path = %resolved.relative().display(), pattern = %edit.pattern, count, "Applied edit");
            content = updated;
            counts.push(count);
        }

        let total: usize = counts.iter().sum();
        if total == 0 {
            debug!(path = %resolved.relative().display(), "No matches, file left unchanged");
            return Ok(counts);
        }
        self.store
            .commit(&resolved, &content, OperationType::Update)
            .await?;
        info!(path = %resolved.relative().display(), replacements = total, "Pattern edit applied");
        Ok(counts)
    }

    /// Compiles a pattern within the configured limits
    pub fn compile(&self, pattern: &str, options: &PatternOptions) -> Result<Regex, FileError> {
        if pattern.len() > self.limits.max_pattern_len {
            return Err(FileError::Pattern(format!(
                "pattern is {} bytes, limit is {}",
                pattern.len(),
                self.limits.max_pattern_len
            )));
        }
        RegexBuilder::new(pattern)
            .case_insensitive(options.case_insensitive)
            .size_limit(self.limits.regex_size_limit)
            .dfa_size_limit(self.limits.regex_size_limit)
            .build()
            .map_err(|e| FileError::Pattern(e.to_string()))
    }
}

fn replace(
    regex: &Regex,
    content: &[u8],
    replacement: &str,
    options: &PatternOptions,
) -> (Vec<u8>, usize) {
    // `replacen` treats a limit of 0 as "replace all"
    let limit = match options.max_replacements {
        Some(0) => return (content.to_vec(), 0),
        Some(limit) => limit,
        None => 0,
    };
    let found = regex.find_iter(content).count();
    let count = if limit == 0 { found } else { found.min(limit) };
    if count == 0 {
        return (content.to_vec(), 0);
    }

    let updated = if options.literal_replacement {
        regex.replacen(content, limit, NoExpand(replacement.as_bytes()))
    } else {
        regex.replacen(content, limit, replacement.as_bytes())
    };
    (updated.into_owned(), count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::PathGuard;
    use scriptoria_config::WorkspaceConfig;
    use tempfile::TempDir;

    async fn editor(temp_dir: &TempDir) -> (Arc<WorkspaceStore>, PatternEditor) {
        let config = WorkspaceConfig::with_root(temp_dir.path());
        let guard = PathGuard::new(temp_dir.path(), &config.metadata_dir)
            .await
            .unwrap();
        let store = Arc::new(WorkspaceStore::new(guard, &config));
        let editor = PatternEditor::new(store.clone(), config.limits.clone());
        (store, editor)
    }

    #[tokio::test]
    async fn test_todo_scenario() {
        let temp_dir = TempDir::new().unwrap();
        let (store, editor) = editor(&temp_dir).await;
        store.write("notes/todo.md", b"- [ ] draft").await.unwrap();

        let count = editor
            .apply_pattern("notes/todo.md", "draft", "draft v2")
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(store.read("notes/todo.md").await.unwrap(), b"- [ ] draft v2");
    }

    #[tokio::test]
    async fn test_invalid_pattern_checked_before_read() {
        let temp_dir = TempDir::new().unwrap();
        let (_store, editor) = editor(&temp_dir).await;

        match editor.apply_pattern("missing.txt", "(unclosed", "x").await {
            Err(FileError::Pattern(_)) => (),
            other => panic!("Expected Pattern error, got {:?}", other),
        }
        assert!(matches!(
            editor.apply_pattern("missing.txt", "ok", "x").await,
            Err(FileError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_capture_groups_and_literal() {
        let temp_dir = TempDir::new().unwrap();
        let (store, editor) = editor(&temp_dir).await;
        store.write("v.txt", b"version=1.2").await.unwrap();

        let count = editor
            .apply_pattern("v.txt", r"(\d+)\.(\d+)", "$2.$1")
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(store.read("v.txt").await.unwrap(), b"version=2.1");

        let options = PatternOptions {
            literal_replacement: true,
            ..PatternOptions::default()
        };
        editor
            .apply_edits("v.txt", &[PatternEdit::new("version", "$cost")], options)
            .await
            .unwrap();
        assert_eq!(store.read("v.txt").await.unwrap(), b"$cost=2.1");
    }

    #[tokio::test]
    async fn test_no_match_does_not_rewrite() {
        let temp_dir = TempDir::new().unwrap();
        let (store, editor) = editor(&temp_dir).await;
        store.write("f.txt", b"unchanged").await.unwrap();
        let before = std::fs::metadata(temp_dir.path().join("f.txt"))
            .unwrap()
            .modified()
            .unwrap();

        assert_eq!(editor.apply_pattern("f.txt", "absent", "x").await.unwrap(), 0);
        let after = std::fs::metadata(temp_dir.path().join("f.txt"))
            .unwrap()
            .modified()
            .unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_edits_apply_in_order_with_limits() {
        let temp_dir = TempDir::new().unwrap();
        let (store, editor) = editor(&temp_dir).await;
        store.write("f.txt", b"a a a A").await.unwrap();

        let options = PatternOptions {
            case_insensitive: true,
            max_replacements: Some(3),
            ..PatternOptions::default()
        };
        let counts = editor
            .apply_edits(
                "f.txt",
                &[PatternEdit::new("a", "b"), PatternEdit::new("b", "c")],
                options,
            )
            .await
            .unwrap();
        assert_eq!(counts, vec![3, 3]);
        assert_eq!(store.read("f.txt").await.unwrap(), b"c c c A");
    }

    #[tokio::test]
    async fn test_pattern_limits() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = WorkspaceConfig::with_root(temp_dir.path());
        config.limits.max_pattern_len = 8;
        config.limits.max_edit_bytes = 4;
        let guard = PathGuard::new(temp_dir.path(), &config.metadata_dir)
            .await
            .unwrap();
        let store = Arc::new(WorkspaceStore::new(guard, &config));
        let editor = PatternEditor::new(store.clone(), config.limits.clone());
        store.write("big.txt", b"too large").await.unwrap();

        assert!(matches!(
            editor.apply_pattern("big.txt", "a-very-long-pattern", "x").await,
            Err(FileError::Pattern(_))
        ));
        assert!(matches!(
            editor.apply_pattern("big.txt", "large", "x").await,
            Err(FileError::InvalidContent(_))
        ));
    }

    #[tokio::test]
    async fn test_oversized_program_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = WorkspaceConfig::with_root(temp_dir.path());
        config.limits.regex_size_limit = 1024;
        let guard = PathGuard::new(temp_dir.path(), &config.metadata_dir)
            .await
            .unwrap();
        let store = Arc::new(WorkspaceStore::new(guard, &config));
        let editor = PatternEditor::new(store, config.limits.clone());

        assert!(matches!(
            editor.compile(r"\w{1000}", &PatternOptions::default()),
            Err(FileError::Pattern(_))
        ));
    }
}
