//! Code editors
//!
//! Applies [`CodeEdit`]s to files by line range. Lines are 1-based and
//! inclusive. Reapplying a replace or insert whose text is already in place
//! leaves the file untouched. A delete cannot tell whether it already ran, so
//! the executor never hands the same edit to an editor twice in one attempt.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::errors::ExecutionError;
use crate::strategy::{CodeEdit, EditKind};

/// Whether an edit changed the file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Applied,
    AlreadyApplied,
}

#[async_trait]
pub trait CodeEditor: Send + Sync {
    async fn apply(&self, edit: &CodeEdit) -> Result<EditOutcome, ExecutionError>;
}

/// Edits files on disk, resolving relative paths against `root`
pub struct FsCodeEditor {
    root: Option<PathBuf>,
}

impl FsCodeEditor {
    pub fn new() -> Self {
        Self { root: None }
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, file: &str) -> PathBuf {
        let path = Path::new(file);
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl Default for FsCodeEditor {
    fn default() -> Self {
        Self::new()
    }
}

/// Pure line-range edit; returns `None` when the content is already in place
pub fn edit_lines(content: &str, edit: &CodeEdit) -> Result<Option<String>, String> {
    if edit.start_line == 0 || edit.end_line < edit.start_line {
        return Err(format!(
            "invalid line range {}..={}",
            edit.start_line, edit.end_line
        ));
    }

    let trailing_newline = content.ends_with('\n');
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    let replacement: Vec<String> = edit.replacement.lines().map(str::to_string).collect();
    let start = (edit.start_line - 1) as usize;
    let end = edit.end_line as usize;

    match edit.kind {
        EditKind::Replace => {
            if end > lines.len() {
                return Err(format!(
                    "line {} is past end of file ({} lines)",
                    edit.end_line,
                    lines.len()
                ));
            }
            // Compare against the replacement's own length; it may differ from the range
            let already = !replacement.is_empty()
                && lines
                    .get(start..start + replacement.len())
                    .is_some_and(|existing| existing == &replacement[..]);
            if already {
                return Ok(None);
            }
            lines.splice(start..end, replacement);
        }
        EditKind::Insert => {
            if start > lines.len() {
                return Err(format!(
                    "cannot insert at line {} ({} lines)",
                    edit.start_line,
                    lines.len()
                ));
            }
            let already = lines
                .get(start..start + replacement.len())
                .is_some_and(|existing| existing == &replacement[..]);
            if already {
                return Ok(None);
            }
            lines.splice(start..start, replacement);
        }
        EditKind::Delete => {
            if start >= lines.len() {
                return Ok(None);
            }
            lines.drain(start..end.min(lines.len()));
        }
    }

    let mut out = lines.join("\n");
    if trailing_newline && !out.is_empty() {
        out.push('\n');
    }
    Ok(Some(out))
}

#[async_trait]
impl CodeEditor for FsCodeEditor {
    async fn apply(&self, edit: &CodeEdit) -> Result<EditOutcome, ExecutionError> {
        let path = self.resolve(&edit.file);
        let edit_err = |message: String| ExecutionError::CodeEdit {
            file: edit.file.clone(),
            message,
        };

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| edit_err(e.to_string()))?;

        match edit_lines(&content, edit).map_err(edit_err)? {
            Some(updated) => {
                tokio::fs::write(&path, updated)
                    .await
                    .map_err(|e| edit_err(e.to_string()))?;
                debug!(file = %path.display(), "Applied code edit");
                Ok(EditOutcome::Applied)
            }
            None => Ok(EditOutcome::AlreadyApplied),
        }
    }
}

#[derive(Debug, Default)]
pub struct DryRunCodeEditor;

#[async_trait]
impl CodeEditor for DryRunCodeEditor {
    async fn apply(&self, edit: &CodeEdit) -> Result<EditOutcome, ExecutionError> {
        info!(
            file = %edit.file,
            start = edit.start_line,
            end = edit.end_line,
            "[dry-run] would edit file"
        );
        Ok(EditOutcome::Applied)
    }
}
