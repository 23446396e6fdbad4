//! Compiling finished chapters into one document

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use strum::{AsRefStr, Display, EnumString};
use tempfile::NamedTempFile;
use tracing::info;

use crate::tasks::{TaskStatus, TaskStore};

pub const DEFAULT_FILE_STEM: &str = "book";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    #[strum(to_string = "markdown", serialize = "md")]
    Markdown,
    #[strum(to_string = "text", serialize = "txt")]
    Text,
}

impl ExportFormat {
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Markdown => "md",
            Self::Text => "txt",
        }
    }
}

/// `# <title>` followed by every finished chapter in order, blank-line separated
#[must_use]
pub fn compile_document(title: &str, tasks: &TaskStore) -> String {
    let mut parts: Vec<String> = Vec::new();
    if !title.trim().is_empty() {
        parts.push(format!("# {title}"));
    }
    parts.extend(
        tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Done && !t.content.is_empty())
            .map(|t| t.content.clone()),
    );
    parts.join("\n\n").trim().to_string()
}

/// Lowercased title with every non-alphanumeric replaced by `_`
#[must_use]
pub fn safe_file_name(title: &str) -> String {
    let name: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if name.is_empty() {
        DEFAULT_FILE_STEM.to_string()
    } else {
        name
    }
}

/// Write `document` as `<dir>/<safe title>.<ext>` via a temp file and rename.
///
/// # Errors
///
/// Any IO failure creating the directory or persisting the file.
pub fn write_document(
    dir: &Path,
    title: &str,
    document: &str,
    format: ExportFormat,
) -> std::io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let target = dir.join(format!("{}.{}", safe_file_name(title), format.extension()));
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(document.as_bytes())?;
    temp.as_file().sync_all()?;
    temp.persist(&target).map_err(|e| e.error)?;
    info!(path = %target.display(), bytes = document.len(), "book exported");
    Ok(target)
}
