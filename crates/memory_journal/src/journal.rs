use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::debug;

use crate::error::JournalError;
use crate::paths::journal_path;

/// Append-only learnings file spliced into the system prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryJournal {
    path: PathBuf,
}

impl MemoryJournal {
    /// Journal under `<cwd>/.agent/memory.md`.
    #[must_use]
    pub fn for_workspace(cwd: &Path) -> Self {
        Self::at(journal_path(cwd))
    }

    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whole journal contents; a missing file reads as empty.
    pub fn read_all(&self) -> Result<String, JournalError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(contents),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(source) => Err(JournalError::io("reading journal", &self.path, source)),
        }
    }

    /// Appends one timestamped entry and returns the line written.
    pub fn append(&self, text: &str) -> Result<String, JournalError> {
        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(JournalError::ClockFormat)?;
        let line = format_entry(&timestamp, text)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| JournalError::io("creating journal directory", parent, source))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| JournalError::io("opening journal for append", &self.path, source))?;
        writeln!(file, "{line}")
            .map_err(|source| JournalError::io("appending journal entry", &self.path, source))?;

        debug!(path = %self.path.display(), "saved learning");
        Ok(line)
    }
}

/// Renders one journal line; embedded line breaks collapse to single spaces.
pub fn format_entry(timestamp: &str, text: &str) -> Result<String, JournalError> {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return Err(JournalError::EmptyEntry);
    }
    Ok(format!("- [{timestamp}] {collapsed}"))
}
