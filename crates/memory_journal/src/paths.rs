use std::path::{Path, PathBuf};

pub const JOURNAL_DIR: &str = ".agent";
pub const JOURNAL_FILE: &str = "memory.md";

#[must_use]
pub fn journal_path(cwd: &Path) -> PathBuf {
    cwd.join(JOURNAL_DIR).join(JOURNAL_FILE)
}
