mod error;
mod journal;
mod paths;

pub use error::JournalError;
pub use journal::{format_entry, MemoryJournal};
pub use paths::{journal_path, JOURNAL_DIR, JOURNAL_FILE};
