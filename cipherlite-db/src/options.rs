//! Open-time configuration.

use std::fmt::Write as _;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// `PRAGMA journal_mode` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalMode {
    /// Rollback journal deleted at the end of each transaction.
    Delete,
    /// Rollback journal truncated instead of deleted.
    Truncate,
    /// Rollback journal header zeroed instead of deleted.
    Persist,
    /// Rollback journal kept in memory.
    Memory,
    /// Write-ahead log.
    Wal,
    /// No journal; transactions cannot be rolled back reliably.
    Off,
}

impl JournalMode {
    const fn as_sql(self) -> &'static str {
        match self {
            Self::Delete => "DELETE",
            Self::Truncate => "TRUNCATE",
            Self::Persist => "PERSIST",
            Self::Memory => "MEMORY",
            Self::Wal => "WAL",
            Self::Off => "OFF",
        }
    }
}

/// `PRAGMA synchronous` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Synchronous {
    /// Hand writes to the OS without syncing.
    Off,
    /// Sync at critical moments only.
    Normal,
    /// Sync before every commit is reported.
    Full,
    /// Like `Full`, plus a directory sync after unlinking the journal.
    Extra,
}

impl Synchronous {
    const fn as_sql(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Normal => "NORMAL",
            Self::Full => "FULL",
            Self::Extra => "EXTRA",
        }
    }
}

/// How to open a database.
///
/// Deserializable from any serde format with every field optional, e.g.
///
/// ```json
/// { "temp_dir": "/data/tmp", "journal_mode": "wal", "foreign_keys": true }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct OpenOptions {
    /// Open without write access.
    pub read_only: bool,
    /// Create the file if it does not exist. Ignored when `read_only` is set.
    pub create: bool,
    /// Scratch directory the engine uses for temp files. Process-wide.
    pub temp_dir: Option<PathBuf>,
    /// Journal mode applied after open.
    pub journal_mode: Option<JournalMode>,
    /// Sync level applied after open.
    pub synchronous: Option<Synchronous>,
    /// Enforce foreign key constraints.
    pub foreign_keys: bool,
    /// Overwrite deleted content with zeroes.
    pub secure_delete: bool,
    /// How long to wait on a locked database before failing with
    /// `SQLITE_BUSY`.
    pub busy_timeout_ms: Option<u32>,
    /// Read the schema right after opening so unreadable files fail at open.
    ///
    /// Turn off to open an encrypted file whose key is supplied afterwards
    /// with [`Connection::set_key`](crate::Connection::set_key). Nothing is
    /// read from the file and no PRAGMAs are applied until then; call
    /// [`Connection::configure`](crate::Connection::configure) once keyed.
    pub verify: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            read_only: false,
            create: true,
            temp_dir: None,
            journal_mode: None,
            synchronous: None,
            foreign_keys: false,
            secure_delete: false,
            busy_timeout_ms: None,
            verify: true,
        }
    }
}

impl OpenOptions {
    /// Durable settings for encrypted stores: WAL, `synchronous = FULL`,
    /// foreign keys and secure deletion.
    pub fn secure() -> Self {
        Self {
            journal_mode: Some(JournalMode::Wal),
            synchronous: Some(Synchronous::Full),
            foreign_keys: true,
            secure_delete: true,
            ..Self::default()
        }
    }

    /// Sets the scratch directory.
    #[must_use]
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Opens read-only.
    #[must_use]
    pub const fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Skips the open-time read; see [`verify`](Self::verify).
    #[must_use]
    pub const fn unverified(mut self) -> Self {
        self.verify = false;
        self
    }

    /// PRAGMA script for these options; empty when nothing needs setting.
    pub(crate) fn pragma_script(&self) -> String {
        let mut sql = String::new();
        if let Some(ms) = self.busy_timeout_ms {
            let _ = writeln!(sql, "PRAGMA busy_timeout = {ms};");
        }
        if self.foreign_keys {
            sql.push_str("PRAGMA foreign_keys = ON;\n");
        }
        if let Some(mode) = self.journal_mode {
            let _ = writeln!(sql, "PRAGMA journal_mode = {};", mode.as_sql());
        }
        if let Some(sync) = self.synchronous {
            let _ = writeln!(sql, "PRAGMA synchronous = {};", sync.as_sql());
        }
        if self.secure_delete {
            sql.push_str("PRAGMA secure_delete = ON;\n");
        }
        sql
    }
}
