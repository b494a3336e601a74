//! Error types for the database layer.

use std::fmt;

use thiserror::Error;

/// Result code reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbErrorCode(pub i32);

impl fmt::Display for DbErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A failure status surfaced by the engine: its result code plus the message
/// from `sqlite3_errmsg` when one is available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStatus {
    /// Engine result code.
    pub code: DbErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl EngineStatus {
    pub(crate) fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code: DbErrorCode(code),
            message: message.into(),
        }
    }
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sqlite error {}: {}", self.code, self.message)
    }
}

/// Errors raised by connections, statements, cursors and the SQL builder.
#[derive(Debug, Error)]
pub enum DbError {
    /// The database file could not be opened, created or decrypted.
    #[error("failed to open database: {0}")]
    EngineOpen(EngineStatus),

    /// The connection has already been closed.
    #[error("database connection is closed")]
    ClosedConnection,

    /// `begin_transaction` was called while a transaction is open.
    #[error("database already in transaction")]
    AlreadyInTransaction,

    /// The SQL text could not be compiled.
    #[error("failed to compile SQL: {0}")]
    Compile(EngineStatus),

    /// A parameter index outside `1..=parameter_count`.
    #[error("bind index {index} out of range (statement has {count} parameters)")]
    BindIndex {
        /// 1-based index that was requested.
        index: usize,
        /// Number of parameters the statement declares.
        count: usize,
    },

    /// The number of bind arguments differs from the statement's parameters.
    #[error("expected {expected} bind arguments but {actual} were provided")]
    ArityMismatch {
        /// Number of parameters the statement declares.
        expected: usize,
        /// Number of arguments supplied.
        actual: usize,
    },

    /// The statement was finalized, or the cursor has no more rows.
    #[error("prepared statement finalized")]
    UseAfterFinalize,

    /// A column index outside `0..column_count`.
    #[error("column index {index} out of range (result has {count} columns)")]
    ColumnIndex {
        /// 0-based index that was requested.
        index: usize,
        /// Number of result columns.
        count: usize,
    },

    /// A column accessor was used before the cursor was advanced to a row.
    #[error("cursor is not positioned on a row")]
    NoCurrentRow,

    /// Stepping failed (constraint violation, I/O error, busy database, ...).
    #[error("step failed: {0}")]
    EngineStep(EngineStatus),

    /// An insert or update was requested without any column values (and, for
    /// inserts, without a null-column hack).
    #[error("no column values supplied")]
    EmptyValues,

    /// An integer does not fit the engine's 64-bit signed storage class.
    #[error("integer {0} does not fit in a 64-bit signed value")]
    IntegerOverflow(String),

    /// The builder was given clauses the engine cannot accept.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Any other engine failure (binding, reset, keying, exec, commit).
    #[error(transparent)]
    Engine(EngineStatus),
}

impl DbError {
    /// Returns the engine result code, if this error originated in the engine.
    pub const fn code(&self) -> Option<DbErrorCode> {
        match self {
            Self::EngineOpen(status)
            | Self::Compile(status)
            | Self::EngineStep(status)
            | Self::Engine(status) => Some(status.code),
            _ => None,
        }
    }
}

impl std::error::Error for EngineStatus {}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;
