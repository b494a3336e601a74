//! Safe client layer over an embedded, encryptable SQL engine (`sqlite3mc`).
//!
//! The engine is compiled from the downloaded amalgamation by `build.rs` and
//! linked statically. On top of its C API this crate provides:
//!
//! * [`Connection`]: open/close, a single non-nesting transaction, ad-hoc
//!   execution and key management.
//! * [`Statement`]: a compiled statement that can be reset and rebound many
//!   times, with positional `?` parameters.
//! * [`Cursor`]: forward-only iteration over result rows.
//! * [`Value`]: the closed set of bindable storage classes.
//! * [`builder`]: SQL assembly for inserts, updates, deletes and selects,
//!   plus the matching table helpers on [`Connection`].
//!
//! ```ignore
//! use cipherlite_db::{params, Connection};
//!
//! let conn = Connection::open(path, temp_dir)?;
//! conn.execute_batch("CREATE TABLE users (uid INTEGER, name TEXT, status INTEGER);")?;
//! conn.execute("INSERT INTO users VALUES (?, ?, ?)", params![7, "user7", 7])?;
//! let name = conn.query_row("SELECT name FROM users WHERE uid = ?", params![7], |row| {
//!     row.string_at(0)
//! })?;
//! ```
//!
//! The `ffi` module is the **only** file that contains `unsafe` code or C
//! types.

mod ffi;

pub mod builder;
mod connection;
mod crud;
mod cursor;
pub mod error;
pub mod options;
mod statement;
mod transaction;
pub mod value;

pub mod cipher;

pub use builder::{ConflictMode, ContentValues, Select, SqlCommand};
pub use cipher::DatabaseKey;
pub use connection::Connection;
pub use cursor::Cursor;
pub use error::{DbError, DbErrorCode, DbResult, EngineStatus};
pub use options::{JournalMode, OpenOptions, Synchronous};
pub use statement::{Statement, StepResult};
pub use transaction::{Transaction, TransactionBehavior};
pub use value::{Value, ValueKind};

#[cfg(test)]
mod tests;
