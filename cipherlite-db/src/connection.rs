//! Safe wrapper around a database connection.
//!
//! This file contains **no `unsafe` code**. All engine interaction goes
//! through [`ffi::RawDb`].

use std::cell::Cell;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::cipher::{self, DatabaseKey};
use crate::cursor::Cursor;
use crate::error::{DbError, DbResult, EngineStatus};
use crate::ffi::{self, RawDb};
use crate::options::OpenOptions;
use crate::statement::Statement;
use crate::transaction::{Transaction, TransactionBehavior};
use crate::value::Value;

/// A connection to a database file.
///
/// Tracks whether it is open and whether a transaction is in progress. Only
/// one transaction can be open at a time: a second
/// [`begin_transaction`](Self::begin_transaction) fails with
/// [`DbError::AlreadyInTransaction`].
///
/// Closed when dropped. Every [`Statement`] borrows the connection, so
/// [`close`](Self::close) cannot be called while a statement is alive.
///
/// `Send` but not `Sync`: a connection must be driven from one calling
/// context at a time.
pub struct Connection {
    db: RawDb,
    path: PathBuf,
    in_transaction: Cell<bool>,
}

impl Connection {
    /// Opens (or creates) the database at `path`, using `temp_dir` as the
    /// engine's scratch directory.
    ///
    /// Fails with [`DbError::EngineOpen`] if the file cannot be opened,
    /// created or read (locked, corrupt, or encrypted under a key that has
    /// not been supplied).
    pub fn open(path: &Path, temp_dir: &Path) -> DbResult<Self> {
        Self::open_with_options(path, &OpenOptions::default().with_temp_dir(temp_dir))
    }

    /// Opens a database with explicit options.
    ///
    /// With [`OpenOptions::verify`] off the file is neither read nor
    /// configured, which is how an existing encrypted database is opened
    /// before [`set_key`](Self::set_key).
    pub fn open_with_options(path: &Path, options: &OpenOptions) -> DbResult<Self> {
        let conn = Self::open_unconfigured(path, options)?;
        if !options.verify {
            return Ok(conn);
        }
        // The engine defers reading the file until it is first needed; touch
        // the schema so unreadable files fail here rather than later.
        conn.db
            .exec("SELECT count(*) FROM sqlite_master;")
            .map_err(DbError::EngineOpen)?;
        conn.configure(options)?;
        Ok(conn)
    }

    /// Opens an in-memory database.
    pub fn open_in_memory() -> DbResult<Self> {
        Self::open_with_options(Path::new(":memory:"), &OpenOptions::default())
    }

    /// Opens the file without reading it or applying any PRAGMAs.
    pub(crate) fn open_unconfigured(path: &Path, options: &OpenOptions) -> DbResult<Self> {
        if let Some(dir) = &options.temp_dir {
            ffi::set_temp_directory(&dir.to_string_lossy()).map_err(DbError::EngineOpen)?;
        }
        let flags = if options.read_only {
            ffi::SQLITE_OPEN_READONLY | ffi::SQLITE_OPEN_FULLMUTEX
        } else if options.create {
            ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE | ffi::SQLITE_OPEN_FULLMUTEX
        } else {
            ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_FULLMUTEX
        };
        let db = RawDb::open(&path.to_string_lossy(), flags).map_err(DbError::EngineOpen)?;
        debug!("opened database at {}", path.display());
        Ok(Self {
            db,
            path: path.to_path_buf(),
            in_transaction: Cell::new(false),
        })
    }

    /// Applies the PRAGMAs `options` asks for. Done by the open functions;
    /// call it directly after [`set_key`](Self::set_key) on a connection
    /// opened unverified.
    pub fn configure(&self, options: &OpenOptions) -> DbResult<()> {
        let script = options.pragma_script();
        if script.is_empty() {
            return Ok(());
        }
        self.execute_batch(&script)
    }

    /// Path the connection was opened with.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `true` until [`close`](Self::close) runs.
    pub fn is_open(&self) -> bool {
        self.db.is_open()
    }

    /// Returns `true` while a transaction begun with
    /// [`begin_transaction`](Self::begin_transaction) is open.
    pub fn in_transaction(&self) -> bool {
        self.in_transaction.get()
    }

    fn ensure_open(&self) -> DbResult<&RawDb> {
        if self.db.is_open() {
            Ok(&self.db)
        } else {
            Err(DbError::ClosedConnection)
        }
    }

    /// Commits any open transaction and releases the handle.
    ///
    /// Idempotent and infallible: errors from the implicit commit or from the
    /// engine while releasing are logged, never returned.
    pub fn close(&mut self) {
        if !self.db.is_open() {
            return;
        }
        if let Err(e) = self.commit_transaction() {
            warn!("implicit commit while closing {} failed: {e}", self.path.display());
        }
        self.in_transaction.set(false);
        if let Err(e) = self.db.close() {
            warn!("closing {} reported {e}", self.path.display());
        }
        debug!("closed database at {}", self.path.display());
    }

    // ── Transactions ─────────────────────────────────────────────────────

    /// Begins a deferred transaction.
    pub fn begin_transaction(&self) -> DbResult<()> {
        self.begin_transaction_with(TransactionBehavior::Deferred)
    }

    /// Begins a transaction with the given locking behaviour.
    pub fn begin_transaction_with(&self, behavior: TransactionBehavior) -> DbResult<()> {
        let db = self.ensure_open()?;
        if self.in_transaction.get() {
            if !db.is_autocommit() {
                return Err(DbError::AlreadyInTransaction);
            }
            // The engine rolled back on its own (e.g. an `OR ROLLBACK`
            // conflict); the flag is stale.
            debug!("engine already left the transaction; clearing flag");
        }
        db.exec(behavior.as_sql()).map_err(DbError::Engine)?;
        self.in_transaction.set(true);
        Ok(())
    }

    /// Commits the open transaction. No-op when none is open.
    ///
    /// If the commit fails but the engine has ended the transaction anyway,
    /// the flag is cleared before the error is returned.
    pub fn commit_transaction(&self) -> DbResult<()> {
        if !self.in_transaction.get() {
            return Ok(());
        }
        let db = self.ensure_open()?;
        let result = db.exec("COMMIT").map_err(DbError::Engine);
        if result.is_ok() || db.is_autocommit() {
            self.in_transaction.set(false);
        }
        result
    }

    /// Rolls back the open transaction. No-op when none is open.
    pub fn rollback_transaction(&self) -> DbResult<()> {
        if !self.in_transaction.get() {
            return Ok(());
        }
        let db = self.ensure_open()?;
        if db.is_autocommit() {
            self.in_transaction.set(false);
            return Ok(());
        }
        let result = db.exec("ROLLBACK").map_err(DbError::Engine);
        if result.is_ok() || db.is_autocommit() {
            self.in_transaction.set(false);
        }
        result
    }

    /// Begins a deferred transaction that rolls back on drop unless
    /// committed.
    pub fn transaction(&self) -> DbResult<Transaction<'_>> {
        Transaction::begin(self, TransactionBehavior::Deferred)
    }

    /// Begins an immediate transaction (acquires a RESERVED lock right away).
    pub fn transaction_immediate(&self) -> DbResult<Transaction<'_>> {
        Transaction::begin(self, TransactionBehavior::Immediate)
    }

    // ── Statements ──────────────────────────────────────────────────────

    /// Compiles a single SQL statement.
    pub fn prepare(&self, sql: &str) -> DbResult<Statement<'_>> {
        let db = self.ensure_open()?;
        let raw = db.prepare(sql).map_err(|e| {
            debug!("prepare failed ({e}): {sql}");
            DbError::Compile(e)
        })?;
        Ok(Statement::new(raw, sql))
    }

    /// Executes one or more `;`-separated SQL statements.
    ///
    /// No result rows are returned. Suitable for DDL, PRAGMAs and scripts.
    pub fn execute_batch(&self, sql: &str) -> DbResult<()> {
        self.ensure_open()?.exec(sql).map_err(DbError::Engine)
    }

    /// Prepares, binds and runs a single statement, then finalizes it.
    ///
    /// Returns the number of rows changed.
    pub fn execute(&self, sql: &str, params: &[Value]) -> DbResult<usize> {
        self.prepare(sql)?.execute_and_dispose(params)
    }

    /// Runs a query and hands its cursor to `f`. The statement is finalized
    /// before returning, whether `f` succeeds or not.
    pub fn with_query<T>(
        &self,
        sql: &str,
        params: &[Value],
        f: impl FnOnce(&mut Cursor<'_, '_>) -> DbResult<T>,
    ) -> DbResult<T> {
        let mut stmt = self.prepare(sql)?;
        let mut cursor = stmt.query(params)?;
        let result = f(&mut cursor);
        cursor.close();
        result
    }

    /// Reads column 0 of the first row as an integer, or `None` when the
    /// query returns no rows.
    pub fn query_scalar_int(&self, sql: &str, params: &[Value]) -> DbResult<Option<i64>> {
        self.with_query(sql, params, |cursor| {
            if cursor.next()? {
                cursor.long_at(0).map(Some)
            } else {
                Ok(None)
            }
        })
    }

    /// Returns `true` if a table called `name` exists.
    pub fn table_exists(&self, name: &str) -> DbResult<bool> {
        let rowid = self.query_scalar_int(
            "SELECT rowid FROM sqlite_master WHERE type = 'table' AND name = ?;",
            crate::params![name],
        )?;
        Ok(rowid.is_some())
    }

    /// Maps exactly one result row. Errors if the query returns no rows.
    pub fn query_row<T>(
        &self,
        sql: &str,
        params: &[Value],
        mapper: impl FnOnce(&Cursor<'_, '_>) -> DbResult<T>,
    ) -> DbResult<T> {
        self.query_row_optional(sql, params, mapper)?.ok_or_else(|| {
            DbError::Engine(EngineStatus::new(ffi::SQLITE_DONE, "query returned no rows"))
        })
    }

    /// Like [`query_row`](Self::query_row) but returns `Ok(None)` when no row
    /// is returned.
    pub fn query_row_optional<T>(
        &self,
        sql: &str,
        params: &[Value],
        mapper: impl FnOnce(&Cursor<'_, '_>) -> DbResult<T>,
    ) -> DbResult<Option<T>> {
        self.with_query(sql, params, |cursor| {
            if cursor.next()? {
                mapper(cursor).map(Some)
            } else {
                Ok(None)
            }
        })
    }

    /// Maps every result row.
    pub fn query_map<T>(
        &self,
        sql: &str,
        params: &[Value],
        mut mapper: impl FnMut(&Cursor<'_, '_>) -> DbResult<T>,
    ) -> DbResult<Vec<T>> {
        self.with_query(sql, params, |cursor| {
            let mut rows = Vec::new();
            while cursor.next()? {
                rows.push(mapper(cursor)?);
            }
            Ok(rows)
        })
    }

    // ── Encryption ──────────────────────────────────────────────────────

    /// Supplies the key for an encrypted database (or encrypts a new, empty
    /// one) and checks that the schema can be read with it.
    ///
    /// An existing encrypted file has to be opened with
    /// [`OpenOptions::unverified`], since the open-time read would fail
    /// without the key.
    ///
    /// Failure is fatal for the connection: it is closed before the error is
    /// returned.
    pub fn set_key(&mut self, key: &DatabaseKey) -> DbResult<()> {
        let result = cipher::apply_key(self.ensure_open()?, key).map_err(DbError::Engine);
        if result.is_err() {
            self.close();
        }
        result
    }

    /// Re-encrypts the database under `new_key`, applying `old_key` first
    /// when given (on a connection opened unverified). Later opens need
    /// `new_key`.
    ///
    /// Failure is fatal for the connection: it is closed before the error is
    /// returned, and no partial re-encryption should be assumed.
    pub fn rekey(&mut self, old_key: Option<&DatabaseKey>, new_key: &DatabaseKey) -> DbResult<()> {
        let result =
            cipher::apply_rekey(self.ensure_open()?, old_key, new_key).map_err(DbError::Engine);
        if result.is_err() {
            self.close();
        }
        result
    }

    // ── Connection state ────────────────────────────────────────────────

    /// Returns the rowid of the most recent successful INSERT.
    pub fn last_insert_rowid(&self) -> DbResult<i64> {
        Ok(self.ensure_open()?.last_insert_rowid())
    }

    /// Returns the number of rows changed by the most recent INSERT, UPDATE
    /// or DELETE.
    pub fn changes(&self) -> DbResult<usize> {
        Ok(usize::try_from(self.ensure_open()?.changes()).unwrap_or(0))
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("path", &self.path)
            .field("open", &self.db.is_open())
            .field("in_transaction", &self.in_transaction.get())
            .finish()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}
