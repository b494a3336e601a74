//! Safe wrapper around a prepared statement.
//!
//! This file contains **no `unsafe` code**. All engine interaction goes
//! through [`ffi::RawStmt`].

use std::os::raw::c_int;

use log::{trace, warn};

use crate::cursor::Cursor;
use crate::error::{DbError, DbResult};
use crate::ffi::{self, RawStmt};
use crate::value::Value;

/// Result of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    /// A result row is available.
    Row,
    /// The statement has finished executing.
    Done,
}

/// A compiled SQL statement with positional (`?`) parameters.
///
/// Created via [`Connection::prepare`](crate::Connection::prepare) and tied
/// to the lifetime of that connection. A statement can be reset and rebound
/// any number of times without recompiling. Once finalized, every operation
/// except [`finalize`](Self::finalize) fails with
/// [`DbError::UseAfterFinalize`]. Finalized on drop.
pub struct Statement<'conn> {
    raw: RawStmt<'conn>,
    sql: String,
    parameter_count: usize,
    column_count: usize,
}

impl<'conn> Statement<'conn> {
    pub(crate) fn new(raw: RawStmt<'conn>, sql: &str) -> Self {
        let parameter_count = raw.parameter_count();
        let column_count = raw.column_count();
        Self {
            raw,
            sql: sql.to_string(),
            parameter_count,
            column_count,
        }
    }

    /// SQL text this statement was compiled from.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Number of `?` parameters, fixed at compile time.
    pub const fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    /// Number of result columns (0 for statements that return no rows).
    pub const fn column_count(&self) -> usize {
        self.column_count
    }

    /// Returns `true` once [`finalize`](Self::finalize) has run.
    pub fn is_finalized(&self) -> bool {
        self.raw.is_finalized()
    }

    fn ensure_live(&self) -> DbResult<()> {
        if self.raw.is_finalized() {
            Err(DbError::UseAfterFinalize)
        } else {
            Ok(())
        }
    }

    fn check_index(&self, index: usize) -> DbResult<c_int> {
        self.ensure_live()?;
        if index == 0 || index > self.parameter_count {
            return Err(DbError::BindIndex {
                index,
                count: self.parameter_count,
            });
        }
        c_int::try_from(index).map_err(|_| DbError::BindIndex {
            index,
            count: self.parameter_count,
        })
    }

    // ── Binding ─────────────────────────────────────────────────────────

    /// Binds `value` to the 1-based parameter `index`, picking the bind
    /// primitive from the value's storage class.
    pub fn bind(&mut self, index: usize, value: &Value) -> DbResult<()> {
        match value {
            Value::Null => self.bind_null(index),
            Value::Integer(v) => self.bind_i64(index, *v),
            Value::Real(v) => self.bind_f64(index, *v),
            Value::Text(v) => self.bind_text(index, v),
            Value::Blob(v) => self.bind_blob(index, v),
        }
    }

    /// Binds every parameter in order. `values` must hold exactly
    /// [`parameter_count`](Self::parameter_count) entries.
    pub fn bind_all(&mut self, values: &[Value]) -> DbResult<()> {
        self.ensure_live()?;
        if values.len() != self.parameter_count {
            return Err(DbError::ArityMismatch {
                expected: self.parameter_count,
                actual: values.len(),
            });
        }
        for (i, value) in values.iter().enumerate() {
            self.bind(i + 1, value)?;
        }
        Ok(())
    }

    /// Binds SQL NULL.
    pub fn bind_null(&mut self, index: usize) -> DbResult<()> {
        let idx = self.check_index(index)?;
        self.raw.bind_null(idx).map_err(DbError::Engine)
    }

    /// Binds a 64-bit integer.
    pub fn bind_i64(&mut self, index: usize, value: i64) -> DbResult<()> {
        let idx = self.check_index(index)?;
        self.raw.bind_i64(idx, value).map_err(DbError::Engine)
    }

    /// Binds a double.
    pub fn bind_f64(&mut self, index: usize, value: f64) -> DbResult<()> {
        let idx = self.check_index(index)?;
        self.raw.bind_f64(idx, value).map_err(DbError::Engine)
    }

    /// Binds UTF-8 text. The engine keeps its own copy.
    pub fn bind_text(&mut self, index: usize, value: &str) -> DbResult<()> {
        let idx = self.check_index(index)?;
        self.raw.bind_text(idx, value).map_err(DbError::Engine)
    }

    /// Binds a blob. The engine keeps its own copy.
    pub fn bind_blob(&mut self, index: usize, value: &[u8]) -> DbResult<()> {
        let idx = self.check_index(index)?;
        self.raw.bind_blob(idx, value).map_err(DbError::Engine)
    }

    // ── Execution ───────────────────────────────────────────────────────

    /// Rewinds the statement and clears all bindings so it can be rebound
    /// and run again without recompiling.
    pub fn reset(&mut self) -> DbResult<()> {
        self.ensure_live()?;
        self.raw.reset().map_err(DbError::Engine)
    }

    /// Executes a single step.
    ///
    /// A mutation performs its write and returns [`StepResult::Done`]; a
    /// query surfaces one row per [`StepResult::Row`].
    pub fn step(&mut self) -> DbResult<StepResult> {
        self.ensure_live()?;
        match self.raw.step().map_err(DbError::EngineStep)? {
            ffi::SQLITE_ROW => Ok(StepResult::Row),
            _ => Ok(StepResult::Done),
        }
    }

    /// Resets, binds `values`, and steps once. Returns the number of rows the
    /// step inserted, updated or deleted; 0 for DDL, PRAGMAs and queries.
    ///
    /// This is the prepare-once/bind-many primitive:
    ///
    /// ```ignore
    /// let mut stmt = conn.prepare("INSERT INTO users VALUES (?, ?, ?)")?;
    /// for uid in 0..100 {
    ///     stmt.execute(params![uid, format!("user{uid}"), uid])?;
    /// }
    /// ```
    pub fn execute(&mut self, values: &[Value]) -> DbResult<usize> {
        self.reset()?;
        self.bind_all(values)?;
        let before = self.raw.total_changes();
        if self.step()? == StepResult::Row || self.raw.total_changes() == before {
            // `sqlite3_changes` still holds the count of an earlier mutation.
            return Ok(0);
        }
        Ok(usize::try_from(self.raw.changes()).unwrap_or(0))
    }

    /// Resets, binds `values`, and returns a cursor over the result rows.
    pub fn query(&mut self, values: &[Value]) -> DbResult<Cursor<'_, 'conn>> {
        self.reset()?;
        self.bind_all(values)?;
        Ok(Cursor::new(self))
    }

    /// Binds `values`, steps once and finalizes, releasing the handle on every
    /// path. Returns the number of rows changed.
    pub fn execute_and_dispose(mut self, values: &[Value]) -> DbResult<usize> {
        let result = self.execute(values);
        self.finalize();
        result
    }

    /// Releases the statement handle. Idempotent; engine errors raised while
    /// releasing are logged and absorbed.
    pub fn finalize(&mut self) {
        if self.raw.is_finalized() {
            return;
        }
        trace!("finalizing statement: {}", self.sql);
        if let Err(e) = self.raw.finalize() {
            // `sqlite3_finalize` repeats the last step error, which the caller
            // has already seen.
            warn!("finalize reported {e} for: {}", self.sql);
        }
    }

    pub(crate) const fn raw(&self) -> &RawStmt<'conn> {
        &self.raw
    }
}

impl std::fmt::Debug for Statement<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.sql)
            .field("parameter_count", &self.parameter_count)
            .field("finalized", &self.raw.is_finalized())
            .finish()
    }
}
