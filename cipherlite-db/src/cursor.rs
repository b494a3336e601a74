//! Forward-only cursor over the rows of a prepared statement.

use std::os::raw::c_int;

use crate::error::{DbError, DbResult};
use crate::statement::{Statement, StepResult};
use crate::value::{Value, ValueKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    BeforeFirst,
    OnRow,
    Exhausted,
    Closed,
}

/// A forward-only iterator over a statement's result rows.
///
/// Holds a mutable back-reference to its [`Statement`], so nothing else can
/// step, reset or rebind the statement while the cursor is alive. Once
/// [`next`](Self::next) has returned `false` the cursor stays exhausted;
/// reading rows again needs a fresh [`Statement::query`]. [`close`](Self::close)
/// finalizes the statement.
///
/// Column readers take 0-based indexes and perform no type checks of their
/// own: request the accessor matching the column's stored type, or the
/// engine's coercion rules apply.
pub struct Cursor<'stmt, 'conn> {
    stmt: &'stmt mut Statement<'conn>,
    state: CursorState,
}

impl<'stmt, 'conn> Cursor<'stmt, 'conn> {
    pub(crate) fn new(stmt: &'stmt mut Statement<'conn>) -> Self {
        Self {
            stmt,
            state: CursorState::BeforeFirst,
        }
    }

    /// Advances to the next row. Returns `false` once the rows are exhausted,
    /// and keeps returning `false` after that.
    #[allow(
        clippy::should_implement_trait,
        reason = "stepping is fallible; `Iterator::next` cannot report the error"
    )]
    pub fn next(&mut self) -> DbResult<bool> {
        match self.state {
            CursorState::Closed => return Err(DbError::UseAfterFinalize),
            CursorState::Exhausted => return Ok(false),
            CursorState::BeforeFirst | CursorState::OnRow => {}
        }
        match self.stmt.step() {
            Ok(StepResult::Row) => {
                self.state = CursorState::OnRow;
                Ok(true)
            }
            Ok(StepResult::Done) => {
                self.state = CursorState::Exhausted;
                Ok(false)
            }
            Err(e) => {
                self.state = CursorState::Exhausted;
                Err(e)
            }
        }
    }

    /// Finalizes the underlying statement. Idempotent.
    pub fn close(&mut self) {
        self.stmt.finalize();
        self.state = CursorState::Closed;
    }

    /// Returns `true` once [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.state == CursorState::Closed
    }

    /// Number of result columns.
    pub fn column_count(&self) -> usize {
        self.stmt.column_count()
    }

    /// Name of column `col` as reported by the engine.
    pub fn column_name(&self, col: usize) -> DbResult<String> {
        if self.state == CursorState::Closed {
            return Err(DbError::UseAfterFinalize);
        }
        let idx = self.column_index(col)?;
        Ok(self.stmt.raw().column_name(idx).unwrap_or_default())
    }

    fn column_index(&self, col: usize) -> DbResult<c_int> {
        let count = self.stmt.column_count();
        if col >= count {
            return Err(DbError::ColumnIndex { index: col, count });
        }
        c_int::try_from(col).map_err(|_| DbError::ColumnIndex { index: col, count })
    }

    /// Validates that a row is current and `col` is in range.
    fn row_column(&self, col: usize) -> DbResult<c_int> {
        match self.state {
            CursorState::OnRow => self.column_index(col),
            CursorState::BeforeFirst => Err(DbError::NoCurrentRow),
            CursorState::Exhausted | CursorState::Closed => Err(DbError::UseAfterFinalize),
        }
    }

    /// Storage class of column `col` in the current row.
    pub fn column_type(&self, col: usize) -> DbResult<ValueKind> {
        let idx = self.row_column(col)?;
        Ok(ValueKind::from_engine(self.stmt.raw().column_type(idx)))
    }

    /// Returns `true` if column `col` is SQL NULL.
    pub fn is_null(&self, col: usize) -> DbResult<bool> {
        Ok(self.column_type(col)? == ValueKind::Null)
    }

    /// Reads column `col` as a 32-bit integer (0 for NULL).
    #[allow(clippy::cast_possible_truncation)]
    pub fn int_at(&self, col: usize) -> DbResult<i32> {
        // Same truncation as `sqlite3_column_int`.
        Ok(self.long_at(col)? as i32)
    }

    /// Reads column `col` as a 64-bit integer (0 for NULL).
    pub fn long_at(&self, col: usize) -> DbResult<i64> {
        let idx = self.row_column(col)?;
        Ok(self.stmt.raw().column_i64(idx))
    }

    /// Reads column `col` as a double (0.0 for NULL).
    pub fn double_at(&self, col: usize) -> DbResult<f64> {
        let idx = self.row_column(col)?;
        Ok(self.stmt.raw().column_f64(idx))
    }

    /// Reads column `col` as text. `None` for NULL.
    pub fn string_at(&self, col: usize) -> DbResult<Option<String>> {
        let idx = self.row_column(col)?;
        Ok(self.stmt.raw().column_text(idx))
    }

    /// Reads column `col` as a blob. `None` for NULL.
    pub fn blob_at(&self, col: usize) -> DbResult<Option<Vec<u8>>> {
        let idx = self.row_column(col)?;
        Ok(self.stmt.raw().column_blob(idx))
    }

    /// Reads column `col` as a [`Value`] matching its stored type.
    pub fn value_at(&self, col: usize) -> DbResult<Value> {
        let value = match self.column_type(col)? {
            ValueKind::Null => Value::Null,
            ValueKind::Integer => Value::Integer(self.long_at(col)?),
            ValueKind::Real => Value::Real(self.double_at(col)?),
            ValueKind::Text => self.string_at(col)?.map_or(Value::Null, Value::Text),
            ValueKind::Blob => self.blob_at(col)?.map_or(Value::Null, Value::Blob),
        };
        Ok(value)
    }
}

impl std::fmt::Debug for Cursor<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("sql", &self.stmt.sql())
            .field("state", &self.state)
            .finish()
    }
}
