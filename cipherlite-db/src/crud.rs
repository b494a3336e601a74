//! Table-level convenience operations on [`Connection`], built on
//! [`crate::builder`].

use log::debug;

use crate::builder::{self, ConflictMode, ContentValues, Select, SqlCommand};
use crate::connection::Connection;
use crate::cursor::Cursor;
use crate::error::DbResult;
use crate::value::Value;

impl Connection {
    fn run_command(&self, cmd: &SqlCommand) -> DbResult<usize> {
        debug!("running {}", cmd.sql);
        self.execute(&cmd.sql, &cmd.args)
    }

    /// Inserts one row into `table`.
    ///
    /// `null_column_hack` names a nullable column to write NULL into when
    /// `values` is empty; see [`builder::build_insert`]. Returns the new row's
    /// rowid, or `None` if no row was written (e.g. the insert was ignored by
    /// a conflict clause).
    pub fn insert(
        &self,
        table: &str,
        null_column_hack: Option<&str>,
        values: &ContentValues,
    ) -> DbResult<Option<i64>> {
        self.insert_with_on_conflict(table, null_column_hack, values, ConflictMode::None)
    }

    /// [`insert`](Self::insert) with an explicit conflict resolution.
    pub fn insert_with_on_conflict(
        &self,
        table: &str,
        null_column_hack: Option<&str>,
        values: &ContentValues,
        conflict: ConflictMode,
    ) -> DbResult<Option<i64>> {
        let cmd = builder::build_insert(table, null_column_hack, values, conflict)?;
        if self.run_command(&cmd)? == 0 {
            return Ok(None);
        }
        self.last_insert_rowid().map(Some)
    }

    /// Updates the rows of `table` matching `where_clause` (every row when
    /// `None`). Returns the number of rows changed.
    pub fn update(
        &self,
        table: &str,
        values: &ContentValues,
        where_clause: Option<&str>,
        where_args: &[Value],
    ) -> DbResult<usize> {
        self.update_with_on_conflict(table, values, where_clause, where_args, ConflictMode::None)
    }

    /// [`update`](Self::update) with an explicit conflict resolution.
    pub fn update_with_on_conflict(
        &self,
        table: &str,
        values: &ContentValues,
        where_clause: Option<&str>,
        where_args: &[Value],
        conflict: ConflictMode,
    ) -> DbResult<usize> {
        let cmd = builder::build_update(table, values, where_clause, where_args, conflict)?;
        self.run_command(&cmd)
    }

    /// Deletes the rows of `table` matching `where_clause` (every row when
    /// `None`). Returns the number of rows deleted.
    pub fn delete(&self, table: &str, where_clause: Option<&str>, where_args: &[Value]) -> DbResult<usize> {
        let cmd = builder::build_delete(table, where_clause, where_args)?;
        self.run_command(&cmd)
    }

    /// Runs `select` and hands its cursor to `f`; see
    /// [`with_query`](Self::with_query).
    pub fn query<T>(
        &self,
        select: &Select,
        f: impl FnOnce(&mut Cursor<'_, '_>) -> DbResult<T>,
    ) -> DbResult<T> {
        let cmd = select.build()?;
        self.with_query(&cmd.sql, &cmd.args, f)
    }

    /// Runs `select` and maps every row.
    pub fn query_map_select<T>(
        &self,
        select: &Select,
        mapper: impl FnMut(&Cursor<'_, '_>) -> DbResult<T>,
    ) -> DbResult<Vec<T>> {
        let cmd = select.build()?;
        self.query_map(&cmd.sql, &cmd.args, mapper)
    }
}
