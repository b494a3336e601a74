//! SQL text and argument assembly for inserts, updates, deletes and selects.
//!
//! Nothing here touches the engine. Each builder returns a [`SqlCommand`]
//! whose `args` line up one-to-one with the `?` placeholders in its `sql`;
//! [`Connection`](crate::Connection)'s CRUD helpers run them.

use crate::error::{DbError, DbResult};
use crate::value::{Value, ValueKind};

/// Conflict resolution applied when an insert or update violates a
/// constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictMode {
    /// No clause; the engine's default (`ABORT`) applies.
    #[default]
    None,
    /// Abort the statement and roll back the enclosing transaction.
    Rollback,
    /// Abort the statement, undoing its own changes; earlier statements in
    /// the transaction are kept.
    Abort,
    /// Abort the statement, keeping the changes it made before the conflict.
    Fail,
    /// Skip the conflicting row and carry on.
    Ignore,
    /// Delete the rows that conflict, then write the new one.
    Replace,
}

impl ConflictMode {
    /// The ` OR <mode>` clause, or an empty string for [`ConflictMode::None`].
    pub const fn clause(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Rollback => " OR ROLLBACK",
            Self::Abort => " OR ABORT",
            Self::Fail => " OR FAIL",
            Self::Ignore => " OR IGNORE",
            Self::Replace => " OR REPLACE",
        }
    }
}

/// Column-to-value mapping for inserts and updates.
///
/// Column names are unique; putting an existing column replaces its value in
/// place. Iteration follows first-insertion order, which is the column order
/// of the generated SQL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentValues {
    entries: Vec<(String, Value)>,
}

impl ContentValues {
    /// Creates an empty mapping.
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Sets `column` to `value`.
    pub fn put(&mut self, column: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let column = column.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(name, _)| *name == column) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((column, value)),
        }
        self
    }

    /// Sets `column` to SQL NULL.
    pub fn put_null(&mut self, column: impl Into<String>) -> &mut Self {
        self.put(column, Value::Null)
    }

    /// Value stored for `column`.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Storage class the value for `column` will bind as.
    pub fn kind_of(&self, column: &str) -> Option<ValueKind> {
        self.get(column).map(Value::kind)
    }

    /// Removes `column`, returning its value.
    pub fn remove(&mut self, column: &str) -> Option<Value> {
        let pos = self.entries.iter().position(|(name, _)| name == column)?;
        Some(self.entries.remove(pos).1)
    }

    /// Returns `true` if `column` has a value.
    pub fn contains_key(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no columns are set.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates `(column, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for ContentValues {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut values = Self::new();
        for (column, value) in iter {
            values.put(column, value);
        }
        values
    }
}

/// SQL text plus its positional arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlCommand {
    /// Statement text with `?` placeholders.
    pub sql: String,
    /// One argument per placeholder, in placeholder order.
    pub args: Vec<Value>,
}

fn non_empty(clause: Option<&str>) -> Option<&str> {
    clause.map(str::trim).filter(|c| !c.is_empty())
}

fn check_table(table: &str) -> DbResult<()> {
    if table.trim().is_empty() {
        return Err(DbError::InvalidQuery("table name is empty".to_string()));
    }
    Ok(())
}

/// Builds `INSERT [OR <mode>] INTO table (cols) VALUES (?, ...)`.
///
/// SQL cannot insert a row without naming a column, so when `values` is
/// empty the row is written as `(null_column_hack) VALUES (NULL)` and every
/// other column takes its default. Without a hack column an empty `values`
/// fails with [`DbError::EmptyValues`].
pub fn build_insert(
    table: &str,
    null_column_hack: Option<&str>,
    values: &ContentValues,
    conflict: ConflictMode,
) -> DbResult<SqlCommand> {
    check_table(table)?;
    let mut sql = format!("INSERT{} INTO {table} (", conflict.clause());

    if values.is_empty() {
        let column = non_empty(null_column_hack).ok_or(DbError::EmptyValues)?;
        sql.push_str(column);
        sql.push_str(") VALUES (NULL)");
        return Ok(SqlCommand {
            sql,
            args: Vec::new(),
        });
    }

    let columns: Vec<&str> = values.iter().map(|(name, _)| name).collect();
    sql.push_str(&columns.join(", "));
    sql.push_str(") VALUES (");
    sql.push_str(&vec!["?"; values.len()].join(", "));
    sql.push(')');

    Ok(SqlCommand {
        sql,
        args: values.iter().map(|(_, value)| value.clone()).collect(),
    })
}

/// Builds `UPDATE [OR <mode>] table SET col = ?, ... [WHERE ...]`.
///
/// The arguments are the `values` in column order followed by `where_args`,
/// matching the placeholder order in the generated text.
pub fn build_update(
    table: &str,
    values: &ContentValues,
    where_clause: Option<&str>,
    where_args: &[Value],
    conflict: ConflictMode,
) -> DbResult<SqlCommand> {
    check_table(table)?;
    if values.is_empty() {
        return Err(DbError::EmptyValues);
    }

    let assignments: Vec<String> = values.iter().map(|(name, _)| format!("{name} = ?")).collect();
    let mut sql = format!("UPDATE{} {table} SET {}", conflict.clause(), assignments.join(", "));
    if let Some(clause) = non_empty(where_clause) {
        sql.push_str(" WHERE ");
        sql.push_str(clause);
    }

    let mut args: Vec<Value> = values.iter().map(|(_, value)| value.clone()).collect();
    args.extend_from_slice(where_args);
    Ok(SqlCommand { sql, args })
}

/// Builds `DELETE FROM table [WHERE ...]`. With no where clause every row is
/// deleted.
pub fn build_delete(table: &str, where_clause: Option<&str>, where_args: &[Value]) -> DbResult<SqlCommand> {
    check_table(table)?;
    let mut sql = format!("DELETE FROM {table}");
    if let Some(clause) = non_empty(where_clause) {
        sql.push_str(" WHERE ");
        sql.push_str(clause);
    }
    Ok(SqlCommand {
        sql,
        args: where_args.to_vec(),
    })
}

/// A `SELECT` over one table. Absent or empty clauses are left out of the
/// generated text.
///
/// ```ignore
/// let select = Select::from("users")
///     .columns(["uid", "name"])
///     .filter("status = ?", params![1])
///     .order_by("uid DESC")
///     .limit(10);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Select {
    table: String,
    distinct: bool,
    columns: Vec<String>,
    selection: Option<String>,
    selection_args: Vec<Value>,
    group_by: Option<String>,
    having: Option<String>,
    order_by: Option<String>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl Select {
    /// Selects every column of `table`.
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// Adds `DISTINCT`.
    #[must_use]
    pub const fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Restricts the result to `columns` (all columns when empty).
    #[must_use]
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the `WHERE` clause and the arguments for its placeholders.
    #[must_use]
    pub fn filter(mut self, selection: impl Into<String>, args: &[Value]) -> Self {
        self.selection = Some(selection.into());
        self.selection_args = args.to_vec();
        self
    }

    /// Sets `GROUP BY`.
    #[must_use]
    pub fn group_by(mut self, group_by: impl Into<String>) -> Self {
        self.group_by = Some(group_by.into());
        self
    }

    /// Sets `HAVING`. Only valid together with [`group_by`](Self::group_by).
    #[must_use]
    pub fn having(mut self, having: impl Into<String>) -> Self {
        self.having = Some(having.into());
        self
    }

    /// Sets `ORDER BY`.
    #[must_use]
    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    /// Sets `LIMIT`.
    #[must_use]
    pub const fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets `OFFSET`. Rendered only together with a limit, as the engine
    /// requires; without one it becomes `LIMIT -1 OFFSET n`.
    #[must_use]
    pub const fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Renders the statement.
    ///
    /// Fails with [`DbError::InvalidQuery`] for an empty table name or a
    /// `HAVING` clause without `GROUP BY`.
    pub fn build(&self) -> DbResult<SqlCommand> {
        check_table(&self.table)?;
        let group_by = non_empty(self.group_by.as_deref());
        let having = non_empty(self.having.as_deref());
        if having.is_some() && group_by.is_none() {
            return Err(DbError::InvalidQuery(
                "HAVING clauses are only permitted when using a GROUP BY clause".to_string(),
            ));
        }

        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        if self.columns.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&self.columns.join(", "));
        }
        sql.push_str(" FROM ");
        sql.push_str(&self.table);

        let clauses = [
            (" WHERE ", non_empty(self.selection.as_deref())),
            (" GROUP BY ", group_by),
            (" HAVING ", having),
            (" ORDER BY ", non_empty(self.order_by.as_deref())),
        ];
        for (keyword, clause) in clauses {
            if let Some(clause) = clause {
                sql.push_str(keyword);
                sql.push_str(clause);
            }
        }

        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }

        Ok(SqlCommand {
            sql,
            args: self.selection_args.clone(),
        })
    }
}
