use test_case::test_case;

use crate::{params, ConflictMode, Connection, ContentValues, DbError, Select, StepResult, Value, ValueKind};

fn users_db() -> Connection {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    conn.execute_batch(
        "CREATE TABLE users (uid INTEGER PRIMARY KEY, name TEXT, status INTEGER, avatar BLOB);",
    )
    .expect("create table");
    conn
}

fn seeded_db() -> Connection {
    let conn = users_db();
    {
        let mut stmt = conn
            .prepare("INSERT INTO users (uid, name, status) VALUES (?, ?, ?)")
            .expect("prepare insert");
        for uid in 0..10 {
            stmt.execute(params![uid, format!("user{uid}"), uid]).expect("insert");
        }
    }
    conn
}

fn count(conn: &Connection, sql: &str) -> i64 {
    conn.query_scalar_int(sql, &[])
        .expect("count query")
        .expect("count row")
}

// ── Statements ──────────────────────────────────────────────────────────

#[test_case(params![1, "user1"] ; "too few")]
#[test_case(params![1, "user1", 1, 1] ; "too many")]
#[test_case(&[] ; "none")]
fn test_bind_arity_mismatch(args: &[Value]) {
    let conn = users_db();
    let mut stmt = conn
        .prepare("INSERT INTO users (uid, name, status) VALUES (?, ?, ?)")
        .expect("prepare");
    let err = stmt.bind_all(args).unwrap_err();
    assert!(
        matches!(err, DbError::ArityMismatch { expected: 3, actual } if actual == args.len()),
        "{err}"
    );
    let err = stmt.execute(args).unwrap_err();
    assert!(matches!(err, DbError::ArityMismatch { .. }));
}

#[test_case(0 ; "zero")]
#[test_case(4 ; "past last")]
fn test_bind_index_out_of_range(index: usize) {
    let conn = users_db();
    let mut stmt = conn
        .prepare("INSERT INTO users (uid, name, status) VALUES (?, ?, ?)")
        .expect("prepare");
    let err = stmt.bind_i64(index, 1).unwrap_err();
    assert!(matches!(err, DbError::BindIndex { count: 3, .. }), "{err}");
}

#[test]
fn test_statement_unusable_after_finalize() {
    let conn = users_db();
    let mut stmt = conn.prepare("SELECT uid FROM users WHERE uid = ?").expect("prepare");
    stmt.finalize();
    assert!(stmt.is_finalized());
    assert!(matches!(stmt.bind_i64(1, 1), Err(DbError::UseAfterFinalize)));
    assert!(matches!(stmt.bind_all(params![1]), Err(DbError::UseAfterFinalize)));
    assert!(matches!(stmt.step(), Err(DbError::UseAfterFinalize)));
    assert!(matches!(stmt.reset(), Err(DbError::UseAfterFinalize)));
    assert!(matches!(stmt.query(params![1]), Err(DbError::UseAfterFinalize)));
    // Second finalize is a no-op.
    stmt.finalize();
}

#[test]
fn test_prepare_reports_compile_errors() {
    let conn = users_db();
    assert!(matches!(conn.prepare("SELEC uid FROM users"), Err(DbError::Compile(_))));
    assert!(matches!(
        conn.prepare("SELECT nope FROM missing_table"),
        Err(DbError::Compile(_))
    ));
}

#[test]
fn test_statement_reusable_after_step_error() {
    let conn = seeded_db();
    let mut stmt = conn
        .prepare("INSERT INTO users (uid, name, status) VALUES (?, ?, ?)")
        .expect("prepare");
    let err = stmt.execute(params![3, "dup", 3]).unwrap_err();
    assert!(matches!(err, DbError::EngineStep(_)), "{err}");
    assert_eq!(stmt.execute(params![42, "user42", 42]).expect("insert after error"), 1);
    assert_eq!(count(&conn, "SELECT count(*) FROM users"), 11);
}

#[test]
fn test_mutation_step_reports_done() {
    let conn = users_db();
    let mut stmt = conn
        .prepare("INSERT INTO users (uid, name, status) VALUES (?, ?, ?)")
        .expect("prepare");
    stmt.bind_all(params![1, "user1", 1]).expect("bind");
    assert_eq!(stmt.step().expect("step"), StepResult::Done);
    assert_eq!(conn.changes().expect("changes"), 1);
    assert_eq!(conn.last_insert_rowid().expect("rowid"), 1);
}

#[test]
fn test_execute_counts_only_row_changes() {
    let conn = seeded_db();
    assert_eq!(conn.execute("DELETE FROM users WHERE uid < ?", params![7]).expect("delete"), 7);
    assert_eq!(
        conn.execute("CREATE TABLE sessions (id INTEGER PRIMARY KEY)", &[]).expect("create"),
        0
    );
    assert_eq!(conn.execute("SELECT uid FROM users", &[]).expect("select"), 0);
    assert_eq!(conn.execute("UPDATE users SET status = 0 WHERE uid > 100", &[]).expect("update"), 0);
    assert_eq!(conn.execute("UPDATE users SET status = 0", &[]).expect("update"), 3);
}

// ── Round trip ──────────────────────────────────────────────────────────

#[test]
fn test_insert_then_query_round_trip() {
    let conn = seeded_db();
    let mut stmt = conn
        .prepare("SELECT uid, name, status FROM users WHERE uid = ?")
        .expect("prepare");
    let mut cursor = stmt.query(params![7]).expect("query");
    assert!(cursor.next().expect("next"));
    assert_eq!(cursor.int_at(0).expect("uid"), 7);
    assert_eq!(cursor.string_at(1).expect("name").as_deref(), Some("user7"));
    assert_eq!(cursor.long_at(2).expect("status"), 7);
    assert!(!cursor.next().expect("next"));
}

#[test]
fn test_builder_insert_round_trip() {
    let conn = users_db();
    let values: ContentValues = [
        ("uid", Value::from(7)),
        ("name", Value::from("user7")),
        ("status", Value::from(7)),
    ]
    .into_iter()
    .collect();
    assert_eq!(conn.insert("users", None, &values).expect("insert"), Some(7));

    let select = Select::from("users").columns(["uid", "name", "status"]);
    conn.query(&select, |cursor| {
        assert!(cursor.next()?);
        assert_eq!(cursor.int_at(0)?, 7);
        assert_eq!(cursor.string_at(1)?.as_deref(), Some("user7"));
        assert_eq!(cursor.int_at(2)?, 7);
        Ok(())
    })
    .expect("read back");
}

#[test]
fn test_requery_same_statement() {
    let conn = seeded_db();
    let mut stmt = conn.prepare("SELECT name FROM users WHERE uid = ?").expect("prepare");
    for uid in [2, 5, 9] {
        let mut cursor = stmt.query(params![uid]).expect("query");
        assert!(cursor.next().expect("next"));
        assert_eq!(cursor.string_at(0).expect("name"), Some(format!("user{uid}")));
    }
}

#[test]
fn test_blob_and_null_columns() {
    let conn = users_db();
    conn.execute(
        "INSERT INTO users (uid, name, status, avatar) VALUES (?, ?, ?, ?)",
        params![1, None::<String>, None::<i64>, vec![0xDE_u8, 0xAD, 0xBE, 0xEF]],
    )
    .expect("insert");

    conn.with_query("SELECT name, status, avatar FROM users", &[], |cursor| {
        assert!(cursor.next()?);
        assert!(cursor.is_null(0)?);
        assert_eq!(cursor.string_at(0)?, None);
        assert_eq!(cursor.int_at(1)?, 0);
        assert_eq!(cursor.column_type(2)?, ValueKind::Blob);
        assert_eq!(cursor.blob_at(2)?, Some(vec![0xDE, 0xAD, 0xBE, 0xEF]));
        assert_eq!(cursor.value_at(1)?, Value::Null);
        Ok(())
    })
    .expect("read row");
}

#[test]
fn test_real_and_bool_values() {
    let conn = Connection::open_in_memory().expect("open");
    conn.execute_batch("CREATE TABLE t (flag INTEGER, ratio REAL);").expect("create");
    conn.execute("INSERT INTO t VALUES (?, ?)", params![true, 0.25]).expect("insert");
    let (flag, ratio) = conn
        .query_row("SELECT flag, ratio FROM t", &[], |row| {
            Ok((row.long_at(0)?, row.value_at(1)?))
        })
        .expect("row");
    assert_eq!(flag, 1);
    assert_eq!(ratio, Value::Real(0.25));
}

// ── Cursor ──────────────────────────────────────────────────────────────

#[test]
fn test_exhausted_cursor_stays_exhausted() {
    let conn = seeded_db();
    let mut stmt = conn.prepare("SELECT uid FROM users WHERE uid < ?").expect("prepare");
    let mut cursor = stmt.query(params![2]).expect("query");
    assert!(cursor.next().expect("row 0"));
    assert!(cursor.next().expect("row 1"));
    assert!(!cursor.next().expect("end"));
    assert!(!cursor.next().expect("still end"));
    assert!(!cursor.next().expect("still end"));
    assert!(matches!(cursor.int_at(0), Err(DbError::UseAfterFinalize)));
}

#[test]
fn test_cursor_column_checks() {
    let conn = seeded_db();
    let mut stmt = conn.prepare("SELECT uid, name, status FROM users").expect("prepare");
    let mut cursor = stmt.query(&[]).expect("query");
    assert_eq!(cursor.column_count(), 3);
    assert_eq!(cursor.column_name(1).expect("name"), "name");
    assert!(matches!(cursor.int_at(0), Err(DbError::NoCurrentRow)));

    assert!(cursor.next().expect("next"));
    let err = cursor.int_at(3).unwrap_err();
    assert!(matches!(err, DbError::ColumnIndex { index: 3, count: 3 }), "{err}");
}

#[test]
fn test_closed_cursor_rejects_next() {
    let conn = seeded_db();
    let mut stmt = conn.prepare("SELECT uid FROM users").expect("prepare");
    let mut cursor = stmt.query(&[]).expect("query");
    assert!(cursor.next().expect("next"));
    cursor.close();
    assert!(cursor.is_closed());
    assert!(matches!(cursor.next(), Err(DbError::UseAfterFinalize)));
    assert!(matches!(cursor.long_at(0), Err(DbError::UseAfterFinalize)));
    drop(cursor);
    assert!(stmt.is_finalized());
}

// ── Transactions ────────────────────────────────────────────────────────

#[test]
fn test_nested_begin_fails() {
    let conn = users_db();
    conn.begin_transaction().expect("begin");
    assert!(conn.in_transaction());
    assert!(matches!(conn.begin_transaction(), Err(DbError::AlreadyInTransaction)));
    assert!(matches!(conn.transaction(), Err(DbError::AlreadyInTransaction)));
    conn.commit_transaction().expect("commit");
    assert!(!conn.in_transaction());
    conn.begin_transaction().expect("begin again");
    conn.commit_transaction().expect("commit");
}

#[test]
fn test_commit_without_transaction_is_noop() {
    let conn = users_db();
    conn.commit_transaction().expect("commit");
    conn.rollback_transaction().expect("rollback");
}

#[test]
fn test_rollback_discards_changes() {
    let conn = seeded_db();
    conn.begin_transaction().expect("begin");
    conn.execute("DELETE FROM users", &[]).expect("delete");
    conn.rollback_transaction().expect("rollback");
    assert!(!conn.in_transaction());
    assert_eq!(count(&conn, "SELECT count(*) FROM users"), 10);
}

#[test]
fn test_transaction_guard_rolls_back_on_drop() {
    let conn = seeded_db();
    {
        let tx = conn.transaction().expect("begin");
        tx.execute("DELETE FROM users WHERE uid < 5", &[]).expect("delete");
    }
    assert!(!conn.in_transaction());
    assert_eq!(count(&conn, "SELECT count(*) FROM users"), 10);

    let tx = conn.transaction_immediate().expect("begin");
    tx.execute("DELETE FROM users WHERE uid < 5", &[]).expect("delete");
    tx.commit().expect("commit");
    assert_eq!(count(&conn, "SELECT count(*) FROM users"), 5);
}

#[test]
fn test_engine_initiated_rollback_clears_flag() {
    let conn = seeded_db();
    conn.begin_transaction().expect("begin");
    let values: ContentValues = [("uid", Value::from(3)), ("name", Value::from("dup"))]
        .into_iter()
        .collect();
    let err = conn
        .insert_with_on_conflict("users", None, &values, ConflictMode::Rollback)
        .unwrap_err();
    assert!(matches!(err, DbError::EngineStep(_)), "{err}");
    // The conflict ended the transaction inside the engine.
    conn.begin_transaction().expect("begin after engine rollback");
    conn.commit_transaction().expect("commit");
}

// ── Connection lifecycle ────────────────────────────────────────────────

#[test]
fn test_closed_connection_rejects_work() {
    let mut conn = users_db();
    conn.close();
    assert!(!conn.is_open());
    assert!(matches!(conn.prepare("SELECT 1"), Err(DbError::ClosedConnection)));
    assert!(matches!(conn.begin_transaction(), Err(DbError::ClosedConnection)));
    assert!(matches!(conn.execute_batch("SELECT 1"), Err(DbError::ClosedConnection)));
    assert!(matches!(conn.changes(), Err(DbError::ClosedConnection)));
    assert!(matches!(conn.last_insert_rowid(), Err(DbError::ClosedConnection)));
    // Idempotent.
    conn.close();
}

#[test]
fn test_close_commits_open_transaction() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("app.db");
    {
        let mut conn = Connection::open(&path, dir.path()).expect("open");
        conn.execute_batch("CREATE TABLE notes (body TEXT);").expect("create");
        conn.begin_transaction().expect("begin");
        conn.execute("INSERT INTO notes VALUES (?)", params!["kept"]).expect("insert");
        conn.close();
        assert!(!conn.in_transaction());
    }
    let conn = Connection::open(&path, dir.path()).expect("reopen");
    assert_eq!(count(&conn, "SELECT count(*) FROM notes"), 1);
}

#[test]
fn test_open_reports_engine_open_for_garbage_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("garbage.db");
    std::fs::write(&path, vec![0x5A_u8; 4096]).expect("write garbage");
    let err = Connection::open(&path, dir.path()).unwrap_err();
    assert!(matches!(err, DbError::EngineOpen(_)), "{err}");
}

#[test]
fn test_table_exists() {
    let conn = users_db();
    assert!(conn.table_exists("users").expect("lookup"));
    assert!(!conn.table_exists("sessions").expect("lookup"));
}

#[test]
fn test_query_row_without_rows() {
    let conn = users_db();
    assert!(conn.query_row("SELECT uid FROM users", &[], |row| row.long_at(0)).is_err());
    let none = conn
        .query_row_optional("SELECT uid FROM users", &[], |row| row.long_at(0))
        .expect("query");
    assert_eq!(none, None);
    assert_eq!(conn.query_scalar_int("SELECT uid FROM users", &[]).expect("query"), None);
}

// ── Builder-backed helpers ──────────────────────────────────────────────

#[test]
fn test_update_matching_rows() {
    let conn = seeded_db();
    let mut values = ContentValues::new();
    values.put("status", 1);
    let changed = conn
        .update("users", &values, Some("uid<?"), params!["5"])
        .expect("update");
    assert_eq!(changed, 5);
    assert_eq!(count(&conn, "SELECT count(*) FROM users WHERE uid < 5 AND status = 1"), 5);
    assert_eq!(count(&conn, "SELECT count(*) FROM users WHERE uid >= 5 AND status = uid"), 5);
}

#[test]
fn test_update_without_values_fails() {
    let conn = seeded_db();
    let err = conn.update("users", &ContentValues::new(), None, &[]).unwrap_err();
    assert!(matches!(err, DbError::EmptyValues));
}

#[test]
fn test_empty_insert_uses_null_column_hack() {
    let conn = users_db();
    let rowid = conn
        .insert("users", Some("name"), &ContentValues::new())
        .expect("insert")
        .expect("row written");
    assert_eq!(count(&conn, "SELECT count(*) FROM users WHERE name IS NULL"), 1);
    assert_eq!(
        conn.query_scalar_int("SELECT uid FROM users", &[]).expect("query"),
        Some(rowid)
    );
}

#[test]
fn test_insert_ignored_conflict_returns_none() {
    let conn = seeded_db();
    let values: ContentValues = [("uid", Value::from(4)), ("name", Value::from("dup"))]
        .into_iter()
        .collect();
    let rowid = conn
        .insert_with_on_conflict("users", None, &values, ConflictMode::Ignore)
        .expect("insert");
    assert_eq!(rowid, None);

    let rowid = conn
        .insert_with_on_conflict("users", None, &values, ConflictMode::Replace)
        .expect("insert");
    assert_eq!(rowid, Some(4));
    let name = conn
        .query_row("SELECT name FROM users WHERE uid = 4", &[], |row| row.string_at(0))
        .expect("row");
    assert_eq!(name.as_deref(), Some("dup"));
}

#[test]
fn test_delete_rows() {
    let conn = seeded_db();
    assert_eq!(conn.delete("users", Some("status >= ?"), params![8]).expect("delete"), 2);
    assert_eq!(conn.delete("users", None, &[]).expect("delete all"), 8);
}

#[test]
fn test_select_query() {
    let conn = seeded_db();
    let select = Select::from("users")
        .columns(["uid", "name"])
        .filter("status BETWEEN ? AND ?", params![3, 6])
        .order_by("uid DESC")
        .limit(2);
    let names = conn
        .query_map_select(&select, |row| Ok(row.string_at(1)?.unwrap_or_default()))
        .expect("query");
    assert_eq!(names, ["user6", "user5"]);

    let first = conn
        .query(&select, |cursor| {
            if cursor.next()? {
                cursor.long_at(0).map(Some)
            } else {
                Ok(None)
            }
        })
        .expect("query");
    assert_eq!(first, Some(6));
}
