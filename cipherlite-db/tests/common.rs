//! Common test utilities shared across integration tests.

use std::path::{Path, PathBuf};

use cipherlite_db::{params, Connection};
use tempfile::TempDir;

/// A database path inside a scratch directory removed on drop.
pub struct TestDb {
    /// Scratch directory, removed on drop.
    pub dir: TempDir,
    /// Database file path inside `dir`.
    pub path: PathBuf,
}

impl TestDb {
    /// Creates a scratch directory and a database path named `name` in it.
    pub fn new(name: &str) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join(name);
        Self { dir, path }
    }

    /// Returns the scratch directory.
    pub fn temp_dir(&self) -> &Path {
        self.dir.path()
    }
}

/// Creates and populates a `users` table with `rows` rows.
pub fn create_users(conn: &Connection, rows: i64) {
    conn.execute_batch("CREATE TABLE users (uid INTEGER PRIMARY KEY, name TEXT, status INTEGER);")
        .expect("create users");
    let tx = conn.transaction().expect("begin");
    {
        let mut stmt = tx
            .prepare("INSERT INTO users (uid, name, status) VALUES (?, ?, ?)")
            .expect("prepare insert");
        for uid in 0..rows {
            stmt.execute(params![uid, format!("user{uid}"), uid])
                .expect("insert user");
        }
    }
    tx.commit().expect("commit");
}

/// Looks up the name of user `uid`.
#[allow(dead_code, reason = "used in tests")]
pub fn user_name(conn: &Connection, uid: i64) -> Option<String> {
    conn.query_row_optional("SELECT name FROM users WHERE uid = ?", params![uid], |row| {
        row.string_at(0)
    })
    .expect("query user")
    .flatten()
}
