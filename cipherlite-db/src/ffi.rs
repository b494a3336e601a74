//! Engine call boundary.
//!
//! The symbols come from the sqlite3mc static library compiled by `build.rs`.
//! This is the **only** module that contains `unsafe` code or C types. The
//! rest of the crate talks to the engine through [`RawDb`] and [`RawStmt`],
//! owned handles that null their pointer on release so a second release is a
//! no-op and any later call reports `SQLITE_MISUSE` instead of touching freed
//! memory.
//!
//! All pointer types use `*mut c_void` so the engine's opaque structs never
//! leak past this file.

#![allow(non_camel_case_types, non_upper_case_globals, dead_code)]

use std::ffi::{CStr, CString};
use std::marker::PhantomData;
use std::os::raw::{c_char, c_int, c_void};
use std::sync::Mutex;

use zeroize::Zeroizing;

use crate::error::EngineStatus;

// ── SQLite constants ────────────────────────────────────────────────────

pub const SQLITE_OK: c_int = 0;
pub const SQLITE_ERROR: c_int = 1;
pub const SQLITE_BUSY: c_int = 5;
pub const SQLITE_NOMEM: c_int = 7;
pub const SQLITE_CONSTRAINT: c_int = 19;
pub const SQLITE_MISUSE: c_int = 21;
pub const SQLITE_RANGE: c_int = 25;
pub const SQLITE_NOTADB: c_int = 26;
pub const SQLITE_ROW: c_int = 100;
pub const SQLITE_DONE: c_int = 101;

// Column type constants
pub const SQLITE_INTEGER: c_int = 1;
pub const SQLITE_FLOAT: c_int = 2;
pub const SQLITE_TEXT: c_int = 3;
pub const SQLITE_BLOB: c_int = 4;
pub const SQLITE_NULL: c_int = 5;

// Open flags
pub const SQLITE_OPEN_READONLY: c_int = 0x0000_0001;
pub const SQLITE_OPEN_READWRITE: c_int = 0x0000_0002;
pub const SQLITE_OPEN_CREATE: c_int = 0x0000_0004;
pub const SQLITE_OPEN_FULLMUTEX: c_int = 0x0001_0000;

// Destructor sentinel: the engine copies bound text/blob data.
pub const SQLITE_TRANSIENT: isize = -1;

type sqlite3 = c_void;
type sqlite3_stmt = c_void;

extern "C" {
    // Global scratch directory for temp files. Must hold memory obtained
    // from `sqlite3_malloc64`.
    static mut sqlite3_temp_directory: *mut c_char;

    fn sqlite3_malloc64(n: u64) -> *mut c_void;
    fn sqlite3_free(ptr: *mut c_void);

    // Connection lifecycle
    fn sqlite3_open_v2(
        filename: *const c_char,
        pp_db: *mut *mut sqlite3,
        flags: c_int,
        z_vfs: *const c_char,
    ) -> c_int;
    fn sqlite3_close_v2(db: *mut sqlite3) -> c_int;

    fn sqlite3_exec(
        db: *mut sqlite3,
        sql: *const c_char,
        callback: *const c_void,
        arg: *mut c_void,
        errmsg: *mut *mut c_char,
    ) -> c_int;

    // Encryption (sqlite3mc)
    fn sqlite3_key(db: *mut sqlite3, key: *const c_void, n_key: c_int) -> c_int;
    fn sqlite3_rekey(db: *mut sqlite3, key: *const c_void, n_key: c_int) -> c_int;

    // Prepared statements
    fn sqlite3_prepare_v2(
        db: *mut sqlite3,
        z_sql: *const c_char,
        n_byte: c_int,
        pp_stmt: *mut *mut sqlite3_stmt,
        pz_tail: *mut *const c_char,
    ) -> c_int;
    fn sqlite3_step(stmt: *mut sqlite3_stmt) -> c_int;
    fn sqlite3_reset(stmt: *mut sqlite3_stmt) -> c_int;
    fn sqlite3_clear_bindings(stmt: *mut sqlite3_stmt) -> c_int;
    fn sqlite3_finalize(stmt: *mut sqlite3_stmt) -> c_int;

    // Parameter binding
    fn sqlite3_bind_null(stmt: *mut sqlite3_stmt, index: c_int) -> c_int;
    fn sqlite3_bind_int64(stmt: *mut sqlite3_stmt, index: c_int, value: i64) -> c_int;
    fn sqlite3_bind_double(stmt: *mut sqlite3_stmt, index: c_int, value: f64) -> c_int;
    fn sqlite3_bind_text(
        stmt: *mut sqlite3_stmt,
        index: c_int,
        value: *const c_char,
        n: c_int,
        destructor: isize,
    ) -> c_int;
    fn sqlite3_bind_blob(
        stmt: *mut sqlite3_stmt,
        index: c_int,
        value: *const c_void,
        n: c_int,
        destructor: isize,
    ) -> c_int;
    fn sqlite3_bind_parameter_count(stmt: *mut sqlite3_stmt) -> c_int;

    // Column reading
    fn sqlite3_column_count(stmt: *mut sqlite3_stmt) -> c_int;
    fn sqlite3_column_type(stmt: *mut sqlite3_stmt, i_col: c_int) -> c_int;
    fn sqlite3_column_int64(stmt: *mut sqlite3_stmt, i_col: c_int) -> i64;
    fn sqlite3_column_double(stmt: *mut sqlite3_stmt, i_col: c_int) -> f64;
    fn sqlite3_column_text(stmt: *mut sqlite3_stmt, i_col: c_int) -> *const u8;
    fn sqlite3_column_blob(stmt: *mut sqlite3_stmt, i_col: c_int) -> *const c_void;
    fn sqlite3_column_bytes(stmt: *mut sqlite3_stmt, i_col: c_int) -> c_int;
    fn sqlite3_column_name(stmt: *mut sqlite3_stmt, i_col: c_int) -> *const c_char;

    // Error reporting and connection state
    fn sqlite3_errmsg(db: *mut sqlite3) -> *const c_char;
    fn sqlite3_changes(db: *mut sqlite3) -> c_int;
    fn sqlite3_total_changes(db: *mut sqlite3) -> c_int;
    fn sqlite3_last_insert_rowid(db: *mut sqlite3) -> i64;
    fn sqlite3_get_autocommit(db: *mut sqlite3) -> c_int;
}

/// Serialises writes to `sqlite3_temp_directory`, which is process-global.
static TEMP_DIRECTORY_LOCK: Mutex<()> = Mutex::new(());

/// Points the engine's scratch directory at `dir`.
///
/// The setting is process-wide; the last caller wins.
pub fn set_temp_directory(dir: &str) -> Result<(), EngineStatus> {
    let c_dir = to_cstring(dir)?;
    let bytes = c_dir.as_bytes_with_nul();

    let _guard = TEMP_DIRECTORY_LOCK
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);

    // SAFETY: the buffer is allocated by the engine's allocator, sized for the
    // string plus NUL, and fully initialised before being published. The
    // previous value (if any) was allocated the same way and is no longer
    // referenced once replaced. Access is serialised by the lock above.
    unsafe {
        let buf = sqlite3_malloc64(bytes.len() as u64).cast::<u8>();
        if buf.is_null() {
            return Err(EngineStatus::new(SQLITE_NOMEM, "out of memory"));
        }
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), buf, bytes.len());
        let previous = sqlite3_temp_directory;
        sqlite3_temp_directory = buf.cast::<c_char>();
        if !previous.is_null() {
            sqlite3_free(previous.cast());
        }
    }
    Ok(())
}

fn to_cstring(s: &str) -> Result<CString, EngineStatus> {
    CString::new(s).map_err(|e| EngineStatus::new(SQLITE_MISUSE, format!("interior NUL byte: {e}")))
}

fn len_as_c_int(len: usize) -> Result<c_int, EngineStatus> {
    c_int::try_from(len).map_err(|_| EngineStatus::new(SQLITE_RANGE, "value too large to bind"))
}

fn released() -> EngineStatus {
    EngineStatus::new(SQLITE_MISUSE, "handle already released")
}

/// Reads the engine's last error message for `db`.
fn errmsg(db: *mut sqlite3) -> String {
    if db.is_null() {
        return "unknown error".to_string();
    }
    // SAFETY: `db` is a live connection handle; the returned string is owned
    // by the engine and copied before any further call.
    unsafe {
        let ptr = sqlite3_errmsg(db);
        if ptr.is_null() {
            "unknown error".to_string()
        } else {
            CStr::from_ptr(ptr).to_string_lossy().into_owned()
        }
    }
}

// ── Connection handle ───────────────────────────────────────────────────

/// Owned `sqlite3*` handle. Null once closed.
pub struct RawDb {
    db: *mut sqlite3,
}

// SAFETY: the handle is owned by exactly one `RawDb`; the engine is built with
// `SQLITE_THREADSAFE=1`, so moving it between threads is sound. `RawDb` is not
// `Sync`, so it is never used from two threads at once.
unsafe impl Send for RawDb {}

impl RawDb {
    /// Opens (or creates) the database at `path` with the given flags.
    pub fn open(path: &str, flags: c_int) -> Result<Self, EngineStatus> {
        let c_path = to_cstring(path)?;
        let mut db: *mut sqlite3 = std::ptr::null_mut();
        // SAFETY: `c_path` is a valid NUL-terminated string and `db` is a
        // valid out-pointer.
        let rc = unsafe { sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, std::ptr::null()) };
        if rc != SQLITE_OK {
            let message = if db.is_null() {
                format!("sqlite3_open_v2 returned {rc}")
            } else {
                let m = errmsg(db);
                // SAFETY: the engine hands back a handle even on failure; it
                // must still be released.
                unsafe {
                    sqlite3_close_v2(db);
                }
                m
            };
            return Err(EngineStatus::new(rc, message));
        }
        Ok(Self { db })
    }

    pub fn is_open(&self) -> bool {
        !self.db.is_null()
    }

    /// Releases the handle. A second call is a no-op.
    ///
    /// The pointer is cleared even when the engine reports an error, so the
    /// handle can never be released twice.
    pub fn close(&mut self) -> Result<(), EngineStatus> {
        if self.db.is_null() {
            return Ok(());
        }
        let db = std::mem::replace(&mut self.db, std::ptr::null_mut());
        // SAFETY: `db` was live and is no longer reachable through `self`.
        let rc = unsafe { sqlite3_close_v2(db) };
        if rc == SQLITE_OK {
            Ok(())
        } else {
            Err(EngineStatus::new(rc, "sqlite3_close_v2 failed"))
        }
    }

    fn live(&self) -> Result<*mut sqlite3, EngineStatus> {
        if self.db.is_null() {
            Err(released())
        } else {
            Ok(self.db)
        }
    }

    fn status(&self, rc: c_int) -> EngineStatus {
        EngineStatus::new(rc, errmsg(self.db))
    }

    /// Runs one or more `;`-separated statements, discarding result rows.
    pub fn exec(&self, sql: &str) -> Result<(), EngineStatus> {
        let c_sql = to_cstring(sql)?;
        self.exec_cstr(&c_sql)
    }

    /// Like [`exec`](Self::exec) but wipes the internal C string copy once
    /// the engine returns. For SQL carrying key material.
    pub fn exec_zeroized(&self, sql: &str) -> Result<(), EngineStatus> {
        let c_sql = to_cstring(sql)?;
        let result = self.exec_cstr(&c_sql);
        drop(Zeroizing::new(c_sql.into_bytes_with_nul()));
        result
    }

    fn exec_cstr(&self, c_sql: &CStr) -> Result<(), EngineStatus> {
        let db = self.live()?;
        let mut err: *mut c_char = std::ptr::null_mut();
        // SAFETY: `db` is live, `c_sql` is NUL-terminated, no callback is
        // installed and `err` is a valid out-pointer.
        let rc = unsafe {
            sqlite3_exec(db, c_sql.as_ptr(), std::ptr::null(), std::ptr::null_mut(), &mut err)
        };
        if rc == SQLITE_OK {
            return Ok(());
        }
        let message = if err.is_null() {
            errmsg(db)
        } else {
            // SAFETY: `err` was allocated by the engine and must be freed
            // with `sqlite3_free` after copying.
            unsafe {
                let m = CStr::from_ptr(err).to_string_lossy().into_owned();
                sqlite3_free(err.cast());
                m
            }
        };
        Err(EngineStatus::new(rc, message))
    }

    /// Applies a passphrase to the connection.
    pub fn key(&self, key: &[u8]) -> Result<(), EngineStatus> {
        let db = self.live()?;
        let n = len_as_c_int(key.len())?;
        // SAFETY: `key` is valid for `n` bytes for the duration of the call.
        let rc = unsafe { sqlite3_key(db, key.as_ptr().cast(), n) };
        if rc == SQLITE_OK {
            Ok(())
        } else {
            Err(self.status(rc))
        }
    }

    /// Re-encrypts the database under a new passphrase.
    pub fn rekey(&self, key: &[u8]) -> Result<(), EngineStatus> {
        let db = self.live()?;
        let n = len_as_c_int(key.len())?;
        // SAFETY: `key` is valid for `n` bytes for the duration of the call.
        let rc = unsafe { sqlite3_rekey(db, key.as_ptr().cast(), n) };
        if rc == SQLITE_OK {
            Ok(())
        } else {
            Err(self.status(rc))
        }
    }

    /// Compiles a single statement.
    pub fn prepare(&self, sql: &str) -> Result<RawStmt<'_>, EngineStatus> {
        let db = self.live()?;
        let c_sql = to_cstring(sql)?;
        let mut stmt: *mut sqlite3_stmt = std::ptr::null_mut();
        // SAFETY: `db` is live, `c_sql` is NUL-terminated and `stmt` is a
        // valid out-pointer.
        let rc = unsafe {
            sqlite3_prepare_v2(db, c_sql.as_ptr(), -1, &mut stmt, std::ptr::null_mut())
        };
        if rc != SQLITE_OK {
            return Err(self.status(rc));
        }
        if stmt.is_null() {
            // Whitespace or comment only.
            return Err(EngineStatus::new(SQLITE_MISUSE, "SQL contains no statement"));
        }
        Ok(RawStmt {
            stmt,
            db,
            _conn: PhantomData,
        })
    }

    pub fn changes(&self) -> i64 {
        if self.db.is_null() {
            return 0;
        }
        // SAFETY: `db` is live.
        i64::from(unsafe { sqlite3_changes(self.db) })
    }

    pub fn last_insert_rowid(&self) -> i64 {
        if self.db.is_null() {
            return 0;
        }
        // SAFETY: `db` is live.
        unsafe { sqlite3_last_insert_rowid(self.db) }
    }

    /// Returns `true` when the engine is not inside an explicit transaction.
    pub fn is_autocommit(&self) -> bool {
        if self.db.is_null() {
            return true;
        }
        // SAFETY: `db` is live.
        unsafe { sqlite3_get_autocommit(self.db) != 0 }
    }
}

impl Drop for RawDb {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

// ── Statement handle ────────────────────────────────────────────────────

/// Owned `sqlite3_stmt*` handle tied to the connection that compiled it.
/// Null once finalized.
pub struct RawStmt<'conn> {
    stmt: *mut sqlite3_stmt,
    /// Owning `sqlite3*`, kept for error messages.
    db: *mut sqlite3,
    _conn: PhantomData<&'conn RawDb>,
}

// SAFETY: see `RawDb`. The statement is owned by one `RawStmt` and is never
// shared.
unsafe impl Send for RawStmt<'_> {}

impl RawStmt<'_> {
    pub fn is_finalized(&self) -> bool {
        self.stmt.is_null()
    }

    /// Releases the handle. A second call is a no-op.
    pub fn finalize(&mut self) -> Result<(), EngineStatus> {
        if self.stmt.is_null() {
            return Ok(());
        }
        let stmt = std::mem::replace(&mut self.stmt, std::ptr::null_mut());
        // SAFETY: `stmt` was live and is no longer reachable through `self`.
        let rc = unsafe { sqlite3_finalize(stmt) };
        // `sqlite3_finalize` echoes the most recent step error; the handle is
        // released either way.
        if rc == SQLITE_OK {
            Ok(())
        } else {
            Err(EngineStatus::new(rc, errmsg(self.db)))
        }
    }

    fn live(&self) -> Result<*mut sqlite3_stmt, EngineStatus> {
        if self.stmt.is_null() {
            Err(released())
        } else {
            Ok(self.stmt)
        }
    }

    fn check(&self, rc: c_int) -> Result<(), EngineStatus> {
        if rc == SQLITE_OK {
            Ok(())
        } else {
            Err(EngineStatus::new(rc, errmsg(self.db)))
        }
    }

    /// Rows changed by the most recent statement on the owning connection.
    pub fn changes(&self) -> i64 {
        // SAFETY: the owning connection outlives this statement.
        i64::from(unsafe { sqlite3_changes(self.db) })
    }

    /// Rows changed by INSERT, UPDATE and DELETE on the owning connection
    /// since it was opened. DDL and queries leave it untouched.
    pub fn total_changes(&self) -> i64 {
        // SAFETY: the owning connection outlives this statement.
        i64::from(unsafe { sqlite3_total_changes(self.db) })
    }

    pub fn parameter_count(&self) -> usize {
        let Ok(stmt) = self.live() else { return 0 };
        // SAFETY: `stmt` is live.
        usize::try_from(unsafe { sqlite3_bind_parameter_count(stmt) }).unwrap_or(0)
    }

    pub fn column_count(&self) -> usize {
        let Ok(stmt) = self.live() else { return 0 };
        // SAFETY: `stmt` is live.
        usize::try_from(unsafe { sqlite3_column_count(stmt) }).unwrap_or(0)
    }

    /// Runs one step and returns the raw result code (`SQLITE_ROW`,
    /// `SQLITE_DONE` or an error status).
    pub fn step(&self) -> Result<c_int, EngineStatus> {
        let stmt = self.live()?;
        // SAFETY: `stmt` is live.
        let rc = unsafe { sqlite3_step(stmt) };
        match rc {
            SQLITE_ROW | SQLITE_DONE => Ok(rc),
            _ => Err(EngineStatus::new(rc, errmsg(self.db))),
        }
    }

    /// Rewinds the statement and drops every bound value.
    pub fn reset(&self) -> Result<(), EngineStatus> {
        let stmt = self.live()?;
        // The return code repeats the last step error, already reported by
        // `step`; the statement is rewound regardless.
        // SAFETY: `stmt` is live.
        unsafe {
            sqlite3_reset(stmt);
        }
        // SAFETY: `stmt` is live.
        let rc = unsafe { sqlite3_clear_bindings(stmt) };
        self.check(rc)
    }

    pub fn bind_null(&self, index: c_int) -> Result<(), EngineStatus> {
        let stmt = self.live()?;
        // SAFETY: `stmt` is live.
        self.check(unsafe { sqlite3_bind_null(stmt, index) })
    }

    pub fn bind_i64(&self, index: c_int, value: i64) -> Result<(), EngineStatus> {
        let stmt = self.live()?;
        // SAFETY: `stmt` is live.
        self.check(unsafe { sqlite3_bind_int64(stmt, index, value) })
    }

    pub fn bind_f64(&self, index: c_int, value: f64) -> Result<(), EngineStatus> {
        let stmt = self.live()?;
        // SAFETY: `stmt` is live.
        self.check(unsafe { sqlite3_bind_double(stmt, index, value) })
    }

    pub fn bind_text(&self, index: c_int, value: &str) -> Result<(), EngineStatus> {
        let stmt = self.live()?;
        let n = len_as_c_int(value.len())?;
        // SAFETY: `value` is valid for `n` bytes; SQLITE_TRANSIENT makes the
        // engine take its own copy before returning.
        self.check(unsafe {
            sqlite3_bind_text(stmt, index, value.as_ptr().cast(), n, SQLITE_TRANSIENT)
        })
    }

    pub fn bind_blob(&self, index: c_int, value: &[u8]) -> Result<(), EngineStatus> {
        let stmt = self.live()?;
        let n = len_as_c_int(value.len())?;
        // SAFETY: as for `bind_text`.
        self.check(unsafe {
            sqlite3_bind_blob(stmt, index, value.as_ptr().cast(), n, SQLITE_TRANSIENT)
        })
    }

    pub fn column_type(&self, col: c_int) -> c_int {
        let Ok(stmt) = self.live() else { return SQLITE_NULL };
        // SAFETY: `stmt` is live; out-of-range columns yield SQLITE_NULL.
        unsafe { sqlite3_column_type(stmt, col) }
    }

    pub fn column_i64(&self, col: c_int) -> i64 {
        let Ok(stmt) = self.live() else { return 0 };
        // SAFETY: `stmt` is live.
        unsafe { sqlite3_column_int64(stmt, col) }
    }

    pub fn column_f64(&self, col: c_int) -> f64 {
        let Ok(stmt) = self.live() else { return 0.0 };
        // SAFETY: `stmt` is live.
        unsafe { sqlite3_column_double(stmt, col) }
    }

    /// Reads a column as text. `None` for SQL NULL.
    pub fn column_text(&self, col: c_int) -> Option<String> {
        let stmt = self.live().ok()?;
        // SAFETY: `stmt` is live. The text pointer must be fetched before
        // `sqlite3_column_bytes`, and both stay valid until the next step,
        // reset or finalize, none of which can happen while `&self` is held.
        unsafe {
            let ptr = sqlite3_column_text(stmt, col);
            if ptr.is_null() {
                return None;
            }
            let len = usize::try_from(sqlite3_column_bytes(stmt, col)).unwrap_or(0);
            let bytes = std::slice::from_raw_parts(ptr, len);
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
    }

    /// Reads a column as a blob. `None` for SQL NULL; a zero-length blob is
    /// `Some(vec![])`.
    pub fn column_blob(&self, col: c_int) -> Option<Vec<u8>> {
        let stmt = self.live().ok()?;
        // SAFETY: see `column_text`.
        unsafe {
            if sqlite3_column_type(stmt, col) == SQLITE_NULL {
                return None;
            }
            let ptr = sqlite3_column_blob(stmt, col);
            let len = usize::try_from(sqlite3_column_bytes(stmt, col)).unwrap_or(0);
            if ptr.is_null() || len == 0 {
                return Some(Vec::new());
            }
            Some(std::slice::from_raw_parts(ptr.cast::<u8>(), len).to_vec())
        }
    }

    pub fn column_name(&self, col: c_int) -> Option<String> {
        let stmt = self.live().ok()?;
        // SAFETY: `stmt` is live; the name is copied immediately.
        unsafe {
            let ptr = sqlite3_column_name(stmt, col);
            if ptr.is_null() {
                None
            } else {
                Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
            }
        }
    }
}

impl Drop for RawStmt<'_> {
    fn drop(&mut self) {
        let _ = self.finalize();
    }
}
