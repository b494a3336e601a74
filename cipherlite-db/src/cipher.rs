//! `sqlite3mc` encryption support.
//!
//! # Encryption flow
//!
//! The engine encrypts every page at rest. Once a connection is keyed, reads
//! and writes are decrypted and encrypted transparently by the pager, so SQL
//! never sees ciphertext.
//!
//! Opening an encrypted database is:
//!
//! 1. **Open** -- the file is opened but not read. Its pages are opaque.
//! 2. **Key** -- a [`DatabaseKey::Passphrase`] goes through `sqlite3_key`,
//!    where the engine derives the page key with its KDF. A
//!    [`DatabaseKey::Raw`] key is hex-encoded into `PRAGMA key = "x'..'"`,
//!    which the engine uses as-is.
//! 3. **Verify** -- reading `sqlite_master` decrypts the first page. A wrong
//!    key fails here with `SQLITE_NOTADB`.
//! 4. **Configure** -- PRAGMAs from [`OpenOptions`] are applied. This has to
//!    come after keying because the engine cannot read settings from a page
//!    it cannot decrypt.
//!
//! Key material is never copied into long-lived buffers: passphrases are
//! handed to the engine straight from the [`SecretString`], and the
//! temporary SQL strings built for raw keys are zeroized on drop.

use std::path::Path;

use secrecy::{ExposeSecret, SecretBox, SecretString};
use zeroize::Zeroizing;

use crate::connection::Connection;
use crate::error::{DbError, DbResult, EngineStatus};
use crate::ffi::RawDb;
use crate::options::OpenOptions;

/// Key protecting an encrypted database.
#[derive(Debug)]
pub enum DatabaseKey {
    /// Passphrase; the engine derives the page key from it.
    Passphrase(SecretString),
    /// 32 bytes of raw key material, used without derivation.
    Raw(SecretBox<[u8; 32]>),
}

impl DatabaseKey {
    /// Wraps a passphrase.
    pub fn passphrase(passphrase: impl Into<String>) -> Self {
        Self::Passphrase(SecretString::from(passphrase.into()))
    }

    /// Wraps raw key bytes.
    pub fn raw(key: [u8; 32]) -> Self {
        Self::Raw(SecretBox::new(Box::new(key)))
    }
}

/// Opens an encrypted database: open -> key -> verify -> configure.
///
/// A wrong key (or a file that is not a database) fails with
/// [`DbError::EngineOpen`].
///
/// See the [module-level documentation](self) for the full flow.
pub fn open_encrypted(path: &Path, key: &DatabaseKey, options: &OpenOptions) -> DbResult<Connection> {
    let mut conn = Connection::open_unconfigured(path, options)?;
    conn.set_key(key).map_err(|e| match e {
        DbError::Engine(status) => DbError::EngineOpen(status),
        other => other,
    })?;
    conn.configure(options)?;
    Ok(conn)
}

/// Runs `PRAGMA integrity_check` and returns whether the database is healthy.
pub fn integrity_check(conn: &Connection) -> DbResult<bool> {
    let result = conn.query_row("PRAGMA integrity_check;", &[], |row| {
        Ok(row.string_at(0)?.unwrap_or_default())
    })?;
    Ok(result.trim() == "ok")
}

/// Keys `db` and verifies the key by reading the schema.
pub(crate) fn apply_key(db: &RawDb, key: &DatabaseKey) -> Result<(), EngineStatus> {
    match key {
        DatabaseKey::Passphrase(passphrase) => db.key(passphrase.expose_secret().as_bytes())?,
        DatabaseKey::Raw(raw) => db.exec_zeroized(&raw_key_pragma("key", raw))?,
    }
    db.exec("SELECT count(*) FROM sqlite_master;").map_err(|e| {
        EngineStatus::new(
            e.code.0,
            format!(
                "encryption key verification failed (is the key correct?): {}",
                e.message
            ),
        )
    })
}

/// Re-encrypts `db` under `new_key`, keying with `old_key` first if given.
pub(crate) fn apply_rekey(
    db: &RawDb,
    old_key: Option<&DatabaseKey>,
    new_key: &DatabaseKey,
) -> Result<(), EngineStatus> {
    if let Some(old_key) = old_key {
        apply_key(db, old_key)?;
    }
    match new_key {
        DatabaseKey::Passphrase(passphrase) => db.rekey(passphrase.expose_secret().as_bytes()),
        DatabaseKey::Raw(raw) => db.exec_zeroized(&raw_key_pragma("rekey", raw)),
    }
}

/// Builds `PRAGMA <pragma> = "x'<64 hex chars>'"`. Zeroized on drop.
fn raw_key_pragma(pragma: &str, key: &SecretBox<[u8; 32]>) -> Zeroizing<String> {
    let key_hex = Zeroizing::new(hex::encode(key.expose_secret()));
    Zeroizing::new(format!("PRAGMA {pragma} = \"x'{}'\";", key_hex.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_key_pragma_format() {
        let key = SecretBox::new(Box::new([0xAB_u8; 32]));
        let pragma = raw_key_pragma("key", &key);
        assert_eq!(pragma.as_str(), format!("PRAGMA key = \"x'{}'\";", "ab".repeat(32)));
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let key = DatabaseKey::passphrase("hunter2");
        assert!(!format!("{key:?}").contains("hunter2"));
    }
}
