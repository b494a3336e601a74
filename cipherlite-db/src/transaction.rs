//! Scoped transaction guard.

use std::ops::Deref;

use log::warn;

use crate::connection::Connection;
use crate::error::DbResult;

/// Locking behaviour for `BEGIN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionBehavior {
    /// `BEGIN DEFERRED` (the default): locks are taken on first access.
    #[default]
    Deferred,
    /// `BEGIN IMMEDIATE`: acquires a RESERVED lock right away.
    Immediate,
    /// `BEGIN EXCLUSIVE`: acquires an EXCLUSIVE lock right away.
    Exclusive,
}

impl TransactionBehavior {
    pub(crate) const fn as_sql(self) -> &'static str {
        match self {
            Self::Deferred => "BEGIN DEFERRED",
            Self::Immediate => "BEGIN IMMEDIATE",
            Self::Exclusive => "BEGIN EXCLUSIVE",
        }
    }
}

/// An open transaction on a [`Connection`].
///
/// Drives the connection's single transaction flag, so it is subject to the
/// same no-nesting rule as
/// [`Connection::begin_transaction`]. Rolls back on drop unless committed.
/// Dereferences to the connection for running statements inside it.
pub struct Transaction<'conn> {
    conn: &'conn Connection,
    finished: bool,
}

impl<'conn> Transaction<'conn> {
    pub(crate) fn begin(conn: &'conn Connection, behavior: TransactionBehavior) -> DbResult<Self> {
        conn.begin_transaction_with(behavior)?;
        Ok(Self {
            conn,
            finished: false,
        })
    }

    /// Commits the transaction.
    pub fn commit(mut self) -> DbResult<()> {
        self.finished = true;
        self.conn.commit_transaction()
    }

    /// Rolls the transaction back.
    pub fn rollback(mut self) -> DbResult<()> {
        self.finished = true;
        self.conn.rollback_transaction()
    }
}

impl Deref for Transaction<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.rollback_transaction() {
                warn!("rollback of abandoned transaction failed: {e}");
            }
        }
    }
}
