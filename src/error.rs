use std::{error::Error, fmt};

use crate::transaction::TransactionId;

/// The reasons a transaction can be forced to abort, per the strict 2PL
/// state machine (spec.md §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    LockOnShrinking,
    LockSharedOnReadUncommitted,
    UpgradeConflict,
    Deadlock,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            AbortReason::LockOnShrinking => "lock acquired while shrinking",
            AbortReason::LockSharedOnReadUncommitted => {
                "shared lock requested under read-uncommitted isolation"
            }
            AbortReason::UpgradeConflict => "another transaction is already upgrading this lock",
            AbortReason::Deadlock => "aborted by deadlock detector",
        };
        write!(f, "{}", s)
    }
}

/// The single error type for the storage and transaction core. One variant
/// per error kind named in spec.md §7 ("not type names — contracts").
#[derive(Debug)]
pub enum DbError {
    /// Table, index, column, or key does not exist.
    NotFound(String),
    /// Table or index with that name already exists.
    AlreadyExists(String),
    /// The buffer pool has no evictable frame left.
    Capacity(String),
    /// Wrong magic number, schema mismatch, unsupported column type, or
    /// similar malformed on-disk data.
    Validation(String),
    /// A transaction was forced to abort under strict 2PL.
    TransactionAbort {
        txn_id: TransactionId,
        reason: AbortReason,
    },
    /// Unrecoverable disk I/O failure.
    Io(String),
}

impl DbError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        DbError::NotFound(msg.into())
    }

    pub fn already_exists(msg: impl Into<String>) -> Self {
        DbError::AlreadyExists(msg.into())
    }

    pub fn capacity(msg: impl Into<String>) -> Self {
        DbError::Capacity(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        DbError::Validation(msg.into())
    }

    pub fn abort(txn_id: TransactionId, reason: AbortReason) -> Self {
        DbError::TransactionAbort { txn_id, reason }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        DbError::Io(msg.into())
    }

    /// True if this error carries a transaction-abort signal the caller
    /// must unwind on (spec.md §7 propagation policy).
    pub fn is_txn_abort(&self) -> bool {
        matches!(self, DbError::TransactionAbort { .. })
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DbError::NotFound(msg) => write!(f, "not found: {}", msg),
            DbError::AlreadyExists(msg) => write!(f, "already exists: {}", msg),
            DbError::Capacity(msg) => write!(f, "capacity exceeded: {}", msg),
            DbError::Validation(msg) => write!(f, "validation failed: {}", msg),
            DbError::TransactionAbort { txn_id, reason } => {
                write!(f, "transaction {} aborted: {}", txn_id, reason)
            }
            DbError::Io(msg) => write!(f, "io error: {}", msg),
        }
    }
}

impl Error for DbError {}

impl From<std::io::Error> for DbError {
    fn from(e: std::io::Error) -> Self {
        DbError::Io(e.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;
