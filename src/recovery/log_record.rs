//! Log records and the counter/prev-LSN bookkeeping that produces them
//! (spec.md §3 "Log record", §4.9, §9 "Global state").
//!
//! Grounded on `original_source/src/include/recovery/log_rec.h`
//! (`LogRec`, `CreateInsertLog`/`CreateDeleteLog`/`CreateUpdateLog`/
//! `CreateBeginLog`/`CreateCommitLog`/`CreateAbortLog`), kept to the same
//! `old_key`/`old_value`/`new_key`/`new_value` field shape rather than a
//! per-variant payload enum, since the recovery manager's redo/undo logic
//! reads those fields uniformly regardless of record kind.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::transaction::TransactionId;

pub type Lsn = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRecordKind {
    Begin,
    Commit,
    Abort,
    Insert,
    Delete,
    Update,
}

/// One entry in the logical log stream. `old_*`/`new_*` are populated per
/// `LogRecordKind`: `Insert` and `Delete` only set `new_key`/`new_value`
/// (the row inserted, or the row being deleted); `Update` sets both pairs.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub lsn: Lsn,
    pub prev_lsn: Option<Lsn>,
    pub txn_id: TransactionId,
    pub kind: LogRecordKind,
    pub old_key: Option<String>,
    pub old_value: Option<i32>,
    pub new_key: Option<String>,
    pub new_value: Option<i32>,
}

/// Issues LSNs and tracks each transaction's most recent LSN so new
/// records can thread `prev_lsn`, bound to one instance rather than the
/// original's process-wide statics (spec.md §9 "Global state").
pub struct LogManager {
    next_lsn: Mutex<Lsn>,
    prev_lsn: Mutex<HashMap<TransactionId, Lsn>>,
}

impl LogManager {
    pub fn new() -> Self {
        LogManager {
            next_lsn: Mutex::new(0),
            prev_lsn: Mutex::new(HashMap::new()),
        }
    }

    fn next(&self, txn_id: TransactionId) -> (Lsn, Option<Lsn>) {
        let mut next_lsn = self.next_lsn.lock().unwrap();
        let lsn = *next_lsn;
        *next_lsn += 1;
        let mut prev_lsn = self.prev_lsn.lock().unwrap();
        let prev = prev_lsn.insert(txn_id, lsn);
        (lsn, prev)
    }

    pub fn log_begin(&self, txn_id: TransactionId) -> LogRecord {
        let (lsn, _) = self.next(txn_id);
        LogRecord {
            lsn,
            prev_lsn: None,
            txn_id,
            kind: LogRecordKind::Begin,
            old_key: None,
            old_value: None,
            new_key: None,
            new_value: None,
        }
    }

    pub fn log_insert(&self, txn_id: TransactionId, key: impl Into<String>, value: i32) -> LogRecord {
        let (lsn, prev_lsn) = self.next(txn_id);
        LogRecord {
            lsn,
            prev_lsn,
            txn_id,
            kind: LogRecordKind::Insert,
            old_key: None,
            old_value: None,
            new_key: Some(key.into()),
            new_value: Some(value),
        }
    }

    pub fn log_delete(&self, txn_id: TransactionId, key: impl Into<String>, value: i32) -> LogRecord {
        let (lsn, prev_lsn) = self.next(txn_id);
        LogRecord {
            lsn,
            prev_lsn,
            txn_id,
            kind: LogRecordKind::Delete,
            old_key: None,
            old_value: None,
            new_key: Some(key.into()),
            new_value: Some(value),
        }
    }

    pub fn log_update(
        &self,
        txn_id: TransactionId,
        old_key: impl Into<String>,
        old_value: i32,
        new_key: impl Into<String>,
        new_value: i32,
    ) -> LogRecord {
        let (lsn, prev_lsn) = self.next(txn_id);
        LogRecord {
            lsn,
            prev_lsn,
            txn_id,
            kind: LogRecordKind::Update,
            old_key: Some(old_key.into()),
            old_value: Some(old_value),
            new_key: Some(new_key.into()),
            new_value: Some(new_value),
        }
    }

    pub fn log_commit(&self, txn_id: TransactionId) -> LogRecord {
        let (lsn, prev_lsn) = self.next(txn_id);
        self.prev_lsn.lock().unwrap().remove(&txn_id);
        LogRecord {
            lsn,
            prev_lsn,
            txn_id,
            kind: LogRecordKind::Commit,
            old_key: None,
            old_value: None,
            new_key: None,
            new_value: None,
        }
    }

    pub fn log_abort(&self, txn_id: TransactionId) -> LogRecord {
        let (lsn, prev_lsn) = self.next(txn_id);
        self.prev_lsn.lock().unwrap().remove(&txn_id);
        LogRecord {
            lsn,
            prev_lsn,
            txn_id,
            kind: LogRecordKind::Abort,
            old_key: None,
            old_value: None,
            new_key: None,
            new_value: None,
        }
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new()
    }
}
