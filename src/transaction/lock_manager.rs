//! Strict two-phase-locking lock manager (spec.md §4.8).
//!
//! Grounded on `original_source/src/concurrency/lock_manager.cpp`
//! (`LockShared`/`LockExclusive`/`LockUpgrade`/`Unlock`/`RunCycleDetection`).
//! Locks are row-granular (keyed by [`RowId`]); a blocked request parks on
//! a [`Condvar`] instead of the original's polling loop, and a background
//! thread periodically runs [`WaitForGraph`] cycle detection, aborting the
//! victim transaction it names. Shutdown uses a `crossbeam::channel` rather
//! than a raw flag so the detector thread wakes immediately on drop instead
//! of waiting out its poll interval.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, RecvTimeoutError};
use log::{info, warn};

use crate::error::{AbortReason, DbError, DbResult};
use crate::transaction::deadlock::WaitForGraph;
use crate::transaction::{IsolationLevel, Transaction, TransactionId, TransactionState};
use crate::types::RowId;

const DETECTION_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockMode {
    Shared,
    Exclusive,
}

fn compatible(held: LockMode, requested: LockMode) -> bool {
    matches!((held, requested), (LockMode::Shared, LockMode::Shared))
}

struct LockRequest {
    txn_id: TransactionId,
    mode: LockMode,
    granted: bool,
}

#[derive(Default)]
struct LockRequestQueue {
    requests: Vec<LockRequest>,
    upgrading: Option<TransactionId>,
}

impl LockRequestQueue {
    fn can_grant(&self, txn_id: TransactionId, mode: LockMode) -> bool {
        self.requests
            .iter()
            .all(|r| r.txn_id == txn_id || !r.granted || compatible(r.mode, mode))
    }
}

/// Shared handle to one transaction, used so the background detector
/// thread can mark a victim aborted from outside its owning thread.
pub type SharedTransaction = Arc<Mutex<Transaction>>;

pub struct LockManager {
    queues: Mutex<HashMap<RowId, LockRequestQueue>>,
    cond: Condvar,
    graph: Mutex<WaitForGraph>,
    registry: Mutex<HashMap<TransactionId, SharedTransaction>>,
    shutdown_tx: channel::Sender<()>,
    detector: Mutex<Option<JoinHandle<()>>>,
}

impl LockManager {
    pub fn new() -> Arc<Self> {
        let (shutdown_tx, shutdown_rx) = channel::unbounded();
        let lm = Arc::new(LockManager {
            queues: Mutex::new(HashMap::new()),
            cond: Condvar::new(),
            graph: Mutex::new(WaitForGraph::new()),
            registry: Mutex::new(HashMap::new()),
            shutdown_tx,
            detector: Mutex::new(None),
        });

        let weak: Weak<LockManager> = Arc::downgrade(&lm);
        let handle = thread::spawn(move || loop {
            match shutdown_rx.recv_timeout(DETECTION_INTERVAL) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                Err(RecvTimeoutError::Timeout) => {}
            }
            match weak.upgrade() {
                Some(lm) => lm.run_cycle_detection(),
                None => return,
            }
        });
        *lm.detector.lock().unwrap() = Some(handle);
        lm
    }

    pub fn register_transaction(&self, txn: SharedTransaction) {
        let txn_id = txn.lock().unwrap().id();
        self.registry.lock().unwrap().insert(txn_id, txn);
    }

    pub fn unregister_transaction(&self, txn_id: TransactionId) {
        self.registry.lock().unwrap().remove(&txn_id);
        self.graph.lock().unwrap().remove_transaction(txn_id);
    }

    pub fn lock_shared(&self, txn: &SharedTransaction, row_id: RowId) -> DbResult<()> {
        let txn_id = {
            let t = txn.lock().unwrap();
            if matches!(t.isolation_level(), IsolationLevel::ReadUncommitted) {
                return Err(DbError::abort(t.id(), AbortReason::LockSharedOnReadUncommitted));
            }
            if t.state() == TransactionState::Shrinking {
                return Err(DbError::abort(t.id(), AbortReason::LockOnShrinking));
            }
            if t.holds_shared(row_id) || t.holds_exclusive(row_id) {
                return Ok(());
            }
            t.id()
        };

        self.acquire(txn, txn_id, row_id, LockMode::Shared)?;
        txn.lock().unwrap().grant_shared(row_id);
        Ok(())
    }

    pub fn lock_exclusive(&self, txn: &SharedTransaction, row_id: RowId) -> DbResult<()> {
        let txn_id = {
            let t = txn.lock().unwrap();
            if t.state() == TransactionState::Shrinking {
                return Err(DbError::abort(t.id(), AbortReason::LockOnShrinking));
            }
            if t.holds_exclusive(row_id) {
                return Ok(());
            }
            t.id()
        };

        self.acquire(txn, txn_id, row_id, LockMode::Exclusive)?;
        txn.lock().unwrap().grant_exclusive(row_id);
        Ok(())
    }

    /// Promotes an already-held shared lock to exclusive. Only one
    /// transaction may be mid-upgrade on a row at a time.
    pub fn lock_upgrade(&self, txn: &SharedTransaction, row_id: RowId) -> DbResult<()> {
        let txn_id = {
            let t = txn.lock().unwrap();
            if t.state() == TransactionState::Shrinking {
                return Err(DbError::abort(t.id(), AbortReason::LockOnShrinking));
            }
            if !t.holds_shared(row_id) {
                return Err(DbError::validation(
                    "lock_upgrade requires an already-held shared lock",
                ));
            }
            t.id()
        };

        {
            let mut queues = self.queues.lock().unwrap();
            let queue = queues.entry(row_id).or_default();
            if let Some(other) = queue.upgrading {
                if other != txn_id {
                    return Err(DbError::abort(txn_id, AbortReason::UpgradeConflict));
                }
            }
            queue.upgrading = Some(txn_id);
        }

        let result = self.wait_for_grant(txn, txn_id, row_id, LockMode::Exclusive, true);

        if let Some(queue) = self.queues.lock().unwrap().get_mut(&row_id) {
            if queue.upgrading == Some(txn_id) {
                queue.upgrading = None;
            }
        }
        result?;
        txn.lock().unwrap().upgrade_to_exclusive(row_id);
        Ok(())
    }

    pub fn unlock(&self, txn: &SharedTransaction, row_id: RowId) -> DbResult<()> {
        let txn_id = txn.lock().unwrap().id();
        let was_exclusive = {
            let mut queues = self.queues.lock().unwrap();
            let was_exclusive = queues.get(&row_id).map(|q| {
                q.requests
                    .iter()
                    .any(|r| r.txn_id == txn_id && r.granted && r.mode == LockMode::Exclusive)
            });
            if let Some(queue) = queues.get_mut(&row_id) {
                queue.requests.retain(|r| r.txn_id != txn_id);
                if queue.upgrading == Some(txn_id) {
                    queue.upgrading = None;
                }
                if queue.requests.is_empty() {
                    queues.remove(&row_id);
                }
            }
            was_exclusive.unwrap_or(false)
        };
        self.cond.notify_all();

        let mut t = txn.lock().unwrap();
        t.release(row_id);
        let releases_lock_phase = was_exclusive || !matches!(t.isolation_level(), IsolationLevel::ReadCommitted);
        if t.state() == TransactionState::Growing && releases_lock_phase {
            t.set_state(TransactionState::Shrinking);
        }
        Ok(())
    }

    fn acquire(
        &self,
        txn: &SharedTransaction,
        txn_id: TransactionId,
        row_id: RowId,
        mode: LockMode,
    ) -> DbResult<()> {
        {
            let mut queues = self.queues.lock().unwrap();
            queues.entry(row_id).or_default().requests.push(LockRequest {
                txn_id,
                mode,
                granted: false,
            });
        }
        self.wait_for_grant(txn, txn_id, row_id, mode, false)
    }

    fn wait_for_grant(
        &self,
        txn: &SharedTransaction,
        txn_id: TransactionId,
        row_id: RowId,
        mode: LockMode,
        is_upgrade: bool,
    ) -> DbResult<()> {
        let mut queues = self.queues.lock().unwrap();
        loop {
            if self.is_aborted(txn) {
                if let Some(queue) = queues.get_mut(&row_id) {
                    if !is_upgrade {
                        queue.requests.retain(|r| r.txn_id != txn_id);
                    }
                }
                drop(queues);
                self.graph.lock().unwrap().remove_transaction(txn_id);
                self.cond.notify_all();
                return Err(DbError::abort(txn_id, AbortReason::Deadlock));
            }

            let grantable = queues
                .get(&row_id)
                .map(|q| q.can_grant(txn_id, mode))
                .unwrap_or(true);

            if grantable {
                if let Some(queue) = queues.get_mut(&row_id) {
                    if let Some(req) = queue.requests.iter_mut().find(|r| r.txn_id == txn_id) {
                        req.granted = true;
                        req.mode = mode;
                    } else if is_upgrade {
                        queue.requests.push(LockRequest { txn_id, mode, granted: true });
                    }
                }
                break;
            }

            {
                let mut graph = self.graph.lock().unwrap();
                if let Some(queue) = queues.get(&row_id) {
                    for req in &queue.requests {
                        if req.granted && req.txn_id != txn_id {
                            graph.add_edge(txn_id, req.txn_id);
                        }
                    }
                }
            }

            queues = self.cond.wait(queues).unwrap();
        }
        drop(queues);
        self.graph.lock().unwrap().remove_transaction(txn_id);
        Ok(())
    }

    fn is_aborted(&self, txn: &SharedTransaction) -> bool {
        txn.lock().unwrap().state() == TransactionState::Aborted
    }

    /// Aborts the cycle's victim and forcibly releases every lock it
    /// already held, so transactions waiting on those rows don't have to
    /// wait for the victim's own thread to notice it was aborted and unwind
    /// (it may be blocked indefinitely on a different row).
    fn run_cycle_detection(&self) {
        let victim_id = self.graph.lock().unwrap().find_cycle_victim();
        let victim_id = match victim_id {
            Some(id) => id,
            None => return,
        };
        warn!("deadlock detected, aborting {}", victim_id);

        let txn = self.registry.lock().unwrap().get(&victim_id).cloned();
        if let Some(txn) = txn {
            let held_rows = {
                let mut t = txn.lock().unwrap();
                t.set_state(TransactionState::Aborted);
                t.all_locks()
            };
            let mut queues = self.queues.lock().unwrap();
            for row_id in held_rows {
                if let Some(queue) = queues.get_mut(&row_id) {
                    queue.requests.retain(|r| r.txn_id != victim_id);
                    if queue.upgrading == Some(victim_id) {
                        queue.upgrading = None;
                    }
                    if queue.requests.is_empty() {
                        queues.remove(&row_id);
                    }
                }
            }
        }
        self.graph.lock().unwrap().remove_transaction(victim_id);
        self.cond.notify_all();
    }
}

impl Drop for LockManager {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.detector.lock().unwrap().take() {
            let _ = handle.join();
        }
        info!("lock manager detector thread stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionManager;
    use std::sync::Arc;

    fn shared(txn: Transaction) -> SharedTransaction {
        Arc::new(Mutex::new(txn))
    }

    #[test]
    fn two_shared_locks_are_both_granted() {
        let lm = LockManager::new();
        let tm = TransactionManager::new();
        let row = RowId::new(1, 0);

        let a = shared(tm.begin_with_isolation(IsolationLevel::ReadCommitted));
        let b = shared(tm.begin_with_isolation(IsolationLevel::ReadCommitted));
        lm.lock_shared(&a, row).unwrap();
        lm.lock_shared(&b, row).unwrap();
        assert!(a.lock().unwrap().holds_shared(row));
        assert!(b.lock().unwrap().holds_shared(row));
    }

    #[test]
    fn exclusive_excludes_other_shared() {
        let lm = LockManager::new();
        let tm = TransactionManager::new();
        let row = RowId::new(1, 0);

        let a = shared(tm.begin_with_isolation(IsolationLevel::ReadCommitted));
        lm.lock_exclusive(&a, row).unwrap();
        assert!(a.lock().unwrap().holds_exclusive(row));

        lm.unlock(&a, row).unwrap();
        assert_eq!(a.lock().unwrap().state(), TransactionState::Shrinking);
    }

    #[test]
    fn lock_after_shrinking_aborts() {
        let lm = LockManager::new();
        let tm = TransactionManager::new();
        let row_a = RowId::new(1, 0);
        let row_b = RowId::new(1, 1);

        let a = shared(tm.begin_with_isolation(IsolationLevel::ReadCommitted));
        lm.lock_exclusive(&a, row_a).unwrap();
        lm.unlock(&a, row_a).unwrap();

        let err = lm.lock_shared(&a, row_b).unwrap_err();
        assert!(err.is_txn_abort());
    }

    #[test]
    fn upgrade_succeeds_when_sole_holder() {
        let lm = LockManager::new();
        let tm = TransactionManager::new();
        let row = RowId::new(1, 0);

        let a = shared(tm.begin_with_isolation(IsolationLevel::ReadCommitted));
        lm.lock_shared(&a, row).unwrap();
        lm.lock_upgrade(&a, row).unwrap();
        assert!(a.lock().unwrap().holds_exclusive(row));
        assert!(!a.lock().unwrap().holds_shared(row));
    }

    #[test]
    fn deadlock_detector_aborts_a_victim() {
        use std::thread;

        let lm = LockManager::new();
        let tm = Arc::new(TransactionManager::new());
        let row_1 = RowId::new(1, 0);
        let row_2 = RowId::new(1, 1);

        let a = shared(tm.begin_with_isolation(IsolationLevel::ReadCommitted));
        let b = shared(tm.begin_with_isolation(IsolationLevel::ReadCommitted));
        lm.register_transaction(a.clone());
        lm.register_transaction(b.clone());

        lm.lock_exclusive(&a, row_1).unwrap();
        lm.lock_exclusive(&b, row_2).unwrap();

        let lm2 = lm.clone();
        let b2 = b.clone();
        let t1 = thread::spawn(move || lm2.lock_exclusive(&b2, row_1));
        let lm3 = lm.clone();
        let a2 = a.clone();
        let t2 = thread::spawn(move || lm3.lock_exclusive(&a2, row_2));

        let r1 = t1.join().unwrap();
        let r2 = t2.join().unwrap();
        // Exactly one side of the cycle must have been aborted by the
        // detector; the other proceeds once its blocker is gone.
        assert!(r1.is_err() || r2.is_err());
    }
}
