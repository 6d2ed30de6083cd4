//! The concrete recovery scenario from spec.md §8: a checkpoint plus a
//! log stream spanning a committed and an in-flight transaction, replayed
//! to the exact expected final key/value state.

use std::collections::BTreeMap;

use small_db::recovery::{Checkpoint, LogManager, LogRecord, Lsn, RecoveryManager};
use small_db::transaction::TransactionId;

fn log_of(records: Vec<LogRecord>) -> BTreeMap<Lsn, LogRecord> {
    records.into_iter().map(|r| (r.lsn, r)).collect()
}

#[test]
fn checkpoint_plus_log_stream_replays_to_expected_state() {
    let mut checkpoint = Checkpoint::new(0);
    checkpoint.add_data("a", 1);

    let mgr = LogManager::new();
    let t1 = TransactionId(1);
    let t2 = TransactionId(2);

    let log = log_of(vec![
        mgr.log_begin(t1),                     // lsn 1
        mgr.log_insert(t1, "b", 2),             // lsn 2
        mgr.log_begin(t2),                      // lsn 3
        mgr.log_update(t2, "a", 1, "a", 9),      // lsn 4: left in flight, never committed
        mgr.log_commit(t1),                     // lsn 5
    ]);

    let mut recovery = RecoveryManager::new(checkpoint);
    recovery.recover(&log);

    let mut expected = std::collections::HashMap::new();
    expected.insert("a".to_string(), 1);
    expected.insert("b".to_string(), 2);
    assert_eq!(recovery.data(), &expected);
    assert!(recovery.active_txns().is_empty());
}
