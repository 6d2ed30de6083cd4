//! ARIES-style logical recovery: log records plus checkpoint-seeded
//! redo/undo replay over an in-memory key/value map (spec.md §4.9).

pub mod log_record;
pub mod manager;

pub use log_record::{LogManager, LogRecord, LogRecordKind, Lsn};
pub use manager::{Checkpoint, RecoveryManager};
