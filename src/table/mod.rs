//! Table storage: a heap of rows backed by slotted pages (spec.md §4.4).

pub mod heap;

pub use heap::{TableHeap, TableHeapIterator};
