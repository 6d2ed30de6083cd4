//! Table heap: a linked list of slotted pages holding one table's rows
//! (spec.md §4.4).
//!
//! Grounded on `original_source/src/storage/table_heap.cpp`
//! (`InsertTuple`/`MarkDelete`/`UpdateTuple`/`ApplyDelete`/
//! `RollbackDelete`/`GetTuple`) layered on the buffer pool's `PageGuard`
//! rather than raw `FetchPage`/`UnpinPage` pairs.

use std::sync::{Arc, Mutex};

use crate::error::{DbError, DbResult};
use crate::record::{Row, Schema};
use crate::storage::buffer_pool::BufferPoolManager;
use crate::storage::table_page::{TablePage, TablePageReader, TABLE_PAGE_HEADER_SIZE};
use crate::types::{PageId, RowId, INVALID_PAGE_ID};

pub struct TableHeap {
    buffer_pool: Arc<BufferPoolManager>,
    schema: Schema,
    first_page_id: PageId,
    last_page_id: Mutex<PageId>,
}

impl TableHeap {
    pub fn create(buffer_pool: Arc<BufferPoolManager>, schema: Schema) -> DbResult<Self> {
        let guard = buffer_pool.new_page()?;
        let page_id = guard.page_id();
        guard.with_mut(|bytes| TablePage::new(bytes).init(page_id, INVALID_PAGE_ID));
        Ok(TableHeap {
            buffer_pool,
            schema,
            first_page_id: page_id,
            last_page_id: Mutex::new(page_id),
        })
    }

    /// Reopens a heap whose first page already exists on disk.
    pub fn open(buffer_pool: Arc<BufferPoolManager>, schema: Schema, first_page_id: PageId) -> DbResult<Self> {
        let mut page_id = first_page_id;
        loop {
            let guard = buffer_pool.fetch_page(page_id)?;
            let next = guard.with(|bytes| TablePageReader::new(bytes).next_page_id());
            if next == INVALID_PAGE_ID {
                break;
            }
            page_id = next;
        }
        Ok(TableHeap {
            buffer_pool,
            schema,
            first_page_id,
            last_page_id: Mutex::new(page_id),
        })
    }

    pub fn first_page_id(&self) -> PageId {
        self.first_page_id
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// `row`'s own `row_id` field is ignored on input (its final value isn't
    /// known until a slot is claimed) and the stored tuple's row-id prefix
    /// is patched to the real `(page_id, slot_num)` once `insert_tuple`
    /// returns it.
    pub fn insert_row(&self, row: &Row) -> DbResult<RowId> {
        let mut data = row.encode_with_schema(&self.schema)?;
        let max_tuple_size = self.buffer_pool_page_size().saturating_sub(TABLE_PAGE_HEADER_SIZE + 8);
        if data.len() > max_tuple_size {
            return Err(DbError::capacity(format!(
                "row of {} bytes cannot fit on an empty page (max {})",
                data.len(),
                max_tuple_size
            )));
        }

        loop {
            let current = *self.last_page_id.lock().unwrap();
            let guard = self.buffer_pool.fetch_page(current)?;
            let slot = guard.with_mut(|bytes| TablePage::new(bytes).insert_tuple(&data));
            if let Some(slot_num) = slot {
                data[0..4].copy_from_slice(&current.to_le_bytes());
                data[4..8].copy_from_slice(&slot_num.to_le_bytes());
                guard.with_mut(|bytes| TablePage::new(bytes).update_tuple(slot_num, &data));
                return Ok(RowId::new(current, slot_num));
            }
            drop(guard);
            self.append_page(current)?;
        }
    }

    fn buffer_pool_page_size(&self) -> usize {
        // A page freshly fetched always reports its full length.
        let guard = self.buffer_pool.fetch_page(self.first_page_id).expect("first page always exists");
        guard.with(|bytes| bytes.len())
    }

    fn append_page(&self, after: PageId) -> DbResult<()> {
        let new_guard = self.buffer_pool.new_page()?;
        let new_page_id = new_guard.page_id();
        new_guard.with_mut(|bytes| TablePage::new(bytes).init(new_page_id, after));
        drop(new_guard);

        let old_guard = self.buffer_pool.fetch_page(after)?;
        old_guard.with_mut(|bytes| TablePage::new(bytes).set_next_page_id(new_page_id));
        drop(old_guard);

        *self.last_page_id.lock().unwrap() = new_page_id;
        Ok(())
    }

    pub fn get_row(&self, row_id: RowId) -> DbResult<Row> {
        let guard = self.buffer_pool.fetch_page(row_id.page_id)?;
        let bytes = guard
            .with(|bytes| TablePageReader::new(bytes).get_tuple(row_id.slot_num))
            .ok_or_else(|| DbError::not_found(format!("row {} does not exist", row_id)))?;
        Row::decode_with_schema(&mut std::io::Cursor::new(bytes), &self.schema)
    }

    pub fn mark_delete(&self, row_id: RowId) -> DbResult<()> {
        let guard = self.buffer_pool.fetch_page(row_id.page_id)?;
        let ok = guard.with_mut(|bytes| TablePage::new(bytes).mark_delete(row_id.slot_num));
        if !ok {
            return Err(DbError::not_found(format!("row {} does not exist", row_id)));
        }
        Ok(())
    }

    pub fn rollback_delete(&self, row_id: RowId) -> DbResult<()> {
        let guard = self.buffer_pool.fetch_page(row_id.page_id)?;
        let ok = guard.with_mut(|bytes| TablePage::new(bytes).rollback_delete(row_id.slot_num));
        if !ok {
            return Err(DbError::not_found(format!("row {} has no pending delete", row_id)));
        }
        Ok(())
    }

    pub fn apply_delete(&self, row_id: RowId) -> DbResult<()> {
        let guard = self.buffer_pool.fetch_page(row_id.page_id)?;
        let ok = guard.with_mut(|bytes| TablePage::new(bytes).apply_delete(row_id.slot_num));
        if !ok {
            return Err(DbError::not_found(format!("row {} does not exist", row_id)));
        }
        Ok(())
    }

    /// Updates in place when the new row still fits; otherwise deletes the
    /// old slot and inserts the row fresh, possibly on a different page —
    /// callers must treat the returned [`RowId`] as authoritative.
    pub fn update_row(&self, row_id: RowId, row: &Row) -> DbResult<RowId> {
        let mut data = row.encode_with_schema(&self.schema)?;
        data[0..4].copy_from_slice(&row_id.page_id.to_le_bytes());
        data[4..8].copy_from_slice(&row_id.slot_num.to_le_bytes());
        let guard = self.buffer_pool.fetch_page(row_id.page_id)?;
        let updated = guard.with_mut(|bytes| TablePage::new(bytes).update_tuple(row_id.slot_num, &data));
        drop(guard);
        if updated {
            return Ok(row_id);
        }
        self.mark_delete(row_id)?;
        self.apply_delete(row_id)?;
        self.insert_row(row)
    }

    pub fn iter(self: &Arc<Self>) -> TableHeapIterator {
        TableHeapIterator {
            heap: self.clone(),
            page_id: self.first_page_id,
            slot: None,
        }
    }
}

/// Grounded on `original_source/src/storage/table_iterator.cpp`'s
/// `operator++` walking slot-then-page.
pub struct TableHeapIterator {
    heap: Arc<TableHeap>,
    page_id: PageId,
    slot: Option<u32>,
}

impl Iterator for TableHeapIterator {
    type Item = (RowId, Row);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.page_id == INVALID_PAGE_ID {
                return None;
            }
            let guard = self.heap.buffer_pool.fetch_page(self.page_id).ok()?;
            let next_slot = guard.with(|bytes| {
                let reader = TablePageReader::new(bytes);
                match self.slot {
                    Some(s) => reader.next_tuple_slot(s),
                    None => reader.first_tuple_slot(),
                }
            });

            match next_slot {
                Some(slot_num) => {
                    self.slot = Some(slot_num);
                    let row_id = RowId::new(self.page_id, slot_num);
                    let row = self.heap.get_row(row_id).ok()?;
                    return Some((row_id, row));
                }
                None => {
                    let next_page = guard.with(|bytes| TablePageReader::new(bytes).next_page_id());
                    drop(guard);
                    self.page_id = next_page;
                    self.slot = None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Column, ColumnType, Field};
    use crate::storage::disk_manager::DiskManager;
    use crate::types::RowId;
    use tempfile::NamedTempFile;

    fn heap(page_size: usize) -> Arc<TableHeap> {
        let f = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::with_page_size(f.path(), page_size).unwrap());
        let bp = BufferPoolManager::new(dm, 8);
        let schema = Schema::new(vec![
            Column::new("id", ColumnType::Int32).not_null(),
            Column::new("name", ColumnType::FixedChar(32)),
        ])
        .unwrap();
        Arc::new(TableHeap::create(bp, schema).unwrap())
    }

    /// The row-id prefix doesn't matter here: `insert_row` overwrites it
    /// with the real `(page_id, slot_num)` once a slot is claimed.
    fn row(id: i32, name: &str) -> Row {
        Row::new(RowId::invalid(), vec![Field::Int32(id), Field::Chars(name.into())])
    }

    #[test]
    fn insert_then_get() {
        let heap = heap(256);
        let row_id = heap.insert_row(&row(1, "alice")).unwrap();
        assert_eq!(heap.get_row(row_id).unwrap(), row(1, "alice"));
    }

    #[test]
    fn delete_then_get_fails() {
        let heap = heap(256);
        let row_id = heap.insert_row(&row(1, "alice")).unwrap();
        heap.mark_delete(row_id).unwrap();
        assert!(heap.get_row(row_id).is_err());
    }

    #[test]
    fn inserting_past_one_page_spills_to_a_new_page() {
        let heap = heap(128);
        let mut ids = Vec::new();
        for i in 0..30 {
            ids.push(heap.insert_row(&row(i, "row")).unwrap());
        }
        let pages: std::collections::HashSet<PageId> = ids.iter().map(|r| r.page_id).collect();
        assert!(pages.len() > 1);
        for (i, row_id) in ids.iter().enumerate() {
            assert_eq!(heap.get_row(*row_id).unwrap(), row(i as i32, "row"));
        }
    }

    #[test]
    fn iterator_visits_every_live_row_in_order() {
        let heap = heap(128);
        for i in 0..10 {
            heap.insert_row(&row(i, "row")).unwrap();
        }
        let collected: Vec<i32> = heap
            .iter()
            .map(|(_, r)| match r.fields[0] {
                Field::Int32(v) => v,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(collected, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn iterator_skips_deleted_rows() {
        let heap = heap(256);
        let a = heap.insert_row(&row(1, "a")).unwrap();
        let _b = heap.insert_row(&row(2, "b")).unwrap();
        heap.mark_delete(a).unwrap();
        let collected: Vec<i32> = heap
            .iter()
            .map(|(_, r)| match r.fields[0] {
                Field::Int32(v) => v,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(collected, vec![2]);
    }

    /// Unlike a variable-length field, a `FixedChar` always serializes to
    /// the same number of bytes regardless of the string's content — the
    /// only way an update grows a row is a null field turning non-null.
    #[test]
    fn update_that_fills_in_a_null_field_may_relocate() {
        let heap = heap(128);
        let null_name = Row::new(RowId::invalid(), vec![Field::Int32(1), Field::Null]);
        let row_id = heap.insert_row(&null_name).unwrap();
        for i in 2..6 {
            heap.insert_row(&row(i, "row")).unwrap();
        }
        let new_id = heap.update_row(row_id, &row(1, "a name")).unwrap();
        assert_eq!(heap.get_row(new_id).unwrap().fields[1], Field::Chars("a name".into()));
    }
}
