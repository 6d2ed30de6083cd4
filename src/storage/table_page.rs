//! Slotted table page layout (spec.md §3 "Table page", §4.4).
//!
//! Grounded on `original_source/src/page/table_page.cpp`
//! (`Init`/`InsertTuple`/`MarkDelete`/`UpdateTuple`/`ApplyDelete`/
//! `RollbackDelete`/`GetTuple`/`GetFirstTupleRid`/`GetNextTupleRid`).
//! Tuples are packed against the bottom of the page; the slot directory
//! grows from the header downward. A slot's `size` high bit marks a
//! tombstoned (deleted-but-not-yet-compacted) tuple, matching the
//! original's `IsDeleted`/`SetDeleted` bit trick on its size field.

use crate::types::{PageId, INVALID_PAGE_ID};

pub const TABLE_PAGE_HEADER_SIZE: usize = 20;
const SLOT_SIZE: usize = 8;
const TOMBSTONE_BIT: u32 = 1 << 31;

pub struct TablePage<'a> {
    bytes: &'a mut [u8],
}

impl<'a> TablePage<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        assert!(bytes.len() > TABLE_PAGE_HEADER_SIZE);
        TablePage { bytes }
    }

    pub fn init(&mut self, page_id: PageId, prev_page_id: PageId) {
        self.set_page_id(page_id);
        self.set_prev_page_id(prev_page_id);
        self.set_next_page_id(INVALID_PAGE_ID);
        self.set_free_space_pointer(self.bytes.len() as u32);
        self.set_tuple_count(0);
    }

    pub fn page_id(&self) -> PageId {
        i32::from_le_bytes(self.bytes[0..4].try_into().unwrap())
    }

    fn set_page_id(&mut self, v: PageId) {
        self.bytes[0..4].copy_from_slice(&v.to_le_bytes());
    }

    pub fn prev_page_id(&self) -> PageId {
        i32::from_le_bytes(self.bytes[4..8].try_into().unwrap())
    }

    pub fn set_prev_page_id(&mut self, v: PageId) {
        self.bytes[4..8].copy_from_slice(&v.to_le_bytes());
    }

    pub fn next_page_id(&self) -> PageId {
        i32::from_le_bytes(self.bytes[8..12].try_into().unwrap())
    }

    pub fn set_next_page_id(&mut self, v: PageId) {
        self.bytes[8..12].copy_from_slice(&v.to_le_bytes());
    }

    fn free_space_pointer(&self) -> u32 {
        u32::from_le_bytes(self.bytes[12..16].try_into().unwrap())
    }

    fn set_free_space_pointer(&mut self, v: u32) {
        self.bytes[12..16].copy_from_slice(&v.to_le_bytes());
    }

    pub fn tuple_count(&self) -> u32 {
        u32::from_le_bytes(self.bytes[16..20].try_into().unwrap())
    }

    fn set_tuple_count(&mut self, v: u32) {
        self.bytes[16..20].copy_from_slice(&v.to_le_bytes());
    }

    fn slot_offset(slot_num: u32) -> usize {
        TABLE_PAGE_HEADER_SIZE + slot_num as usize * SLOT_SIZE
    }

    fn slot_dir_end(&self) -> usize {
        Self::slot_offset(self.tuple_count())
    }

    fn raw_slot_size(&self, slot_num: u32) -> u32 {
        let off = Self::slot_offset(slot_num) + 4;
        u32::from_le_bytes(self.bytes[off..off + 4].try_into().unwrap())
    }

    fn set_raw_slot(&mut self, slot_num: u32, offset: u32, raw_size: u32) {
        let off = Self::slot_offset(slot_num);
        self.bytes[off..off + 4].copy_from_slice(&offset.to_le_bytes());
        self.bytes[off + 4..off + 8].copy_from_slice(&raw_size.to_le_bytes());
    }

    fn slot_tuple_offset(&self, slot_num: u32) -> u32 {
        let off = Self::slot_offset(slot_num);
        u32::from_le_bytes(self.bytes[off..off + 4].try_into().unwrap())
    }

    pub fn is_deleted(&self, slot_num: u32) -> bool {
        self.raw_slot_size(slot_num) & TOMBSTONE_BIT != 0
    }

    fn tuple_size(&self, slot_num: u32) -> u32 {
        self.raw_slot_size(slot_num) & !TOMBSTONE_BIT
    }

    /// Packs `data` against the current bottom of free space, reusing the
    /// first recycled slot (size 0, left by `apply_delete`) if one exists
    /// rather than always appending a new slot. Returns `None` if the
    /// tuple doesn't fit.
    pub fn insert_tuple(&mut self, data: &[u8]) -> Option<u32> {
        let reused = (0..self.tuple_count()).find(|&s| self.tuple_size(s) == 0);
        let extra_dir_entry = if reused.is_none() { SLOT_SIZE } else { 0 };
        let free_ptr = self.free_space_pointer() as usize;
        if self.slot_dir_end() + extra_dir_entry + data.len() > free_ptr {
            return None;
        }

        let new_free_ptr = free_ptr - data.len();
        self.bytes[new_free_ptr..free_ptr].copy_from_slice(data);
        self.set_free_space_pointer(new_free_ptr as u32);

        let slot_num = reused.unwrap_or_else(|| self.tuple_count());
        self.set_raw_slot(slot_num, new_free_ptr as u32, data.len() as u32);
        if reused.is_none() {
            self.set_tuple_count(slot_num + 1);
        }
        Some(slot_num)
    }

    pub fn get_tuple(&self, slot_num: u32) -> Option<Vec<u8>> {
        if slot_num >= self.tuple_count() || self.is_deleted(slot_num) {
            return None;
        }
        let offset = self.slot_tuple_offset(slot_num) as usize;
        let size = self.tuple_size(slot_num) as usize;
        Some(self.bytes[offset..offset + size].to_vec())
    }

    /// Flags a tuple as logically deleted without reclaiming its bytes —
    /// `apply_delete` (on commit) or `rollback_delete` (on abort) resolve
    /// it later, mirroring the original's two-phase delete protocol used
    /// to keep deletes undoable until the owning transaction commits.
    pub fn mark_delete(&mut self, slot_num: u32) -> bool {
        if slot_num >= self.tuple_count() || self.is_deleted(slot_num) {
            return false;
        }
        let raw = self.raw_slot_size(slot_num) | TOMBSTONE_BIT;
        let off = Self::slot_offset(slot_num) + 4;
        self.bytes[off..off + 4].copy_from_slice(&raw.to_le_bytes());
        true
    }

    pub fn rollback_delete(&mut self, slot_num: u32) -> bool {
        if slot_num >= self.tuple_count() || !self.is_deleted(slot_num) {
            return false;
        }
        let raw = self.raw_slot_size(slot_num) & !TOMBSTONE_BIT;
        let off = Self::slot_offset(slot_num) + 4;
        self.bytes[off..off + 4].copy_from_slice(&raw.to_le_bytes());
        true
    }

    /// Permanently reclaims a tombstoned slot's storage: shifts every
    /// tuple packed before it (lower slot-dir address, higher byte
    /// address, inserted earlier) up to close the hole, then zeros the
    /// slot's size so `insert_tuple` can reuse it.
    pub fn apply_delete(&mut self, slot_num: u32) -> bool {
        if slot_num >= self.tuple_count() {
            return false;
        }
        let tuple_size = self.tuple_size(slot_num) as usize;
        if tuple_size == 0 {
            return false;
        }
        let tuple_offset = self.slot_tuple_offset(slot_num) as usize;
        let free_ptr = self.free_space_pointer() as usize;

        self.bytes.copy_within(free_ptr..tuple_offset, free_ptr + tuple_size);
        self.set_free_space_pointer((free_ptr + tuple_size) as u32);
        self.set_raw_slot(slot_num, 0, 0);

        for s in 0..self.tuple_count() {
            if s == slot_num || self.tuple_size(s) == 0 {
                continue;
            }
            let o = self.slot_tuple_offset(s) as usize;
            if o < tuple_offset {
                self.set_raw_slot(s, (o + tuple_size) as u32, self.raw_slot_size(s));
            }
        }
        true
    }

    /// Replaces a live tuple's bytes in place. Fails (returns `false`)
    /// if the new payload is larger than the old one and there's no room
    /// to grow into — callers must then delete-and-reinsert, possibly on
    /// a different page.
    pub fn update_tuple(&mut self, slot_num: u32, data: &[u8]) -> bool {
        if slot_num >= self.tuple_count() || self.is_deleted(slot_num) {
            return false;
        }
        let old_size = self.tuple_size(slot_num) as usize;
        if data.len() <= old_size {
            let offset = self.slot_tuple_offset(slot_num) as usize;
            let shift = old_size - data.len();
            if shift > 0 {
                let free_ptr = self.free_space_pointer() as usize;
                let new_free_ptr = free_ptr + shift;
                // Slide every tuple packed below this one (lower address,
                // inserted later) up by `shift` to close the gap the
                // shrink just opened, keeping the occupied region
                // contiguous against the slot directory.
                self.bytes.copy_within(free_ptr..offset, new_free_ptr);
                self.set_free_space_pointer(new_free_ptr as u32);

                for s in 0..self.tuple_count() {
                    if s == slot_num {
                        continue;
                    }
                    let o = self.slot_tuple_offset(s) as usize;
                    if o < offset {
                        self.set_raw_slot(s, (o + shift) as u32, self.raw_slot_size(s));
                    }
                }
            }
            let new_offset = offset + shift;
            self.bytes[new_offset..new_offset + data.len()].copy_from_slice(data);
            self.set_raw_slot(slot_num, new_offset as u32, data.len() as u32);
            return true;
        }

        let grow = data.len() - old_size;
        let free_ptr = self.free_space_pointer() as usize;
        if free_ptr < grow || free_ptr - grow < self.slot_dir_end() {
            return false;
        }
        let offset = self.slot_tuple_offset(slot_num) as usize;
        let new_free_ptr = free_ptr - grow;
        // Slide every tuple packed below this one down by `grow` bytes to
        // make room, then relocate this tuple to the new free boundary.
        if new_free_ptr < offset {
            self.bytes.copy_within(new_free_ptr + grow..offset, new_free_ptr);
        }
        let new_offset = offset - grow;
        self.bytes[new_offset..new_offset + data.len()].copy_from_slice(data);
        self.set_free_space_pointer(new_free_ptr as u32);
        self.set_raw_slot(slot_num, new_offset as u32, data.len() as u32);

        for s in 0..self.tuple_count() {
            if s == slot_num {
                continue;
            }
            let o = self.slot_tuple_offset(s);
            if (o as usize) < offset {
                self.set_raw_slot(s, o - grow as u32, self.raw_slot_size(s));
            }
        }
        true
    }

    pub fn first_tuple_slot(&self) -> Option<u32> {
        (0..self.tuple_count()).find(|&s| !self.is_deleted(s))
    }

    pub fn next_tuple_slot(&self, after: u32) -> Option<u32> {
        (after + 1..self.tuple_count()).find(|&s| !self.is_deleted(s))
    }

    pub fn free_bytes(&self) -> usize {
        self.free_space_pointer() as usize - self.slot_dir_end()
    }
}

/// A read-only view over the same layout, for callers that only hold an
/// immutable byte slice (e.g. [`crate::storage::buffer_pool::PageGuard::with`]).
pub struct TablePageReader<'a> {
    bytes: &'a [u8],
}

impl<'a> TablePageReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        TablePageReader { bytes }
    }

    pub fn page_id(&self) -> PageId {
        i32::from_le_bytes(self.bytes[0..4].try_into().unwrap())
    }

    pub fn prev_page_id(&self) -> PageId {
        i32::from_le_bytes(self.bytes[4..8].try_into().unwrap())
    }

    pub fn next_page_id(&self) -> PageId {
        i32::from_le_bytes(self.bytes[8..12].try_into().unwrap())
    }

    pub fn tuple_count(&self) -> u32 {
        u32::from_le_bytes(self.bytes[16..20].try_into().unwrap())
    }

    fn raw_slot_size(&self, slot_num: u32) -> u32 {
        let off = TablePage::slot_offset(slot_num) + 4;
        u32::from_le_bytes(self.bytes[off..off + 4].try_into().unwrap())
    }

    fn slot_tuple_offset(&self, slot_num: u32) -> u32 {
        let off = TablePage::slot_offset(slot_num);
        u32::from_le_bytes(self.bytes[off..off + 4].try_into().unwrap())
    }

    pub fn is_deleted(&self, slot_num: u32) -> bool {
        self.raw_slot_size(slot_num) & TOMBSTONE_BIT != 0
    }

    fn tuple_size(&self, slot_num: u32) -> u32 {
        self.raw_slot_size(slot_num) & !TOMBSTONE_BIT
    }

    pub fn get_tuple(&self, slot_num: u32) -> Option<Vec<u8>> {
        if slot_num >= self.tuple_count() || self.is_deleted(slot_num) {
            return None;
        }
        let offset = self.slot_tuple_offset(slot_num) as usize;
        let size = self.tuple_size(slot_num) as usize;
        Some(self.bytes[offset..offset + size].to_vec())
    }

    pub fn first_tuple_slot(&self) -> Option<u32> {
        (0..self.tuple_count()).find(|&s| !self.is_deleted(s))
    }

    pub fn next_tuple_slot(&self, after: u32) -> Option<u32> {
        (after + 1..self.tuple_count()).find(|&s| !self.is_deleted(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(size: usize) -> Vec<u8> {
        vec![0u8; size]
    }

    #[test]
    fn insert_then_get_round_trips() {
        let mut buf = page(256);
        let mut p = TablePage::new(&mut buf);
        p.init(1, INVALID_PAGE_ID);
        let slot = p.insert_tuple(b"hello").unwrap();
        assert_eq!(p.get_tuple(slot).unwrap(), b"hello");
    }

    #[test]
    fn delete_then_get_returns_none() {
        let mut buf = page(256);
        let mut p = TablePage::new(&mut buf);
        p.init(1, INVALID_PAGE_ID);
        let slot = p.insert_tuple(b"hello").unwrap();
        assert!(p.mark_delete(slot));
        assert!(p.get_tuple(slot).is_none());
    }

    #[test]
    fn rollback_restores_deleted_tuple() {
        let mut buf = page(256);
        let mut p = TablePage::new(&mut buf);
        p.init(1, INVALID_PAGE_ID);
        let slot = p.insert_tuple(b"hello").unwrap();
        p.mark_delete(slot);
        p.rollback_delete(slot);
        assert_eq!(p.get_tuple(slot).unwrap(), b"hello");
    }

    #[test]
    fn update_with_smaller_payload_shrinks_in_place() {
        let mut buf = page(256);
        let mut p = TablePage::new(&mut buf);
        p.init(1, INVALID_PAGE_ID);
        let slot = p.insert_tuple(b"hello world").unwrap();
        assert!(p.update_tuple(slot, b"hi"));
        assert_eq!(p.get_tuple(slot).unwrap(), b"hi");
    }

    #[test]
    fn update_with_larger_payload_grows_when_room_exists() {
        let mut buf = page(256);
        let mut p = TablePage::new(&mut buf);
        p.init(1, INVALID_PAGE_ID);
        let slot = p.insert_tuple(b"hi").unwrap();
        assert!(p.update_tuple(slot, b"hello world"));
        assert_eq!(p.get_tuple(slot).unwrap(), b"hello world");
    }

    #[test]
    fn insert_fails_once_page_is_full() {
        let mut buf = page(64);
        let mut p = TablePage::new(&mut buf);
        p.init(1, INVALID_PAGE_ID);
        let mut count = 0;
        while p.insert_tuple(b"0123456789").is_some() {
            count += 1;
        }
        assert!(count > 0);
        assert!(p.insert_tuple(b"0123456789").is_none());
    }

    #[test]
    fn apply_delete_closes_the_hole_and_keeps_other_tuples_readable() {
        let mut buf = page(256);
        let mut p = TablePage::new(&mut buf);
        p.init(1, INVALID_PAGE_ID);
        let a = p.insert_tuple(b"aaaa").unwrap();
        let b = p.insert_tuple(b"bbbb").unwrap();
        let c = p.insert_tuple(b"cccc").unwrap();
        let free_before = p.free_bytes();

        p.mark_delete(b);
        assert!(p.apply_delete(b));

        assert_eq!(p.get_tuple(a).unwrap(), b"aaaa");
        assert_eq!(p.get_tuple(c).unwrap(), b"cccc");
        assert!(p.get_tuple(b).is_none());
        assert_eq!(p.free_bytes(), free_before + 4);
    }

    #[test]
    fn insert_tuple_reuses_a_slot_reclaimed_by_apply_delete() {
        let mut buf = page(256);
        let mut p = TablePage::new(&mut buf);
        p.init(1, INVALID_PAGE_ID);
        let a = p.insert_tuple(b"aaaa").unwrap();
        let b = p.insert_tuple(b"bbbb").unwrap();
        p.mark_delete(b);
        p.apply_delete(b);

        let count_before = p.tuple_count();
        let reused = p.insert_tuple(b"zzzz").unwrap();
        assert_eq!(reused, b);
        assert_eq!(p.tuple_count(), count_before);
        assert_eq!(p.get_tuple(a).unwrap(), b"aaaa");
        assert_eq!(p.get_tuple(reused).unwrap(), b"zzzz");
    }

    #[test]
    fn iteration_skips_deleted_slots() {
        let mut buf = page(256);
        let mut p = TablePage::new(&mut buf);
        p.init(1, INVALID_PAGE_ID);
        let a = p.insert_tuple(b"a").unwrap();
        let b = p.insert_tuple(b"b").unwrap();
        let c = p.insert_tuple(b"c").unwrap();
        p.mark_delete(b);

        let first = p.first_tuple_slot().unwrap();
        assert_eq!(first, a);
        let next = p.next_tuple_slot(first).unwrap();
        assert_eq!(next, c);
    }
}
