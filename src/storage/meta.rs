//! Disk meta page (spec.md §3 "Disk meta page").
//!
//! Grounded on `original_source/src/include/page/disk_file_meta_page.h`:
//! `{num_allocated_pages_, num_extents_, extent_used_page_[]}`.

/// Header bytes: `extent_count: u32` followed by `total_allocated: u32`.
pub const META_HEADER_SIZE: usize = 8;

pub struct DiskMetaPage<'a> {
    bytes: &'a mut [u8],
}

impl<'a> DiskMetaPage<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        assert!(bytes.len() > META_HEADER_SIZE);
        DiskMetaPage { bytes }
    }

    pub fn max_extents(page_size: usize) -> usize {
        (page_size - META_HEADER_SIZE) / 4
    }

    pub fn extent_count(&self) -> u32 {
        u32::from_le_bytes(self.bytes[0..4].try_into().unwrap())
    }

    pub fn set_extent_count(&mut self, v: u32) {
        self.bytes[0..4].copy_from_slice(&v.to_le_bytes());
    }

    pub fn total_allocated(&self) -> u32 {
        u32::from_le_bytes(self.bytes[4..8].try_into().unwrap())
    }

    pub fn set_total_allocated(&mut self, v: u32) {
        self.bytes[4..8].copy_from_slice(&v.to_le_bytes());
    }

    fn entry_offset(extent_id: u32) -> usize {
        META_HEADER_SIZE + extent_id as usize * 4
    }

    pub fn extent_used(&self, extent_id: u32) -> u32 {
        let off = Self::entry_offset(extent_id);
        u32::from_le_bytes(self.bytes[off..off + 4].try_into().unwrap())
    }

    pub fn set_extent_used(&mut self, extent_id: u32, used: u32) {
        let off = Self::entry_offset(extent_id);
        self.bytes[off..off + 4].copy_from_slice(&used.to_le_bytes());
    }
}
