//! The buffer pool's frame: one fixed-size byte buffer plus the metadata
//! the pool needs to decide when it can be reused (spec.md §4.2).

use crate::types::{PageId, INVALID_PAGE_ID};

pub struct Frame {
    pub bytes: Vec<u8>,
    pub page_id: PageId,
    pub pin_count: u32,
    pub dirty: bool,
}

impl Frame {
    pub fn new(page_size: usize) -> Self {
        Frame {
            bytes: vec![0u8; page_size],
            page_id: INVALID_PAGE_ID,
            pin_count: 0,
            dirty: false,
        }
    }

    pub fn reset(&mut self, page_id: PageId) {
        for b in self.bytes.iter_mut() {
            *b = 0;
        }
        self.page_id = page_id;
        self.pin_count = 0;
        self.dirty = false;
    }
}
