//! Ascending range-scan cursor over a B+-tree's leaf chain.
//!
//! Grounded on `original_source/src/index/index_iterator.cpp`, which walks
//! `next_leaf` pointers rather than re-descending from the root for every
//! step.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::index::key::IndexKey;
use crate::index::leaf_page::LeafPage;
use crate::storage::buffer_pool::BufferPoolManager;
use crate::types::{PageId, RowId, INVALID_PAGE_ID};

pub struct BPlusTreeIterator<K> {
    buffer_pool: Arc<BufferPoolManager>,
    page_id: PageId,
    index: usize,
    _marker: PhantomData<K>,
}

impl<K: IndexKey> BPlusTreeIterator<K> {
    pub(crate) fn new(buffer_pool: Arc<BufferPoolManager>, start_leaf: PageId, start_index: usize) -> Self {
        BPlusTreeIterator {
            buffer_pool,
            page_id: start_leaf,
            index: start_index,
            _marker: PhantomData,
        }
    }
}

impl<K: IndexKey> Iterator for BPlusTreeIterator<K> {
    type Item = (K, RowId);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.page_id == INVALID_PAGE_ID {
                return None;
            }
            let guard = self.buffer_pool.fetch_page(self.page_id).ok()?;
            let count = guard.with(|bytes| LeafPage::<_, K>::new(bytes).key_count());

            if self.index < count {
                let item = guard.with(|bytes| {
                    let leaf = LeafPage::<_, K>::new(bytes);
                    (leaf.key_at(self.index), leaf.value_at(self.index))
                });
                self.index += 1;
                return Some(item);
            }

            let next = guard.with(|bytes| LeafPage::<_, K>::new(bytes).next_leaf());
            drop(guard);
            self.page_id = next;
            self.index = 0;
        }
    }
}
