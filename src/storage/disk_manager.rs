//! Disk manager: owns the backing file, allocates/frees logical pages
//! through bitmap extents, and translates logical to physical page ids
//! (spec.md §4.1, §6).
//!
//! Grounded on `original_source/src/storage/disk_manager.cpp`
//! (`AllocatePage`/`DeAllocatePage`/`MapPageId`/`ReadPhysicalPage`).

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

use log::debug;

use crate::error::{DbError, DbResult};
use crate::storage::bitmap::BitmapPage;
use crate::storage::meta::DiskMetaPage;
use crate::types::{PageId, PAGE_SIZE};

/// Physical page 0 is always the disk meta page (spec.md §6).
const META_PHYSICAL_PAGE: u64 = 0;

struct Inner {
    file: File,
    /// The meta page's bytes, kept resident and flushed on every mutation
    /// — it's small and touched on every allocate/deallocate.
    meta: Vec<u8>,
}

/// A single backing file's page allocator. `page_size` is a runtime
/// parameter (not the crate-wide [`PAGE_SIZE`] constant) so tests can use
/// a small extent capacity `B` and exercise "extent nearly full" scenarios
/// without allocating tens of thousands of pages (spec.md §8).
pub struct DiskManager {
    inner: Mutex<Inner>,
    page_size: usize,
}

impl DiskManager {
    pub fn new<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        Self::with_page_size(path, PAGE_SIZE)
    }

    pub fn with_page_size<P: AsRef<Path>>(path: P, page_size: usize) -> DbResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let mut dm = DiskManager {
            inner: Mutex::new(Inner {
                file,
                meta: vec![0u8; page_size],
            }),
            page_size,
        };
        dm.load_or_init_meta()?;
        Ok(dm)
    }

    fn load_or_init_meta(&mut self) -> DbResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let file_len = inner.file.metadata()?.len();
        if file_len >= self.page_size as u64 {
            read_physical(&mut inner.file, META_PHYSICAL_PAGE, &mut inner.meta, self.page_size)?;
        } else {
            // brand new file: meta stays zeroed, persist it immediately so
            // `is_free`/reads on a fresh file see a consistent layout.
            write_physical(&mut inner.file, META_PHYSICAL_PAGE, &inner.meta)?;
        }
        Ok(())
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    fn extent_capacity(&self) -> usize {
        BitmapPage::max_supported_size(self.page_size)
    }

    /// `bitmap@1+E*(B+1)`, `data@1+E*(B+1)+1+O` (spec.md §3).
    fn map_page_id(&self, logical: PageId) -> (u64, u64, usize, usize) {
        let b = self.extent_capacity() as u32;
        let extent = logical as u32 / b;
        let offset = logical as u32 % b;
        let bitmap_physical = 1 + extent as u64 * (b as u64 + 1);
        let data_physical = bitmap_physical + 1 + offset as u64;
        (bitmap_physical, data_physical, extent as usize, offset as usize)
    }

    pub fn allocate_page(&self) -> DbResult<PageId> {
        let mut inner = self.inner.lock().unwrap();
        let page_size = self.page_size;
        let b = self.extent_capacity() as u32;

        let mut meta = DiskMetaPage::new(&mut inner.meta);
        let mut extent_count = meta.extent_count();
        let mut extent_id = 0u32;
        while extent_id < extent_count && meta.extent_used(extent_id) as usize == b as usize {
            extent_id += 1;
        }

        let bitmap_physical = 1 + extent_id as u64 * (b as u64 + 1);

        if extent_id == extent_count {
            // every existing extent is full: grow the file with a fresh
            // bitmap page.
            let mut fresh = vec![0u8; page_size];
            {
                let mut bm = BitmapPage::new(&mut fresh);
                bm.reset();
            }
            write_physical(&mut inner.file, bitmap_physical, &fresh)?;
            meta.set_extent_used(extent_id, 0);
            extent_count += 1;
            meta.set_extent_count(extent_count);
        }

        let mut bitmap_bytes = vec![0u8; page_size];
        read_physical(&mut inner.file, bitmap_physical, &mut bitmap_bytes, page_size)?;
        let offset = {
            let mut bm = BitmapPage::new(&mut bitmap_bytes);
            bm.allocate_page()
                .ok_or_else(|| DbError::capacity("bitmap extent unexpectedly full"))?
        };
        write_physical(&mut inner.file, bitmap_physical, &bitmap_bytes)?;

        let used = meta.extent_used(extent_id) + 1;
        meta.set_extent_used(extent_id, used);
        meta.set_total_allocated(meta.total_allocated() + 1);
        let meta_bytes = inner.meta.clone();
        write_physical(&mut inner.file, META_PHYSICAL_PAGE, &meta_bytes)?;

        let logical = extent_id * b + offset as u32;
        debug!("allocate_page -> {}", logical);
        Ok(logical as PageId)
    }

    pub fn deallocate_page(&self, logical: PageId) -> DbResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let page_size = self.page_size;
        let (bitmap_physical, _, extent_id, offset) = self.map_page_id(logical);

        let mut bitmap_bytes = vec![0u8; page_size];
        read_physical(&mut inner.file, bitmap_physical, &mut bitmap_bytes, page_size)?;
        let freed = {
            let mut bm = BitmapPage::new(&mut bitmap_bytes);
            bm.deallocate_page(offset)
        };
        if !freed {
            // already free: idempotent no-op, tolerates recovery replay.
            return Ok(());
        }
        write_physical(&mut inner.file, bitmap_physical, &bitmap_bytes)?;

        let mut meta = DiskMetaPage::new(&mut inner.meta);
        meta.set_total_allocated(meta.total_allocated() - 1);
        let used = meta.extent_used(extent_id as u32);
        meta.set_extent_used(extent_id as u32, used - 1);
        let meta_bytes = inner.meta.clone();
        write_physical(&mut inner.file, META_PHYSICAL_PAGE, &meta_bytes)?;
        Ok(())
    }

    pub fn is_free(&self, logical: PageId) -> DbResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        let page_size = self.page_size;
        let (bitmap_physical, _, _, offset) = self.map_page_id(logical);
        let mut bitmap_bytes = vec![0u8; page_size];
        read_physical(&mut inner.file, bitmap_physical, &mut bitmap_bytes, page_size)?;
        let bm = BitmapPage::new(&mut bitmap_bytes);
        Ok(bm.is_page_free(offset))
    }

    pub fn read_page(&self, logical: PageId, buf: &mut [u8]) -> DbResult<()> {
        assert!(logical >= 0, "invalid logical page id");
        let mut inner = self.inner.lock().unwrap();
        let (_, data_physical, _, _) = self.map_page_id(logical);
        read_physical(&mut inner.file, data_physical, buf, self.page_size)
    }

    pub fn write_page(&self, logical: PageId, buf: &[u8]) -> DbResult<()> {
        assert!(logical >= 0, "invalid logical page id");
        let mut inner = self.inner.lock().unwrap();
        let (_, data_physical, _, _) = self.map_page_id(logical);
        write_physical(&mut inner.file, data_physical, buf)
    }

    /// Per-extent "pages used" snapshot, exposed for tests that assert on
    /// §8's concrete bookkeeping scenarios.
    pub fn extent_usage(&self) -> Vec<u32> {
        let inner = self.inner.lock().unwrap();
        let mut bytes = inner.meta.clone();
        let meta = DiskMetaPage::new(&mut bytes);
        (0..meta.extent_count()).map(|e| meta.extent_used(e)).collect()
    }

    pub fn extent_count(&self) -> u32 {
        let inner = self.inner.lock().unwrap();
        let mut bytes = inner.meta.clone();
        DiskMetaPage::new(&mut bytes).extent_count()
    }

    pub fn total_allocated(&self) -> u32 {
        let inner = self.inner.lock().unwrap();
        let mut bytes = inner.meta.clone();
        DiskMetaPage::new(&mut bytes).total_allocated()
    }
}

fn read_physical(file: &mut File, physical: u64, buf: &mut [u8], page_size: usize) -> DbResult<()> {
    let offset = physical * page_size as u64;
    let file_len = file.metadata()?.len();
    if offset >= file_len {
        for b in buf.iter_mut() {
            *b = 0;
        }
        return Ok(());
    }
    file.seek(SeekFrom::Start(offset))?;
    let mut read_total = 0;
    while read_total < buf.len() {
        let n = file.read(&mut buf[read_total..])?;
        if n == 0 {
            break;
        }
        read_total += n;
    }
    for b in buf.iter_mut().skip(read_total) {
        *b = 0;
    }
    Ok(())
}

fn write_physical(file: &mut File, physical: u64, buf: &[u8]) -> DbResult<()> {
    let offset = physical * buf.len() as u64;
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(buf)?;
    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn disk_manager(page_size: usize) -> DiskManager {
        let f = NamedTempFile::new().unwrap();
        DiskManager::with_page_size(f.path(), page_size).unwrap()
    }

    #[test]
    fn allocate_starts_at_zero_and_increases() {
        let dm = disk_manager(64);
        for expected in 0..20 {
            assert_eq!(dm.allocate_page().unwrap(), expected);
        }
    }

    #[test]
    fn two_full_extents() {
        let dm = disk_manager(64);
        let b = BitmapPage::max_supported_size(64) as i32;
        for i in 0..2 * b {
            assert_eq!(dm.allocate_page().unwrap(), i);
        }
        assert_eq!(dm.extent_count(), 2);
        assert_eq!(dm.extent_usage(), vec![b as u32, b as u32]);
    }

    #[test]
    fn deallocate_scenario_matches_spec() {
        let dm = disk_manager(64);
        let b = BitmapPage::max_supported_size(64) as i32;
        for i in 0..2 * b {
            assert_eq!(dm.allocate_page().unwrap(), i);
        }
        for pid in [0, b - 1, b, b + 1, b + 2] {
            dm.deallocate_page(pid).unwrap();
        }
        assert_eq!(dm.total_allocated(), (2 * b - 5) as u32);
        assert_eq!(
            dm.extent_usage(),
            vec![(b - 2) as u32, (b - 3) as u32]
        );
    }

    #[test]
    fn write_then_read_round_trips() {
        let dm = disk_manager(64);
        let pid = dm.allocate_page().unwrap();
        let mut data = vec![0u8; 64];
        for (i, b) in data.iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        dm.write_page(pid, &data).unwrap();
        let mut out = vec![0u8; 64];
        dm.read_page(pid, &mut out).unwrap();
        assert_eq!(data, out);
    }

    #[test]
    fn deallocate_already_free_is_noop() {
        let dm = disk_manager(64);
        let pid = dm.allocate_page().unwrap();
        dm.deallocate_page(pid).unwrap();
        assert!(dm.is_free(pid).unwrap());
        dm.deallocate_page(pid).unwrap();
        assert_eq!(dm.total_allocated(), 0);
    }
}
