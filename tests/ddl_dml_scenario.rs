//! End-to-end DDL + DML scenario across the catalog, table heap, and
//! B+-tree index together (spec.md §8 "End-to-end scenario (DDL + DML)").
//!
//! Deriving an index key from a column value is an executor-level
//! concern out of scope for this crate (spec.md §1), so this test drives
//! the index directly with a key built from the inserted row's `CHAR(4)`
//! value instead of going through a SQL layer.

use std::sync::Arc;

use small_db::catalog::Catalog;
use small_db::record::{Column, ColumnType, Field, Row, Schema};
use small_db::storage::buffer_pool::BufferPoolManager;
use small_db::storage::disk_manager::DiskManager;
use small_db::types::RowId;

fn schema() -> Schema {
    Schema::new(vec![
        Column::new("id", ColumnType::Int32).not_null(),
        Column::new("s", ColumnType::FixedChar(4)).unique(),
    ])
    .unwrap()
}

fn char4_key(s: &str) -> i32 {
    let mut bytes = [0u8; 4];
    let src = s.as_bytes();
    bytes[..src.len().min(4)].copy_from_slice(&src[..src.len().min(4)]);
    i32::from_le_bytes(bytes)
}

#[test]
fn create_table_index_insert_lookup_drop_index_drop_table() {
    let f = tempfile::NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::with_page_size(f.path(), 512).unwrap());
    let bp = BufferPoolManager::new(dm, 16);
    let catalog = Catalog::create(bp).unwrap();

    catalog.create_table("t", schema()).unwrap();
    catalog.create_index("s_idx", "t", 1).unwrap();

    let (_meta, heap) = catalog.get_table("t").unwrap();
    let row = Row::new(RowId::invalid(), vec![Field::Int32(1), Field::Chars("abcd".into())]);
    let row_id = heap.insert_row(&row).unwrap();

    let (_idx_meta, tree) = catalog.get_index("s_idx").unwrap();
    let key = char4_key("abcd");
    tree.insert(key, row_id).unwrap();
    assert_eq!(tree.get(key).unwrap(), Some(row_id));
    assert_eq!(heap.get_row(row_id).unwrap(), Row::new(row_id, row.fields.clone()));

    catalog.drop_index("s_idx").unwrap();
    assert!(catalog.get_table_indexes("t").unwrap().is_empty());
    assert!(catalog.get_index("s_idx").is_err());

    catalog.drop_table("t").unwrap();
    assert!(catalog.get_table("t").is_err());
}
