//! Row schema (spec.md §3 "Schema").
//!
//! Grounded on the teacher's `storage/schema/schema.rs` (`Schema{fields}`)
//! and `original_source/src/record/schema.cpp`. Every serialized form
//! carries a leading magic number so a reader can sanity-check it isn't
//! looking at unrelated bytes (spec.md §4.5), matching the teacher's
//! convention in `io.rs` of magic-prefixing on-disk structures.

use std::io::Read;

use crate::error::{DbError, DbResult};
use crate::io::{ByteWriter, Decodeable, Encodeable};
use crate::record::column::Column;

pub const SCHEMA_MAGIC: u32 = 0x5343_4852; // "SCHR"

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub columns: Vec<Column>,
}

impl Schema {
    /// Assigns each column's `table_index` from its position in `columns`,
    /// matching the original's `table_ind_` (a column's index within its
    /// owning table, used by `Row::GetKeyFromRow` to project index keys).
    pub fn new(columns: Vec<Column>) -> DbResult<Self> {
        let mut seen = std::collections::HashSet::new();
        for c in &columns {
            if !seen.insert(&c.name) {
                return Err(DbError::validation(format!("duplicate column name '{}'", c.name)));
            }
        }
        let columns = columns
            .into_iter()
            .enumerate()
            .map(|(i, mut c)| {
                c.table_index = i as u32;
                c
            })
            .collect();
        Ok(Schema { columns })
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }
}

impl Encodeable for Schema {
    fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.write(&SCHEMA_MAGIC);
        w.write(&(self.columns.len() as u32));
        for c in &self.columns {
            w.write_bytes(&c.encode());
        }
        w.into_bytes()
    }
}

impl Decodeable for Schema {
    fn decode_from<R: Read>(reader: &mut R) -> Self {
        let magic = u32::decode_from(reader);
        assert_eq!(magic, SCHEMA_MAGIC, "bad schema magic number");
        let count = u32::decode_from(reader);
        let columns = (0..count).map(|_| Column::decode_from(reader)).collect();
        Schema { columns }
    }
}
