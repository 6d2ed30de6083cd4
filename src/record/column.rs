//! Column definitions (spec.md §3 "Schema", §4.5, §6 "Column serialization").
//!
//! Grounded on the teacher's `storage/schema/types.rs` (`Type::{Bool,
//! Int64, Float64, Bytes(u8)}`) for the overall shape of a closed type enum
//! with variable-length payloads, and `original_source/src/record/column.cpp`
//! (`Column{name_, type_, len_, table_ind_, nullable_, unique_}`) for the
//! exact field set and wire layout.

use std::io::Read;

use crate::error::{DbError, DbResult};
use crate::io::{read_exact, ByteWriter, Decodeable, Encodeable};

pub const COLUMN_MAGIC: u32 = 0x434f_4c21; // "COL!"

/// A column's storage type: the closed set spec.md §3 names, `Int32`,
/// `Float32`, and `FixedChar(length)` where `length` is the declared
/// character count (only meaningful for `FixedChar`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int32,
    Float32,
    FixedChar(u32),
}

impl ColumnType {
    /// Fixed-width types report their exact encoded size; `FixedChar`'s
    /// width is the declared length, since it's padded/truncated to that
    /// many bytes rather than length-prefixed.
    pub fn fixed_size(&self) -> usize {
        match self {
            ColumnType::Int32 => 4,
            ColumnType::Float32 => 4,
            ColumnType::FixedChar(len) => *len as usize,
        }
    }

    fn tag(&self) -> u32 {
        match self {
            ColumnType::Int32 => 0,
            ColumnType::Float32 => 1,
            ColumnType::FixedChar(_) => 2,
        }
    }

    fn length_field(&self) -> u32 {
        match self {
            ColumnType::FixedChar(len) => *len,
            _ => 0,
        }
    }

    fn from_wire(tag: u32, length: u32) -> DbResult<Self> {
        match tag {
            0 => Ok(ColumnType::Int32),
            1 => Ok(ColumnType::Float32),
            2 => Ok(ColumnType::FixedChar(length)),
            other => Err(DbError::validation(format!("unsupported column type tag {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub col_type: ColumnType,
    pub table_index: u32,
    pub nullable: bool,
    pub unique: bool,
}

impl Column {
    /// `table_index` defaults to 0; callers that build a `Schema` with
    /// `Schema::new` get it assigned from each column's position.
    pub fn new(name: impl Into<String>, col_type: ColumnType) -> Self {
        Column {
            name: name.into(),
            col_type,
            table_index: 0,
            nullable: true,
            unique: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

impl Encodeable for Column {
    fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.write(&COLUMN_MAGIC);
        w.write(&(self.name.len() as u32));
        w.write_bytes(self.name.as_bytes());
        w.write(&self.col_type.tag());
        w.write(&self.col_type.length_field());
        w.write(&self.table_index);
        w.write(&(self.nullable as u32));
        w.write(&(self.unique as u32));
        w.into_bytes()
    }
}

impl Decodeable for Column {
    fn decode_from<R: Read>(reader: &mut R) -> Self {
        let magic = u32::decode_from(reader);
        assert_eq!(magic, COLUMN_MAGIC, "bad column magic number");
        let name_len = u32::decode_from(reader) as usize;
        let name = String::from_utf8(read_exact(reader, name_len)).expect("column name is not utf8");
        let tag = u32::decode_from(reader);
        let length = u32::decode_from(reader);
        let col_type = ColumnType::from_wire(tag, length).expect("unsupported column type tag");
        let table_index = u32::decode_from(reader);
        let nullable = u32::decode_from(reader) != 0;
        let unique = u32::decode_from(reader) != 0;
        Column {
            name,
            col_type,
            table_index,
            nullable,
            unique,
        }
    }
}

pub fn validate_name(name: &str) -> DbResult<()> {
    if name.is_empty() {
        return Err(DbError::validation("column name must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_int32_column() {
        let column = Column::new("id", ColumnType::Int32).not_null().unique();
        let bytes = column.encode();
        let decoded = Column::decode_from(&mut Cursor::new(bytes));
        assert_eq!(column, decoded);
    }

    #[test]
    fn round_trips_fixed_char_column_with_table_index() {
        let mut column = Column::new("name", ColumnType::FixedChar(16));
        column.table_index = 3;
        let bytes = column.encode();
        let decoded = Column::decode_from(&mut Cursor::new(bytes));
        assert_eq!(column, decoded);
        assert_eq!(decoded.col_type.fixed_size(), 16);
    }

    #[test]
    #[should_panic(expected = "bad column magic number")]
    fn rejects_bad_magic() {
        let mut w = ByteWriter::new();
        w.write(&0xdead_beefu32);
        Column::decode_from(&mut Cursor::new(w.into_bytes()));
    }
}
