//! Row values (spec.md §3 "Row", §4.5, §6 "Column serialization").
//!
//! Grounded on the teacher's `storage/tuple/{tuple,cell}.rs`
//! (`Tuple{cells: Vec<Cell>}`, `Cell::{Null,Bool,Int64,Float64,String}`) for
//! the overall typed-tuple shape, and `original_source/src/record/row.cpp`
//! for the exact wire layout: `row_id` (page-id, slot-num), then one byte
//! per field marking it null, then the non-null fields' bytes in schema
//! order. Unlike `Column`/`Schema`, a `Row` carries no leading magic number
//! — `original_source`'s `Row::SerializeTo` doesn't write one either, since
//! a row is only ever deserialized with its exact byte length already known
//! from the table page's slot directory, not sniffed out of a raw stream.

use std::io::Read;

use crate::error::{DbError, DbResult};
use crate::io::{read_exact, ByteWriter, Decodeable, Encodeable};
use crate::record::column::ColumnType;
use crate::record::schema::Schema;
use crate::types::RowId;

#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Null,
    Int32(i32),
    Float32(f32),
    Chars(String),
}

impl Field {
    fn matches(&self, col_type: ColumnType) -> bool {
        matches!(
            (self, col_type),
            (Field::Null, _)
                | (Field::Int32(_), ColumnType::Int32)
                | (Field::Float32(_), ColumnType::Float32)
                | (Field::Chars(_), ColumnType::FixedChar(_))
        )
    }

    /// `FixedChar` is padded with trailing zero bytes out to the column's
    /// declared length; callers must have already checked the value fits
    /// via `Row::validate`.
    fn encode_value(&self, col_type: ColumnType) -> Vec<u8> {
        match self {
            Field::Null => Vec::new(),
            Field::Int32(v) => v.encode(),
            Field::Float32(v) => v.encode(),
            Field::Chars(s) => {
                let mut bytes = s.as_bytes().to_vec();
                bytes.resize(col_type.fixed_size(), 0);
                bytes
            }
        }
    }

    fn decode_value<R: Read>(reader: &mut R, col_type: ColumnType) -> Self {
        match col_type {
            ColumnType::Int32 => Field::Int32(i32::decode_from(reader)),
            ColumnType::Float32 => Field::Float32(f32::decode_from(reader)),
            ColumnType::FixedChar(len) => {
                let bytes = read_exact(reader, len as usize);
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                Field::Chars(String::from_utf8(bytes[..end].to_vec()).expect("fixed char field is not utf8"))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub row_id: RowId,
    pub fields: Vec<Field>,
}

impl Row {
    pub fn new(row_id: RowId, fields: Vec<Field>) -> Self {
        Row { row_id, fields }
    }

    /// Checks `self` against `schema`: field count, nullability, type per
    /// column, and that any `FixedChar` value fits in its declared length.
    pub fn validate(&self, schema: &Schema) -> DbResult<()> {
        if self.fields.len() != schema.column_count() {
            return Err(DbError::validation(format!(
                "row has {} fields, schema expects {}",
                self.fields.len(),
                schema.column_count()
            )));
        }
        for (field, column) in self.fields.iter().zip(schema.columns.iter()) {
            if matches!(field, Field::Null) && !column.nullable {
                return Err(DbError::validation(format!(
                    "column '{}' is not nullable",
                    column.name
                )));
            }
            if !field.matches(column.col_type) {
                return Err(DbError::validation(format!(
                    "column '{}' received a value of the wrong type",
                    column.name
                )));
            }
            if let (Field::Chars(s), ColumnType::FixedChar(len)) = (field, column.col_type) {
                if s.len() > len as usize {
                    return Err(DbError::validation(format!(
                        "column '{}' value is longer than its declared length {}",
                        column.name, len
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn encode_with_schema(&self, schema: &Schema) -> DbResult<Vec<u8>> {
        self.validate(schema)?;
        let mut w = ByteWriter::new();
        w.write(&self.row_id.page_id);
        w.write(&self.row_id.slot_num);
        for field in &self.fields {
            w.write(&(matches!(field, Field::Null) as u8));
        }
        for (field, column) in self.fields.iter().zip(schema.columns.iter()) {
            if !matches!(field, Field::Null) {
                w.write_bytes(&field.encode_value(column.col_type));
            }
        }
        Ok(w.into_bytes())
    }

    pub fn decode_with_schema<R: Read>(reader: &mut R, schema: &Schema) -> DbResult<Self> {
        let page_id = i32::decode_from(reader);
        let slot_num = u32::decode_from(reader);
        let row_id = RowId::new(page_id, slot_num);

        let mut nulls = Vec::with_capacity(schema.column_count());
        for _ in 0..schema.column_count() {
            nulls.push(u8::decode_from(reader) != 0);
        }

        let mut fields = Vec::with_capacity(schema.column_count());
        for (i, is_null) in nulls.into_iter().enumerate() {
            let column = schema
                .column(i)
                .ok_or_else(|| DbError::validation("row has more fields than schema"))?;
            if is_null {
                fields.push(Field::Null);
            } else {
                fields.push(Field::decode_value(reader, column.col_type));
            }
        }
        Ok(Row { row_id, fields })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::column::Column;
    use std::io::Cursor;

    fn schema() -> Schema {
        Schema::new(vec![
            Column::new("id", ColumnType::Int32).not_null(),
            Column::new("name", ColumnType::FixedChar(8)),
            Column::new("score", ColumnType::Float32),
        ])
        .unwrap()
    }

    #[test]
    fn round_trips_with_a_null_field() {
        let schema = schema();
        let row = Row::new(
            RowId::new(4, 2),
            vec![Field::Int32(7), Field::Null, Field::Float32(3.5)],
        );
        let bytes = row.encode_with_schema(&schema).unwrap();
        let decoded = Row::decode_with_schema(&mut Cursor::new(bytes), &schema).unwrap();
        assert_eq!(row, decoded);
    }

    #[test]
    fn fixed_char_field_round_trips_without_the_padding() {
        let schema = schema();
        let row = Row::new(
            RowId::new(1, 0),
            vec![Field::Int32(1), Field::Chars("hi".into()), Field::Null],
        );
        let bytes = row.encode_with_schema(&schema).unwrap();
        assert_eq!(bytes.len(), 4 + 4 + 3 + 4 + 8);
        let decoded = Row::decode_with_schema(&mut Cursor::new(bytes), &schema).unwrap();
        assert_eq!(decoded.fields[1], Field::Chars("hi".into()));
    }

    #[test]
    fn rejects_null_in_not_null_column() {
        let schema = schema();
        let row = Row::new(RowId::new(1, 0), vec![Field::Null, Field::Null, Field::Float32(1.0)]);
        assert!(row.encode_with_schema(&schema).is_err());
    }

    #[test]
    fn rejects_wrong_field_type() {
        let schema = schema();
        let row = Row::new(
            RowId::new(1, 0),
            vec![Field::Chars("oops".into()), Field::Null, Field::Float32(1.0)],
        );
        assert!(row.encode_with_schema(&schema).is_err());
    }

    #[test]
    fn rejects_fixed_char_value_longer_than_declared_length() {
        let schema = schema();
        let row = Row::new(
            RowId::new(1, 0),
            vec![Field::Int32(1), Field::Chars("way too long".into()), Field::Null],
        );
        assert!(row.encode_with_schema(&schema).is_err());
    }
}
