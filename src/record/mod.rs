//! The self-describing record model: columns, schemas, and rows
//! (spec.md §3, §4.5).

pub mod column;
pub mod row;
pub mod schema;

pub use column::{Column, ColumnType};
pub use row::{Field, Row};
pub use schema::Schema;
