//! Paged storage layer: disk allocation, buffering, and the on-disk page
//! layouts built on top of it (spec.md §4.1-§4.4).

pub mod bitmap;
pub mod buffer_pool;
pub mod disk_manager;
pub mod frame;
pub mod meta;
pub mod replacer;
pub mod table_page;
