//! Pagination for list endpoints
//!
//! - [`keyset`]: cursor-based traversal for tables that keep growing
//! - [`offset`]: page/per_page arithmetic for small bounded sets
//! - [`cursor`]: the opaque continuation token used by keyset pages

pub mod cursor;
pub mod keyset;
pub mod offset;

pub use cursor::Cursor;
pub use keyset::{KeysetPaginator, KeysetQuery, Page, Predicate, SortDirection};
pub use offset::{OffsetPaginator, OffsetParams, PageMeta};
