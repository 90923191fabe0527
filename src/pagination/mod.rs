//! Pagination: orderings, cursors, interpretation of connection arguments and
//! assembly of fetched rows into pages.

pub mod cursor;
pub mod interpret;
pub mod ordering;
pub mod page;

pub use cursor::{cursor_to_offset, offset_to_cursor, Cursor};
pub use interpret::{interpret, Limit, PageArgs, Paging, PagingSettings};
pub use ordering::{Direction, Order, OrderColumn, SortSpec};
pub use page::{Edge, Page, PageInfo};
