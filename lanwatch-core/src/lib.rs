//! lanwatch-core: admission control and pagination primitives
//!
//! Everything here is I/O free so the server crate (and tests) can drive it
//! with a controllable clock and plain in-memory rows.

pub mod clock;
pub mod error;
pub mod pagination;
pub mod ratelimit;
pub mod value;

pub use clock::{ManualClock, SystemClock, TimeSource};
pub use error::ValidationError;
pub use pagination::{
    Cursor, KeysetPaginator, KeysetQuery, OffsetPaginator, OffsetParams, Page, PageMeta, Predicate,
    SortDirection,
};
pub use ratelimit::{RateLimitDecision, RateLimitRule, SlidingWindowLimiter};
pub use value::{Row, SqlValue};
