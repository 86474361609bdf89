//! Offset pagination for small, bounded result sets

use serde::{Deserialize, Serialize};

/// Maximum items per page
const MAX_PER_PAGE: u32 = 100;

/// Default items per page
const DEFAULT_PER_PAGE: u32 = 20;

/// Page/per_page pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetPaginator {
    /// Page number (1-indexed)
    pub page: u32,
    /// Items per page (max 100)
    pub per_page: u32,
}

impl OffsetPaginator {
    /// Create pagination with validation.
    ///
    /// - Page is clamped to minimum of 1
    /// - Per page is clamped to 1..=100
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, MAX_PER_PAGE),
        }
    }

    /// SQL OFFSET value.
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.per_page)
    }

    /// SQL LIMIT value.
    pub fn limit(&self) -> u32 {
        self.per_page
    }

    /// Number of pages needed for `total` rows (ceiling division).
    pub fn total_pages(&self, total: u64) -> u64 {
        total.div_ceil(u64::from(self.per_page))
    }

    /// Navigation flags for the current page.
    pub fn meta(&self, total: u64) -> PageMeta {
        PageMeta {
            has_prev: self.page > 1,
            has_next: u64::from(self.page) < self.total_pages(total),
        }
    }
}

impl Default for OffsetPaginator {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

/// Previous/next flags for offset pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageMeta {
    pub has_prev: bool,
    pub has_next: bool,
}

/// Query parameters for offset pagination
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OffsetParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl From<OffsetParams> for OffsetPaginator {
    fn from(params: OffsetParams) -> Self {
        Self::new(
            params.page.unwrap_or(1),
            params.per_page.unwrap_or(DEFAULT_PER_PAGE),
        )
    }
}
