//! Pagination helpers for list endpoints

use serde::Deserialize;

/// Default rows per page when the caller does not specify a limit
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Query parameters common to paginated list endpoints
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageQuery {
    /// Page number (1-indexed)
    #[serde(default = "default_page")]
    pub page: i64,

    /// Rows per page
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    DEFAULT_PAGE_SIZE
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: default_limit(),
        }
    }
}

/// Sanitized pagination window
#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    /// Current page number (1-indexed)
    pub page: i64,
    /// Rows per page
    pub limit: i64,
    /// Offset for SQL LIMIT/OFFSET or slice start for in-memory paging
    pub offset: i64,
}

/// Clamp page and limit to sane minimums and compute the offset
///
/// A page past the end of the result set is allowed; it simply yields an
/// empty data slice, never an error.
pub fn paginate(query: &PageQuery) -> Pagination {
    let page = query.page.max(1);
    let limit = query.limit.max(1);
    Pagination {
        page,
        limit,
        offset: (page - 1) * limit,
    }
}

/// Slice a merged, already-sorted list for in-memory pagination
pub fn page_slice<T>(items: Vec<T>, window: Pagination) -> Vec<T> {
    items
        .into_iter()
        .skip(window.offset as usize)
        .take(window.limit as usize)
        .collect()
}
