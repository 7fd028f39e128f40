//! Numbered offset pagination over ordered result sets.
//!
//! Page numbers are 1-based and forgiving: anything at or below zero is
//! treated as the first page, anything past the end is clamped to the
//! last page, and an empty result set still yields exactly one (empty)
//! page. The page size is fixed by configuration and never taken from
//! the request.

use serde::Deserialize;

/// Raw `?page=` query parameter as it arrives from the URL.
///
/// Kept as a string so that a malformed value degrades to page one
/// instead of rejecting the request.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct PageParam {
    pub page: Option<String>,
}

impl PageParam {
    /// The requested page number, before clamping. Non-numeric input
    /// counts as a request for the first page.
    pub fn requested(&self) -> i64 {
        self.page
            .as_deref()
            .map(str::trim)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(1)
    }
}

/// Offset window handed to list queries after clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageBounds {
    /// 1-based page number, already clamped into `1..=total_pages`.
    pub number: u64,
    pub offset: u64,
    pub limit: u64,
    pub total_count: u64,
    pub total_pages: u64,
}

/// Clamp a requested page number against the known total.
pub fn resolve_page(total_count: u64, page_size: u64, requested: i64) -> PageBounds {
    debug_assert!(page_size > 0, "page size is validated at config load");
    let page_size = page_size.max(1);
    let total_pages = total_count.div_ceil(page_size).max(1);
    let number = if requested <= 0 {
        1
    } else {
        (requested as u64).min(total_pages)
    };

    PageBounds {
        number,
        offset: (number - 1) * page_size,
        limit: page_size,
        total_count,
        total_pages,
    }
}

/// One page of an ordered result set plus navigation metadata.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u64,
    pub total_count: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, bounds: PageBounds) -> Self {
        Self {
            items,
            number: bounds.number,
            total_count: bounds.total_count,
            total_pages: bounds.total_pages,
        }
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.total_pages
    }
}
