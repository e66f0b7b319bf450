//! Page resolution for catalog listings.
//!
//! Out-of-range or malformed page numbers never fail a request. They are
//! clamped, and the clamp is reported through [`PageResolution`].

use serde::Serialize;
use utoipa::ToSchema;

/// How the requested page number was interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub enum PageResolution {
    /// The requested page (or the default first page) was used as-is
    ValidPage,
    /// The page was not a positive integer, so the first page was served
    ClampedToFirst,
    /// The page was past the end, so the last page was served
    ClampedToLast,
}

/// Position of one page within a result set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct PageInfo {
    /// 1-based page number actually served
    pub page: u64,
    /// Number of pages; 0 when there are no results
    pub num_pages: u64,
    pub per_page: u64,
    /// Number of items across all pages
    pub total: u64,
    pub has_next: bool,
    pub has_previous: bool,
    /// 1-based index of the first item on this page, 0 when empty
    pub start_index: u64,
    /// 1-based index of the last item on this page, 0 when empty
    pub end_index: u64,
    pub resolution: PageResolution,
}

enum RequestedPage {
    Absent,
    Number(u64),
    /// All digits but too large to represent
    Overflow,
    Malformed,
}

fn parse_requested(raw: Option<&str>) -> RequestedPage {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return RequestedPage::Absent;
    };

    match raw.parse::<u64>() {
        Ok(0) => RequestedPage::Malformed,
        Ok(n) => RequestedPage::Number(n),
        Err(_) if raw.bytes().all(|b| b.is_ascii_digit()) => RequestedPage::Overflow,
        Err(_) => RequestedPage::Malformed,
    }
}

impl PageInfo {
    /// Resolves a raw `page` parameter against `total` items split into
    /// pages of `per_page` items.
    pub fn resolve(raw_page: Option<&str>, total: u64, per_page: u64) -> Self {
        let per_page = per_page.max(1);
        let num_pages = total.div_ceil(per_page);
        let last_page = num_pages.max(1);

        let (page, resolution) = match parse_requested(raw_page) {
            RequestedPage::Absent => (1, PageResolution::ValidPage),
            RequestedPage::Malformed => (1, PageResolution::ClampedToFirst),
            RequestedPage::Overflow => (last_page, PageResolution::ClampedToLast),
            RequestedPage::Number(n) if n > last_page => (last_page, PageResolution::ClampedToLast),
            RequestedPage::Number(n) => (n, PageResolution::ValidPage),
        };

        let (start_index, end_index) = if total == 0 {
            (0, 0)
        } else {
            let start = (page - 1) * per_page + 1;
            (start, (page * per_page).min(total))
        };

        Self {
            page,
            num_pages,
            per_page,
            total,
            has_next: page < num_pages,
            has_previous: page > 1,
            start_index,
            end_index,
            resolution,
        }
    }

    /// Number of items to skip to reach this page
    pub fn offset(&self) -> u64 {
        (self.page - 1) * self.per_page
    }
}
