//! Page-number pagination helpers for the feed.

use std::num::NonZeroU32;

use serde::Serialize;

/// A 1-based page number coerced from untrusted input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct PageNumber(NonZeroU32);

impl PageNumber {
    pub const FIRST: PageNumber = PageNumber(NonZeroU32::MIN);

    /// Page `value`; zero maps to the first page.
    pub fn new(value: u32) -> Self {
        NonZeroU32::new(value).map(Self).unwrap_or(Self::FIRST)
    }

    /// Coerce a raw route/query value into a page number.
    ///
    /// Absent, blank, non-numeric, non-finite and sub-1 values all yield page 1.
    /// Fractional values are truncated toward zero.
    pub fn coerce(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
            return Self::FIRST;
        };
        match raw.parse::<f64>() {
            Ok(value) if value.is_finite() && value >= 1.0 => {
                let truncated = value.trunc().min(f64::from(u32::MAX));
                Self::new(truncated as u32)
            }
            _ => Self::FIRST,
        }
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl Default for PageNumber {
    fn default() -> Self {
        Self::FIRST
    }
}

/// Offset/limit pair handed to the feed source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PageWindow {
    pub skip: u64,
    pub take: u32,
}

/// Fetch window for `page_number` when pages hold `items_per_page` items.
pub fn window_for(items_per_page: NonZeroU32, page_number: PageNumber) -> PageWindow {
    let take = items_per_page.get();
    PageWindow {
        skip: u64::from(page_number.get() - 1) * u64::from(take),
        take,
    }
}

/// Navigation state rendered below a feed page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaginationSummary {
    pub current_page: u32,
    pub total_pages: u32,
    pub has_previous: bool,
    pub has_next: bool,
}

impl PaginationSummary {
    pub fn new(item_count: u64, items_per_page: NonZeroU32, current: PageNumber) -> Self {
        let per_page = u64::from(items_per_page.get());
        let pages = item_count.div_ceil(per_page).max(1);
        let total_pages = u32::try_from(pages).unwrap_or(u32::MAX);
        let current_page = current.get();
        Self {
            current_page,
            total_pages,
            has_previous: current_page > 1,
            has_next: current_page < total_pages,
        }
    }
}
