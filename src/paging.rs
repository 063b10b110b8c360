//! Offset/limit windows for card listings and the rule deciding when a
//! listing needs a separate exact count.

/// Listing order: `position` ascending, then `created_at` ascending.
pub const SORT_COLUMNS: [&str; 2] = ["position", "created_at"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub index: u64,
    pub size: u32,
}

impl Page {
    pub fn new(index: u64, size: u32) -> Self {
        Self { index, size }
    }

    pub fn offset(&self) -> u64 {
        self.index.saturating_mul(u64::from(self.size))
    }

    /// `None` when the page size is zero, which reads without a limit.
    pub fn limit(&self) -> Option<u64> {
        (self.size > 0).then_some(u64::from(self.size))
    }
}

/// What the caller should report as the total for a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Total {
    Exact(u64),
    NeedsCount,
}

/// Direct multi-gets and short pages already know their total; only a full
/// page of an open-ended listing pays for a count.
pub fn resolve_total(explicit_ids: bool, page_size: u32, returned: usize) -> Total {
    let returned = returned as u64;
    if explicit_ids || returned != u64::from(page_size) {
        Total::Exact(returned)
    } else {
        Total::NeedsCount
    }
}
