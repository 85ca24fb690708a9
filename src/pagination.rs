//! Page index bookkeeping and navigation bounds.

/// `ceil(total / limit)`; zero when there are no items.
pub fn total_pages(total_count: u64, limit: u32) -> u64 {
    total_count.div_ceil(u64::from(limit.max(1)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    page: u32,
    limit: u32,
    /// `None` until the first result for the current view arrives.
    total_count: Option<u64>,
}

impl Pagination {
    pub fn new(limit: u32) -> Self {
        Self {
            page: 0,
            limit: limit.max(1),
            total_count: None,
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn total_count(&self) -> Option<u64> {
        self.total_count
    }

    /// Never less than 1, so an empty feed reads "1 / 1".
    pub fn display_total_pages(&self) -> u64 {
        self.total_count
            .map_or(1, |total| total_pages(total, self.limit).max(1))
    }

    pub fn display_page(&self) -> u64 {
        u64::from(self.page) + 1
    }

    pub fn label(&self) -> String {
        format!("{} / {}", self.display_page(), self.display_total_pages())
    }

    pub fn has_previous(&self) -> bool {
        self.page > 0
    }

    pub fn has_next(&self) -> bool {
        u64::from(self.page) + 1 < self.display_total_pages()
    }

    /// Returns `false` (and changes nothing) on the last known page.
    pub fn next_page(&mut self) -> bool {
        if !self.has_next() {
            return false;
        }
        self.page += 1;
        true
    }

    pub fn previous_page(&mut self) -> bool {
        if !self.has_previous() {
            return false;
        }
        self.page -= 1;
        true
    }

    /// Records the server's total. If the current page is now past the end, moves to the
    /// last valid page and returns it; the caller owes one corrective fetch.
    pub fn on_result(&mut self, total_count: u64) -> Option<u32> {
        self.total_count = Some(total_count);
        let last = total_pages(total_count, self.limit).saturating_sub(1);
        let last = u32::try_from(last).unwrap_or(u32::MAX);
        if self.page > last {
            self.page = last;
            Some(last)
        } else {
            None
        }
    }

    /// Back to page 0 with an unknown total, for a new filter or page size.
    pub fn reset(&mut self, limit: u32) {
        self.page = 0;
        self.limit = limit.max(1);
        self.total_count = None;
    }
}
