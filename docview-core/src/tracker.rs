#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationState {
    pub current_page: usize,
    pub page_count: usize,
    pub prev_enabled: bool,
    pub next_enabled: bool,
}

/// Current page bookkeeping. Pages are 1-based; with no document the page
/// count is zero and both directions are disabled.
#[derive(Debug, Clone)]
pub struct PageTracker {
    current_page: usize,
    page_count: usize,
}

impl Default for PageTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PageTracker {
    pub fn new() -> Self {
        Self {
            current_page: 1,
            page_count: 0,
        }
    }

    pub fn reset(&mut self, page_count: usize) {
        self.current_page = 1;
        self.page_count = page_count;
    }

    pub fn clear(&mut self) {
        self.reset(0);
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn is_valid(&self, page: usize) -> bool {
        page >= 1 && page <= self.page_count
    }

    /// Out-of-range pages are ignored.
    pub fn go_to(&mut self, page: usize) -> Option<usize> {
        if !self.is_valid(page) {
            return None;
        }
        self.current_page = page;
        Some(page)
    }

    pub fn next(&mut self) -> Option<usize> {
        let target = self.current_page.checked_add(1)?;
        self.go_to(target)
    }

    pub fn previous(&mut self) -> Option<usize> {
        let target = self.current_page.checked_sub(1)?;
        self.go_to(target)
    }

    /// Follows a page reported by scroll position. Returns whether the
    /// current page changed.
    pub fn follow_scroll(&mut self, page: usize) -> bool {
        if page == self.current_page || !self.is_valid(page) {
            return false;
        }
        self.current_page = page;
        true
    }

    pub fn navigation(&self) -> NavigationState {
        NavigationState {
            current_page: self.current_page,
            page_count: self.page_count,
            prev_enabled: self.current_page > 1,
            next_enabled: self.current_page < self.page_count,
        }
    }
}
