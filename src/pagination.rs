//! Fixed-size pages for the measurement result strip.
//!
//! Items fill the last page until it reaches `page_size`, then spill onto a
//! new page, up to `max_pages`. Removing an item pulls every later item one
//! slot towards the front, across page boundaries, so pages never have gaps.

use crate::error::{AnnotatorError, Result};

/// Pagination limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub page_size: usize,
    pub max_pages: usize,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            page_size: crate::constants::DEFAULT_PAGE_SIZE,
            max_pages: crate::constants::DEFAULT_MAX_PAGES,
        }
    }
}

/// Ordered pages of items. Page numbers are 1-based.
#[derive(Debug, Clone)]
pub struct Paginator<T> {
    pages: Vec<Vec<T>>,
    limits: PageLimits,
    current: usize,
    /// Jump to the last page whenever an item is inserted.
    show_last: bool,
}

impl<T: PartialEq> Paginator<T> {
    /// Create a paginator holding one empty page.
    pub fn new(limits: PageLimits) -> Self {
        Self {
            pages: vec![Vec::new()],
            limits: PageLimits {
                page_size: limits.page_size.max(1),
                max_pages: limits.max_pages.max(1),
            },
            current: 1,
            show_last: true,
        }
    }

    pub fn with_show_last(mut self, show_last: bool) -> Self {
        self.show_last = show_last;
        self
    }

    pub fn limits(&self) -> PageLimits {
        self.limits
    }

    /// Append an item. Returns the page it landed on.
    pub fn insert(&mut self, item: T) -> Result<usize> {
        let last_full = self.pages.last().is_none_or(|p| p.len() >= self.limits.page_size);
        if last_full {
            if self.pages.len() >= self.limits.max_pages {
                return Err(AnnotatorError::PaginationFull {
                    max_pages: self.limits.max_pages,
                    page_size: self.limits.page_size,
                });
            }
            self.pages.push(Vec::new());
            log::debug!("📄 New result page {}", self.pages.len());
        }

        let page = self.pages.len();
        if let Some(last) = self.pages.last_mut() {
            last.push(item);
        }
        if self.show_last {
            self.current = page;
        }
        Ok(page)
    }

    /// Remove an item and reflow later items into the gap.
    ///
    /// Returns the removed item, or `None` if it was not present.
    pub fn remove(&mut self, item: &T) -> Option<T> {
        let (page_idx, slot) = self.position(item)?;
        let removed = self.pages[page_idx].remove(slot);

        for i in page_idx..self.pages.len() - 1 {
            if self.pages[i + 1].is_empty() {
                break;
            }
            let moved = self.pages[i + 1].remove(0);
            self.pages[i].push(moved);
        }

        let total = self.pages.len();
        if total > 1 && self.pages[total - 1].is_empty() {
            self.pages.pop();
            log::debug!("📄 Dropped empty result page {}", total);
            if self.current > self.pages.len() {
                self.current = self.pages.len();
            }
        }

        Some(removed)
    }

    /// 1-based page and slot of an item.
    fn position(&self, item: &T) -> Option<(usize, usize)> {
        self.pages.iter().enumerate().find_map(|(p, page)| {
            page.iter().position(|candidate| candidate == item).map(|slot| (p, slot))
        })
    }

    /// Page number (1-based) holding `item`.
    pub fn page_of(&self, item: &T) -> Option<usize> {
        self.position(item).map(|(p, _)| p + 1)
    }

    pub fn current_page(&self) -> usize {
        self.current
    }

    /// Navigate to a page.
    pub fn go_to(&mut self, page: usize) -> Result<()> {
        if page == 0 || page > self.pages.len() {
            return Err(AnnotatorError::InvalidPage {
                page,
                total: self.pages.len(),
            });
        }
        self.current = page;
        Ok(())
    }

    /// Items on a page, if it exists.
    pub fn page(&self, page: usize) -> Option<&[T]> {
        page.checked_sub(1)
            .and_then(|idx| self.pages.get(idx))
            .map(Vec::as_slice)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Whether another item can be inserted.
    pub fn has_space(&self) -> bool {
        self.len() < self.limits.max_pages * self.limits.page_size
    }

    pub fn len(&self) -> usize {
        self.pages.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All items in page order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.pages.iter().flatten()
    }

    /// Back to a single empty page.
    pub fn reset(&mut self) {
        self.pages = vec![Vec::new()];
        self.current = 1;
    }
}
