use serde::Serialize;
use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pager {
    total: usize,
    per_page: usize,
    number: usize,
    number_of_pages: usize,
}

impl Pager {
    pub fn new(total: usize, per_page: usize) -> Self {
        let per_page = per_page.max(1);
        Self {
            total,
            per_page,
            number: 1,
            number_of_pages: total.div_ceil(per_page).max(1),
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn per_page(&self) -> usize {
        self.per_page
    }

    pub fn number(&self) -> usize {
        self.number
    }

    pub fn number_of_pages(&self) -> usize {
        self.number_of_pages
    }

    pub fn offset(&self) -> usize {
        (self.number - 1) * self.per_page
    }

    pub fn range(&self) -> Range<usize> {
        let start = self.offset().min(self.total);
        start..(start + self.per_page).min(self.total)
    }

    pub fn has_prev(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.number_of_pages
    }

    pub fn prev_number(&self) -> Option<usize> {
        self.has_prev().then(|| self.number - 1)
    }

    pub fn next_number(&self) -> Option<usize> {
        self.has_next().then(|| self.number + 1)
    }

    pub fn advance(&mut self) -> bool {
        if self.has_next() {
            self.number += 1;
            true
        } else {
            false
        }
    }
}
