//! Page windows and page results.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::types::PageRequest;
use crate::error::{QueryError, QueryResult};

/// A validated, zero-based page window over primary entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    page_number: u64,
    page_size: u64,
}

impl PageWindow {
    /// Validate a caller's page request.
    ///
    /// Sizes above `max_page_size` are capped rather than rejected.
    pub fn from_request(request: &PageRequest, max_page_size: u64) -> QueryResult<Self> {
        let page_number = u64::try_from(request.page_number).map_err(|_| {
            QueryError::InvalidPageRequest(format!(
                "page_number must be zero or greater, got {}",
                request.page_number
            ))
        })?;
        let requested = match u64::try_from(request.page_size) {
            Ok(size) if size > 0 => size,
            _ => {
                return Err(QueryError::InvalidPageRequest(format!(
                    "page_size must be positive, got {}",
                    request.page_size
                )));
            }
        };

        let page_size = if max_page_size > 0 && requested > max_page_size {
            warn!(
                requested,
                capped = max_page_size,
                "page_size exceeds maximum, capping"
            );
            max_page_size
        } else {
            requested
        };

        // OFFSET is rendered as a signed 64-bit bind value.
        let offset_in_range = page_number
            .checked_mul(page_size)
            .is_some_and(|offset| i64::try_from(offset).is_ok());
        if !offset_in_range {
            return Err(QueryError::InvalidPageRequest(format!(
                "page {page_number} of size {page_size} is out of range"
            )));
        }

        Ok(Self {
            page_number,
            page_size,
        })
    }

    /// The window used for single-entity lookups.
    pub fn single() -> Self {
        Self {
            page_number: 0,
            page_size: 1,
        }
    }

    pub fn page_number(&self) -> u64 {
        self.page_number
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn limit(&self) -> u64 {
        self.page_size
    }

    /// Checked at construction, so this cannot overflow.
    pub fn offset(&self) -> u64 {
        self.page_number * self.page_size
    }
}

/// One page of results plus the totals needed to page through the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult<T> {
    pub content: Vec<T>,
    pub page_number: u64,
    pub page_size: u64,
    pub total_elements: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl<T> PageResult<T> {
    /// Combine one window of content with the total count.
    pub fn assemble(content: Vec<T>, total_elements: u64, window: PageWindow) -> Self {
        let total_pages = total_elements.div_ceil(window.page_size);
        Self {
            content,
            page_number: window.page_number,
            page_size: window.page_size,
            total_elements,
            total_pages,
            has_next: window.page_number + 1 < total_pages,
            has_previous: window.page_number > 0,
        }
    }

    pub fn empty(window: PageWindow) -> Self {
        Self::assemble(Vec::new(), 0, window)
    }

    /// Convert the content while keeping the page metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PageResult<U> {
        PageResult {
            content: self.content.into_iter().map(f).collect(),
            page_number: self.page_number,
            page_size: self.page_size,
            total_elements: self.total_elements,
            total_pages: self.total_pages,
            has_next: self.has_next,
            has_previous: self.has_previous,
        }
    }
}
