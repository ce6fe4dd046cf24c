//! Pagination types and utilities for consistent pagination across all endpoints

use database_layer::{ListQuery, Page, PageRequest, SortField};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::error::{api_success_with_meta, ApiResponse, PaginationInfo, ResponseMetadata};

/// Standard pagination parameters for list endpoints
#[derive(Debug, Deserialize, IntoParams, Clone, Copy, Default)]
#[into_params(parameter_in = Query)]
pub struct PaginationParams {
    #[param(example = 1, minimum = 1)]
    pub page: Option<u32>,

    #[param(example = 20, minimum = 1, maximum = 100)]
    pub page_size: Option<u32>,
}

impl PaginationParams {
    pub fn new(page: Option<u32>, page_size: Option<u32>) -> Self {
        Self { page, page_size }
    }

    /// Clamped page request (page defaults to 1, size to 20 within 1..=100)
    pub fn page_request(&self) -> PageRequest {
        PageRequest::new(
            self.page.unwrap_or(1),
            self.page_size.unwrap_or(PageRequest::DEFAULT_PAGE_SIZE),
        )
    }

    /// Calculate total pages given a total count
    pub fn total_pages(&self, total_count: u64) -> u64 {
        if total_count == 0 {
            return 1;
        }
        total_count.div_ceil(self.page_request().limit())
    }

    /// Create response metadata with pagination info
    pub fn to_metadata(&self, total_count: u64) -> ResponseMetadata {
        let request = self.page_request();
        let total_pages = self.total_pages(total_count);

        ResponseMetadata {
            pagination: Some(PaginationInfo {
                page: request.page,
                page_size: request.page_size,
                total_pages,
                has_next: u64::from(request.page) < total_pages,
                has_previous: request.page > 1,
            }),
            total_count: Some(total_count),
        }
    }

    /// Attach this page to a list query
    pub fn apply<F, S: SortField>(&self, query: ListQuery<F, S>) -> ListQuery<F, S> {
        query.with_page(self.page_request())
    }

    /// Wrap a store page with pagination metadata
    pub fn wrap_response<T>(&self, page: Page<T>) -> ApiResponse<Vec<T>> {
        let metadata = self.to_metadata(page.total);
        api_success_with_meta(page.items, metadata)
    }
}
