//! Pagination parameters and results

use serde::{Deserialize, Serialize};

/// Pagination parameters (1-indexed pages)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListParams {
    pub page: u32,
    pub per_page: u32,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
        }
    }
}

impl ListParams {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, 100),
        }
    }

    /// Offset for database queries
    pub fn offset(&self) -> i64 {
        (self.page.saturating_sub(1) as i64) * self.per_page as i64
    }

    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }
}

/// Pagination block returned next to a page of items
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: i64,
    pub page: u32,
    pub total_pages: i64,
    pub limit: u32,
}

/// Paginated result container
#[derive(Debug, Clone)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub params: ListParams,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, total: i64, params: ListParams) -> Self {
        Self {
            items,
            total,
            params,
        }
    }

    pub fn total_pages(&self) -> i64 {
        let per_page = self.params.per_page as i64;
        (self.total + per_page - 1) / per_page
    }

    pub fn pagination(&self) -> Pagination {
        Pagination {
            total: self.total,
            page: self.params.page,
            total_pages: self.total_pages(),
            limit: self.params.per_page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_params_clamp() {
        let params = ListParams::new(0, 500);
        assert_eq!(params.page, 1);
        assert_eq!(params.per_page, 100);
        assert_eq!(params.offset(), 0);

        let params = ListParams::new(3, 20);
        assert_eq!(params.offset(), 40);
        assert_eq!(params.limit(), 20);
    }

    #[test]
    fn test_total_pages() {
        let result = PagedResult::new(vec![1, 2, 3], 41, ListParams::new(1, 20));
        assert_eq!(result.total_pages(), 3);

        let empty: PagedResult<i32> = PagedResult::new(vec![], 0, ListParams::default());
        assert_eq!(empty.total_pages(), 0);
        assert_eq!(
            empty.pagination(),
            Pagination {
                total: 0,
                page: 1,
                total_pages: 0,
                limit: 20
            }
        );
    }
}
