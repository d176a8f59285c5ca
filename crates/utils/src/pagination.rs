//! `page` / `limit` / `sort` query handling for listing endpoints.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Error, PartialEq)]
pub enum PaginationError {
    #[error("page must be at least 1")]
    InvalidPage(i64),
    #[error("limit must be between 1 and {MAX_PAGE_SIZE}")]
    InvalidLimit(i64),
    #[error("cannot sort by '{0}'")]
    InvalidSort(String),
}

impl PaginationError {
    /// Name of the query parameter that was rejected.
    pub fn field(&self) -> &'static str {
        match self {
            PaginationError::InvalidPage(_) => "page",
            PaginationError::InvalidLimit(_) => "limit",
            PaginationError::InvalidSort(_) => "sort",
        }
    }
}

/// Raw query parameters as sent by clients.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub sort: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub column: &'static str,
    pub descending: bool,
}

/// Validated pagination. Sort columns always come from a caller-supplied whitelist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub sort: Option<SortSpec>,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
            sort: None,
        }
    }
}

impl Pagination {
    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

impl PageParams {
    pub fn resolve(&self, sortable: &[&'static str]) -> Result<Pagination, PaginationError> {
        let page = self.page.unwrap_or(1);
        if page < 1 {
            return Err(PaginationError::InvalidPage(page));
        }

        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(PaginationError::InvalidLimit(limit));
        }

        let sort = match self.sort.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => {
                let (name, descending) = match raw.strip_prefix('-') {
                    Some(name) => (name, true),
                    None => (raw, false),
                };
                let column = sortable
                    .iter()
                    .copied()
                    .find(|candidate| *candidate == name)
                    .ok_or_else(|| PaginationError::InvalidSort(raw.to_string()))?;
                Some(SortSpec { column, descending })
            }
        };

        Ok(Pagination { page, limit, sort })
    }
}

/// One page of a listing.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, pagination: &Pagination, total: i64) -> Self {
        Self {
            items,
            page: pagination.page,
            limit: pagination.limit,
            total,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            limit: self.limit,
            total: self.total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SORTABLE: &[&str] = &["created_at", "title"];

    #[test]
    fn defaults_to_first_page_in_insertion_order() {
        let pagination = PageParams::default().resolve(SORTABLE).unwrap();
        assert_eq!(pagination, Pagination::default());
        assert_eq!(pagination.offset(), 0);
    }

    #[test]
    fn descending_sort_uses_dash_prefix() {
        let params = PageParams {
            page: Some(3),
            limit: Some(10),
            sort: Some("-title".to_string()),
        };
        let pagination = params.resolve(SORTABLE).unwrap();
        assert_eq!(
            pagination.sort,
            Some(SortSpec {
                column: "title",
                descending: true
            })
        );
        assert_eq!(pagination.offset(), 20);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let zero_page = PageParams {
            page: Some(0),
            ..Default::default()
        };
        assert_eq!(
            zero_page.resolve(SORTABLE),
            Err(PaginationError::InvalidPage(0))
        );

        let huge_limit = PageParams {
            limit: Some(MAX_PAGE_SIZE + 1),
            ..Default::default()
        };
        assert_eq!(
            huge_limit.resolve(SORTABLE).unwrap_err().field(),
            "limit"
        );
    }

    #[test]
    fn rejects_columns_outside_whitelist() {
        let params = PageParams {
            sort: Some("password_hash; DROP TABLE users".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            params.resolve(SORTABLE),
            Err(PaginationError::InvalidSort(_))
        ));
    }
}
