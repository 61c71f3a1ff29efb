use serde::{Deserialize, Serialize};

use crate::{
    constants::MAX_PAGE_SIZE,
    error::{ApiError, Error},
};

#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Resolved page position. `page` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: i64,
    pub limit: i64,
}

impl PageQuery {
    /// Non-positive limits fall back to `default_limit`; the limit is capped
    /// at `MAX_PAGE_SIZE`. Pages whose rows lie beyond `i64` offsets are not
    /// found.
    pub fn window(&self, default_limit: i64) -> Result<PageWindow, Error> {
        let page = self.page.unwrap_or(1);
        if page < 1 {
            return Err(ApiError::NotFound.new("Invalid page").on("page"));
        }
        let limit = match self.limit {
            Some(limit) if limit > 0 => limit.min(MAX_PAGE_SIZE),
            _ => default_limit,
        };
        if page.checked_mul(limit).is_none() {
            return Err(ApiError::NotFound.new("Invalid page").on("page"));
        }

        Ok(PageWindow { page, limit })
    }
}

impl PageWindow {
    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }

    fn link(&self, path: &str, page: i64) -> String {
        format!("{path}?page={page}&limit={}", self.limit)
    }
}

#[derive(Serialize, Debug)]
pub struct Page<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    /// An empty page past the first one is reported as not found.
    pub fn from_rows(
        results: Vec<T>,
        count: i64,
        window: PageWindow,
        path: &str,
    ) -> Result<Self, Error> {
        if results.is_empty() && window.page > 1 {
            return Err(ApiError::NotFound.new("Invalid page").on("page"));
        }

        let next = (window.page * window.limit < count).then(|| window.link(path, window.page + 1));
        let previous = (window.page > 1).then(|| window.link(path, window.page - 1));

        Ok(Self {
            count,
            next,
            previous,
            results,
        })
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            count: self.count,
            next: self.next,
            previous: self.previous,
            results: self.results.into_iter().map(f).collect(),
        }
    }
}
