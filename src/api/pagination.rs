//! Limit/offset pagination.
//!
//! Responses look like `{"count", "next", "previous", "results"}` where
//! `next` and `previous` are absolute URLs of the neighbouring pages.

use serde::{Deserialize, Serialize};

/// Page size used when the request does not ask for one.
pub const DEFAULT_LIMIT: usize = 100;

/// Largest page a client can get.
pub const MAX_LIMIT: usize = 50;

/// `?limit=&offset=` query parameters.
///
/// Values are kept as text so malformed numbers fall back to the defaults
/// instead of rejecting the request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageParams {
    pub limit: Option<String>,
    pub offset: Option<String>,
}

impl PageParams {
    /// Effective page size: positive, at most [`MAX_LIMIT`].
    pub fn limit(&self) -> usize {
        self.limit
            .as_deref()
            .and_then(|l| l.trim().parse::<usize>().ok())
            .filter(|l| *l > 0)
            .unwrap_or(DEFAULT_LIMIT)
            .min(MAX_LIMIT)
    }

    /// Effective offset; anything unparsable is 0.
    pub fn offset(&self) -> usize {
        self.offset
            .as_deref()
            .and_then(|o| o.trim().parse::<usize>().ok())
            .unwrap_or(0)
    }
}

/// One page of results.
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub count: usize,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    /// Build a page from an already sliced result set. `count` is the size of
    /// the whole listing and `base_url` its absolute URL without a query string.
    pub fn new(count: usize, results: Vec<T>, params: &PageParams, base_url: &str) -> Self {
        let limit = params.limit();
        let offset = params.offset();

        let next = (offset + limit < count)
            .then(|| format!("{}?limit={}&offset={}", base_url, limit, offset + limit));

        let previous = (offset > 0).then(|| {
            let prev_offset = offset.saturating_sub(limit);
            if prev_offset == 0 {
                format!("{}?limit={}", base_url, limit)
            } else {
                format!("{}?limit={}&offset={}", base_url, limit, prev_offset)
            }
        });

        Self {
            count,
            next,
            previous,
            results,
        }
    }

    /// Slice an in-memory listing according to `params`.
    pub fn paginate(items: Vec<T>, params: &PageParams, base_url: &str) -> Self {
        let count = items.len();
        let results = items
            .into_iter()
            .skip(params.offset())
            .take(params.limit())
            .collect();
        Self::new(count, results, params, base_url)
    }
}
