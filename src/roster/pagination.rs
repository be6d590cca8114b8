//! Paginated aggregation of platform listings
//!
//! Drains a page-numbered listing (`page_number` starting at 1, fixed
//! `page_size`) into one ordered collection. The loop carries the running
//! total and the next page number as plain state; any page failure aborts the
//! whole aggregation so a partial pool is never used for staffing.

use std::collections::HashSet;
use std::future::Future;

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, warn};

use crate::types::{Page, Queue, RosterMember};

/// Items that can be de-duplicated across pages.
pub trait PageItem {
    fn key(&self) -> &str;
}

impl PageItem for RosterMember {
    fn key(&self) -> &str {
        &self.id
    }
}

impl PageItem for Queue {
    fn key(&self) -> &str {
        &self.id
    }
}

/// Aggregation failures, generic over the page fetcher's error.
#[derive(Debug, thiserror::Error)]
pub enum AggregateError<E: std::error::Error + 'static> {
    #[error("page size must be at least 1")]
    InvalidPageSize,
    #[error("failed to fetch page {page}: {source}")]
    Page {
        page: u32,
        #[source]
        source: E,
    },
    #[error("listing stalled at page {page}: {fetched} of {total} items received")]
    Stalled { page: u32, fetched: usize, total: u64 },
}

/// Pagination settings for one aggregation.
#[derive(Debug, Clone, Copy)]
pub struct Paginator {
    pub page_size: u32,
    /// Pages fetched in flight once the total is known. 1 = strictly sequential.
    pub max_concurrent_pages: usize,
}

impl Default for Paginator {
    fn default() -> Self {
        Self {
            page_size: crate::config::defaults::DEFAULT_PAGE_SIZE,
            max_concurrent_pages: 1,
        }
    }
}

impl Paginator {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size,
            ..Self::default()
        }
    }

    pub fn with_concurrency(mut self, max_concurrent_pages: usize) -> Self {
        self.max_concurrent_pages = max_concurrent_pages.max(1);
        self
    }

    /// Drain every page of a listing.
    ///
    /// Continues while `total > page_size * pages_fetched`, where `total` is
    /// the count reported by the most recent page, so a listing that grows or
    /// shrinks mid-walk is followed rather than truncated. Items whose key
    /// was already seen on an earlier page are dropped, so the result never
    /// contains duplicates even if the listing shifts between requests.
    pub async fn aggregate<T, E, F, Fut>(&self, mut fetch_page: F) -> Result<Vec<T>, AggregateError<E>>
    where
        T: PageItem,
        E: std::error::Error + 'static,
        F: FnMut(u32, u32) -> Fut,
        Fut: Future<Output = Result<Page<T>, E>>,
    {
        if self.page_size == 0 {
            return Err(AggregateError::InvalidPageSize);
        }

        let page_size = self.page_size;
        let size = u64::from(page_size);
        let mut acc = Accumulator::default();

        let first = fetch_page(1, page_size)
            .await
            .map_err(|source| AggregateError::Page { page: 1, source })?;
        let mut total = first.total;
        let mut pages_fetched = 1u32;
        acc.extend(1, first.items);

        debug!(total, page_size, "Aggregating paginated listing");

        while total > size * u64::from(pages_fetched) {
            let next = pages_fetched.saturating_add(1);
            let window_end = if self.max_concurrent_pages <= 1 {
                next
            } else {
                last_page_number(total, page_size).max(next)
            };

            // `buffered` yields in page order regardless of completion order.
            let pages: Vec<(u32, Page<T>)> = stream::iter(next..=window_end)
                .map(|page| {
                    let fut = fetch_page(page, page_size);
                    async move {
                        fut.await
                            .map(|result| (page, result))
                            .map_err(|source| AggregateError::Page { page, source })
                    }
                })
                .buffered(self.max_concurrent_pages)
                .try_collect()
                .await?;

            for (page, result) in pages {
                if result.items.is_empty() && result.total > size * u64::from(page - 1) {
                    return Err(AggregateError::Stalled {
                        page,
                        fetched: acc.items.len(),
                        total: result.total,
                    });
                }
                if result.total != total {
                    debug!(page, previous = total, total = result.total, "Listing total changed mid-walk");
                }
                total = result.total;
                pages_fetched = page;
                acc.extend(page, result.items);

                // A shrunken listing ends the walk; later pages in the window are dropped.
                if total <= size * u64::from(page) {
                    break;
                }
            }
        }

        if (acc.items.len() as u64) < total {
            warn!(
                fetched = acc.items.len(),
                total,
                duplicates = acc.duplicates,
                "Listing returned fewer unique items than its reported total"
            );
        }

        Ok(acc.items)
    }
}

/// Number of the last page for a listing of `total` items.
fn last_page_number(total: u64, page_size: u32) -> u32 {
    let pages = total.div_ceil(u64::from(page_size));
    u32::try_from(pages).unwrap_or(u32::MAX)
}

struct Accumulator<T> {
    items: Vec<T>,
    seen: HashSet<String>,
    duplicates: usize,
}

impl<T> Default for Accumulator<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            seen: HashSet::new(),
            duplicates: 0,
        }
    }
}

impl<T: PageItem> Accumulator<T> {
    fn extend(&mut self, page: u32, items: Vec<T>) {
        for item in items {
            if self.seen.insert(item.key().to_string()) {
                self.items.push(item);
            } else {
                self.duplicates += 1;
                debug!(page, key = item.key(), "Dropping duplicate listing item");
            }
        }
    }
}
