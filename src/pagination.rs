/// Pagination with an optional shared count cache
///
/// Listings paginate over a [`PageSource`]. Counting a large result set is
/// the expensive part, so call sites may opt into caching the total under a
/// key derived from the query's fingerprint. Cached totals are only
/// refreshed by expiry; a listing may show a stale count for up to the TTL.

use crate::cache::{categories, CountCache};
use crate::error::SonoraResult;
use crate::metrics;
use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha224};
use std::time::Duration;
use tracing::{debug, warn};

/// An ordered, sliceable result set
#[async_trait]
pub trait PageSource: Send + Sync {
    type Item: Send;

    /// Stable text identifying the effective query (statement plus parameters)
    fn fingerprint(&self) -> String;

    async fn count(&self) -> SonoraResult<i64>;

    async fn slice(&self, offset: i64, limit: i64) -> SonoraResult<Vec<Self::Item>>;
}

/// How the total item count is obtained
pub enum CountStrategy<'a> {
    /// Count on every request
    Direct,
    /// Reuse a count stored under the query fingerprint
    Cached {
        cache: &'a dyn CountCache,
        ttl: Duration,
    },
    /// The caller already knows the total
    Known(i64),
}

/// Totals for a paginated listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Paginator {
    pub count: i64,
    pub per_page: i64,
    pub num_pages: i64,
}

impl Paginator {
    pub fn new(count: i64, per_page: i64) -> Self {
        let per_page = per_page.max(1);
        let count = count.max(0);
        // An empty listing still has one (empty) first page
        let num_pages = if count == 0 {
            1
        } else {
            (count + per_page - 1) / per_page
        };

        Self {
            count,
            per_page,
            num_pages,
        }
    }

    /// Resolve a raw `page` parameter; anything unusable means page 1
    pub fn resolve_page(&self, raw: Option<&str>) -> i64 {
        let requested = match raw {
            None => return 1,
            Some(raw) => raw.trim().parse::<i64>().unwrap_or(1),
        };

        if requested < 1 || requested > self.num_pages {
            1
        } else {
            requested
        }
    }

    pub fn offset(&self, page: i64) -> i64 {
        (page - 1) * self.per_page
    }
}

/// One page of a listing
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub current_page: i64,
    pub paginator: Paginator,
}

impl<T> Page<T> {
    pub fn has_next(&self) -> bool {
        self.current_page < self.paginator.num_pages
    }

    pub fn has_previous(&self) -> bool {
        self.current_page > 1
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            current_page: self.current_page,
            paginator: self.paginator,
        }
    }
}

/// Cache key for a query fingerprint
pub fn count_cache_key(fingerprint: &str) -> String {
    let digest = Sha224::digest(fingerprint.as_bytes());
    format!("{}{}", categories::PAGINATOR_COUNT, hex::encode(digest))
}

/// Count through the cache.
///
/// Concurrent misses on a cold key each compute and store; the last writer
/// wins. Cache backend failures degrade to a direct count.
pub async fn cached_count<F, Fut>(
    cache: &dyn CountCache,
    fingerprint: &str,
    ttl: Duration,
    count: F,
) -> SonoraResult<i64>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = SonoraResult<i64>>,
{
    let key = count_cache_key(fingerprint);

    match cache.get_count(&key).await {
        Ok(Some(cached)) => {
            debug!("Paginator count HIT: {}", key);
            metrics::record_cache_access(cache.backend(), true);
            return Ok(cached);
        }
        Ok(None) => {
            debug!("Paginator count MISS: {}", key);
            metrics::record_cache_access(cache.backend(), false);
        }
        Err(e) => warn!("Paginator count cache unavailable: {}", e),
    }

    let total = count().await?;

    if let Err(e) = cache.set_count(&key, total, ttl).await {
        warn!("Failed to store paginator count {}: {}", key, e);
    }

    Ok(total)
}

/// Paginate a source
pub async fn paginate<S: PageSource>(
    source: &S,
    per_page: i64,
    raw_page: Option<&str>,
    strategy: CountStrategy<'_>,
) -> SonoraResult<Page<S::Item>> {
    let count = match strategy {
        CountStrategy::Direct => source.count().await?,
        CountStrategy::Cached { cache, ttl } => {
            cached_count(cache, &source.fingerprint(), ttl, || source.count()).await?
        }
        CountStrategy::Known(count) => count,
    };

    let paginator = Paginator::new(count, per_page);
    let current_page = paginator.resolve_page(raw_page);
    let items = source
        .slice(paginator.offset(current_page), paginator.per_page)
        .await?;

    Ok(Page {
        items,
        current_page,
        paginator,
    })
}
