//! Request orchestration: serve from cache while fresh, refresh when stale,
//! and fall back to whatever we still have when a refresh fails.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::FeedCache;
use crate::clock::Clock;
use crate::error::{FeedError, Result};
use crate::fetch::FeedSource;
use crate::recipe::{normalize_items, NormalizeOptions, RecipeCard};
use crate::snapshot::SnapshotStore;
use crate::xml::parse_items;

type RefreshResult = std::result::Result<(), Arc<FeedError>>;
type Refresh = Shared<BoxFuture<'static, RefreshResult>>;

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub default_feed_url: String,
    pub ttl: chrono::Duration,
    pub max_items: usize,
    pub fetch_timeout: Duration,
    pub normalize: NormalizeOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardSource {
    /// Fresh cache entry, no fetch.
    Cache,
    /// Fetched during this request (or a concurrent one).
    Network,
    /// Refresh failed, serving the previous in-memory entry.
    StaleCache,
    /// Refresh failed and memory was empty, serving the durable snapshot.
    Snapshot,
}

#[derive(Debug, Clone)]
pub struct Cards {
    pub source: CardSource,
    pub cards: Vec<RecipeCard>,
    pub updated_at: DateTime<Utc>,
}

pub struct FeedService {
    settings: ServiceSettings,
    cache: Arc<FeedCache>,
    source: Arc<dyn FeedSource>,
    clock: Arc<dyn Clock>,
    snapshot: Option<SnapshotStore>,
    in_flight: Arc<Mutex<HashMap<String, Refresh>>>,
}

impl FeedService {
    pub fn new(
        settings: ServiceSettings,
        source: Arc<dyn FeedSource>,
        clock: Arc<dyn Clock>,
        snapshot: Option<SnapshotStore>,
    ) -> Self {
        Self {
            cache: Arc::new(FeedCache::new(settings.max_items)),
            settings,
            source,
            clock,
            snapshot,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn cache(&self) -> &FeedCache {
        &self.cache
    }

    /// Blank overrides fall back to the configured feed.
    pub fn resolve_feed_url<'a>(&'a self, feed: Option<&'a str>) -> &'a str {
        feed.map(str::trim)
            .filter(|f| !f.is_empty())
            .unwrap_or(&self.settings.default_feed_url)
    }

    /// Zero or missing means "as many as we keep"; larger values are clamped.
    pub fn effective_limit(&self, limit: Option<usize>) -> usize {
        limit
            .filter(|&l| l > 0)
            .map(|l| l.min(self.settings.max_items))
            .unwrap_or(self.settings.max_items)
    }

    /// Cards for `feed` (or the default feed), at most `limit` of them.
    ///
    /// Only fails when there is no live feed, no cached entry and no snapshot.
    pub async fn recipes(
        &self,
        feed: Option<&str>,
        limit: Option<usize>,
    ) -> std::result::Result<Cards, Arc<FeedError>> {
        let feed_url = self.resolve_feed_url(feed);
        let limit = self.effective_limit(limit);

        if self
            .cache
            .is_fresh(feed_url, self.clock.now(), self.settings.ttl)
            .await
        {
            if let Some(entry) = self.cache.get(feed_url, limit).await {
                debug!("Cache hit for {}", feed_url);
                return Ok(Cards {
                    source: CardSource::Cache,
                    cards: entry.data,
                    updated_at: entry.cached_at,
                });
            }
        }

        debug!("Cache miss for {}", feed_url);
        match self.refresh(feed_url).await {
            Ok(source) => match self.cache.get(feed_url, limit).await {
                Some(entry) => Ok(Cards {
                    source,
                    cards: entry.data,
                    updated_at: entry.cached_at,
                }),
                None => {
                    let missing = Arc::new(FeedError::shape("cache empty after refresh"));
                    self.fallback(feed_url, limit, missing).await
                }
            },
            Err(e) => {
                warn!("Refresh of {} failed: {}", feed_url, e);
                self.fallback(feed_url, limit, e).await
            }
        }
    }

    async fn fallback(
        &self,
        feed_url: &str,
        limit: usize,
        error: Arc<FeedError>,
    ) -> std::result::Result<Cards, Arc<FeedError>> {
        if let Some(entry) = self.cache.get(feed_url, limit).await {
            info!("Serving stale cache for {}", feed_url);
            return Ok(Cards {
                source: CardSource::StaleCache,
                cards: entry.data,
                updated_at: entry.cached_at,
            });
        }

        if let Some(store) = &self.snapshot {
            if let Some(snapshot) = store.load(feed_url).await {
                info!("Serving snapshot for {}", feed_url);
                return Ok(Cards {
                    source: CardSource::Snapshot,
                    cards: snapshot.cards.into_iter().take(limit).collect(),
                    updated_at: snapshot.saved_at,
                });
            }
        }

        Err(error)
    }

    /// Joins the in-flight refresh for `feed_url`, or starts one.
    ///
    /// The refresh runs as its own task and clears its `in_flight` slot when it
    /// finishes, so it completes even if every waiting request is dropped.
    async fn refresh(&self, feed_url: &str) -> std::result::Result<CardSource, Arc<FeedError>> {
        let refresh = {
            let mut in_flight = self.in_flight.lock().await;
            match in_flight.get(feed_url) {
                Some(pending) => {
                    debug!("Joining in-flight refresh of {}", feed_url);
                    pending.clone()
                }
                None => {
                    // another refresh may have landed between our freshness check and the lock
                    if self
                        .cache
                        .is_fresh(feed_url, self.clock.now(), self.settings.ttl)
                        .await
                    {
                        debug!("{} was refreshed while we waited", feed_url);
                        return Ok(CardSource::Cache);
                    }

                    let job = self.job(feed_url);
                    let in_flight_slots = self.in_flight.clone();
                    let key = feed_url.to_string();
                    let handle = tokio::spawn(async move {
                        let result = job.run().await;
                        in_flight_slots.lock().await.remove(&key);
                        result
                    });

                    let pending = handle
                        .map(|joined| joined.unwrap_or_else(|e| Err(Arc::new(e.into()))))
                        .boxed()
                        .shared();
                    in_flight.insert(feed_url.to_string(), pending.clone());
                    pending
                }
            }
        };

        refresh.await.map(|()| CardSource::Network)
    }

    fn job(&self, feed_url: &str) -> RefreshJob {
        // the snapshot belongs to the default feed; overrides never overwrite it
        let snapshot = self
            .snapshot
            .clone()
            .filter(|_| feed_url == self.settings.default_feed_url);

        RefreshJob {
            feed_url: feed_url.to_string(),
            source: self.source.clone(),
            cache: self.cache.clone(),
            clock: self.clock.clone(),
            snapshot,
            normalize: self.settings.normalize.clone(),
            max_items: self.settings.max_items,
            timeout: self.settings.fetch_timeout,
        }
    }
}

/// Everything one refresh needs, owned so the future can be shared between requests.
struct RefreshJob {
    feed_url: String,
    source: Arc<dyn FeedSource>,
    cache: Arc<FeedCache>,
    clock: Arc<dyn Clock>,
    snapshot: Option<SnapshotStore>,
    normalize: NormalizeOptions,
    max_items: usize,
    timeout: Duration,
}

impl RefreshJob {
    async fn run(self) -> RefreshResult {
        self.execute().await.map_err(Arc::new)
    }

    async fn execute(self) -> Result<()> {
        info!("Fetching {}", self.feed_url);

        let body = tokio::time::timeout(self.timeout, self.source.fetch(&self.feed_url))
            .await
            .map_err(|_| FeedError::Timeout(self.timeout))??;

        let items = parse_items(&body)?;
        let now = self.clock.now();
        let mut cards = normalize_items(&items, &self.normalize, now);

        info!(
            "Parsed {} items from {}, kept {}",
            items.len(),
            self.feed_url,
            cards.len()
        );

        cards.truncate(self.max_items);
        match &self.snapshot {
            Some(_) if cards.is_empty() => {
                warn!("{} has no usable items; keeping the previous snapshot", self.feed_url)
            }
            Some(store) => store.persist(&self.feed_url, &cards, now).await,
            None => {}
        }
        self.cache.update(&self.feed_url, cards, now).await;

        Ok(())
    }
}
