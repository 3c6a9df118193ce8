use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::recipe::RecipeCard;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub data: Vec<RecipeCard>,
    pub cached_at: DateTime<Utc>, // instant of the last successful refresh
}

impl CacheEntry {
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.cached_at < ttl
    }

    pub fn first(&self, limit: usize) -> Vec<RecipeCard> {
        self.data.iter().take(limit).cloned().collect()
    }
}

/// Last good card list per feed URL.
#[derive(Debug)]
pub struct FeedCache {
    max_items: usize,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl FeedCache {
    pub fn new(max_items: usize) -> Self {
        Self {
            max_items,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn is_fresh(&self, feed_url: &str, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.entries
            .lock()
            .await
            .get(feed_url)
            .is_some_and(|entry| entry.is_fresh(now, ttl))
    }

    /// The entry for `feed_url` cut down to its first `limit` cards in feed order.
    /// The stored entry keeps everything. Never triggers a fetch.
    pub async fn get(&self, feed_url: &str, limit: usize) -> Option<CacheEntry> {
        self.entries
            .lock()
            .await
            .get(feed_url)
            .map(|entry| CacheEntry {
                data: entry.first(limit),
                cached_at: entry.cached_at,
            })
    }

    /// Replaces the entry for `feed_url`, keeping at most `max_items` cards
    /// no matter how many the triggering request asked for.
    pub async fn update(&self, feed_url: &str, mut cards: Vec<RecipeCard>, now: DateTime<Utc>) {
        cards.truncate(self.max_items);

        self.entries.lock().await.insert(
            feed_url.to_string(),
            CacheEntry {
                data: cards,
                cached_at: now,
            },
        );
    }
}
