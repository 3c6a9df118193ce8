use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::Result;
use crate::recipe::RecipeCard;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub feed_url: String,
    pub saved_at: DateTime<Utc>,
    pub cards: Vec<RecipeCard>,
}

/// On-disk copy of the last successful refresh. Survives restarts and is only
/// read when neither memory nor the network can answer.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write(&self, snapshot: &Snapshot) -> Result<()> {
        let body = serde_json::to_vec_pretty(snapshot)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    async fn read(&self) -> Result<Snapshot> {
        let body = tokio::fs::read(&self.path).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Write-through after a refresh. Failures are logged and swallowed.
    pub async fn persist(&self, feed_url: &str, cards: &[RecipeCard], now: DateTime<Utc>) {
        let snapshot = Snapshot {
            feed_url: feed_url.to_string(),
            saved_at: now,
            cards: cards.to_vec(),
        };

        match self.write(&snapshot).await {
            Ok(()) => debug!("Snapshot written to {}", self.path.display()),
            Err(e) => warn!("Failed to write snapshot {}: {}", self.path.display(), e),
        }
    }

    /// Cards saved for `feed_url`, if a readable snapshot for that feed exists.
    pub async fn load(&self, feed_url: &str) -> Option<Snapshot> {
        match self.read().await {
            Ok(snapshot) if snapshot.feed_url == feed_url => Some(snapshot),
            Ok(snapshot) => {
                debug!(
                    "Snapshot is for {}, not {}; ignoring",
                    snapshot.feed_url, feed_url
                );
                None
            }
            Err(e) => {
                warn!("Failed to read snapshot {}: {}", self.path.display(), e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cards() -> Vec<RecipeCard> {
        vec![RecipeCard {
            title: "Focaccia".into(),
            image: "https://img.test/focaccia.jpg".into(),
            description: "Olive oil and salt".into(),
            link: "https://r.test/focaccia".into(),
            pub_date: "2026-10-01T10:00:00.000Z".into(),
        }]
    }

    #[tokio::test]
    async fn persist_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("snapshot.json"));

        store.persist("https://feed.test/rss", &cards(), Utc::now()).await;

        let loaded = store.load("https://feed.test/rss").await.unwrap();
        assert_eq!(loaded.cards, cards());
    }

    #[tokio::test]
    async fn other_feed_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("snapshot.json"));

        store.persist("https://feed.test/rss", &cards(), Utc::now()).await;

        assert!(store.load("https://elsewhere.test/rss").await.is_none());
    }

    #[tokio::test]
    async fn missing_or_corrupt_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("snapshot.json"));
        assert!(store.load("https://feed.test/rss").await.is_none());

        std::fs::write(store.path(), b"{ not json").unwrap();
        assert!(store.load("https://feed.test/rss").await.is_none());
    }

    #[tokio::test]
    async fn unwritable_path_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("missing").join("snapshot.json"));

        store.persist("https://feed.test/rss", &cards(), Utc::now()).await;
        assert!(store.load("https://feed.test/rss").await.is_none());
    }
}
