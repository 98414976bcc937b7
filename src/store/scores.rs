//! Profile and Leaderboard Store
//!
//! In-memory store behind an async `RwLock`, optionally mirrored to a JSON
//! file that is rewritten after every mutation. A mutation whose write fails
//! is undone in memory, so memory never runs ahead of the file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use chrono::Utc;
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::models::{PlayerScore, StatsUpdate, UserProfile};

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No profile for this uid.
    #[error("profile not found: {0}")]
    NotFound(String),

    /// Uid already registered.
    #[error("profile already exists: {0}")]
    AlreadyExists(String),

    /// Username is blank.
    #[error("username is required")]
    InvalidUsername,

    /// Reading or writing the store file failed.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Store file could not be (de)serialized.
    #[error("store format error: {0}")]
    Format(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
    profiles: BTreeMap<String, UserProfile>,
    /// Kept in leaderboard order: score descending, then oldest first.
    scores: Vec<PlayerScore>,
}

impl StoreData {
    fn sort_scores(&mut self) {
        self.scores.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then(a.recorded_at.cmp(&b.recorded_at))
        });
    }

    /// Position for a new entry: after every score at least as high.
    fn score_slot(&self, score: u32) -> usize {
        self.scores.partition_point(|s| s.score >= score)
    }
}

/// Profiles keyed by uid, plus every recorded score.
pub struct ScoreStore {
    data: RwLock<StoreData>,
    path: Option<PathBuf>,
}

impl ScoreStore {
    /// Create an empty store that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            data: RwLock::new(StoreData::default()),
            path: None,
        }
    }

    /// Open a file-backed store. A missing file starts empty.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut data: StoreData = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreData::default(),
            Err(e) => return Err(e.into()),
        };
        data.sort_scores();
        info!(
            "Opened score store {} ({} profiles, {} scores)",
            path.display(),
            data.profiles.len(),
            data.scores.len()
        );

        Ok(Self {
            data: RwLock::new(data),
            path: Some(path),
        })
    }

    /// Register a profile for `uid`.
    pub async fn create_profile(
        &self,
        uid: &str,
        username: &str,
        email: Option<&str>,
    ) -> Result<UserProfile, StoreError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(StoreError::InvalidUsername);
        }

        let mut data = self.data.write().await;
        if data.profiles.contains_key(uid) {
            return Err(StoreError::AlreadyExists(uid.to_string()));
        }

        let profile = UserProfile::new(username.to_string(), email.map(str::to_string));
        data.profiles.insert(uid.to_string(), profile.clone());
        if let Err(e) = self.persist(&data).await {
            data.profiles.remove(uid);
            return Err(e);
        }

        Ok(profile)
    }

    /// Get the profile for `uid`.
    pub async fn profile(&self, uid: &str) -> Result<UserProfile, StoreError> {
        let data = self.data.read().await;
        data.profiles
            .get(uid)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(uid.to_string()))
    }

    /// Raise best score and best level, each only if strictly higher.
    pub async fn update_stats_if_higher(
        &self,
        uid: &str,
        score: u32,
        level: u32,
    ) -> Result<StatsUpdate, StoreError> {
        let mut data = self.data.write().await;
        let profile = data
            .profiles
            .get_mut(uid)
            .ok_or_else(|| StoreError::NotFound(uid.to_string()))?;

        let previous = (profile.highest_score, profile.highest_level);
        let mut update = StatsUpdate::default();
        if score > profile.highest_score {
            profile.highest_score = score;
            update.score_raised = true;
        }
        if level > profile.highest_level {
            profile.highest_level = level;
            update.level_raised = true;
        }

        if update.changed() {
            if let Err(e) = self.persist(&data).await {
                if let Some(profile) = data.profiles.get_mut(uid) {
                    (profile.highest_score, profile.highest_level) = previous;
                }
                return Err(e);
            }
        }
        Ok(update)
    }

    /// Append a leaderboard entry.
    pub async fn add_score(
        &self,
        user_id: &str,
        player_name: &str,
        score: u32,
    ) -> Result<PlayerScore, StoreError> {
        let entry = PlayerScore {
            doc_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            player_name: player_name.to_string(),
            score,
            recorded_at: Utc::now(),
        };

        let mut data = self.data.write().await;
        let slot = data.score_slot(score);
        data.scores.insert(slot, entry.clone());
        if let Err(e) = self.persist(&data).await {
            data.scores.remove(slot);
            return Err(e);
        }

        Ok(entry)
    }

    /// Best `limit` scores, highest first. Ties go to the earlier entry.
    pub async fn top_scores(&self, limit: usize) -> Vec<PlayerScore> {
        let data = self.data.read().await;
        data.scores.iter().take(limit).cloned().collect()
    }

    /// Number of registered profiles.
    pub async fn profile_count(&self) -> usize {
        self.data.read().await.profiles.len()
    }

    /// Write the whole store to a sibling temp file, then rename it over
    /// the store file.
    async fn persist(&self, data: &StoreData) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let raw = serde_json::to_string_pretty(data)?;
        let tmp = temp_path(path);
        if let Err(e) = tokio::fs::write(&tmp, raw).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        tokio::fs::rename(&tmp, path).await?;
        debug!("Wrote score store {}", path.display());
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

impl Default for ScoreStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_read_profile() {
        let store = ScoreStore::in_memory();
        let created = store
            .create_profile("uid-1", "  barista  ", Some("b@cafe.test"))
            .await
            .unwrap();
        assert_eq!(created.username, "barista");
        assert_eq!(created.highest_score, 0);
        assert_eq!(created.highest_level, 0);

        let read = store.profile("uid-1").await.unwrap();
        assert_eq!(read, created);
        assert_eq!(store.profile_count().await, 1);
    }

    #[tokio::test]
    async fn test_create_profile_validation() {
        let store = ScoreStore::in_memory();
        assert!(matches!(
            store.create_profile("uid-1", "   ", None).await,
            Err(StoreError::InvalidUsername)
        ));

        store.create_profile("uid-1", "first", None).await.unwrap();
        assert!(matches!(
            store.create_profile("uid-1", "second", None).await,
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_profile() {
        let store = ScoreStore::in_memory();
        assert!(matches!(store.profile("nobody").await, Err(StoreError::NotFound(_))));
        assert!(matches!(
            store.update_stats_if_higher("nobody", 10, 1).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_stats_only_raised() {
        let store = ScoreStore::in_memory();
        store.create_profile("uid-1", "barista", None).await.unwrap();

        let update = store.update_stats_if_higher("uid-1", 100, 2).await.unwrap();
        assert!(update.score_raised && update.level_raised);

        // Lower score, higher level
        let update = store.update_stats_if_higher("uid-1", 60, 3).await.unwrap();
        assert!(!update.score_raised);
        assert!(update.level_raised);

        // Equal is not higher
        let update = store.update_stats_if_higher("uid-1", 100, 3).await.unwrap();
        assert!(!update.changed());

        let profile = store.profile("uid-1").await.unwrap();
        assert_eq!(profile.highest_score, 100);
        assert_eq!(profile.highest_level, 3);
    }

    #[tokio::test]
    async fn test_top_scores_sorted_and_limited() {
        let store = ScoreStore::in_memory();
        for (name, score) in [("a", 40), ("b", 200), ("c", 120), ("d", 200), ("e", 0)] {
            store.add_score(name, name, score).await.unwrap();
        }

        let top = store.top_scores(3).await;
        let names: Vec<_> = top.iter().map(|s| s.player_name.as_str()).collect();
        assert_eq!(names, vec!["b", "d", "c"]);

        assert_eq!(store.top_scores(10).await.len(), 5);
        assert!(store.top_scores(0).await.is_empty());
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let path = std::env::temp_dir().join(format!("cafe-store-{}.json", uuid::Uuid::new_v4()));

        {
            let store = ScoreStore::open(&path).await.unwrap();
            store.create_profile("uid-1", "barista", None).await.unwrap();
            store.update_stats_if_higher("uid-1", 80, 2).await.unwrap();
            store.add_score("uid-1", "barista", 80).await.unwrap();
        }

        let reopened = ScoreStore::open(&path).await.unwrap();
        assert_eq!(reopened.profile("uid-1").await.unwrap().highest_score, 80);
        assert_eq!(reopened.top_scores(10).await.len(), 1);

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_failed_write_leaves_memory_unchanged() {
        // Parent directory does not exist, so every write fails
        let dir = std::env::temp_dir().join(format!("cafe-store-{}", uuid::Uuid::new_v4()));
        let store = ScoreStore::open(dir.join("store.json")).await.unwrap();

        assert!(matches!(
            store.create_profile("uid-1", "barista", None).await,
            Err(StoreError::Io(_))
        ));
        assert!(matches!(store.profile("uid-1").await, Err(StoreError::NotFound(_))));
        assert_eq!(store.profile_count().await, 0);
        // A retry hits the same write error, not AlreadyExists
        assert!(matches!(
            store.create_profile("uid-1", "barista", None).await,
            Err(StoreError::Io(_))
        ));

        assert!(matches!(store.add_score("uid-1", "barista", 40).await, Err(StoreError::Io(_))));
        assert!(store.top_scores(10).await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_stats_write_keeps_old_bests() {
        let dir = std::env::temp_dir().join(format!("cafe-store-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir(&dir).await.unwrap();
        let store = ScoreStore::open(dir.join("store.json")).await.unwrap();
        store.create_profile("uid-1", "barista", None).await.unwrap();
        store.update_stats_if_higher("uid-1", 40, 1).await.unwrap();

        tokio::fs::remove_dir_all(&dir).await.unwrap();

        assert!(matches!(
            store.update_stats_if_higher("uid-1", 90, 3).await,
            Err(StoreError::Io(_))
        ));
        let profile = store.profile("uid-1").await.unwrap();
        assert_eq!(profile.highest_score, 40);
        assert_eq!(profile.highest_level, 1);
    }

    #[tokio::test]
    async fn test_write_leaves_no_temp_file() {
        let path = std::env::temp_dir().join(format!("cafe-store-{}.json", uuid::Uuid::new_v4()));
        let store = ScoreStore::open(&path).await.unwrap();
        store.add_score("uid-1", "barista", 20).await.unwrap();

        assert!(tokio::fs::metadata(&path).await.is_ok());
        assert!(tokio::fs::metadata(temp_path(&path)).await.is_err());

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_unsorted_file_loads_in_leaderboard_order() {
        let path = std::env::temp_dir().join(format!("cafe-store-{}.json", uuid::Uuid::new_v4()));
        let entry = |name: &str, score: u32, secs: i64| PlayerScore {
            doc_id: name.to_string(),
            user_id: name.to_string(),
            player_name: name.to_string(),
            score,
            recorded_at: chrono::DateTime::from_timestamp(secs, 0).unwrap(),
        };
        let data = StoreData {
            profiles: BTreeMap::new(),
            scores: vec![entry("late", 60, 300), entry("low", 20, 100), entry("early", 60, 200)],
        };
        tokio::fs::write(&path, serde_json::to_string(&data).unwrap()).await.unwrap();

        let store = ScoreStore::open(&path).await.unwrap();
        store.add_score("new", "new", 60).await.unwrap();

        let names: Vec<_> = store
            .top_scores(10)
            .await
            .into_iter()
            .map(|s| s.player_name)
            .collect();
        assert_eq!(names, vec!["early", "late", "new", "low"]);

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_corrupt_file_rejected() {
        let path = std::env::temp_dir().join(format!("cafe-store-{}.json", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, "not json").await.unwrap();

        assert!(matches!(ScoreStore::open(&path).await, Err(StoreError::Format(_))));

        let _ = tokio::fs::remove_file(&path).await;
    }
}
