//! Score Recorder
//!
//! Bridges the synchronous [`ScoreSink`] seen by the engine to the async
//! store. Reports are queued on an unbounded channel and written by a
//! background task, so the engine never waits on I/O.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::game::engine::ScoreSink;
use crate::game::events::ScoreReport;
use crate::network::auth::UserIdentity;
use super::scores::{ScoreStore, StoreError};

/// Sink that forwards reports to a recorder task.
#[derive(Debug, Clone)]
pub struct ScoreRecorder {
    tx: mpsc::UnboundedSender<ScoreReport>,
}

impl ScoreRecorder {
    /// Spawn the recorder task for one game session.
    ///
    /// The task exits once every clone of the returned sink is dropped.
    pub fn spawn(
        store: Arc<ScoreStore>,
        identity: Option<UserIdentity>,
    ) -> (Arc<Self>, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<ScoreReport>();

        let handle = tokio::spawn(async move {
            while let Some(report) = rx.recv().await {
                let Some(identity) = identity.as_ref() else {
                    debug!("Guest game over at score {}, not recorded", report.final_score);
                    continue;
                };
                if let Err(e) = record_score(&store, identity, report).await {
                    warn!(
                        "Failed to record score for player {}: {}",
                        identity.player_id.short(),
                        e
                    );
                }
            }
        });

        (Arc::new(Self { tx }), handle)
    }
}

impl ScoreSink for ScoreRecorder {
    fn report(&self, report: ScoreReport) {
        if self.tx.send(report).is_err() {
            warn!("Score recorder stopped, dropping report {:?}", report);
        }
    }
}

/// Add a leaderboard entry and raise the player's bests.
///
/// Both writes are attempted even if one fails. The first error is returned.
pub async fn record_score(
    store: &ScoreStore,
    identity: &UserIdentity,
    report: ScoreReport,
) -> Result<(), StoreError> {
    let added = store
        .add_score(&identity.uid, identity.player_name(), report.final_score)
        .await;
    if let Err(e) = &added {
        warn!("Leaderboard entry for player {} not written: {}", identity.player_id.short(), e);
    }

    let update = store
        .update_stats_if_higher(&identity.uid, report.final_score, report.final_level)
        .await;

    added?;
    let update = update?;
    info!(
        "Recorded score {} (level {}) for player {}{}",
        report.final_score,
        report.final_level,
        identity.player_id.short(),
        if update.changed() { ", new personal best" } else { "" }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::auth::PlayerId;

    fn identity(uid: &str, name: Option<&str>) -> UserIdentity {
        UserIdentity {
            uid: uid.into(),
            player_id: PlayerId::new([7; 16]),
            display_name: name.map(Into::into),
            email: None,
        }
    }

    fn report(final_score: u32, final_level: u32) -> ScoreReport {
        ScoreReport { final_score, final_level }
    }

    #[tokio::test]
    async fn test_record_score_updates_profile() {
        let store = ScoreStore::in_memory();
        store.create_profile("uid-1", "barista", None).await.unwrap();

        record_score(&store, &identity("uid-1", Some("Barista")), report(140, 2))
            .await
            .unwrap();

        let top = store.top_scores(10).await;
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].player_name, "Barista");
        assert_eq!(top[0].score, 140);

        let profile = store.profile("uid-1").await.unwrap();
        assert_eq!(profile.highest_score, 140);
        assert_eq!(profile.highest_level, 2);
    }

    #[tokio::test]
    async fn test_unregistered_player_keeps_leaderboard_entry() {
        let store = ScoreStore::in_memory();

        let result = record_score(&store, &identity("uid-9", None), report(40, 1)).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));

        let top = store.top_scores(10).await;
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].player_name, "uid-9");
    }

    #[tokio::test]
    async fn test_failed_write_records_nothing() {
        let dir = std::env::temp_dir().join(format!("cafe-recorder-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir(&dir).await.unwrap();
        let store = ScoreStore::open(dir.join("store.json")).await.unwrap();
        store.create_profile("uid-1", "barista", None).await.unwrap();
        tokio::fs::remove_dir_all(&dir).await.unwrap();

        let result = record_score(&store, &identity("uid-1", None), report(80, 2)).await;
        assert!(matches!(result, Err(StoreError::Io(_))));

        assert!(store.top_scores(10).await.is_empty());
        assert_eq!(store.profile("uid-1").await.unwrap().highest_score, 0);
    }

    #[tokio::test]
    async fn test_recorder_task_drains_reports() {
        let store = Arc::new(ScoreStore::in_memory());
        store.create_profile("uid-1", "barista", None).await.unwrap();

        let (sink, handle) = ScoreRecorder::spawn(store.clone(), Some(identity("uid-1", None)));
        sink.report(report(60, 1));
        sink.report(report(20, 1));
        drop(sink);
        handle.await.unwrap();

        assert_eq!(store.top_scores(10).await.len(), 2);
        assert_eq!(store.profile("uid-1").await.unwrap().highest_score, 60);
    }

    #[tokio::test]
    async fn test_guest_reports_are_dropped() {
        let store = Arc::new(ScoreStore::in_memory());

        let (sink, handle) = ScoreRecorder::spawn(store.clone(), None);
        sink.report(report(200, 3));
        drop(sink);
        handle.await.unwrap();

        assert!(store.top_scores(10).await.is_empty());
    }
}
