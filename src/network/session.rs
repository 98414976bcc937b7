//! Game Session Actor
//!
//! One session per playing connection. The session task owns the
//! [`RoundEngine`] and applies every mutation serially: player commands and
//! countdown ticks arrive on the same channel. Observers read snapshots from
//! a `watch` channel and events from a `broadcast` channel.
//!
//! ```text
//!   GameSession ──Command──► actor ──snapshot──► watch
//!        ▲                     │  └──events────► broadcast
//!   countdown ──Tick{epoch}────┘
//!   (one task per order)       └──ScoreReport──► recorder ──► ScoreStore
//! ```

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument};

use crate::core::rng::DeterministicRng;
use crate::game::catalog::{Catalog, Item, ItemId};
use crate::game::engine::{RoundEngine, RulesConfig, ScoreSink};
use crate::game::events::GameEvent;
use crate::game::state::RoundSnapshot;
use crate::network::auth::UserIdentity;
use crate::store::{ScoreRecorder, ScoreStore};

/// Unique session identifier.
pub type SessionId = [u8; 16];

/// Countdown resolution.
pub const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

/// Event channel capacity per session.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Everything a session needs from its connection.
#[derive(Clone)]
pub struct SessionContext {
    /// Orderable items.
    pub catalog: Arc<Catalog>,
    /// Game rules.
    pub rules: RulesConfig,
    /// Where final scores go.
    pub store: Arc<ScoreStore>,
    /// Signed-in player, or `None` for a guest.
    pub identity: Option<UserIdentity>,
}

impl SessionContext {
    /// Context with the default menu and rules.
    pub fn new(store: Arc<ScoreStore>, identity: Option<UserIdentity>) -> Self {
        Self {
            catalog: Arc::new(Catalog::cafe_menu()),
            rules: RulesConfig::default(),
            store,
            identity,
        }
    }
}

/// Session errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    /// The session task has stopped.
    #[error("Session closed")]
    Closed,

    /// Item id is not on the menu.
    #[error("Unknown item {0}")]
    UnknownItem(ItemId),
}

/// Commands applied by the session task.
#[derive(Debug)]
enum Command {
    Start,
    Select(Item),
    Clear,
    Serve,
    Tick { epoch: u64 },
    Shutdown,
}

/// Receivers created before the session task starts, so nothing it
/// publishes is missed.
pub struct SessionFeed {
    /// Latest round snapshot.
    pub snapshots: watch::Receiver<RoundSnapshot>,
    /// Game events in order.
    pub events: broadcast::Receiver<GameEvent>,
}

// =============================================================================
// HANDLE
// =============================================================================

/// Handle to a running session.
///
/// All inputs are non-blocking sends. Dropping the handle stops the
/// session once its countdown notices.
pub struct GameSession {
    id: SessionId,
    player_uid: Option<String>,
    catalog: Arc<Catalog>,
    cmd_tx: mpsc::UnboundedSender<Command>,
    snapshot_rx: watch::Receiver<RoundSnapshot>,
    actor: JoinHandle<()>,
    recorder: JoinHandle<()>,
}

impl GameSession {
    /// Start a new game in its own task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(ctx: SessionContext) -> (Self, SessionFeed) {
        let id = uuid::Uuid::new_v4().into_bytes();
        let entropy = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        let rng = DeterministicRng::for_session(&id, entropy);

        let (sink, recorder) = ScoreRecorder::spawn(ctx.store.clone(), ctx.identity.clone());
        Self::spawn_with(id, ctx, rng, sink, recorder)
    }

    fn spawn_with(
        id: SessionId,
        ctx: SessionContext,
        rng: DeterministicRng,
        sink: Arc<dyn ScoreSink>,
        recorder: JoinHandle<()>,
    ) -> (Self, SessionFeed) {
        let engine = RoundEngine::new(ctx.catalog.clone(), ctx.rules, rng, sink);

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(engine.snapshot());
        let (event_tx, event_rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let feed = SessionFeed {
            snapshots: snapshot_rx.clone(),
            events: event_rx,
        };

        let actor = SessionActor {
            id,
            engine,
            cmd_rx,
            cmd_tx: cmd_tx.downgrade(),
            snapshot_tx,
            event_tx,
            countdown: None,
        };
        let actor = tokio::spawn(actor.run());

        info!(
            "Session {} started for {}",
            hex::encode(&id[..4]),
            ctx.identity
                .as_ref()
                .map(|i| i.player_id.short())
                .unwrap_or_else(|| "guest".to_string())
        );

        let session = Self {
            id,
            player_uid: ctx.identity.map(|i| i.uid),
            catalog: ctx.catalog,
            cmd_tx,
            snapshot_rx,
            actor,
            recorder,
        };
        (session, feed)
    }

    /// Restart the game from scratch.
    pub fn start(&self) -> Result<(), SessionError> {
        self.send(Command::Start)
    }

    /// Add a menu item to the selection.
    pub fn select(&self, item_id: ItemId) -> Result<(), SessionError> {
        let item = self
            .catalog
            .get(item_id)
            .cloned()
            .ok_or(SessionError::UnknownItem(item_id))?;
        self.send(Command::Select(item))
    }

    /// Empty the selection.
    pub fn clear_selection(&self) -> Result<(), SessionError> {
        self.send(Command::Clear)
    }

    /// Serve the current selection.
    pub fn serve(&self) -> Result<(), SessionError> {
        self.send(Command::Serve)
    }

    /// Stop the session task.
    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(Command::Shutdown);
    }

    /// Wait for the session and its pending score writes to finish.
    pub async fn join(self) {
        let Self { cmd_tx, actor, recorder, .. } = self;
        drop(cmd_tx);
        let _ = actor.await;
        let _ = recorder.await;
    }

    /// Latest snapshot.
    pub fn snapshot(&self) -> RoundSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Session id.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Uid of the player whose scores this session records.
    pub fn player_uid(&self) -> Option<&str> {
        self.player_uid.as_deref()
    }

    /// Whether the session task is still running.
    pub fn is_running(&self) -> bool {
        !self.actor.is_finished()
    }

    fn send(&self, cmd: Command) -> Result<(), SessionError> {
        self.cmd_tx.send(cmd).map_err(|_| SessionError::Closed)
    }
}

// =============================================================================
// ACTOR
// =============================================================================

struct Countdown {
    epoch: u64,
    handle: JoinHandle<()>,
}

struct SessionActor {
    id: SessionId,
    engine: RoundEngine,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    /// Weak so that dropping every handle closes the channel.
    cmd_tx: mpsc::WeakUnboundedSender<Command>,
    snapshot_tx: watch::Sender<RoundSnapshot>,
    event_tx: broadcast::Sender<GameEvent>,
    countdown: Option<Countdown>,
}

impl SessionActor {
    #[instrument(skip(self), fields(session = %hex::encode(&self.id[..4])))]
    async fn run(mut self) {
        self.publish();

        while let Some(cmd) = self.cmd_rx.recv().await {
            match cmd {
                Command::Start => self.engine.start_or_reset(),
                Command::Select(item) => {
                    self.engine.select_item(item);
                }
                Command::Clear => {
                    self.engine.clear_selection();
                }
                Command::Serve => {
                    self.engine.serve_order();
                }
                Command::Tick { epoch } => {
                    self.engine.countdown_tick(epoch);
                }
                Command::Shutdown => break,
            }
            self.publish();
        }

        self.stop_countdown();
        debug!(
            "Session ended at score {} level {}",
            self.engine.state().score,
            self.engine.state().level
        );
    }

    /// Push pending events and the new snapshot, then line the countdown
    /// up with the current order.
    fn publish(&mut self) {
        for event in self.engine.take_events() {
            // No receivers is fine
            let _ = self.event_tx.send(event);
        }

        let snapshot = self.engine.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });

        self.sync_countdown();
    }

    fn sync_countdown(&mut self) {
        if self.engine.is_game_over() {
            self.stop_countdown();
            return;
        }

        let epoch = self.engine.order_epoch();
        if self.countdown.as_ref().map(|c| c.epoch) == Some(epoch) {
            return;
        }

        self.stop_countdown();
        let handle = tokio::spawn(run_countdown(epoch, self.cmd_tx.clone()));
        self.countdown = Some(Countdown { epoch, handle });
    }

    fn stop_countdown(&mut self) {
        if let Some(countdown) = self.countdown.take() {
            countdown.handle.abort();
        }
    }
}

/// Send one tick per second for `epoch` until aborted or the session is gone.
async fn run_countdown(epoch: u64, cmd_tx: mpsc::WeakUnboundedSender<Command>) {
    let mut ticker = interval_at(Instant::now() + COUNTDOWN_TICK, COUNTDOWN_TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let Some(tx) = cmd_tx.upgrade() else {
            break;
        };
        if tx.send(Command::Tick { epoch }).is_err() {
            break;
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::events::{GameEventData, MissReason, ScoreReport};
    use crate::game::state::RoundPhase;
    use crate::network::auth::PlayerId;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        reports: Mutex<Vec<ScoreReport>>,
    }

    impl ScoreSink for RecordingSink {
        fn report(&self, report: ScoreReport) {
            self.reports.lock().unwrap().push(report);
        }
    }

    fn guest_context() -> SessionContext {
        SessionContext::new(Arc::new(ScoreStore::in_memory()), None)
    }

    fn spawn_recording(seed: u64) -> (GameSession, SessionFeed, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let recorder = tokio::spawn(async {});
        let (session, feed) = GameSession::spawn_with(
            [9; 16],
            guest_context(),
            DeterministicRng::new(seed),
            sink.clone(),
            recorder,
        );
        (session, feed, sink)
    }

    /// Let the session task drain its queue.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_snapshot_is_a_fresh_game() {
        let (session, feed, _) = spawn_recording(1);
        let snapshot = feed.snapshots.borrow().clone();

        assert_eq!(snapshot.score, 0);
        assert_eq!(snapshot.lives, 3);
        assert_eq!(snapshot.level, 1);
        assert_eq!(snapshot.time_remaining, 30);
        assert_eq!(snapshot.order.len(), 2);
        assert!(snapshot.selection.is_empty());
        assert_eq!(session.snapshot(), snapshot);
    }

    #[tokio::test(start_paused = true)]
    async fn test_feed_sees_initial_events() {
        let (_session, mut feed, _) = spawn_recording(2);

        let first = feed.events.recv().await.unwrap();
        assert_eq!(first.data, GameEventData::GameReset);
        let second = feed.events.recv().await.unwrap();
        assert!(matches!(second.data, GameEventData::OrderGenerated { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_and_serve_through_handle() {
        let (session, _feed, _) = spawn_recording(3);
        let order: Vec<ItemId> = session.snapshot().order.iter().map(|i| i.id).collect();

        for id in &order {
            session.select(*id).unwrap();
        }
        session.serve().unwrap();
        settle().await;

        let snapshot = session.snapshot();
        assert_eq!(snapshot.score, 20);
        assert_eq!(snapshot.lives, 3);
        assert_eq!(snapshot.correct_streak, 1);
        assert!(snapshot.selection.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_item_rejected() {
        let (session, _feed, _) = spawn_recording(4);
        assert!(matches!(session.select(999), Err(SessionError::UnknownItem(999))));
        assert!(matches!(session.select(0), Err(SessionError::UnknownItem(0))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_decrements_each_second() {
        let (session, _feed, _) = spawn_recording(5);

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(session.snapshot().time_remaining, 27);
        assert_eq!(session.snapshot().lives, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_costs_one_life_and_rearms() {
        let (session, mut feed, _) = spawn_recording(6);
        let first_epoch = session.snapshot().order_epoch;

        tokio::time::sleep(Duration::from_millis(30_500)).await;

        let snapshot = session.snapshot();
        assert_eq!(snapshot.lives, 2);
        assert_eq!(snapshot.time_remaining, 30);
        assert!(snapshot.order_epoch > first_epoch);
        assert_eq!(snapshot.phase, RoundPhase::Active);

        let mut timeouts = 0;
        while let Ok(event) = feed.events.try_recv() {
            if let GameEventData::LifeLost { reason: MissReason::Timeout, .. } = event.data {
                timeouts += 1;
            }
        }
        assert_eq!(timeouts, 1);

        // The new order gets its own full countdown
        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(session.snapshot().lives, 2);
        assert_eq!(session.snapshot().time_remaining, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_serve_resets_countdown() {
        let (session, _feed, _) = spawn_recording(7);

        tokio::time::sleep(Duration::from_millis(20_500)).await;
        assert_eq!(session.snapshot().time_remaining, 10);

        let order: Vec<ItemId> = session.snapshot().order.iter().map(|i| i.id).collect();
        for id in order {
            session.select(id).unwrap();
        }
        session.serve().unwrap();
        settle().await;
        assert_eq!(session.snapshot().time_remaining, 30);

        // The old countdown would have expired here
        tokio::time::sleep(Duration::from_secs(15)).await;
        let snapshot = session.snapshot();
        assert_eq!(snapshot.lives, 3);
        assert_eq!(snapshot.time_remaining, 15);
    }

    #[tokio::test(start_paused = true)]
    async fn test_game_over_reports_once_and_stops_countdown() {
        let (session, _feed, sink) = spawn_recording(8);

        // Empty selection never matches a non-empty order
        for _ in 0..3 {
            session.serve().unwrap();
        }
        session.serve().unwrap();
        settle().await;

        let snapshot = session.snapshot();
        assert_eq!(snapshot.phase, RoundPhase::GameOver);
        assert_eq!(snapshot.lives, 0);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(session.snapshot(), snapshot);

        let reports = sink.reports.lock().unwrap().clone();
        assert_eq!(reports, vec![ScoreReport { final_score: 0, final_level: 1 }]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_after_game_over() {
        let (session, _feed, _) = spawn_recording(9);
        for _ in 0..3 {
            session.serve().unwrap();
        }
        settle().await;
        assert_eq!(session.snapshot().phase, RoundPhase::GameOver);

        session.start().unwrap();
        settle().await;
        let snapshot = session.snapshot();
        assert_eq!(snapshot.phase, RoundPhase::Active);
        assert_eq!(snapshot.lives, 3);
        assert_eq!(snapshot.time_remaining, 30);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(session.snapshot().time_remaining, 28);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_session() {
        let (session, _feed, _) = spawn_recording(10);
        session.shutdown();
        settle().await;

        assert!(!session.is_running());
        assert!(matches!(session.serve(), Err(SessionError::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_signed_in_game_over_is_recorded() {
        let store = Arc::new(ScoreStore::in_memory());
        store.create_profile("uid-1", "barista", None).await.unwrap();

        let identity = UserIdentity {
            uid: "uid-1".into(),
            player_id: PlayerId::new([1; 16]),
            display_name: Some("Barista".into()),
            email: None,
        };
        let (session, _feed) = GameSession::spawn(SessionContext::new(store.clone(), Some(identity)));
        assert_eq!(session.player_uid(), Some("uid-1"));

        for _ in 0..3 {
            session.serve().unwrap();
        }
        settle().await;
        session.serve().unwrap();
        session.shutdown();
        session.join().await;

        let top = store.top_scores(10).await;
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].player_name, "Barista");
        assert_eq!(store.profile("uid-1").await.unwrap().highest_level, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_guest_game_over_not_recorded() {
        let store = Arc::new(ScoreStore::in_memory());
        let (session, _feed) = GameSession::spawn(SessionContext::new(store.clone(), None));

        for _ in 0..3 {
            session.serve().unwrap();
        }
        session.shutdown();
        session.join().await;

        assert!(store.top_scores(10).await.is_empty());
    }
}
