//! Round Engine
//!
//! The game's state machine. Owns one [`RoundState`] and mutates it only
//! through the operations below; every operation is total and never blocks.
//!
//! ```text
//!   start_or_reset ──► Active ──serve ok──► (RoundCleared) ──► Active
//!                        │  ▲
//!          serve wrong / │  │ lives > 0
//!          timeout       ▼  │
//!                     (LifeLost) ──lives == 0──► GameOver ──start_or_reset──► Active
//! ```

use std::sync::Arc;
use tracing::{debug, info};

use crate::core::rng::DeterministicRng;
use crate::game::catalog::{Catalog, Item};
use crate::game::events::{GameEvent, GameEventData, MissReason, ScoreReport};
use crate::game::order::{generate_order, order_size_for};
use crate::game::state::{RoundPhase, RoundSnapshot, RoundState};
use crate::{
    BASE_ORDER_SIZE, LEVELS_PER_SIZE_STEP, MAX_ORDER_SIZE, POINTS_PER_SERVE, ROUND_SECONDS,
    SERVES_PER_LEVEL, STARTING_LIVES,
};

/// Receiver of the final score.
///
/// Called exactly once per game over. Implementations must return
/// immediately; whatever persistence happens behind it is invisible to
/// the engine.
pub trait ScoreSink: Send + Sync {
    /// Hand off the final score and level.
    fn report(&self, report: ScoreReport);
}

/// Sink that drops every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ScoreSink for NullSink {
    fn report(&self, _report: ScoreReport) {}
}

/// Game rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RulesConfig {
    /// Countdown length per order, in one-second ticks
    pub round_seconds: u32,
    /// Lives at the start of a game
    pub starting_lives: u8,
    /// Score for a correct serve
    pub points_per_serve: u32,
    /// Correct serves needed to level up
    pub serves_per_level: u32,
    /// Items per order at level 1
    pub base_order_size: usize,
    /// Order size cap
    pub max_order_size: usize,
    /// Levels between order size increments
    pub levels_per_size_step: u32,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            round_seconds: ROUND_SECONDS,
            starting_lives: STARTING_LIVES,
            points_per_serve: POINTS_PER_SERVE,
            serves_per_level: SERVES_PER_LEVEL,
            base_order_size: BASE_ORDER_SIZE,
            max_order_size: MAX_ORDER_SIZE,
            levels_per_size_step: LEVELS_PER_SIZE_STEP,
        }
    }
}

impl RulesConfig {
    /// Order size at `level`.
    pub fn order_size(&self, level: u32) -> usize {
        order_size_for(
            level,
            self.base_order_size,
            self.max_order_size,
            self.levels_per_size_step,
        )
    }
}

/// Result of [`RoundEngine::serve_order`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeOutcome {
    /// Selection matched; a new order is up
    Served {
        /// Whether this serve completed the level
        level_up: bool,
    },
    /// Selection did not match; a life was lost
    Missed {
        /// Whether that was the last life
        game_over: bool,
    },
    /// Engine is in game over
    Ignored,
}

/// Result of [`RoundEngine::countdown_tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// One second elapsed
    Counted {
        /// Seconds left after this tick
        time_remaining: u32,
    },
    /// Countdown hit zero; a life was lost
    Expired {
        /// Whether that was the last life
        game_over: bool,
    },
    /// Tick belongs to an older order, or the game is over
    Stale,
}

/// The round state machine.
pub struct RoundEngine {
    catalog: Arc<Catalog>,
    rules: RulesConfig,
    rng: DeterministicRng,
    state: RoundState,
    sink: Arc<dyn ScoreSink>,
    pending_events: Vec<GameEvent>,
}

impl RoundEngine {
    /// Create an engine and start the first game.
    pub fn new(
        catalog: Arc<Catalog>,
        rules: RulesConfig,
        rng: DeterministicRng,
        sink: Arc<dyn ScoreSink>,
    ) -> Self {
        let state = RoundState::new(rules.starting_lives, rules.round_seconds);
        let mut engine = Self {
            catalog,
            rules,
            rng,
            state,
            sink,
            pending_events: Vec::new(),
        };
        engine.start_or_reset();
        engine
    }

    /// Create an engine with default rules and a fixed seed.
    pub fn with_seed(catalog: Arc<Catalog>, seed: u64, sink: Arc<dyn ScoreSink>) -> Self {
        Self::new(catalog, RulesConfig::default(), DeterministicRng::new(seed), sink)
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Start a new game from any state.
    ///
    /// The order epoch keeps counting across resets so ticks from the
    /// previous game can never match.
    pub fn start_or_reset(&mut self) {
        let epoch = self.state.order_epoch;
        self.state = RoundState::new(self.rules.starting_lives.max(1), self.rules.round_seconds);
        self.state.order_epoch = epoch;
        self.push_event(GameEventData::GameReset);
        self.generate_new_order();
    }

    /// Append an item to the selection. Returns false in game over.
    pub fn select_item(&mut self, item: Item) -> bool {
        if !self.state.is_active() {
            return false;
        }
        let item_id = item.id;
        self.state.selection.push(item);
        let event = GameEvent::item_selected(self.state.order_epoch, item_id, self.state.selection.len());
        self.pending_events.push(event);
        true
    }

    /// Empty the selection. Order and countdown are untouched.
    pub fn clear_selection(&mut self) -> bool {
        if !self.state.is_active() {
            return false;
        }
        self.state.selection.clear();
        self.push_event(GameEventData::SelectionCleared);
        true
    }

    /// Compare the selection to the order, as sequences.
    pub fn serve_order(&mut self) -> ServeOutcome {
        if !self.state.is_active() {
            return ServeOutcome::Ignored;
        }

        if !self.state.order.is_matched_by(&self.state.selection) {
            self.lose_life(MissReason::WrongOrder);
            return ServeOutcome::Missed {
                game_over: self.state.is_game_over(),
            };
        }

        let epoch = self.state.order_epoch;
        self.state.score = self.state.score.saturating_add(self.rules.points_per_serve);
        self.state.correct_streak += 1;
        self.pending_events.push(GameEvent::order_served(
            epoch,
            self.rules.points_per_serve,
            self.state.score,
            self.state.correct_streak,
        ));

        let level_up = self.state.correct_streak >= self.rules.serves_per_level;
        if level_up {
            self.state.level += 1;
            self.state.correct_streak = 0;
            let size = self.rules.order_size(self.state.level);
            debug!(level = self.state.level, order_size = size, "level up");
            self.pending_events.push(GameEvent::level_up(epoch, self.state.level, size));
        }

        self.generate_new_order();
        ServeOutcome::Served { level_up }
    }

    /// Advance the countdown by one second.
    ///
    /// `epoch` is the order epoch the tick was scheduled for. Reaching zero
    /// costs a life on this same tick.
    pub fn countdown_tick(&mut self, epoch: u64) -> TickOutcome {
        if !self.state.is_active() || epoch != self.state.order_epoch {
            return TickOutcome::Stale;
        }

        self.state.time_remaining = self.state.time_remaining.saturating_sub(1);
        if self.state.time_remaining > 0 {
            return TickOutcome::Counted {
                time_remaining: self.state.time_remaining,
            };
        }

        self.lose_life(MissReason::Timeout);
        TickOutcome::Expired {
            game_over: self.state.is_game_over(),
        }
    }

    fn lose_life(&mut self, reason: MissReason) {
        self.state.lives = self.state.lives.saturating_sub(1);
        self.state.selection.clear();
        let event = GameEvent::life_lost(self.state.order_epoch, reason, self.state.lives);
        self.pending_events.push(event);

        if self.state.lives > 0 {
            self.generate_new_order();
        } else {
            self.finish();
        }
    }

    fn finish(&mut self) {
        self.state.phase = RoundPhase::GameOver;
        let report = ScoreReport {
            final_score: self.state.score,
            final_level: self.state.level,
        };
        info!(score = report.final_score, level = report.final_level, "game over");
        self.pending_events.push(GameEvent::game_over(self.state.order_epoch, report));

        if !self.state.reported {
            self.state.reported = true;
            self.sink.report(report);
        }
    }

    fn generate_new_order(&mut self) {
        let size = self.rules.order_size(self.state.level);
        self.state.order = generate_order(&self.catalog, &mut self.rng, size);
        self.state.selection.clear();
        self.state.time_remaining = self.rules.round_seconds;
        self.state.order_epoch += 1;

        let event = GameEvent::order_generated(
            self.state.order_epoch,
            self.state.order.ids(),
            self.rules.round_seconds,
        );
        self.pending_events.push(event);
    }

    fn push_event(&mut self, data: GameEventData) {
        self.pending_events.push(GameEvent::new(self.state.order_epoch, data));
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Current state.
    pub fn state(&self) -> &RoundState {
        &self.state
    }

    /// Immutable copy of the observable state.
    pub fn snapshot(&self) -> RoundSnapshot {
        self.state.snapshot()
    }

    /// Epoch of the current order.
    pub fn order_epoch(&self) -> u64 {
        self.state.order_epoch
    }

    /// Check if the game has ended.
    pub fn is_game_over(&self) -> bool {
        self.state.is_game_over()
    }

    /// The catalog orders are drawn from.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Rules in force.
    pub fn rules(&self) -> &RulesConfig {
        &self.rules
    }

    /// Take pending events (consumes them).
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.pending_events)
    }
}

// =============================================================================
// TESTS
// =============================================================================
