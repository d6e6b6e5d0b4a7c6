//! Game session state machine.
//!
//! [`GameSession`] is plain synchronous state: every transition is a method that
//! either applies fully or returns a [`SessionError`] and leaves the session
//! untouched. [`GameController`] wraps it with the pool builder and the round
//! countdown.
//!
//! Phases run `idle -> loading -> active -> over -> summary_shown`, and
//! `reset` returns to `idle` from anywhere.

mod controller;
mod timer;
mod turn;

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::catalog::CatalogError;
use crate::types::*;

pub use controller::{GameController, SettingsUpdate};
pub use timer::RoundTimer;
pub use turn::TurnTracker;

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("cannot {action} while the game is {from:?}")]
    InvalidTransition {
        from: GamePhase,
        action: &'static str,
    },

    #[error("no game in progress")]
    NotActive,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("a newer request replaced this one")]
    Superseded,

    #[error(transparent)]
    Fetch(#[from] CatalogError),
}

/// Outcome of a "Next" press
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Advance {
    /// The other player answers the same question
    TurnPassed,
    NextQuestion,
    /// The queue ran out and the game is over
    Finished,
}

/// Read-only view of the session handed to the presentation layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub phase: GamePhase,
    pub category: Option<String>,
    pub current_question: Option<Question>,
    pub question_index: usize,
    pub total_question_count: usize,
    pub remaining_question_count: usize,
    /// Active game whose pool came back empty
    pub no_questions_available: bool,
    pub current_player: PlayerSlot,
    pub current_player_name: String,
    pub players: Players,
    pub config: GameConfig,
    pub seconds_remaining: Option<u64>,
    pub has_error: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Default)]
pub struct GameSession {
    current_category: Option<CategorySelection>,
    current_question: Option<Question>,
    remaining: VecDeque<Question>,
    question_index: usize,
    total: usize,
    config: GameConfig,
    turns: TurnTracker,
    players: Players,
    phase: GamePhase,
    /// Phase to restore when a load fails
    phase_before_loading: GamePhase,
    /// Identifies the most recent load; older loads are discarded on completion
    load_token: u64,
    /// Bumped on every change of the displayed round; countdowns compare against it
    round_generation: u64,
    errors: Vec<String>,
}

impl GameSession {
    pub fn new(players: Players) -> Self {
        Self {
            players,
            ..Default::default()
        }
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn players(&self) -> &Players {
        &self.players
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.current_question.as_ref()
    }

    pub fn current_player(&self) -> PlayerSlot {
        self.turns.current()
    }

    pub fn question_index(&self) -> usize {
        self.question_index
    }

    pub fn remaining_count(&self) -> usize {
        self.remaining.len()
    }

    pub fn total_question_count(&self) -> usize {
        self.total
    }

    pub fn round_generation(&self) -> u64 {
        self.round_generation
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Whether a countdown should be running for the current round
    pub fn is_timed_round(&self) -> bool {
        self.phase == GamePhase::Active && self.config.mode == GameMode::Timed
    }

    /// Enter `loading` for a new game. Returns the token the caller must hand
    /// back to [`complete_loading`](Self::complete_loading) or
    /// [`fail_loading`](Self::fail_loading).
    ///
    /// Starting again while a load is in flight supersedes that load.
    pub fn begin_loading(&mut self, config: &GameConfig) -> SessionResult<u64> {
        config.validate().map_err(SessionError::InvalidConfig)?;

        match self.phase {
            GamePhase::Idle | GamePhase::Over => self.phase_before_loading = self.phase,
            GamePhase::Loading => {
                tracing::debug!("Superseding load {}", self.load_token);
            }
            from => {
                return Err(SessionError::InvalidTransition {
                    from,
                    action: "start a game",
                })
            }
        }

        self.phase = GamePhase::Loading;
        self.load_token += 1;
        self.round_generation += 1;
        Ok(self.load_token)
    }

    /// Install a freshly built pool and enter `active`.
    /// An empty pool still enters `active` with no current question.
    pub fn complete_loading(
        &mut self,
        token: u64,
        selection: CategorySelection,
        config: GameConfig,
        pool: Vec<Question>,
    ) -> SessionResult<()> {
        self.check_load_token(token)?;

        let mut queue = VecDeque::from(pool);
        self.total = queue.len();
        self.current_question = queue.pop_front();
        self.remaining = queue;
        self.question_index = 0;
        self.config = config;
        self.turns.reset();
        self.errors.clear();
        self.phase = GamePhase::Active;
        self.round_generation += 1;

        tracing::info!(
            "Game started: {} with {} questions",
            selection.name(),
            self.total
        );
        self.current_category = Some(selection);
        Ok(())
    }

    /// Record a failed load and return to the phase held before it
    pub fn fail_loading(&mut self, token: u64, message: String) -> SessionResult<()> {
        self.check_load_token(token)?;

        tracing::warn!("Game start failed: {}", message);
        self.phase = self.phase_before_loading;
        self.errors.push(message);
        Ok(())
    }

    fn check_load_token(&self, token: u64) -> SessionResult<()> {
        if self.phase != GamePhase::Loading || token != self.load_token {
            tracing::debug!("Discarding stale load {} (current {})", token, self.load_token);
            return Err(SessionError::Superseded);
        }
        Ok(())
    }

    /// Handle a "Next" press, manual or from the countdown.
    ///
    /// Exhausting the queue moves to `over` but keeps the last question visible.
    /// Presses after that are rejected with `NotActive` (HTTP 409) and leave
    /// the state unchanged.
    pub fn next_question(&mut self) -> SessionResult<Advance> {
        if self.phase != GamePhase::Active {
            return Err(SessionError::NotActive);
        }
        self.round_generation += 1;

        if self.current_question.is_none() {
            return Ok(self.finish());
        }

        if !self.turns.advance(self.config.pairing) {
            tracing::debug!("Turn passed to {:?}", self.turns.current());
            return Ok(Advance::TurnPassed);
        }

        match self.remaining.pop_front() {
            Some(question) => {
                self.current_question = Some(question);
                self.question_index += 1;
                tracing::debug!("Question {}/{}", self.question_index + 1, self.total);
                Ok(Advance::NextQuestion)
            }
            None => Ok(self.finish()),
        }
    }

    fn finish(&mut self) -> Advance {
        self.phase = GamePhase::Over;
        self.question_index = self.total;
        tracing::info!("Game over after {} questions", self.total);
        Advance::Finished
    }

    /// Stop an active or loading game early
    pub fn end_game(&mut self) -> SessionResult<()> {
        match self.phase {
            GamePhase::Active | GamePhase::Loading => {}
            from => {
                return Err(SessionError::InvalidTransition {
                    from,
                    action: "end the game",
                })
            }
        }

        self.phase = GamePhase::Over;
        self.remaining.clear();
        self.current_category = None;
        // Any load still in flight must not revive the game
        self.load_token += 1;
        self.round_generation += 1;
        tracing::info!("Game ended at question {}", self.question_index);
        Ok(())
    }

    /// Back to `idle` with everything but the player names cleared
    pub fn reset(&mut self) {
        let players = std::mem::take(&mut self.players);
        *self = Self {
            players,
            load_token: self.load_token + 1,
            round_generation: self.round_generation + 1,
            ..Default::default()
        };
        tracing::info!("Game reset");
    }

    pub fn show_summary(&mut self) -> SessionResult<()> {
        match self.phase {
            GamePhase::Over => {
                self.phase = GamePhase::SummaryShown;
                Ok(())
            }
            GamePhase::SummaryShown => Ok(()),
            from => Err(SessionError::InvalidTransition {
                from,
                action: "show the summary",
            }),
        }
    }

    /// Takes effect from the next round on
    pub fn set_mode(&mut self, mode: GameMode) {
        self.config.mode = mode;
    }

    /// Takes effect on the next "Next" press
    pub fn set_pairing(&mut self, pairing: Pairing) {
        self.config.pairing = pairing;
    }

    /// Countdown length for rounds started after this call
    pub fn set_time_per_round(&mut self, seconds: u32) -> SessionResult<()> {
        if seconds == 0 {
            return Err(SessionError::InvalidConfig(
                "Time per round must be at least 1 second".to_string(),
            ));
        }
        self.config.time_per_round_seconds = seconds;
        Ok(())
    }

    pub fn set_players(&mut self, player1: &str, player2: &str) -> SessionResult<Players> {
        let player1 = player1.trim();
        let player2 = player2.trim();
        if player1.is_empty() || player2.is_empty() {
            return Err(SessionError::InvalidConfig(
                "Player names cannot be empty".to_string(),
            ));
        }

        self.players = Players {
            player1: player1.to_string(),
            player2: player2.to_string(),
        };
        Ok(self.players.clone())
    }

    pub fn snapshot(&self, seconds_remaining: Option<u64>) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            category: self
                .current_category
                .as_ref()
                .map(|selection| selection.name().to_string()),
            current_question: self.current_question.clone(),
            question_index: self.question_index,
            total_question_count: self.total,
            remaining_question_count: self.remaining.len(),
            no_questions_available: self.phase == GamePhase::Active
                && self.current_question.is_none(),
            current_player: self.turns.current(),
            current_player_name: self.players.name_of(self.turns.current()).to_string(),
            players: self.players.clone(),
            config: self.config.clone(),
            seconds_remaining,
            has_error: !self.errors.is_empty(),
            errors: self.errors.clone(),
        }
    }
}
