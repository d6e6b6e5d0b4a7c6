use serde::Deserialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;

use super::*;
use crate::cache::{PLAYER1_NAME_KEY, PLAYER2_NAME_KEY};
use crate::pool::PoolBuilder;

/// Mid-game setting changes; absent fields stay as they are
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    pub mode: Option<GameMode>,
    pub pairing: Option<Pairing>,
    pub time_per_round_seconds: Option<u32>,
}

/// Owns the game session and drives it: builds pools, runs the round
/// countdown, persists player names.
#[derive(Clone)]
pub struct GameController {
    inner: Arc<Inner>,
}

struct Inner {
    // Lock order: session, then timer
    session: Mutex<GameSession>,
    timer: Mutex<RoundTimer>,
    builder: PoolBuilder,
}

impl GameController {
    pub fn new(builder: PoolBuilder) -> Self {
        let players = load_players(&builder);
        Self {
            inner: Arc::new(Inner {
                session: Mutex::new(GameSession::new(players)),
                timer: Mutex::new(RoundTimer::new()),
                builder,
            }),
        }
    }

    pub fn builder(&self) -> &PoolBuilder {
        &self.inner.builder
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let session = self.inner.session.lock().await;
        let timer = self.inner.timer.lock().await;
        snapshot_of(&session, &timer)
    }

    /// Start a game on the named category (`"Random"` mixes all of them).
    ///
    /// The session sits in `loading` while the pool is built. A failed build
    /// puts it back where it was and can be retried; a build overtaken by a
    /// newer start, an end or a reset is dropped.
    pub async fn start_game(
        &self,
        category_name: &str,
        config: GameConfig,
    ) -> SessionResult<SessionSnapshot> {
        let token = {
            let mut session = self.inner.session.lock().await;
            let token = session.begin_loading(&config)?;
            self.inner.timer.lock().await.cancel();
            token
        };

        let built = self.build_pool(category_name, &config).await;

        let mut session = self.inner.session.lock().await;
        let mut timer = self.inner.timer.lock().await;
        match built {
            Ok((selection, pool)) => {
                session.complete_loading(token, selection, config, pool)?;
                self.inner.sync_timer(&session, &mut timer);
                Ok(snapshot_of(&session, &timer))
            }
            Err(e) => {
                session.fail_loading(token, e.to_string())?;
                Err(SessionError::Fetch(e))
            }
        }
    }

    async fn build_pool(
        &self,
        category_name: &str,
        config: &GameConfig,
    ) -> Result<(CategorySelection, Vec<Question>), CatalogError> {
        let builder = &self.inner.builder;
        let selection = if category_name == RANDOM_CATEGORY {
            CategorySelection::Random
        } else {
            CategorySelection::Named(builder.find_category(category_name).await?)
        };
        let pool = builder.build(&selection, config.limit()).await?;
        Ok((selection, pool))
    }

    /// Manual "Next". Restarts the countdown for the new round.
    pub async fn next_question(&self) -> SessionResult<SessionSnapshot> {
        let mut session = self.inner.session.lock().await;
        session.next_question()?;

        let mut timer = self.inner.timer.lock().await;
        self.inner.sync_timer(&session, &mut timer);
        Ok(snapshot_of(&session, &timer))
    }

    pub async fn end_game(&self) -> SessionResult<SessionSnapshot> {
        let mut session = self.inner.session.lock().await;
        session.end_game()?;

        let mut timer = self.inner.timer.lock().await;
        timer.cancel();
        Ok(snapshot_of(&session, &timer))
    }

    pub async fn reset_game(&self) -> SessionSnapshot {
        let mut session = self.inner.session.lock().await;
        session.reset();

        let mut timer = self.inner.timer.lock().await;
        timer.cancel();
        snapshot_of(&session, &timer)
    }

    pub async fn show_summary(&self) -> SessionResult<SessionSnapshot> {
        let mut session = self.inner.session.lock().await;
        session.show_summary()?;

        let timer = self.inner.timer.lock().await;
        Ok(snapshot_of(&session, &timer))
    }

    /// Change mode, pairing or countdown length. A running countdown keeps
    /// its length; the new values apply from the next round. Switching to
    /// unlimited stops the running countdown at once.
    pub async fn update_settings(&self, update: SettingsUpdate) -> SessionResult<SessionSnapshot> {
        let mut session = self.inner.session.lock().await;

        if let Some(seconds) = update.time_per_round_seconds {
            session.set_time_per_round(seconds)?;
        }
        if let Some(mode) = update.mode {
            session.set_mode(mode);
        }
        if let Some(pairing) = update.pairing {
            session.set_pairing(pairing);
        }

        let mut timer = self.inner.timer.lock().await;
        if update.mode == Some(GameMode::Unlimited) && timer.is_armed() {
            tracing::debug!("Unlimited mode, cancelling countdown");
            timer.cancel();
        }
        Ok(snapshot_of(&session, &timer))
    }

    pub async fn set_players(&self, player1: &str, player2: &str) -> SessionResult<SessionSnapshot> {
        let mut session = self.inner.session.lock().await;
        let players = session.set_players(player1, player2)?;

        let cache = self.inner.builder.cache();
        cache.put(PLAYER1_NAME_KEY, &players.player1, None);
        cache.put(PLAYER2_NAME_KEY, &players.player2, None);

        let timer = self.inner.timer.lock().await;
        Ok(snapshot_of(&session, &timer))
    }
}

impl Inner {
    /// Make the countdown match the session: running for an active timed
    /// round, stopped otherwise
    fn sync_timer(self: &Arc<Self>, session: &GameSession, timer: &mut RoundTimer) {
        if !session.is_timed_round() {
            timer.cancel();
            return;
        }

        let generation = session.round_generation();
        let duration = Duration::from_secs(u64::from(session.config().time_per_round_seconds));
        let inner: Weak<Self> = Arc::downgrade(self);

        timer.arm(duration, async move {
            if let Some(inner) = inner.upgrade() {
                inner.on_countdown_expired(generation).await;
            }
        });
    }

    async fn on_countdown_expired(self: Arc<Self>, generation: u64) {
        let mut session = self.session.lock().await;
        if session.round_generation() != generation || !session.is_timed_round() {
            tracing::debug!("Ignoring stale countdown for round {}", generation);
            return;
        }

        let mut timer = self.timer.lock().await;
        timer.release();

        match session.next_question() {
            Ok(advance) => tracing::debug!("Countdown expired: {:?}", advance),
            Err(e) => tracing::warn!("Countdown advance failed: {}", e),
        }
        self.sync_timer(&session, &mut timer);
    }
}

fn snapshot_of(session: &GameSession, timer: &RoundTimer) -> SessionSnapshot {
    let seconds_remaining = timer
        .remaining()
        .map(|remaining| remaining.as_secs_f64().ceil() as u64);
    session.snapshot(seconds_remaining)
}

fn load_players(builder: &PoolBuilder) -> Players {
    let defaults = Players::default();
    let cache = builder.cache();
    Players {
        player1: cache
            .get::<String>(PLAYER1_NAME_KEY)
            .unwrap_or(defaults.player1),
        player2: cache
            .get::<String>(PLAYER2_NAME_KEY)
            .unwrap_or(defaults.player2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LocalCache;
    use crate::catalog::{CatalogResult, CatalogStore, QuestionSource};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Catalog that can be switched offline
    struct FlakySource {
        store: CatalogStore,
        offline: AtomicBool,
    }

    #[async_trait]
    impl QuestionSource for FlakySource {
        async fn fetch_categories(&self) -> CatalogResult<Vec<Category>> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(CatalogError::Unavailable("offline".to_string()));
            }
            self.store.fetch_categories().await
        }

        async fn fetch_questions(&self, category_name: &str) -> CatalogResult<Vec<Question>> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(CatalogError::Unavailable("offline".to_string()));
            }
            self.store.fetch_questions(category_name).await
        }

        async fn sanitize_category(&self, category_name: &str) -> CatalogResult<Vec<Question>> {
            self.store.sanitize_category(category_name).await
        }
    }

    async fn catalog() -> CatalogStore {
        let store = CatalogStore::new();
        let wyr = store.create_category("Would you rather", "").await.unwrap();
        for text in ["A", "B", "C"] {
            store.create_question(&wyr.id, text).await.unwrap();
        }
        let deep = store.create_category("Deep", "").await.unwrap();
        store.create_question(&deep.id, "D").await.unwrap();
        store.create_category("Empty", "").await.unwrap();
        store
    }

    async fn controller() -> (GameController, Arc<FlakySource>) {
        let source = Arc::new(FlakySource {
            store: catalog().await,
            offline: AtomicBool::new(false),
        });
        let builder = PoolBuilder::new(
            source.clone(),
            LocalCache::in_memory(),
            chrono::Duration::hours(24),
        );
        (GameController::new(builder), source)
    }

    fn timed(seconds: u32) -> GameConfig {
        GameConfig {
            mode: GameMode::Timed,
            pairing: Pairing::Different,
            time_per_round_seconds: seconds,
            ..Default::default()
        }
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_start_unlimited_game() {
        let (controller, _) = controller().await;
        let snapshot = controller
            .start_game("Would you rather", GameConfig::default())
            .await
            .unwrap();

        assert_eq!(snapshot.phase, GamePhase::Active);
        assert_eq!(snapshot.total_question_count, 3);
        assert!(["A", "B", "C"].contains(&snapshot.current_question.unwrap().text.as_str()));
        assert_eq!(snapshot.seconds_remaining, None);

        // Same pairing by default: two presses per question
        for _ in 0..5 {
            controller.next_question().await.unwrap();
        }
        let snapshot = controller.next_question().await.unwrap();
        assert_eq!(snapshot.phase, GamePhase::Over);
        assert!(snapshot.current_question.is_some());
    }

    #[tokio::test]
    async fn test_start_random_and_empty_category() {
        let (controller, _) = controller().await;
        let snapshot = controller
            .start_game(RANDOM_CATEGORY, GameConfig::default())
            .await
            .unwrap();
        assert_eq!(snapshot.total_question_count, 4);
        assert_eq!(snapshot.category.as_deref(), Some(RANDOM_CATEGORY));

        controller.end_game().await.unwrap();
        let snapshot = controller
            .start_game("Empty", GameConfig::default())
            .await
            .unwrap();
        assert_eq!(snapshot.phase, GamePhase::Active);
        assert!(snapshot.no_questions_available);
    }

    #[tokio::test]
    async fn test_unknown_category_is_recoverable() {
        let (controller, _) = controller().await;
        let err = controller
            .start_game("Nope", GameConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Fetch(CatalogError::NotFound(_))));

        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.phase, GamePhase::Idle);
        assert!(snapshot.has_error);
    }

    #[tokio::test]
    async fn test_fetch_failure_then_retry() {
        let (controller, source) = controller().await;
        source.offline.store(true, Ordering::SeqCst);

        let err = controller
            .start_game("Would you rather", GameConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Fetch(CatalogError::Unavailable(_))));
        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.phase, GamePhase::Idle);
        assert_eq!(snapshot.errors.len(), 1);

        source.offline.store(false, Ordering::SeqCst);
        let snapshot = controller
            .start_game("Would you rather", GameConfig::default())
            .await
            .unwrap();
        assert_eq!(snapshot.phase, GamePhase::Active);
        assert!(!snapshot.has_error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_advances_round() {
        let (controller, _) = controller().await;
        let snapshot = controller
            .start_game("Would you rather", timed(30))
            .await
            .unwrap();
        assert_eq!(snapshot.seconds_remaining, Some(30));

        tokio::time::sleep(Duration::from_secs(31)).await;
        settle().await;
        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.question_index, 1);
        assert_eq!(snapshot.current_player, PlayerSlot::Player2);
        assert_eq!(snapshot.seconds_remaining, Some(29));

        tokio::time::sleep(Duration::from_secs(60)).await;
        settle().await;
        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.phase, GamePhase::Over);
        assert_eq!(snapshot.seconds_remaining, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_next_restarts_countdown() {
        let (controller, _) = controller().await;
        controller
            .start_game("Would you rather", timed(30))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        controller.next_question().await.unwrap();

        // Past the first deadline: the old countdown must not fire
        tokio::time::sleep(Duration::from_secs(25)).await;
        settle().await;
        assert_eq!(controller.snapshot().await.question_index, 1);

        tokio::time::sleep(Duration::from_secs(6)).await;
        settle().await;
        assert_eq!(controller.snapshot().await.question_index, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_and_reset_stop_countdown() {
        let (controller, _) = controller().await;
        controller.start_game("Would you rather", timed(5)).await.unwrap();
        let ended = controller.end_game().await.unwrap();
        assert_eq!(ended.seconds_remaining, None);

        tokio::time::sleep(Duration::from_secs(60)).await;
        settle().await;
        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.phase, GamePhase::Over);
        assert_eq!(snapshot.question_index, ended.question_index);

        controller.reset_game().await;
        controller.start_game("Would you rather", timed(5)).await.unwrap();
        controller.reset_game().await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(controller.snapshot().await.phase, GamePhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_override_applies_to_next_round() {
        let (controller, _) = controller().await;
        controller
            .start_game("Would you rather", timed(30))
            .await
            .unwrap();

        let snapshot = controller
            .update_settings(SettingsUpdate {
                time_per_round_seconds: Some(10),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(snapshot.seconds_remaining, Some(30));

        let snapshot = controller.next_question().await.unwrap();
        assert_eq!(snapshot.seconds_remaining, Some(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_switching_to_timed_arms_on_next_round() {
        let (controller, _) = controller().await;
        controller
            .start_game("Would you rather", GameConfig::default())
            .await
            .unwrap();

        let snapshot = controller
            .update_settings(SettingsUpdate {
                mode: Some(GameMode::Timed),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(snapshot.seconds_remaining, None);

        let snapshot = controller.next_question().await.unwrap();
        assert_eq!(snapshot.seconds_remaining, Some(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_switching_to_unlimited_stops_countdown() {
        let (controller, _) = controller().await;
        controller
            .start_game("Would you rather", timed(30))
            .await
            .unwrap();

        let snapshot = controller
            .update_settings(SettingsUpdate {
                mode: Some(GameMode::Unlimited),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(snapshot.seconds_remaining, None);

        tokio::time::sleep(Duration::from_secs(31)).await;
        settle().await;

        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.phase, GamePhase::Active);
        assert_eq!(snapshot.question_index, 0);
        assert_eq!(snapshot.current_player, PlayerSlot::Player1);

        // Only an explicit press advances now, and it arms nothing
        let snapshot = controller.next_question().await.unwrap();
        assert_eq!(snapshot.current_player, PlayerSlot::Player2);
        assert_eq!(snapshot.seconds_remaining, None);
    }

    #[tokio::test]
    async fn test_player_names_persist_in_cache() {
        let (controller, source) = controller().await;
        controller.set_players("Ana", "Ben").await.unwrap();

        let builder = PoolBuilder::new(
            source,
            controller.builder().cache().clone(),
            chrono::Duration::hours(24),
        );
        let restored = GameController::new(builder);
        let snapshot = restored.snapshot().await;
        assert_eq!(snapshot.players.player1, "Ana");
        assert_eq!(snapshot.current_player_name, "Ana");
    }
}
