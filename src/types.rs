use serde::{Deserialize, Serialize};

/// Opaque ID types for type safety
pub type CategoryId = String;
pub type QuestionId = String;

/// Name of the pseudo-category that draws from every real category
pub const RANDOM_CATEGORY: &str = "Random";

pub const DEFAULT_TIME_PER_ROUND_SECONDS: u32 = 30;
pub const DEFAULT_PRESET_COUNT: u32 = 10;

/// A named grouping of prompts. `name` is the lookup key used by the game flow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Question IDs in display order
    #[serde(default)]
    pub questions: Vec<QuestionId>,
}

impl Category {
    /// Whether this is the "Random" pseudo-category rather than a real one
    pub fn is_random(&self) -> bool {
        self.name == RANDOM_CATEGORY
    }
}

/// A single prompt shown to the players
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Question {
    pub id: QuestionId,
    pub text: String,
    pub category_id: CategoryId,
}

impl Question {
    /// A question with blank text can't be shown and is eligible for removal
    pub fn is_playable(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// What the players picked to play
#[derive(Debug, Clone, PartialEq)]
pub enum CategorySelection {
    /// Draw from every real category
    Random,
    Named(Category),
}

impl CategorySelection {
    pub fn name(&self) -> &str {
        match self {
            CategorySelection::Random => RANDOM_CATEGORY,
            CategorySelection::Named(category) => &category.name,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    Timed,
    #[default]
    Unlimited,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HowMany {
    Preset,
    #[default]
    Infinite,
}

/// Whether both players answer the same prompt each round or get their own
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Pairing {
    #[default]
    Same,
    Different,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    #[default]
    Idle,
    Loading,
    Active,
    Over,
    SummaryShown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlayerSlot {
    #[default]
    Player1,
    Player2,
}

impl PlayerSlot {
    pub fn other(self) -> Self {
        match self {
            PlayerSlot::Player1 => PlayerSlot::Player2,
            PlayerSlot::Player2 => PlayerSlot::Player1,
        }
    }
}

/// Names of the two players
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Players {
    pub player1: String,
    pub player2: String,
}

impl Players {
    pub fn name_of(&self, slot: PlayerSlot) -> &str {
        match slot {
            PlayerSlot::Player1 => &self.player1,
            PlayerSlot::Player2 => &self.player2,
        }
    }
}

impl Default for Players {
    fn default() -> Self {
        Self {
            player1: "Player 1".to_string(),
            player2: "Player 2".to_string(),
        }
    }
}

/// Configuration chosen before a game starts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameConfig {
    pub mode: GameMode,
    pub how_many: HowMany,
    pub preset_count: u32,
    pub time_per_round_seconds: u32,
    pub pairing: Pairing,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            mode: GameMode::default(),
            how_many: HowMany::default(),
            preset_count: DEFAULT_PRESET_COUNT,
            time_per_round_seconds: DEFAULT_TIME_PER_ROUND_SECONDS,
            pairing: Pairing::default(),
        }
    }
}

impl GameConfig {
    /// Reject configuration the session machine can't work with
    pub fn validate(&self) -> Result<(), String> {
        if self.how_many == HowMany::Preset && self.preset_count == 0 {
            return Err("Preset question count must be at least 1".to_string());
        }
        if self.time_per_round_seconds == 0 {
            return Err("Time per round must be at least 1 second".to_string());
        }
        Ok(())
    }

    /// Upper bound on the pool size, if any
    pub fn limit(&self) -> Option<usize> {
        match self.how_many {
            HowMany::Preset => Some(self.preset_count as usize),
            HowMany::Infinite => None,
        }
    }
}
