//! Game session model (the leaf synchronizable entity)

use serde::{Deserialize, Serialize};

use crate::clock::Stamp;
use crate::error::{Error, Result};
use crate::util::new_entity_id;

/// Points awarded per finishing position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringRules {
    pub first: i32,
    pub second: i32,
    pub third: i32,
    pub others: i32,
}

impl ScoringRules {
    /// Standard 4/3/2/1 preset.
    #[must_use]
    pub const fn standard() -> Self {
        Self {
            first: 4,
            second: 3,
            third: 2,
            others: 1,
        }
    }

    /// Winner-takes-all preset.
    #[must_use]
    pub const fn winner_takes_all() -> Self {
        Self {
            first: 1,
            second: 0,
            third: 0,
            others: 0,
        }
    }
}

/// Whether a session ranks every participant or only records winners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResultsMode {
    Ranked,
    WinnersOnly,
}

/// One participant's final placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub participant_id: String,
    pub rank: u32,
    pub score: i32,
}

/// Recorded outcome of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResults {
    pub mode: ResultsMode,
    #[serde(default)]
    pub placements: Vec<Placement>,
}

/// A participant seated at a session (may or may not be a real account).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Progress state of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    #[default]
    InProgress,
    Completed,
}

/// A recorded play of one game, optionally belonging to a tournament.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSession {
    pub id: String,
    #[serde(default)]
    pub owner_id: Option<String>,
    /// Parent tournament, when this session was played as part of one
    #[serde(default)]
    pub tournament_id: Option<String>,
    #[serde(default)]
    pub game_name: String,
    /// Name of the scoring preset the rules were derived from
    #[serde(default)]
    pub preset: Option<String>,
    #[serde(default)]
    pub scoring_rules: Option<ScoringRules>,
    #[serde(default)]
    pub participants: Vec<Participant>,
    /// Account ids entitled to read this session even when not the owner
    #[serde(default)]
    pub participant_user_ids: Vec<String>,
    #[serde(default)]
    pub winner_user_ids: Vec<String>,
    #[serde(default)]
    pub results: Option<SessionResults>,
    #[serde(default)]
    pub status: SessionStatus,
    #[serde(default)]
    pub played_at: Option<Stamp>,
    #[serde(default)]
    pub created_at: Option<Stamp>,
    #[serde(default)]
    pub updated_at: Option<Stamp>,
}

impl GameSession {
    /// Create an in-progress session owned by the given user.
    #[must_use]
    pub fn new(
        game_name: impl Into<String>,
        owner_id: impl Into<String>,
        tournament_id: Option<String>,
    ) -> Self {
        let now = Stamp::now();
        Self {
            id: new_entity_id(),
            owner_id: Some(owner_id.into()),
            tournament_id,
            game_name: game_name.into(),
            preset: None,
            scoring_rules: Some(ScoringRules::standard()),
            participants: Vec::new(),
            participant_user_ids: Vec::new(),
            winner_user_ids: Vec::new(),
            results: None,
            status: SessionStatus::default(),
            played_at: Some(now.clone()),
            created_at: Some(now.clone()),
            updated_at: Some(now),
        }
    }

    /// Refresh the logical timestamp after a local mutation.
    pub fn touch(&mut self) {
        self.updated_at = Some(Stamp::now());
    }

    /// Required-field validation run before any remote write.
    ///
    /// Returns the names of missing/invalid fields; empty means transmittable.
    /// Mirrors what the server-side policy would reject, so failures are caught
    /// locally with better diagnostics before wasting a round-trip.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.owner_id.as_deref().is_none_or(|id| id.trim().is_empty()) {
            missing.push("ownerId");
        }
        if self.game_name.trim().is_empty() {
            missing.push("gameName");
        }
        if self.scoring_rules.is_none() {
            missing.push("scoringRules");
        }
        if self.participants.is_empty() {
            missing.push("participants");
        }
        if self.status == SessionStatus::Completed && self.results.is_none() {
            missing.push("results");
        }
        missing
    }

    /// Required-field validation as a hard error naming the missing fields.
    pub fn validate(&self) -> Result<()> {
        let missing = self.missing_fields();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation {
                kind: "game session",
                id: self.id.clone(),
                missing,
            })
        }
    }
}
