//! Tournament model (the top-level synchronizable collection)

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::clock::Stamp;
use crate::error::{Error, Result};
use crate::util::new_entity_id;

/// Role a member holds within a tournament.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Owner,
    Editor,
    Viewer,
}

/// Lifecycle state of a tournament.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TournamentState {
    #[default]
    Setup,
    Active,
    Completed,
}

/// Play format of a tournament.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TournamentFormat {
    #[default]
    FreePlay,
    SingleElimination,
    RoundRobin,
}

/// Bracket settings for elimination formats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BracketConfig {
    /// Bracket size (next power of two above the player count)
    pub bracket_size: u32,
    /// Player ids in seed order
    #[serde(default)]
    pub seed_player_ids: Vec<String>,
}

/// A player entry within a tournament.
///
/// Players are tournament-local; `linked_user_id` optionally ties one to a
/// real account so their sessions show up on that account's devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub linked_user_id: Option<String>,
}

impl Player {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_entity_id(),
            name: name.into(),
            linked_user_id: None,
        }
    }
}

/// A tournament: owned, membered, and carrying references to its game sessions.
///
/// Field names mirror the remote document shape (camelCase); optional fields
/// default so partially-populated or legacy remote documents still reconstruct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tournament {
    pub id: String,
    pub name: String,
    /// Owning user; `None` only for legacy records created before ownership
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub owner_name: Option<String>,
    #[serde(default)]
    pub players: Vec<Player>,
    /// Ids of the game sessions belonging to this tournament
    #[serde(default)]
    pub game_sessions: Vec<String>,
    /// Users permitted to read/write this tournament
    #[serde(default)]
    pub member_ids: Vec<String>,
    #[serde(default)]
    pub member_roles: BTreeMap<String, MemberRole>,
    #[serde(default)]
    pub state: TournamentState,
    #[serde(default)]
    pub format: TournamentFormat,
    #[serde(default)]
    pub bracket_config: Option<BracketConfig>,
    #[serde(default)]
    pub created_at: Option<Stamp>,
    /// Logical timestamp used to order conflicting copies
    #[serde(default)]
    pub updated_at: Option<Stamp>,
}

impl Tournament {
    /// Create a new tournament owned by the given user.
    #[must_use]
    pub fn new(name: impl Into<String>, owner_id: impl Into<String>, owner_name: Option<String>) -> Self {
        let owner_id = owner_id.into();
        let now = Stamp::now();
        let mut member_roles = BTreeMap::new();
        member_roles.insert(owner_id.clone(), MemberRole::Owner);
        Self {
            id: new_entity_id(),
            name: name.into(),
            owner_id: Some(owner_id.clone()),
            owner_name,
            players: Vec::new(),
            game_sessions: Vec::new(),
            member_ids: vec![owner_id],
            member_roles,
            state: TournamentState::default(),
            format: TournamentFormat::default(),
            bracket_config: None,
            created_at: Some(now.clone()),
            updated_at: Some(now),
        }
    }

    /// Whether the given user may read/write this tournament.
    #[must_use]
    pub fn is_member(&self, user_id: &str) -> bool {
        self.member_ids.iter().any(|id| id == user_id)
    }

    /// Whether the given user is the owner.
    #[must_use]
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner_id.as_deref() == Some(user_id)
    }

    /// Refresh the logical timestamp after a local mutation.
    pub fn touch(&mut self) {
        self.updated_at = Some(Stamp::now());
    }

    /// Repair the member-set invariant: the owner is always a member with the
    /// `Owner` role. Applied when reconstructing remote documents.
    pub fn normalize(&mut self) {
        if let Some(owner) = self.owner_id.clone() {
            if !self.member_ids.contains(&owner) {
                self.member_ids.push(owner.clone());
            }
            self.member_roles.entry(owner).or_insert(MemberRole::Owner);
        }
    }

    /// Link a player to a user account.
    ///
    /// Rejected synchronously when the user is already linked to another
    /// player in this tournament; the tournament is left unchanged.
    pub fn link_player_to_user(&mut self, player_id: &str, user_id: &str) -> Result<()> {
        let already_linked = self
            .players
            .iter()
            .any(|p| p.id != player_id && p.linked_user_id.as_deref() == Some(user_id));
        if already_linked {
            return Err(Error::Conflict(format!(
                "user {user_id} is already linked to another player in tournament {}",
                self.id
            )));
        }

        let player = self
            .players
            .iter_mut()
            .find(|p| p.id == player_id)
            .ok_or_else(|| Error::NotFound(format!("player {player_id}")))?;
        player.linked_user_id = Some(user_id.to_string());
        self.touch();
        Ok(())
    }
}
