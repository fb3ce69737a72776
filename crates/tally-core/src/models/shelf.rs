//! Game-library shelf models.
//!
//! Shelves hold a user's game collection and replicate with shallower
//! semantics than tournaments: whole-document remote replacement, plus a
//! debounced layout document for high-frequency placement edits.

use serde::{Deserialize, Serialize};

use crate::clock::Stamp;
use crate::util::new_entity_id;

/// A named shelf of games owned by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameShelf {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    #[serde(default)]
    pub game_ids: Vec<String>,
    #[serde(default)]
    pub updated_at: Option<Stamp>,
}

impl GameShelf {
    #[must_use]
    pub fn new(name: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            id: new_entity_id(),
            owner_id: owner_id.into(),
            name: name.into(),
            game_ids: Vec::new(),
            updated_at: Some(Stamp::now()),
        }
    }

    /// Refresh the logical timestamp after a local mutation.
    pub fn touch(&mut self) {
        self.updated_at = Some(Stamp::now());
    }
}

/// Placement of one game on a shelf grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShelfSlot {
    pub game_id: String,
    pub row: u32,
    pub col: u32,
}

/// Per-shelf layout document (`shelfLayouts/{shelfId}`).
///
/// Written on every drag-and-drop placement, so pushes go through the
/// debounced writer rather than straight to the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShelfLayout {
    pub shelf_id: String,
    pub owner_id: String,
    #[serde(default)]
    pub slots: Vec<ShelfSlot>,
    #[serde(default)]
    pub updated_at: Option<Stamp>,
}
