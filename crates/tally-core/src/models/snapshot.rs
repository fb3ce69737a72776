//! Snapshot: one side's view of the synchronizable data at a point in time.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::session::GameSession;
use super::tournament::Tournament;

/// An immutable `{tournaments, sessions}` map pair.
///
/// Snapshots are the unit of comparison for the merge engine: local and remote
/// each produce one, and the engine reconciles them into a third without
/// mutating either input. `BTreeMap` keys keep iteration deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub tournaments: BTreeMap<String, Tournament>,
    #[serde(default)]
    pub sessions: BTreeMap<String, GameSession>,
}

impl Snapshot {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tournaments.is_empty() && self.sessions.is_empty()
    }

    /// Insert a tournament keyed by its own id.
    pub fn insert_tournament(&mut self, tournament: Tournament) {
        self.tournaments.insert(tournament.id.clone(), tournament);
    }

    /// Insert a session keyed by its own id.
    pub fn insert_session(&mut self, session: GameSession) {
        self.sessions.insert(session.id.clone(), session);
    }
}
