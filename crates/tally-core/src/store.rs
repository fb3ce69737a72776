//! Local store: the single piece of mutable shared state.
//!
//! Every sync trigger reads a consistent snapshot captured at its own start
//! and writes back only through [`LocalStore::hydrate`], an atomic
//! whole-snapshot replace. Partial interleaved updates from two concurrent
//! triggers cannot occur; the last hydrate wins, which is safe because the
//! merge engine is idempotent and remote-biased.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::error::{Error, Result};
use crate::models::{GameSession, GameShelf, ShelfLayout, Snapshot, Tournament};

#[derive(Default)]
struct State {
    snapshot: Snapshot,
    active_tournament_id: Option<String>,
    shelves: BTreeMap<String, GameShelf>,
    shelf_layouts: BTreeMap<String, ShelfLayout>,
}

/// Clone-able handle to the in-memory local data.
#[derive(Clone, Default)]
pub struct LocalStore {
    inner: Arc<RwLock<State>>,
}

impl LocalStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture a consistent copy of the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.read(|state| state.snapshot.clone())
    }

    /// Atomic whole-snapshot replace; the only write entry point for merges.
    pub fn hydrate(&self, snapshot: Snapshot) {
        self.write(|state| state.snapshot = snapshot);
    }

    /// Drop all local data, including the active pointer and shelves.
    /// Called on sign-out before any in-flight step can write stale data back.
    pub fn clear(&self) {
        self.write(|state| *state = State::default());
    }

    #[must_use]
    pub fn active_tournament_id(&self) -> Option<String> {
        self.read(|state| state.active_tournament_id.clone())
    }

    pub fn set_active_tournament(&self, id: Option<String>) {
        self.write(|state| state.active_tournament_id = id);
    }

    /// Re-point the active tournament after a merge: keep the current one if
    /// it survived, else fall back to an arbitrary remaining one, else none.
    pub fn resolve_active_tournament(&self) {
        self.write(|state| {
            let still_there = state
                .active_tournament_id
                .as_ref()
                .is_some_and(|id| state.snapshot.tournaments.contains_key(id));
            if !still_there {
                state.active_tournament_id = state.snapshot.tournaments.keys().next().cloned();
            }
        });
    }

    #[must_use]
    pub fn tournament(&self, id: &str) -> Option<Tournament> {
        self.read(|state| state.snapshot.tournaments.get(id).cloned())
    }

    #[must_use]
    pub fn session(&self, id: &str) -> Option<GameSession> {
        self.read(|state| state.snapshot.sessions.get(id).cloned())
    }

    /// Insert or replace a tournament, refreshing its logical timestamp.
    pub fn upsert_tournament(&self, mut tournament: Tournament) {
        tournament.touch();
        self.write(|state| {
            state
                .snapshot
                .tournaments
                .insert(tournament.id.clone(), tournament);
        });
    }

    /// Insert or replace a session, refreshing its timestamp and maintaining
    /// the parent tournament's back-link.
    pub fn upsert_session(&self, mut session: GameSession) {
        session.touch();
        self.write(|state| {
            if let Some(parent_id) = session.tournament_id.clone() {
                if let Some(parent) = state.snapshot.tournaments.get_mut(&parent_id) {
                    if !parent.game_sessions.contains(&session.id) {
                        parent.game_sessions.push(session.id.clone());
                        parent.touch();
                    }
                }
            }
            state
                .snapshot
                .sessions
                .insert(session.id.clone(), session);
        });
    }

    /// Remove a session and its back-link from the parent tournament.
    pub fn remove_session(&self, session_id: &str) -> Option<GameSession> {
        self.write(|state| {
            let removed = state.snapshot.sessions.remove(session_id)?;
            if let Some(parent_id) = &removed.tournament_id {
                if let Some(parent) = state.snapshot.tournaments.get_mut(parent_id) {
                    parent.game_sessions.retain(|id| id != session_id);
                    parent.touch();
                }
            }
            Some(removed)
        })
    }

    /// Remove a tournament together with its sessions from the local snapshot.
    pub fn remove_tournament(&self, tournament_id: &str) -> Option<Tournament> {
        self.write(|state| {
            let removed = state.snapshot.tournaments.remove(tournament_id)?;
            state
                .snapshot
                .sessions
                .retain(|_, session| session.tournament_id.as_deref() != Some(tournament_id));
            if state.active_tournament_id.as_deref() == Some(tournament_id) {
                state.active_tournament_id = state.snapshot.tournaments.keys().next().cloned();
            }
            Some(removed)
        })
    }

    /// Link a tournament player to a user account.
    ///
    /// The conflict guard runs inside the write lock at the mutation boundary;
    /// on rejection the store is left unchanged.
    pub fn link_player_to_user(
        &self,
        tournament_id: &str,
        player_id: &str,
        user_id: &str,
    ) -> Result<()> {
        self.write(|state| {
            let tournament = state
                .snapshot
                .tournaments
                .get_mut(tournament_id)
                .ok_or_else(|| Error::NotFound(format!("tournament {tournament_id}")))?;
            tournament.link_player_to_user(player_id, user_id)
        })
    }

    #[must_use]
    pub fn shelves(&self) -> BTreeMap<String, GameShelf> {
        self.read(|state| state.shelves.clone())
    }

    /// Remote-replacement hydrate for shelf data (shallow merge semantics).
    pub fn hydrate_shelves(&self, shelves: BTreeMap<String, GameShelf>) {
        self.write(|state| state.shelves = shelves);
    }

    pub fn upsert_shelf(&self, mut shelf: GameShelf) {
        shelf.touch();
        self.write(|state| {
            state.shelves.insert(shelf.id.clone(), shelf);
        });
    }

    #[must_use]
    pub fn shelf_layout(&self, shelf_id: &str) -> Option<ShelfLayout> {
        self.read(|state| state.shelf_layouts.get(shelf_id).cloned())
    }

    pub fn upsert_shelf_layout(&self, layout: ShelfLayout) {
        self.write(|state| {
            state.shelf_layouts.insert(layout.shelf_id.clone(), layout);
        });
    }

    fn read<T>(&self, f: impl FnOnce(&State) -> T) -> T {
        let guard = self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&guard)
    }

    fn write<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Participant, Player};

    fn store_with_tournament() -> (LocalStore, Tournament) {
        let store = LocalStore::new();
        let tournament = Tournament::new("Cup", "u1", None);
        store.upsert_tournament(tournament.clone());
        (store, tournament)
    }

    #[test]
    fn hydrate_replaces_whole_snapshot() {
        let (store, _) = store_with_tournament();
        store.hydrate(Snapshot::default());
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn upsert_session_maintains_back_link() {
        let (store, tournament) = store_with_tournament();
        let session = GameSession::new("Azul", "u1", Some(tournament.id.clone()));
        let session_id = session.id.clone();
        store.upsert_session(session);

        let parent = store.tournament(&tournament.id).unwrap();
        assert_eq!(parent.game_sessions, vec![session_id]);
    }

    #[test]
    fn remove_session_drops_back_link() {
        let (store, tournament) = store_with_tournament();
        let session = GameSession::new("Azul", "u1", Some(tournament.id.clone()));
        let session_id = session.id.clone();
        store.upsert_session(session);

        store.remove_session(&session_id).unwrap();
        let parent = store.tournament(&tournament.id).unwrap();
        assert!(parent.game_sessions.is_empty());
    }

    #[test]
    fn remove_tournament_drops_child_sessions() {
        let (store, tournament) = store_with_tournament();
        store.upsert_session(GameSession::new("Azul", "u1", Some(tournament.id.clone())));
        store.upsert_session(GameSession::new("Root", "u1", None));

        store.remove_tournament(&tournament.id).unwrap();
        let snapshot = store.snapshot();
        assert!(snapshot.tournaments.is_empty());
        assert_eq!(snapshot.sessions.len(), 1);
    }

    #[test]
    fn resolve_active_keeps_surviving_pointer() {
        let (store, tournament) = store_with_tournament();
        store.set_active_tournament(Some(tournament.id.clone()));
        store.resolve_active_tournament();
        assert_eq!(store.active_tournament_id(), Some(tournament.id));
    }

    #[test]
    fn resolve_active_falls_back_after_merge_dropped_it() {
        let (store, _) = store_with_tournament();
        store.set_active_tournament(Some("gone".into()));
        store.resolve_active_tournament();
        let active = store.active_tournament_id().unwrap();
        assert!(store.tournament(&active).is_some());

        store.hydrate(Snapshot::default());
        store.resolve_active_tournament();
        assert_eq!(store.active_tournament_id(), None);
    }

    #[test]
    fn link_player_conflict_leaves_store_unchanged() {
        let store = LocalStore::new();
        let mut tournament = Tournament::new("Cup", "u1", None);
        let alice = Player::new("Alice");
        let bob = Player::new("Bob");
        let alice_id = alice.id.clone();
        let bob_id = bob.id.clone();
        tournament.players = vec![alice, bob];
        let tid = tournament.id.clone();
        store.upsert_tournament(tournament);

        store.link_player_to_user(&tid, &alice_id, "u9").unwrap();
        let before = store.tournament(&tid).unwrap();
        assert!(store.link_player_to_user(&tid, &bob_id, "u9").is_err());
        assert_eq!(store.tournament(&tid).unwrap(), before);
    }

    #[test]
    fn clear_wipes_everything() {
        let (store, tournament) = store_with_tournament();
        store.set_active_tournament(Some(tournament.id));
        store.upsert_shelf(GameShelf::new("Favorites", "u1"));

        store.clear();
        assert!(store.snapshot().is_empty());
        assert_eq!(store.active_tournament_id(), None);
        assert!(store.shelves().is_empty());
    }

    #[test]
    fn sessions_with_linked_users_participate() {
        // participant_user_ids drives remote visibility; keep it intact through upsert
        let store = LocalStore::new();
        let mut session = GameSession::new("Azul", "u1", None);
        session.participants = vec![Participant {
            id: "p1".into(),
            name: "Bob".into(),
            user_id: Some("u2".into()),
        }];
        session.participant_user_ids = vec!["u2".into()];
        let id = session.id.clone();
        store.upsert_session(session);

        assert_eq!(store.session(&id).unwrap().participant_user_ids, vec!["u2"]);
    }
}
