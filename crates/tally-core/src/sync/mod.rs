//! Sync orchestrator: the lifecycle controller tying auth transitions, the
//! remote adapter, the merge engine, and the local store together.
//!
//! Three triggers, each independently cancellable:
//! - sign-in: profile upsert → pull → push owned tournaments → re-pull →
//!   merge → hydrate → re-point the active tournament;
//! - live remote change: pull → merge → hydrate;
//! - sign-out: cancel outstanding work and clear local state before any
//!   in-flight step can write stale data back.
//!
//! Every remote call is a suspension point; between any two of them the
//! orchestrator re-checks its cancellation token. That check — not a lock —
//! is the concurrency-correctness mechanism.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::auth::AuthStateProvider;
use crate::clock::to_epoch_millis;
use crate::error::{Error, Result};
use crate::models::{GameSession, Snapshot, Tournament, UserProfile};
use crate::remote::{RemoteAdapter, RemoteStore};
use crate::status::SyncStatusTracker;
use crate::store::LocalStore;
use crate::util::compact_text;

mod debounce;
mod merge;
mod shelf;

pub use debounce::{DebounceSink, DebouncedWriter};
pub use merge::merge_snapshots;
pub use shelf::{ShelfSyncService, LAYOUT_DEBOUNCE_WINDOW};

/// Cooperative cancellation token for one sync sequence.
///
/// Cancelled explicitly on sign-out, and implicitly whenever the live auth
/// state no longer names the user the sequence was started for. Cancellation
/// never interrupts an in-flight network call; it only prevents that call's
/// result from being applied.
#[derive(Clone)]
pub struct SyncToken {
    user_id: String,
    cancelled: Arc<AtomicBool>,
    auth: Arc<dyn AuthStateProvider>,
}

impl SyncToken {
    fn new(user_id: impl Into<String>, auth: Arc<dyn AuthStateProvider>) -> Self {
        Self {
            user_id: user_id.into(),
            cancelled: Arc::new(AtomicBool::new(false)),
            auth,
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// True once cancelled or once the signed-in user is no longer the one
    /// this token was issued for (sign-out or account switch mid-flight).
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || self.auth.current_user_id().as_deref() != Some(self.user_id.as_str())
    }

    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

/// Stateful sync lifecycle controller; one per process.
pub struct SyncOrchestrator<S: RemoteStore> {
    adapter: Arc<RemoteAdapter<S>>,
    store: LocalStore,
    status: SyncStatusTracker,
    auth: Arc<dyn AuthStateProvider>,
    active_token: Mutex<Option<SyncToken>>,
    shelf_sync: Mutex<Option<Arc<ShelfSyncService<S>>>>,
}

impl<S: RemoteStore + 'static> SyncOrchestrator<S> {
    pub fn new(
        adapter: Arc<RemoteAdapter<S>>,
        store: LocalStore,
        status: SyncStatusTracker,
        auth: Arc<dyn AuthStateProvider>,
    ) -> Self {
        Self {
            adapter,
            store,
            status,
            auth,
            active_token: Mutex::new(None),
            shelf_sync: Mutex::new(None),
        }
    }

    /// Attach the shelf service so sign-out can flush its pending layout
    /// writes before local state is cleared.
    pub fn set_shelf_sync(&self, shelf: Arc<ShelfSyncService<S>>) {
        if let Ok(mut guard) = self.shelf_sync.lock() {
            *guard = Some(shelf);
        }
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn status(&self) -> &SyncStatusTracker {
        &self.status
    }

    /// Trigger A: the auth layer reports `signed-out → signed-in(uid)`.
    ///
    /// Returns the upserted profile, or `None` when the run was cut short by
    /// a permission error racing a sign-out.
    pub async fn on_sign_in(
        &self,
        user_id: &str,
        display_name: Option<String>,
    ) -> Result<Option<UserProfile>> {
        tracing::info!(user_id, "sign-in sync starting");
        let token = self.begin_session(user_id);

        self.status.start();
        let result = self.run_sign_in(&token, user_id, display_name).await;
        self.conclude_with(result)
    }

    /// Trigger B: a live notification that member tournaments changed
    /// remotely. Re-fetches and re-merges against the current local snapshot.
    pub async fn on_remote_change(&self, user_id: &str) -> Result<()> {
        let token = self.session_token(user_id);

        self.status.start();
        let result = self.pull_and_merge(&token, user_id).await;
        self.conclude(result)
    }

    /// Trigger C: sign-out or account switch. Cancels outstanding work,
    /// flushes the attached shelf service's pending debounce window, then
    /// clears all local state; the abort checks (not literal sequencing)
    /// guarantee no stale write-back from the previous session.
    pub async fn on_sign_out(&self) {
        tracing::info!("sign-out: cancelling sync and clearing local state");
        if let Ok(mut guard) = self.active_token.lock() {
            if let Some(token) = guard.take() {
                token.cancel();
            }
        }
        let shelf = self
            .shelf_sync
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(Arc::clone));
        if let Some(shelf) = shelf {
            shelf.teardown().await;
        }
        self.store.clear();
    }

    /// Manual retry after a surfaced error: clears it and re-runs the full
    /// push/pull/merge sequence for the signed-in user.
    pub async fn retry_sync(&self) -> Result<()> {
        let Some(user_id) = self.auth.current_user_id() else {
            return Ok(());
        };
        self.status.clear_error();
        let token = self.session_token(&user_id);

        self.status.start();
        let result = self.run_full_sync(&token, &user_id).await;
        self.conclude(result)
    }

    /// Record a tournament mutation locally and push it (owner-authoritative).
    pub async fn save_tournament(&self, tournament: Tournament) -> Result<()> {
        self.store.upsert_tournament(tournament.clone());

        self.status.start();
        let result = self.adapter.sync_tournament(&tournament).await;
        self.conclude(result)
    }

    /// Record a game session locally and push it. A session failing
    /// required-field validation stays local-only until completed; that is
    /// not an error.
    pub async fn record_session(&self, session: GameSession) -> Result<()> {
        self.store.upsert_session(session.clone());

        self.status.start();
        let result = self.adapter.sync_session(&session).await.map(|_| ());
        self.conclude(result)
    }

    /// Remove a session locally right away; the remote delete is best-effort.
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.store.remove_session(session_id);

        self.status.start();
        let result = self.adapter.delete_session(session_id).await;
        self.conclude(result)
    }

    /// Remove a tournament and its sessions. Only the owner may delete;
    /// violations are rejected before anything changes.
    pub async fn delete_tournament(&self, tournament_id: &str) -> Result<()> {
        let Some(tournament) = self.store.tournament(tournament_id) else {
            return Err(Error::NotFound(format!("tournament {tournament_id}")));
        };
        let user_id = self.auth.current_user_id();
        if tournament.owner_id.is_some() && tournament.owner_id != user_id {
            return Err(Error::Conflict(format!(
                "only the owner may delete tournament {tournament_id}"
            )));
        }

        self.store.remove_tournament(tournament_id);

        self.status.start();
        let result = self.adapter.delete_tournament_cascade(tournament_id).await;
        self.conclude(result)
    }

    async fn run_sign_in(
        &self,
        token: &SyncToken,
        user_id: &str,
        display_name: Option<String>,
    ) -> Result<UserProfile> {
        let profile = self.adapter.ensure_profile(user_id, display_name).await?;
        if token.is_cancelled() {
            return Ok(profile);
        }
        self.run_full_sync(token, user_id).await?;
        Ok(profile)
    }

    /// Steps 2–7 of the sign-in sequence; also the body of a manual retry.
    async fn run_full_sync(&self, token: &SyncToken, user_id: &str) -> Result<()> {
        let local = self.store.snapshot();
        let mut remote = self.adapter.load_remote_state(user_id).await?;
        if token.is_cancelled() {
            return Ok(());
        }

        let push_set = tournaments_to_push(&local, &remote, user_id);
        if !push_set.is_empty() {
            tracing::info!(
                count = push_set.len(),
                "pushing locally-authoritative tournaments"
            );
            for tournament in &push_set {
                self.adapter.sync_tournament(tournament).await?;
                if token.is_cancelled() {
                    return Ok(());
                }
                for session_id in &tournament.game_sessions {
                    if let Some(session) = local.sessions.get(session_id) {
                        self.adapter.sync_session(session).await?;
                        if token.is_cancelled() {
                            return Ok(());
                        }
                    }
                }
            }

            // The pushes changed remote state; merge against a fresh copy.
            remote = self.adapter.load_remote_state(user_id).await?;
            if token.is_cancelled() {
                return Ok(());
            }
        }

        let merged = merge_snapshots(&local, &remote, Some(user_id));
        self.store.hydrate(merged);
        self.store.resolve_active_tournament();
        Ok(())
    }

    async fn pull_and_merge(&self, token: &SyncToken, user_id: &str) -> Result<()> {
        let local = self.store.snapshot();
        let remote = self.adapter.load_remote_state(user_id).await?;
        if token.is_cancelled() {
            return Ok(());
        }

        let merged = merge_snapshots(&local, &remote, Some(user_id));
        self.store.hydrate(merged);
        self.store.resolve_active_tournament();
        Ok(())
    }

    /// Issue a fresh token for a new session, cancelling the previous one.
    fn begin_session(&self, user_id: &str) -> SyncToken {
        let token = SyncToken::new(user_id, Arc::clone(&self.auth));
        if let Ok(mut guard) = self.active_token.lock() {
            if let Some(previous) = guard.replace(token.clone()) {
                previous.cancel();
            }
        }
        token
    }

    /// Token for follow-up triggers within the current session.
    fn session_token(&self, user_id: &str) -> SyncToken {
        if let Ok(guard) = self.active_token.lock() {
            if let Some(token) = guard.as_ref() {
                if token.user_id() == user_id {
                    return token.clone();
                }
            }
        }
        SyncToken::new(user_id, Arc::clone(&self.auth))
    }

    /// Fold an operation result into the status tracker. Permission errors
    /// racing a sign-out are expected noise, reported as success (`Ok(None)`)
    /// so the UI never shows "sync failed" for logging out.
    fn conclude_with<T>(&self, result: Result<T>) -> Result<Option<T>> {
        match result {
            Ok(value) => {
                self.status.success();
                Ok(Some(value))
            }
            Err(error) if self.adapter.is_benign_signout_error(&error) => {
                tracing::debug!(%error, "ignoring permission error racing sign-out");
                self.status.success();
                Ok(None)
            }
            Err(error) => {
                tracing::warn!(%error, "sync step failed");
                self.status.fail(compact_text(&error.to_string()));
                Err(error)
            }
        }
    }

    fn conclude(&self, result: Result<()>) -> Result<()> {
        self.conclude_with(result).map(|_| ())
    }
}

/// The push set: local tournaments this user owns that remote needs.
///
/// Owner-only by construction — a viewer's local copy is never pushed, so a
/// read-only member cannot overwrite an owner's data. A tournament qualifies
/// when it is absent remotely, remotely timestamp-less, differs in session
/// count (a cheap changed-content proxy), or is strictly newer locally.
fn tournaments_to_push(local: &Snapshot, remote: &Snapshot, user_id: &str) -> Vec<Tournament> {
    local
        .tournaments
        .values()
        .filter(|tournament| tournament.is_owned_by(user_id))
        .filter(|tournament| match remote.tournaments.get(&tournament.id) {
            None => true,
            Some(existing) => {
                existing.updated_at.is_none()
                    || existing.game_sessions.len() != tournament.game_sessions.len()
                    || to_epoch_millis(tournament.updated_at.as_ref())
                        > to_epoch_millis(existing.updated_at.as_ref())
            }
        })
        .cloned()
        .collect()
}
