//! Remote adapter: validated entity reads/writes against the document store.
//!
//! Translates the domain models to/from remote documents and performs the
//! validation a server-side policy would also enforce, so failures are caught
//! locally with better diagnostics before wasting a round-trip. The adapter
//! never merges snapshots; it only transports.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::Rng;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::auth::AuthStateProvider;
use crate::error::{Error, Result};
use crate::models::{GameSession, GameShelf, ShelfLayout, Snapshot, Tournament, UserProfile};
use crate::util::normalize_text_option;

use super::{collections, payload_from, DocRef, Document, FieldWrite, RemoteStore};

const USER_CODE_ATTEMPTS: u32 = 5;

/// Validated read/write access to the remote store for one process.
pub struct RemoteAdapter<S> {
    store: Arc<S>,
    auth: Arc<dyn AuthStateProvider>,
}

impl<S: RemoteStore> RemoteAdapter<S> {
    pub fn new(store: Arc<S>, auth: Arc<dyn AuthStateProvider>) -> Self {
        Self { store, auth }
    }

    /// Underlying store handle (shared with the shelf sync service).
    pub fn store(&self) -> Arc<S> {
        Arc::clone(&self.store)
    }

    /// Whether a failure is expected noise from a request racing a sign-out.
    ///
    /// A permission error arriving after the local session has already been
    /// cleared means the user logged out mid-request; surfacing it as a sync
    /// failure would be a false alarm.
    #[must_use]
    pub fn is_benign_signout_error(&self, error: &Error) -> bool {
        error.is_permission_denied() && self.auth.current_user_id().is_none()
    }

    /// Fetch the remote snapshot visible to `user_id`: tournaments they are a
    /// member of, plus sessions they own or participate in, deduplicated by id.
    pub async fn load_remote_state(&self, user_id: &str) -> Result<Snapshot> {
        let mut snapshot = Snapshot::default();

        let tournament_docs = self
            .store
            .query_array_contains(collections::TOURNAMENTS, "memberIds", user_id)
            .await?;
        for doc in tournament_docs {
            if let Some(mut tournament) = parse_doc::<Tournament>("tournament", doc) {
                tournament.normalize();
                snapshot.insert_tournament(tournament);
            }
        }

        let owned = self
            .store
            .query_eq(collections::GAME_SESSIONS, "ownerId", user_id)
            .await?;
        let participating = self
            .store
            .query_array_contains(collections::GAME_SESSIONS, "participantUserIds", user_id)
            .await?;
        for doc in owned.into_iter().chain(participating) {
            if let Some(session) = parse_doc::<GameSession>("game session", doc) {
                if !snapshot.sessions.contains_key(&session.id) {
                    snapshot.insert_session(session);
                }
            }
        }

        tracing::debug!(
            tournaments = snapshot.tournaments.len(),
            sessions = snapshot.sessions.len(),
            "loaded remote state"
        );
        Ok(snapshot)
    }

    /// Write one tournament: merge write when it already exists remotely,
    /// non-merge create otherwise. `updatedAt` is set to server time.
    pub async fn sync_tournament(&self, tournament: &Tournament) -> Result<()> {
        let existing = self
            .store
            .get(collections::TOURNAMENTS, &tournament.id)
            .await?;
        if existing.is_some() {
            let payload = payload_from(tournament, &["updatedAt"])?;
            self.store
                .merge(collections::TOURNAMENTS, &tournament.id, payload)
                .await
        } else {
            let payload = payload_from(tournament, &["createdAt", "updatedAt"])?;
            self.store
                .create(collections::TOURNAMENTS, &tournament.id, payload)
                .await
        }
    }

    /// Write one game session after required-field validation.
    ///
    /// Returns `Ok(false)` (and logs the specific missing fields) when the
    /// session is rejected locally; the caller's batch continues.
    pub async fn sync_session(&self, session: &GameSession) -> Result<bool> {
        if let Err(error) = session.validate() {
            tracing::warn!(%error, "skipping game session failing validation");
            return Ok(false);
        }

        let existing = self
            .store
            .get(collections::GAME_SESSIONS, &session.id)
            .await?;
        if existing.is_some() {
            let payload = payload_from(session, &["updatedAt"])?;
            self.store
                .merge(collections::GAME_SESSIONS, &session.id, payload)
                .await?;
        } else {
            let payload = payload_from(session, &["createdAt", "updatedAt"])?;
            self.store
                .create(collections::GAME_SESSIONS, &session.id, payload)
                .await?;
        }
        Ok(true)
    }

    /// Delete one session document.
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.store
            .delete(collections::GAME_SESSIONS, session_id)
            .await
    }

    /// Delete a tournament together with all of its sessions, all-or-nothing.
    pub async fn delete_tournament_cascade(&self, tournament_id: &str) -> Result<()> {
        let session_docs = self
            .store
            .query_eq(collections::GAME_SESSIONS, "tournamentId", tournament_id)
            .await?;

        let mut refs: Vec<DocRef> = session_docs
            .iter()
            .filter_map(|doc| doc.get("id").and_then(Value::as_str))
            .map(|id| DocRef {
                collection: collections::GAME_SESSIONS,
                id: id.to_string(),
            })
            .collect();
        refs.push(DocRef {
            collection: collections::TOURNAMENTS,
            id: tournament_id.to_string(),
        });

        tracing::info!(
            tournament_id,
            sessions = refs.len() - 1,
            "deleting tournament cascade"
        );
        self.store.delete_all(refs).await
    }

    /// Idempotent profile upsert: creates the `users/{uid}` document on first
    /// sign-in, assigns a unique 6-digit user code (with collision retry) when
    /// one is missing, and refreshes a changed display name.
    pub async fn ensure_profile(
        &self,
        user_id: &str,
        display_name: Option<String>,
    ) -> Result<UserProfile> {
        let display_name = normalize_text_option(display_name);
        let existing = self.store.get(collections::USERS, user_id).await?;

        let Some(doc) = existing else {
            let mut profile = UserProfile::new(user_id, display_name);
            profile.user_code = Some(self.claim_user_code(user_id).await?);
            let payload = payload_from(&profile, &["createdAt", "updatedAt"])?;
            self.store
                .create(collections::USERS, user_id, payload)
                .await?;
            tracing::info!(user_id, "created profile");
            return Ok(profile);
        };

        let mut profile = parse_doc::<UserProfile>("user profile", doc)
            .unwrap_or_else(|| UserProfile::new(user_id, display_name.clone()));

        let mut patch: BTreeMap<String, FieldWrite> = BTreeMap::new();
        if profile.user_code.is_none() {
            let code = self.claim_user_code(user_id).await?;
            patch.insert("userCode".to_string(), FieldWrite::Set(code.clone().into()));
            profile.user_code = Some(code);
        }
        if display_name.is_some() && profile.display_name != display_name {
            patch.insert(
                "displayName".to_string(),
                FieldWrite::Set(display_name.clone().into()),
            );
            profile.display_name = display_name;
        }
        if !patch.is_empty() {
            patch.insert("updatedAt".to_string(), FieldWrite::ServerTime);
            self.store.merge(collections::USERS, user_id, patch).await?;
        }
        Ok(profile)
    }

    /// Resolve a 6-digit user code to a user id.
    ///
    /// Fast path through the `userCodes` reverse index, with a fallback query
    /// against `users` for accounts created before the index existed.
    pub async fn find_user_by_code(&self, code: &str) -> Result<Option<String>> {
        if let Some(doc) = self.store.get(collections::USER_CODES, code).await? {
            if let Some(uid) = doc.get("uid").and_then(Value::as_str) {
                return Ok(Some(uid.to_string()));
            }
        }

        let fallback = self
            .store
            .query_eq(collections::USERS, "userCode", code)
            .await?;
        Ok(fallback
            .first()
            .and_then(|doc| doc.get("id").and_then(Value::as_str))
            .map(ToString::to_string))
    }

    /// Fetch all shelves owned by `user_id`.
    pub async fn load_shelves(&self, user_id: &str) -> Result<BTreeMap<String, GameShelf>> {
        let docs = self
            .store
            .query_eq(collections::SHELVES, "ownerId", user_id)
            .await?;
        Ok(docs
            .into_iter()
            .filter_map(|doc| parse_doc::<GameShelf>("shelf", doc))
            .map(|shelf| (shelf.id.clone(), shelf))
            .collect())
    }

    /// Write one shelf (merge when present, create when new).
    pub async fn sync_shelf(&self, shelf: &GameShelf) -> Result<()> {
        let existing = self.store.get(collections::SHELVES, &shelf.id).await?;
        if existing.is_some() {
            let payload = payload_from(shelf, &["updatedAt"])?;
            self.store
                .merge(collections::SHELVES, &shelf.id, payload)
                .await
        } else {
            let payload = payload_from(shelf, &["updatedAt"])?;
            self.store
                .create(collections::SHELVES, &shelf.id, payload)
                .await
        }
    }

    /// Write one shelf layout document (always a merge write; layout docs
    /// have no creation-only validation).
    pub async fn sync_shelf_layout(&self, layout: &ShelfLayout) -> Result<()> {
        let payload = payload_from(layout, &["updatedAt"])?;
        self.store
            .merge(collections::SHELF_LAYOUTS, &layout.shelf_id, payload)
            .await
    }

    async fn claim_user_code(&self, user_id: &str) -> Result<String> {
        for attempt in 1..=USER_CODE_ATTEMPTS {
            let code = format!("{:06}", rand::thread_rng().gen_range(100_000..=999_999));
            if self.store.get(collections::USER_CODES, &code).await?.is_some() {
                tracing::debug!(attempt, "user code collision, retrying");
                continue;
            }

            let mut payload = BTreeMap::new();
            payload.insert("uid".to_string(), FieldWrite::Set(user_id.into()));
            self.store
                .create(collections::USER_CODES, &code, payload)
                .await?;
            return Ok(code);
        }
        Err(Error::Remote(format!(
            "could not allocate a unique user code after {USER_CODE_ATTEMPTS} attempts"
        )))
    }
}

/// Reconstruct an entity from a raw document; parse failures are logged and
/// the document skipped rather than aborting the whole load.
fn parse_doc<T: DeserializeOwned>(kind: &'static str, doc: Document) -> Option<T> {
    match serde_json::from_value(Value::Object(doc)) {
        Ok(entity) => Some(entity),
        Err(error) => {
            tracing::warn!(kind, %error, "skipping malformed remote document");
            None
        }
    }
}
