//! Shelf replication: the game-library counterpart of the tournament sync.
//!
//! Follows the same three triggers as the orchestrator but with shallower
//! merge semantics: the remote shelf set replaces the local one wholesale
//! after locally-authoritative shelves are pushed. Layout documents are
//! written on every drag-and-drop placement, so their pushes go through the
//! debounced writer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::auth::AuthStateProvider;
use crate::clock::to_epoch_millis;
use crate::error::Result;
use crate::models::{GameShelf, ShelfLayout};
use crate::remote::{RemoteAdapter, RemoteStore};
use crate::status::SyncStatusTracker;
use crate::store::LocalStore;
use crate::util::compact_text;

use super::debounce::{DebounceSink, DebouncedWriter};

/// Window within which consecutive layout edits collapse into one write.
pub const LAYOUT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(800);

struct LayoutSink<S> {
    adapter: Arc<RemoteAdapter<S>>,
    status: SyncStatusTracker,
}

#[async_trait]
impl<S: RemoteStore + 'static> DebounceSink<ShelfLayout> for LayoutSink<S> {
    async fn write(&self, key: &str, layout: ShelfLayout) {
        tracing::debug!(shelf_id = key, "pushing debounced shelf layout");
        self.status.start();
        match self.adapter.sync_shelf_layout(&layout).await {
            Ok(()) => self.status.success(),
            Err(error) if self.adapter.is_benign_signout_error(&error) => {
                tracing::debug!(%error, "ignoring layout push error racing sign-out");
                self.status.success();
            }
            Err(error) => {
                tracing::warn!(%error, shelf_id = key, "shelf layout push failed");
                self.status.fail(compact_text(&error.to_string()));
            }
        }
    }
}

/// Replicates shelf and layout documents for the signed-in user.
pub struct ShelfSyncService<S: RemoteStore> {
    adapter: Arc<RemoteAdapter<S>>,
    store: LocalStore,
    status: SyncStatusTracker,
    auth: Arc<dyn AuthStateProvider>,
    layout_writer: DebouncedWriter<ShelfLayout>,
}

impl<S: RemoteStore + 'static> ShelfSyncService<S> {
    /// Must be called within a tokio runtime (spawns the debounce actor).
    pub fn new(
        adapter: Arc<RemoteAdapter<S>>,
        store: LocalStore,
        status: SyncStatusTracker,
        auth: Arc<dyn AuthStateProvider>,
        debounce_window: Duration,
    ) -> Self {
        let sink = Arc::new(LayoutSink {
            adapter: Arc::clone(&adapter),
            status: status.clone(),
        });
        Self {
            adapter,
            store,
            status,
            auth,
            layout_writer: DebouncedWriter::new(debounce_window, sink),
        }
    }

    /// Trigger A/B: push offline-authored shelves, then replace the local
    /// shelf set with the remote one.
    pub async fn refresh(&self, user_id: &str) -> Result<()> {
        self.status.start();
        let result = self.run_refresh(user_id).await;
        match result {
            Ok(()) => {
                self.status.success();
                Ok(())
            }
            Err(error) if self.adapter.is_benign_signout_error(&error) => {
                tracing::debug!(%error, "ignoring shelf refresh error racing sign-out");
                self.status.success();
                Ok(())
            }
            Err(error) => {
                self.status.fail(compact_text(&error.to_string()));
                Err(error)
            }
        }
    }

    async fn run_refresh(&self, user_id: &str) -> Result<()> {
        let local = self.store.shelves();
        let remote = self.adapter.load_shelves(user_id).await?;
        if self.signed_out(user_id) {
            return Ok(());
        }

        for shelf in local.values() {
            if shelf.owner_id != user_id {
                continue;
            }
            let push = match remote.get(&shelf.id) {
                None => true,
                Some(existing) => {
                    to_epoch_millis(shelf.updated_at.as_ref())
                        > to_epoch_millis(existing.updated_at.as_ref())
                }
            };
            if push {
                self.adapter.sync_shelf(shelf).await?;
                if self.signed_out(user_id) {
                    return Ok(());
                }
            }
        }

        let refreshed = self.adapter.load_shelves(user_id).await?;
        if self.signed_out(user_id) {
            return Ok(());
        }
        self.store.hydrate_shelves(refreshed);
        Ok(())
    }

    /// Record a shelf mutation locally and push it immediately.
    pub async fn save_shelf(&self, shelf: GameShelf) -> Result<()> {
        self.store.upsert_shelf(shelf.clone());
        self.status.start();
        match self.adapter.sync_shelf(&shelf).await {
            Ok(()) => {
                self.status.success();
                Ok(())
            }
            Err(error) if self.adapter.is_benign_signout_error(&error) => {
                self.status.success();
                Ok(())
            }
            Err(error) => {
                self.status.fail(compact_text(&error.to_string()));
                Err(error)
            }
        }
    }

    /// Record a layout edit locally and schedule its debounced push.
    pub fn save_layout(&self, layout: ShelfLayout) {
        self.store.upsert_shelf_layout(layout.clone());
        self.layout_writer.schedule(layout.shelf_id.clone(), layout);
    }

    /// Force out any pending layout writes (navigation-away).
    pub async fn flush_layouts(&self) {
        self.layout_writer.flush().await;
    }

    /// Trigger C: flush the pending debounce window before the session's
    /// local data is cleared. Only an abrupt process kill can lose the last
    /// window after this.
    pub async fn teardown(&self) {
        self.layout_writer.flush().await;
    }

    fn signed_out(&self, user_id: &str) -> bool {
        self.auth.current_user_id().as_deref() != Some(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthUser, SessionHandle};
    use crate::models::ShelfSlot;
    use crate::remote::{collections, MemoryRemoteStore};
    use crate::status::SyncStatus;

    fn service() -> (
        Arc<MemoryRemoteStore>,
        SessionHandle,
        LocalStore,
        ShelfSyncService<MemoryRemoteStore>,
    ) {
        let remote = Arc::new(MemoryRemoteStore::new());
        let session = SessionHandle::new();
        session.sign_in(AuthUser {
            id: "u1".into(),
            display_name: None,
        });
        let auth: Arc<dyn AuthStateProvider> = Arc::new(session.clone());
        let adapter = Arc::new(RemoteAdapter::new(Arc::clone(&remote), Arc::clone(&auth)));
        let store = LocalStore::new();
        let service = ShelfSyncService::new(
            adapter,
            store.clone(),
            SyncStatusTracker::new(),
            auth,
            Duration::from_millis(100),
        );
        (remote, session, store, service)
    }

    fn layout(shelf_id: &str, slots: u32) -> ShelfLayout {
        ShelfLayout {
            shelf_id: shelf_id.into(),
            owner_id: "u1".into(),
            slots: (0..slots)
                .map(|i| ShelfSlot {
                    game_id: format!("g{i}"),
                    row: 0,
                    col: i,
                })
                .collect(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn refresh_pushes_offline_shelves_then_replaces_local() {
        let (remote, _, store, service) = service();
        store.upsert_shelf(GameShelf::new("Favorites", "u1"));

        service.refresh("u1").await.unwrap();
        assert_eq!(remote.len(collections::SHELVES), 1);
        assert_eq!(store.shelves().len(), 1);
    }

    #[tokio::test]
    async fn refresh_replacement_drops_foreign_local_shelves() {
        let (_, _, store, service) = service();
        // Residue from a previous account; not pushed (wrong owner) and
        // replaced away by the remote set.
        store.upsert_shelf(GameShelf::new("Not Mine", "u2"));

        service.refresh("u1").await.unwrap();
        assert!(store.shelves().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn layout_edits_collapse_into_one_remote_write() {
        let (remote, _, store, service) = service();

        service.save_layout(layout("shelf-1", 1));
        service.save_layout(layout("shelf-1", 2));
        service.save_layout(layout("shelf-1", 3));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(remote.len(collections::SHELF_LAYOUTS), 1);
        // Local copy reflects the latest edit either way.
        assert_eq!(store.shelf_layout("shelf-1").unwrap().slots.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_flushes_pending_window() {
        let (remote, _, _, service) = service();

        service.save_layout(layout("shelf-1", 2));
        service.teardown().await;

        assert_eq!(remote.len(collections::SHELF_LAYOUTS), 1);
    }

    #[tokio::test]
    async fn permission_error_after_sign_out_is_benign() {
        let (remote, session, _, service) = service();
        remote.set_permission_denied(true);
        session.sign_out();

        service.refresh("u1").await.unwrap();
        assert_eq!(service.status.status(), SyncStatus::Idle);
    }
}
