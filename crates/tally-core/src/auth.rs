//! Auth-state seam between the authentication layer and the sync engine.
//!
//! The engine never manages tokens; it only needs "who is signed in right
//! now" and notification of sign-in/out transitions. The provider trait is
//! injected into the orchestrator so the live user check stays testable.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

/// Minimal identity of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub display_name: Option<String>,
}

/// Read-only view of the current auth state.
pub trait AuthStateProvider: Send + Sync {
    /// Id of the currently signed-in user, or `None` when signed out.
    fn current_user_id(&self) -> Option<String>;
}

/// In-memory session handle; the default `AuthStateProvider` implementation.
#[derive(Clone, Default)]
pub struct SessionHandle {
    inner: Arc<RwLock<Option<AuthUser>>>,
}

impl SessionHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, user: AuthUser) {
        if let Ok(mut guard) = self.inner.write() {
            *guard = Some(user);
        }
    }

    pub fn sign_out(&self) {
        if let Ok(mut guard) = self.inner.write() {
            *guard = None;
        }
    }

    #[must_use]
    pub fn current_user(&self) -> Option<AuthUser> {
        self.inner.read().map(|guard| guard.clone()).unwrap_or(None)
    }
}

impl AuthStateProvider for SessionHandle {
    fn current_user_id(&self) -> Option<String> {
        self.current_user().map(|user| user.id)
    }
}
