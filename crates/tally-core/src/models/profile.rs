//! User profile model

use serde::{Deserialize, Serialize};

use crate::clock::Stamp;

/// Subscription tier of an account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountTier {
    #[default]
    Free,
    Plus,
}

/// Per-user profile document (`users/{uid}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Unique 6-digit code other users can look this account up by
    #[serde(default)]
    pub user_code: Option<String>,
    #[serde(default)]
    pub account_tier: AccountTier,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub created_at: Option<Stamp>,
    #[serde(default)]
    pub updated_at: Option<Stamp>,
}

impl UserProfile {
    /// Create a fresh profile for a newly signed-up user.
    #[must_use]
    pub fn new(id: impl Into<String>, display_name: Option<String>) -> Self {
        let now = Stamp::now();
        Self {
            id: id.into(),
            display_name,
            user_code: None,
            account_tier: AccountTier::default(),
            features: Vec::new(),
            created_at: Some(now.clone()),
            updated_at: Some(now),
        }
    }
}
