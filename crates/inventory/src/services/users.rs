//! User directory port and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::UserId;
use domain::AuthorProfile;
use tokio::sync::RwLock;

/// Read access to order authors.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Returns the author's profile, or `None` if the user does not exist.
    async fn get_author(&self, id: UserId) -> Option<AuthorProfile>;
}

/// In-memory user directory, seeded by the host or by tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserDirectory {
    users: Arc<RwLock<HashMap<UserId, AuthorProfile>>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a profile.
    pub async fn insert(&self, profile: AuthorProfile) {
        self.users.write().await.insert(profile.id, profile);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn get_author(&self, id: UserId) -> Option<AuthorProfile> {
        self.users.read().await.get(&id).cloned()
    }
}
