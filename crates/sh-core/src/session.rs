//! Client-held user session state.
//!
//! This is the session blob the UI layer keeps between navigations, distinct
//! from the per-service connections owned by the registry. Guards read it,
//! and critical error handling is the only path that wipes it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// User session as seen by route guards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSession {
    pub user_id: String,
    pub roles: Vec<String>,
    pub is_valid: bool,
}

impl UserSession {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Storage for the single client-side user session.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self) -> Option<UserSession>;
    async fn put(&self, session: UserSession);
    async fn clear(&self);
}

/// In-memory session store.
#[derive(Default)]
pub struct MemorySessionStore {
    inner: RwLock<Option<StoredSession>>,
}

#[derive(Debug, Clone)]
struct StoredSession {
    session: UserSession,
    stored_at: DateTime<Utc>,
}

impl MemorySessionStore {
    /// When the current session was stored, if any.
    pub async fn stored_at(&self) -> Option<DateTime<Utc>> {
        self.inner.read().await.as_ref().map(|s| s.stored_at)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self) -> Option<UserSession> {
        self.inner.read().await.as_ref().map(|s| s.session.clone())
    }

    async fn put(&self, session: UserSession) {
        *self.inner.write().await = Some(StoredSession {
            session,
            stored_at: Utc::now(),
        });
    }

    async fn clear(&self) {
        *self.inner.write().await = None;
    }
}
