//! Session store (spec §3 `Placeholder Session`, §4.5.2, §6 "Session
//! store"): the rendezvous between Phase 1 (`Generate`) and Phase 2
//! (`CreateSession`) of the two-phase lifecycle, and the only place a
//! session's identity lives once it has been upgraded to a live
//! [`MultiSession`]. Store backends persist metadata only — the live
//! in-process portions of a `MultiSession` never leave this process (spec
//! §3 Ownership), so [`InMemorySessionStore`] is the only implementation
//! that can ever be fully faithful to the contract; a Redis-backed one
//! would need a companion in-process registry for the live half, which is
//! outside this core's scope.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::multi_session::MultiSession;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session id already present in store")]
    Collision,
    #[error("store entry was not a placeholder")]
    NotAPlaceholder,
}

/// One entry in the session store.
#[derive(Clone)]
pub enum SessionEntry {
    /// Phase 1 has reserved this id but Phase 2 has not yet run (or raced a
    /// concurrent `Terminate`, spec §4.5.2 step 2/6).
    Placeholder { terminated: bool },
    /// Phase 2 completed: a live, routable session.
    Active(Arc<MultiSession>),
}

/// The store contract consumed by [`crate::manager::SessionManager`].
/// Pluggable (spec §6): an in-process map is the default; a Redis-backed
/// implementation is a valid alternative for the metadata half, deployed
/// behind the same trait.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Inserts a fresh placeholder. Fails with [`StoreError::Collision`] if
    /// `id` is already present — callers retry with a new id (spec §4.5.2
    /// Phase 1 step 3).
    async fn insert_placeholder(&self, id: &str) -> Result<(), StoreError>;

    /// Snapshot read; does not refresh TTL by itself callers that want to
    /// keep a session warm should rely on genuine operation traffic instead.
    async fn get(&self, id: &str) -> Option<SessionEntry>;

    /// Sets `terminated = true` on a placeholder in place. Returns `false`
    /// if `id` is absent or is not a placeholder (already upgraded, in which
    /// case the caller should go through [`SessionStore::close_and_remove_active`]
    /// instead).
    async fn mark_placeholder_terminated(&self, id: &str) -> bool;

    /// Phase 2's atomic upgrade (spec §4.5.2 step 7): replaces the
    /// placeholder at `id` with an active session. Fails with
    /// [`StoreError::NotAPlaceholder`] if `id` is absent or no longer a
    /// placeholder (a concurrent `Terminate` deleted it, or another
    /// `CreateSession` already won the race) — the caller is expected to
    /// have already done its own pre/post-check (spec §4.5.2) and treats
    /// this failure identically to "absent".
    async fn replace_with_active(
        &self,
        id: &str,
        session: Arc<MultiSession>,
    ) -> Result<(), StoreError>;

    /// Removes any entry at `id`, returning what was there.
    async fn delete(&self, id: &str) -> Option<SessionEntry>;
}

struct Entry {
    state: SessionEntry,
    touched_at: Instant,
}

/// Default session store: an in-process map guarded by a single
/// `RwLock`, with a background sweeper that expires placeholders older
/// than its configured TTL. Reads (`get`) take the read lock; every other
/// operation takes the write lock, which is fine at vMCP's scale — a
/// Redis-backed store would replace this file entirely, not wrap it.
pub struct InMemorySessionStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Spawns the periodic TTL sweeper (spec §6 "a periodic TTL sweeper").
    /// Placeholders idle longer than `ttl` are dropped outright (nothing to
    /// close). Active sessions idle longer than `ttl` are closed the same
    /// way an explicit `Terminate` would close them, then removed — this is
    /// the mechanism that reclaims a client that disappeared without
    /// sending `DELETE`. Returns a handle the owning process should abort on
    /// shutdown (spec §5 "stop the session-store TTL worker").
    pub fn spawn_ttl_sweeper(self: &Arc<Self>, ttl: Duration, sweep_interval: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_interval);
            loop {
                interval.tick().await;
                store.sweep_expired(ttl).await;
            }
        })
    }

    async fn sweep_expired(&self, ttl: Duration) {
        let expired: Vec<(String, SessionEntry)> = {
            let guard = self.entries.read().await;
            let now = Instant::now();
            guard
                .iter()
                .filter(|(_, entry)| now.duration_since(entry.touched_at) > ttl)
                .map(|(id, entry)| (id.clone(), entry.state.clone()))
                .collect()
        };
        for (id, state) in expired {
            self.entries.write().await.remove(&id);
            if let SessionEntry::Active(session) = state {
                tracing::debug!(session_id = %id, "ttl sweep closing abandoned session");
                session.close().await;
            }
        }
    }
}

impl Clone for SessionEntry {
    fn clone(&self) -> Self {
        match self {
            SessionEntry::Placeholder { terminated } => SessionEntry::Placeholder {
                terminated: *terminated,
            },
            SessionEntry::Active(session) => SessionEntry::Active(Arc::clone(session)),
        }
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert_placeholder(&self, id: &str) -> Result<(), StoreError> {
        let mut guard = self.entries.write().await;
        if guard.contains_key(id) {
            return Err(StoreError::Collision);
        }
        guard.insert(
            id.to_string(),
            Entry {
                state: SessionEntry::Placeholder { terminated: false },
                touched_at: Instant::now(),
            },
        );
        Ok(())
    }

    async fn get(&self, id: &str) -> Option<SessionEntry> {
        let guard = self.entries.read().await;
        guard.get(id).map(|entry| entry.state.clone())
    }

    async fn mark_placeholder_terminated(&self, id: &str) -> bool {
        let mut guard = self.entries.write().await;
        match guard.get_mut(id) {
            Some(entry) => match &mut entry.state {
                SessionEntry::Placeholder { terminated } => {
                    *terminated = true;
                    entry.touched_at = Instant::now();
                    true
                }
                SessionEntry::Active(_) => false,
            },
            None => false,
        }
    }

    async fn replace_with_active(
        &self,
        id: &str,
        session: Arc<MultiSession>,
    ) -> Result<(), StoreError> {
        let mut guard = self.entries.write().await;
        match guard.get(id) {
            Some(entry) if matches!(entry.state, SessionEntry::Placeholder { .. }) => {
                guard.insert(
                    id.to_string(),
                    Entry {
                        state: SessionEntry::Active(session),
                        touched_at: Instant::now(),
                    },
                );
                Ok(())
            }
            _ => Err(StoreError::NotAPlaceholder),
        }
    }

    async fn delete(&self, id: &str) -> Option<SessionEntry> {
        self.entries.write().await.remove(id).map(|entry| entry.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_then_get_returns_placeholder() {
        let store = InMemorySessionStore::new();
        store.insert_placeholder("s1").await.unwrap();
        assert!(matches!(
            store.get("s1").await,
            Some(SessionEntry::Placeholder { terminated: false })
        ));
    }

    #[tokio::test]
    async fn duplicate_insert_collides() {
        let store = InMemorySessionStore::new();
        store.insert_placeholder("s1").await.unwrap();
        assert!(matches!(
            store.insert_placeholder("s1").await,
            Err(StoreError::Collision)
        ));
    }

    #[tokio::test]
    async fn mark_terminated_then_delete_roundtrip() {
        let store = InMemorySessionStore::new();
        store.insert_placeholder("s1").await.unwrap();
        assert!(store.mark_placeholder_terminated("s1").await);
        assert!(matches!(
            store.get("s1").await,
            Some(SessionEntry::Placeholder { terminated: true })
        ));
        let removed = store.delete("s1").await;
        assert!(matches!(
            removed,
            Some(SessionEntry::Placeholder { terminated: true })
        ));
        assert!(store.get("s1").await.is_none());
    }

    #[tokio::test]
    async fn mark_terminated_on_missing_id_returns_false() {
        let store = InMemorySessionStore::new();
        assert!(!store.mark_placeholder_terminated("missing").await);
    }

    #[tokio::test]
    async fn replace_rejected_when_not_a_placeholder() {
        let store = InMemorySessionStore::new();
        assert!(matches!(
            store
                .replace_with_active("missing", Arc::new(MultiSession::empty_for_test("missing")))
                .await,
            Err(StoreError::NotAPlaceholder)
        ));
    }
}
