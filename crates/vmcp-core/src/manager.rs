//! Session Manager (spec §4.5.2): the two-phase lifecycle that bridges the
//! MCP streamable-HTTP transport's "session id before request context"
//! requirement to the session subsystem.
//!
//! Phase 1 (`generate`) runs synchronously at initialize time, before any
//! backend, identity, or request context is available — it only reserves an
//! id in the [`SessionStore`]. Phase 2 (`create_session`) runs from the
//! protocol adapter's post-registration hook, once context exists, and does
//! the actual backend fan-out through the [`Factory`]. The store is the
//! rendezvous between the two; see `DESIGN.md` for how the pre-check /
//! fan-out / post-check bracket defends against a `Terminate` racing
//! between them (spec §9, §8 property 9).

use std::sync::Arc;

use rand::RngCore;

use crate::backend::BackendTarget;
use crate::error::ManagerError;
use crate::factory::Factory;
use crate::identity::Identity;
use crate::multi_session::MultiSession;
use crate::registry::BackendRegistry;
use crate::store::{SessionEntry, SessionStore, StoreError};

/// Random bytes backing a session id (spec §6: "128-bit ... cryptographically
/// random"). Hex-encoded, this yields 32 characters, all within the
/// ASCII-visible range 0x21-0x7E the wire protocol requires.
const SESSION_ID_BYTES: usize = 16;

fn random_session_id() -> String {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().fold(String::with_capacity(SESSION_ID_BYTES * 2), |mut s, b| {
        s.push_str(&format!("{b:02x}"));
        s
    })
}

/// Implements the `SessionIdManager`-shaped contract an outer MCP protocol
/// adapter calls into (spec §4.5.2, §6 "Exposed to collaborators").
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    registry: Arc<dyn BackendRegistry>,
    factory: Factory,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, registry: Arc<dyn BackendRegistry>, factory: Factory) -> Self {
        Self {
            store,
            registry,
            factory,
        }
    }

    /// Phase 1: generates a fresh id and reserves a placeholder for it.
    /// Retries exactly once on a storage collision (spec §4.5.2 step 3); a
    /// second failure returns the empty string, the sentinel meaning "no
    /// session issued" — the adapter omits the session header and lets
    /// subsequent client requests fail validation like any other storage
    /// outage (spec §9 Open Question (a), resolved in `DESIGN.md`).
    pub async fn generate(&self) -> String {
        for _ in 0..2 {
            let id = random_session_id();
            match self.store.insert_placeholder(&id).await {
                Ok(()) => return id,
                Err(StoreError::Collision) => continue,
                Err(_) => break,
            }
        }
        String::new()
    }

    /// Phase 2: upgrades the placeholder at `session_id` into a live,
    /// routable [`MultiSession`] by snapshotting the backend registry and
    /// fanning out through the [`Factory`].
    pub async fn create_session(
        &self,
        session_id: &str,
        identity: Option<Identity>,
    ) -> Result<Arc<MultiSession>, ManagerError> {
        if session_id.is_empty() {
            return Err(ManagerError::EmptyId);
        }

        // Fast-fail pre-check (spec §4.5.2 step 2): no backend connection is
        // opened for a session that's already gone or terminated.
        match self.store.get(session_id).await {
            None => return Err(ManagerError::NotFound),
            Some(SessionEntry::Placeholder { terminated: true }) => {
                return Err(ManagerError::Terminated)
            }
            Some(SessionEntry::Placeholder { terminated: false }) => {}
            // A second `create_session` call for an id that already
            // upgraded is treated as idempotent: the existing session is
            // handed back rather than re-run through fan-out.
            Some(SessionEntry::Active(session)) => return Ok(session),
        }

        let backends: Vec<BackendTarget> = self.registry.list().await;
        let (session, failures) = self
            .factory
            .make_session(session_id.to_string(), &backends, identity.as_ref())
            .await;
        if !failures.is_empty() {
            tracing::warn!(
                session_id,
                failed_backends = failures.len(),
                "session created with one or more backends unreachable"
            );
        }
        let session = Arc::new(session);

        // Post-check (spec §4.5.2 step 6): fan-out may have taken seconds;
        // a concurrent `Terminate` could have raced it. Bracketing the
        // fan-out with pre- and post-checks guarantees at least one of the
        // two observes any interleaving with `terminate` (spec §8 property 9).
        match self.store.get(session_id).await {
            None | Some(SessionEntry::Placeholder { terminated: true }) => {
                session.close().await;
                return Err(ManagerError::Terminated);
            }
            _ => {}
        }

        if self
            .store
            .replace_with_active(session_id, Arc::clone(&session))
            .await
            .is_err()
        {
            session.close().await;
            return Err(ManagerError::Terminated);
        }

        Ok(session)
    }

    /// Spec §4.5.2 `Validate`: `Ok(true)` means terminated-but-present,
    /// `Ok(false)` means live, `Err(NotFound)` means absent (the adapter
    /// maps that to an HTTP auth-style rejection upstream, not this crate's
    /// concern).
    pub async fn validate(&self, session_id: &str) -> Result<bool, ManagerError> {
        if session_id.is_empty() {
            return Err(ManagerError::EmptyId);
        }
        match self.store.get(session_id).await {
            None => Err(ManagerError::NotFound),
            Some(SessionEntry::Placeholder { terminated }) => Ok(terminated),
            Some(SessionEntry::Active(_)) => Ok(false),
        }
    }

    /// Spec §4.5.2 `Terminate`: asymmetric by session kind. Client-initiated
    /// termination is always permitted, so the returned `not_allowed` is
    /// always `false` — it exists to mirror the two-value contract the
    /// source describes, not because this implementation can refuse.
    pub async fn terminate(&self, session_id: &str) -> Result<bool, ManagerError> {
        if session_id.is_empty() {
            return Err(ManagerError::EmptyId);
        }
        match self.store.get(session_id).await {
            // Absent succeeds silently: a client DELETE racing TTL expiry
            // is not an error (spec §4.5.2 Terminate, "Absent → succeed
            // silently").
            None => Ok(false),
            Some(SessionEntry::Active(session)) => {
                session.close().await;
                self.store.delete(session_id).await;
                Ok(false)
            }
            Some(SessionEntry::Placeholder { .. }) => {
                // Marked, not deleted: the window a racing Phase 2 needs to
                // observe via its pre/post-check (spec §9).
                self.store.mark_placeholder_terminated(session_id).await;
                Ok(false)
            }
        }
    }

    /// Spec §6 "Exposed to collaborators": `GetMultiSession(id) -> MultiSession?`.
    pub async fn get_multi_session(&self, session_id: &str) -> Option<Arc<MultiSession>> {
        match self.store.get(session_id).await? {
            SessionEntry::Active(session) => Some(session),
            SessionEntry::Placeholder { .. } => None,
        }
    }
}
