//! Multi-Session Factory (spec §4.5.1): fans out to every configured
//! backend concurrently, tolerates partial failure, and assembles the
//! surviving connections into a [`MultiSession`].

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::backend::BackendTarget;
use crate::capability::CapabilityList;
use crate::connector::Connector;
use crate::identity::Identity;
use crate::multi_session::{MultiSession, SessionMetadata};
use crate::routing::RoutingTable;
use crate::session::BackendSession;

/// Default value of `max_backend_init_concurrency` (spec §4.5.1 step 2: "a
/// semaphore of capacity `max_backend_init_concurrency` (default 10)").
pub const DEFAULT_MAX_CONCURRENT_CONNECTS: usize = 10;

/// One backend's outcome from the fan-out, before assembly.
struct ConnectOutcome {
    backend_id: Arc<str>,
    result: Result<(BackendSession, CapabilityList), crate::error::ConnectError>,
}

/// Builds [`MultiSession`]s from a set of [`BackendTarget`]s (spec §4.5.1).
/// A thin orchestration layer over [`Connector`]: every actual network call
/// is the connector's, this only bounds concurrency and aggregates results.
pub struct Factory {
    connector: Arc<dyn Connector>,
    max_concurrent_connects: usize,
}

impl Factory {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            max_concurrent_connects: DEFAULT_MAX_CONCURRENT_CONNECTS,
        }
    }

    pub fn with_max_concurrent_connects(mut self, limit: usize) -> Self {
        self.max_concurrent_connects = limit.max(1);
        self
    }

    /// Connects to every backend in `targets` concurrently (bounded by
    /// `max_concurrent_connects`), builds the merged routing table from
    /// whichever backends succeeded, and returns the assembled
    /// [`MultiSession`] plus the ids of backends that failed to connect
    /// (spec §4.5.1 steps 2-6: a backend that fails to connect is dropped,
    /// logged as a warning, and excluded from the session).
    ///
    /// Never fails outright, even when every backend failed or `targets` was
    /// empty (spec §4.5.1 step 7, §7 `NoBackendsConnected`: "not an error,
    /// empty session returned; individual operations fail `NotFound`"). A
    /// vMCP client can attach during a total backend outage; the session
    /// just won't route anything until backends recover and the session is
    /// recreated.
    pub async fn make_session(
        &self,
        session_id: String,
        targets: &[BackendTarget],
        identity: Option<&Identity>,
    ) -> (MultiSession, Vec<(Arc<str>, crate::error::ConnectError)>) {
        let identity = identity.cloned().unwrap_or_else(Identity::anonymous);
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_connects));

        let outcomes = futures::future::join_all(targets.iter().map(|target| {
            let connector = Arc::clone(&self.connector);
            let semaphore = Arc::clone(&semaphore);
            let target = target.clone();
            let identity = identity.clone();
            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .expect("semaphore is never closed");
                let result = connector.connect(&target, &identity).await;
                ConnectOutcome {
                    backend_id: target.backend_id.clone(),
                    result,
                }
            }
        }))
        .await;

        let mut connections = HashMap::with_capacity(outcomes.len());
        let mut capability_lists = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        let mut connected_ids: Vec<Arc<str>> = Vec::new();

        for outcome in outcomes {
            match outcome.result {
                Ok((session, capabilities)) => {
                    connected_ids.push(outcome.backend_id.clone());
                    capability_lists.push(capabilities);
                    connections.insert(outcome.backend_id, session);
                }
                Err(error) => {
                    tracing::warn!(
                        backend_id = %outcome.backend_id,
                        %error,
                        "backend connection failed, excluding it from the session"
                    );
                    failures.push((outcome.backend_id, error));
                }
            }
        }

        connected_ids.sort();
        let backend_ids = (!connected_ids.is_empty())
            .then(|| connected_ids.iter().map(|id| id.as_ref()).collect::<Vec<_>>().join(","));

        let routing_table = RoutingTable::build(capability_lists);
        let metadata = SessionMetadata {
            identity_subject: identity.subject.clone(),
            backend_ids,
        };

        (
            MultiSession::new(session_id, connections, routing_table, metadata),
            failures,
        )
    }
}
