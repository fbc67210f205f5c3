//! Backend Registry (spec §6): the external source of truth for which
//! backends a session should fan out to. The core only ever reads a
//! snapshot; it never mutates the registry.

use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::BackendTarget;

/// Snapshot-read contract the [`crate::manager::SessionManager`] consults at
/// the start of every Phase 2 `CreateSession` (spec §4.5.2 step 4). A
/// deployment backed by a dynamic source (e.g. Kubernetes service
/// discovery) implements this directly; the core never assumes the list is
/// stable between calls.
#[async_trait::async_trait]
pub trait BackendRegistry: Send + Sync {
    async fn list(&self) -> Vec<BackendTarget>;
    async fn get(&self, id: &str) -> Option<BackendTarget>;
    async fn count(&self) -> usize;
}

/// The CLI-configured, immutable variant (spec §6: "two implementations —
/// immutable (CLI) and dynamic (Kubernetes)"). The dynamic variant is an
/// external collaborator and out of this core's scope.
pub struct StaticBackendRegistry {
    backends: HashMap<Arc<str>, BackendTarget>,
}

impl StaticBackendRegistry {
    pub fn new(backends: Vec<BackendTarget>) -> Self {
        Self {
            backends: backends
                .into_iter()
                .map(|target| (target.backend_id.clone(), target))
                .collect(),
        }
    }
}

#[async_trait::async_trait]
impl BackendRegistry for StaticBackendRegistry {
    async fn list(&self) -> Vec<BackendTarget> {
        self.backends.values().cloned().collect()
    }

    async fn get(&self, id: &str) -> Option<BackendTarget> {
        self.backends.get(id).cloned()
    }

    async fn count(&self) -> usize {
        self.backends.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthConfig;
    use crate::backend::TransportKind;

    fn target(id: &str) -> BackendTarget {
        BackendTarget::new(
            id,
            id,
            url::Url::parse("https://backend.example/mcp").unwrap(),
            TransportKind::StreamableHttp,
            AuthConfig::Unauthenticated,
        )
    }

    #[tokio::test]
    async fn lists_and_gets_configured_backends() {
        let registry = StaticBackendRegistry::new(vec![target("a"), target("b")]);
        assert_eq!(registry.count().await, 2);
        assert!(registry.get("a").await.is_some());
        assert!(registry.get("missing").await.is_none());
        assert_eq!(registry.list().await.len(), 2);
    }
}
