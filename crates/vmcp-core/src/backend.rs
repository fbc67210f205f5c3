//! Static description of one backend MCP server (spec §3 `BackendTarget`).

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::auth::AuthConfig;

/// Transport used to reach a backend. Streamable-HTTP and SSE are both
/// supported by `rmcp`'s client transports; anything else is rejected at
/// connect time with [`crate::error::ConnectError::UnsupportedTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    StreamableHttp,
    Sse,
}

/// Translates a backend's own tool/resource/prompt name into the name exposed
/// on the merged routing table. Defaults to the identity function: most
/// backends need no translation, and a deployment only supplies one when two
/// backends would otherwise collide.
pub type NameTranslator = Arc<dyn Fn(&str) -> String + Send + Sync>;

fn identity_translator() -> NameTranslator {
    Arc::new(|name: &str| name.to_string())
}

/// One configured backend the [`crate::factory::Factory`] will attempt to
/// connect to when building a session.
#[derive(Clone)]
pub struct BackendTarget {
    /// Stable identifier used for conflict-resolution ordering (spec §4.4:
    /// sort by `backend_id` ascending, first writer wins) and for routing
    /// table lookups. Not the display name.
    pub backend_id: Arc<str>,
    pub display_name: String,
    pub endpoint: url::Url,
    pub transport: TransportKind,
    pub auth: AuthConfig,
    pub name_translator: NameTranslator,
}

impl std::fmt::Debug for BackendTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendTarget")
            .field("backend_id", &self.backend_id)
            .field("display_name", &self.display_name)
            .field("endpoint", &self.endpoint)
            .field("transport", &self.transport)
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

impl BackendTarget {
    pub fn new(
        backend_id: impl Into<Arc<str>>,
        display_name: impl Into<String>,
        endpoint: url::Url,
        transport: TransportKind,
        auth: AuthConfig,
    ) -> Self {
        Self {
            backend_id: backend_id.into(),
            display_name: display_name.into(),
            endpoint,
            transport,
            auth,
            name_translator: identity_translator(),
        }
    }

    pub fn with_name_translator(mut self, translator: NameTranslator) -> Self {
        self.name_translator = translator;
        self
    }

    pub fn translate(&self, name: &str) -> String {
        (self.name_translator)(name)
    }
}
