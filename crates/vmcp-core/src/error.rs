//! Error taxonomy for the vMCP multi-backend session subsystem.
//!
//! Each component gets its own enum so call sites can match on exactly the
//! failures they can produce; [`VmcpError`] joins them for callers that just
//! want one type to propagate with `?`.

use thiserror::Error;

/// Errors raised while [`crate::connector::Connector::connect`] is setting up one
/// backend. All of these are advisory to the [`crate::factory::Factory`]: a
/// failure here skips the offending backend, it never fails session creation.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("unsupported transport type: {0}")]
    UnsupportedTransport(String),

    #[error("invalid auth config for strategy {strategy}: {reason}")]
    AuthInvalidConfig { strategy: String, reason: String },

    #[error("authentication failed for strategy {strategy}: {reason}")]
    AuthFailed { strategy: String, reason: String },

    #[error("transport failed during {stage}: {source}")]
    TransportFailed {
        stage: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ConnectError {
    pub fn transport_failed(
        stage: &'static str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        ConnectError::TransportFailed {
            stage,
            source: source.into(),
        }
    }
}

/// Errors raised by a live [`crate::session::BackendSession`] operation.
/// These propagate to the caller verbatim (spec §7 "Transport-level errors on a
/// live operation propagate to the caller verbatim").
#[derive(Debug, Error)]
pub enum BackendCallError {
    #[error("backend call failed: {0}")]
    Transport(#[from] rmcp::ServiceError),

    #[error("operation cancelled")]
    Cancelled,
}

/// Errors raised while [`crate::multi_session::MultiSession`] dispatches a
/// client-facing operation.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("session is closed")]
    SessionClosed,

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error("prompt not found: {0}")]
    PromptNotFound(String),

    /// Invariant violation: the routing table named a backend id with no
    /// corresponding live connection. Logged loudly by the caller; surfaced here
    /// as an internal error.
    #[error("no backend client for backend id: {0}")]
    NoBackendClient(String),

    #[error(transparent)]
    Backend(#[from] BackendCallError),
}

/// Errors raised by the two-phase [`crate::manager::SessionManager`] lifecycle.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("empty session id")]
    EmptyId,

    #[error("session not found")]
    NotFound,

    #[error("session already terminated")]
    Terminated,

    #[error("session store error: {0}")]
    Store(#[from] crate::store::StoreError),
}

/// Errors raised by an adapted tool handler (spec §4.5.3) — always returned as a
/// protocol-level tool error result, never a transport error.
#[derive(Debug, Error)]
pub enum AdaptedToolError {
    #[error("tool arguments must be a JSON object")]
    InvalidInput,

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Umbrella error for callers that don't need to match on a specific component.
#[derive(Debug, Error)]
pub enum VmcpError {
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Manager(#[from] ManagerError),
    #[error(transparent)]
    AdaptedTool(#[from] AdaptedToolError),
}
