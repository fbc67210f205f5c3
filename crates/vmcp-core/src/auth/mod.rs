//! Outgoing authentication toward backend MCP servers (spec §4.1).
//!
//! A backend's [`AuthConfig`] describes *how* to authenticate to it; the
//! [`OutgoingAuthRegistry`] trait is the seam a deployment uses to plug in its
//! own credential source (e.g. a vault lookup) without vmcp-core needing to
//! know about it.

mod strategy;

pub use strategy::{ClientCredentials, HeaderInjection, TokenExchange, Unauthenticated};

use std::sync::Arc;

use crate::error::ConnectError;
use crate::identity::Identity;

/// How a [`crate::backend::BackendTarget`] should be authenticated. Stored as
/// configuration (serializable, cloneable); [`build_strategy`] turns it into a
/// live [`OutgoingAuthRegistry`] at connect time.
#[derive(Debug, Clone)]
pub enum AuthConfig {
    /// No credentials are attached to outgoing requests.
    Unauthenticated,
    /// A single static header is attached verbatim to every request, e.g. a
    /// shared-secret `Authorization: Bearer <token>`.
    HeaderInjection { header_name: String, header_value: String },
    /// Plain OAuth2 client-credentials grant; the token carries the vMCP
    /// server's own identity, not the connecting client's.
    ClientCredentials {
        token_endpoint: url::Url,
        client_id: String,
        client_secret: String,
        scopes: Vec<String>,
    },
    /// The client's [`Identity`] is exchanged for a backend-scoped token via
    /// an OAuth2 client-credentials grant carrying a signed JWT bearer
    /// assertion in place of a shared secret, per RFC 7523.
    TokenExchange {
        token_endpoint: url::Url,
        client_id: String,
        client_secret: String,
        audience: String,
    },
}

/// A live, per-backend credential source. Implementations may cache and
/// refresh tokens internally; [`Strategy::header_for`] is called once per
/// outgoing request.
#[async_trait::async_trait]
pub trait OutgoingAuthRegistry: Send + Sync {
    /// Computes the `Authorization` (or other) header value to attach to a
    /// request made on behalf of `identity`. `None` means attach nothing.
    async fn header_for(&self, identity: &Identity) -> Result<Option<String>, ConnectError>;
}

/// Resolves `config` to a live strategy, validating it in the process (spec
/// §4.1 "the strategy is validated once at connection time", §6
/// `Strategy.Validate(auth_config)`). A malformed config — an empty
/// `client_id`/`client_secret`/`token_endpoint`/`audience`/header name — fails
/// here, at connect time, rather than surfacing as an opaque `AuthFailed` on
/// the first outgoing request.
pub fn build_strategy(config: &AuthConfig) -> Result<Arc<dyn OutgoingAuthRegistry>, ConnectError> {
    match config {
        AuthConfig::Unauthenticated => Ok(Arc::new(Unauthenticated)),
        AuthConfig::HeaderInjection {
            header_name,
            header_value,
        } => HeaderInjection::new(header_name, header_value)
            .map(|s| Arc::new(s) as Arc<dyn OutgoingAuthRegistry>),
        AuthConfig::ClientCredentials {
            token_endpoint,
            client_id,
            client_secret,
            scopes,
        } => ClientCredentials::new(
            token_endpoint.clone(),
            client_id.clone(),
            client_secret.clone(),
            scopes.clone(),
        )
        .map(|s| Arc::new(s) as Arc<dyn OutgoingAuthRegistry>),
        AuthConfig::TokenExchange {
            token_endpoint,
            client_id,
            client_secret,
            audience,
        } => TokenExchange::new(
            token_endpoint.clone(),
            client_id.clone(),
            client_secret.clone(),
            audience.clone(),
        )
        .map(|s| Arc::new(s) as Arc<dyn OutgoingAuthRegistry>),
    }
}

/// Rejects an empty field in a strategy config, tagging the error with which
/// strategy and field failed (spec §4.1/§6 `Strategy.Validate`).
pub(crate) fn validate_non_empty(strategy: &'static str, field: &'static str, value: &str) -> Result<(), ConnectError> {
    if value.trim().is_empty() {
        return Err(ConnectError::AuthInvalidConfig {
            strategy: strategy.to_string(),
            reason: format!("{field} must not be empty"),
        });
    }
    Ok(())
}
