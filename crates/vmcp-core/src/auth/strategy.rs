use std::sync::Arc;

use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::OutgoingAuthRegistry;
use crate::error::ConnectError;
use crate::identity::Identity;

/// Attaches no credentials. The default for backends that trust the network
/// they're reached on (e.g. a sidecar over localhost).
pub struct Unauthenticated;

#[async_trait::async_trait]
impl OutgoingAuthRegistry for Unauthenticated {
    async fn header_for(&self, _identity: &Identity) -> Result<Option<String>, ConnectError> {
        Ok(None)
    }
}

/// Attaches the same static header to every request, regardless of identity.
pub struct HeaderInjection {
    header_name: String,
    header_value: String,
}

impl HeaderInjection {
    pub fn new(header_name: impl Into<String>, header_value: impl Into<String>) -> Result<Self, ConnectError> {
        let header_name = header_name.into();
        let header_value = header_value.into();
        super::validate_non_empty("header_injection", "header_name", &header_name)?;
        super::validate_non_empty("header_injection", "header_value", &header_value)?;
        Ok(Self {
            header_name,
            header_value,
        })
    }

    pub fn header_name(&self) -> &str {
        &self.header_name
    }
}

#[async_trait::async_trait]
impl OutgoingAuthRegistry for HeaderInjection {
    async fn header_for(&self, _identity: &Identity) -> Result<Option<String>, ConnectError> {
        Ok(Some(self.header_value.clone()))
    }
}

/// Plain OAuth2 client-credentials grant. The resulting token represents the
/// vMCP server itself, not the connecting client — use [`TokenExchange`]
/// instead when the backend needs to see the caller's own identity.
pub struct ClientCredentials {
    client: oauth2::basic::BasicClient<
        oauth2::EndpointSet,
        oauth2::EndpointNotSet,
        oauth2::EndpointNotSet,
        oauth2::EndpointNotSet,
        oauth2::EndpointSet,
    >,
    scopes: Vec<oauth2::Scope>,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl ClientCredentials {
    pub fn new(
        token_endpoint: url::Url,
        client_id: String,
        client_secret: String,
        scopes: Vec<String>,
    ) -> Result<Self, ConnectError> {
        super::validate_non_empty("client_credentials", "client_id", &client_id)?;
        super::validate_non_empty("client_credentials", "client_secret", &client_secret)?;
        super::validate_non_empty(
            "client_credentials",
            "token_endpoint",
            token_endpoint.host_str().unwrap_or(""),
        )?;
        let client = oauth2::basic::BasicClient::new(oauth2::ClientId::new(client_id))
            .set_client_secret(oauth2::ClientSecret::new(client_secret))
            .set_token_uri(oauth2::TokenUrl::from_url(token_endpoint));
        Ok(Self {
            client,
            scopes: scopes.into_iter().map(oauth2::Scope::new).collect(),
            http: reqwest::Client::new(),
            cached: Mutex::new(None),
        })
    }
}

#[async_trait::async_trait]
impl OutgoingAuthRegistry for ClientCredentials {
    async fn header_for(&self, _identity: &Identity) -> Result<Option<String>, ConnectError> {
        {
            let guard = self.cached.lock().await;
            if let Some(cached) = guard.as_ref() {
                if cached.expires_at > Instant::now() {
                    return Ok(Some(format!("Bearer {}", cached.value)));
                }
            }
        }

        use oauth2::TokenResponse as _;
        let mut request = self.client.exchange_client_credentials();
        for scope in &self.scopes {
            request = request.add_scope(scope.clone());
        }
        let token = request
            .request_async(&self.http)
            .await
            .map_err(|e| ConnectError::AuthFailed {
                strategy: "client_credentials".to_string(),
                reason: format!("token endpoint request failed: {e}"),
            })?;

        let ttl = token
            .expires_in()
            .map(|d| d.as_secs().saturating_sub(30).max(1))
            .unwrap_or(270);
        let value = token.access_token().secret().clone();
        let mut guard = self.cached.lock().await;
        *guard = Some(CachedToken {
            value: value.clone(),
            expires_at: Instant::now() + std::time::Duration::from_secs(ttl),
        });
        Ok(Some(format!("Bearer {value}")))
    }
}

#[derive(Serialize)]
struct ExchangeAssertionClaims<'a> {
    sub: &'a str,
    aud: &'a str,
    iss: &'a str,
    exp: u64,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Exchanges the connecting client's [`Identity`] for a backend-scoped bearer
/// token, minting a short-lived JWT assertion signed with the shared client
/// secret and trading it at `token_endpoint` via OAuth2 client credentials.
/// Caches the resulting token until shortly before its expiry.
pub struct TokenExchange {
    token_endpoint: url::Url,
    client_id: String,
    encoding_key: EncodingKey,
    audience: String,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

impl TokenExchange {
    pub fn new(
        token_endpoint: url::Url,
        client_id: String,
        client_secret: String,
        audience: String,
    ) -> Result<Self, ConnectError> {
        super::validate_non_empty("token_exchange", "client_id", &client_id)?;
        super::validate_non_empty("token_exchange", "client_secret", &client_secret)?;
        super::validate_non_empty("token_exchange", "audience", &audience)?;
        super::validate_non_empty(
            "token_exchange",
            "token_endpoint",
            token_endpoint.host_str().unwrap_or(""),
        )?;
        Ok(Self {
            token_endpoint,
            client_id,
            encoding_key: EncodingKey::from_secret(client_secret.as_bytes()),
            audience,
            http: reqwest::Client::new(),
            cached: Mutex::new(None),
        })
    }

    fn mint_assertion(&self, identity: &Identity) -> Result<String, ConnectError> {
        let subject = identity.subject.as_deref().unwrap_or("anonymous");
        let exp = (std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs())
            + 60;
        let claims = ExchangeAssertionClaims {
            sub: subject,
            aud: &self.audience,
            iss: &self.client_id,
            exp,
        };
        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| {
            ConnectError::AuthFailed {
                strategy: "token_exchange".to_string(),
                reason: format!("failed to sign assertion: {e}"),
            }
        })
    }

    /// RFC 7523 JWT-bearer client assertion flow: the signed assertion
    /// replaces a shared client secret so the backend can attribute the call
    /// to the originating client identity rather than just "the vMCP server".
    async fn exchange(&self, identity: &Identity) -> Result<(String, u64), ConnectError> {
        let assertion = self.mint_assertion(identity)?;
        let response = self
            .http
            .post(self.token_endpoint.clone())
            .form(&[
                ("grant_type", "client_credentials"),
                (
                    "client_assertion_type",
                    "urn:ietf:params:oauth:client-assertion-type:jwt-bearer",
                ),
                ("client_assertion", assertion.as_str()),
                ("client_id", self.client_id.as_str()),
                ("audience", self.audience.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ConnectError::AuthFailed {
                strategy: "token_exchange".to_string(),
                reason: format!("token endpoint request failed: {e}"),
            })?;

        if !response.status().is_success() {
            return Err(ConnectError::AuthFailed {
                strategy: "token_exchange".to_string(),
                reason: format!("token endpoint returned {}", response.status()),
            });
        }

        let body: TokenResponse = response.json().await.map_err(|e| ConnectError::AuthFailed {
            strategy: "token_exchange".to_string(),
            reason: format!("malformed token response: {e}"),
        })?;
        Ok((body.access_token, body.expires_in.unwrap_or(300)))
    }
}

#[async_trait::async_trait]
impl OutgoingAuthRegistry for TokenExchange {
    async fn header_for(&self, identity: &Identity) -> Result<Option<String>, ConnectError> {
        {
            let guard = self.cached.lock().await;
            if let Some(cached) = guard.as_ref() {
                if cached.expires_at > Instant::now() {
                    return Ok(Some(format!("Bearer {}", cached.value)));
                }
            }
        }
        let (token, expires_in) = self.exchange(identity).await?;
        let mut guard = self.cached.lock().await;
        // Refresh a bit early so a request never starts with a token that
        // expires mid-flight.
        let ttl = expires_in.saturating_sub(30).max(1);
        *guard = Some(CachedToken {
            value: token.clone(),
            expires_at: Instant::now() + std::time::Duration::from_secs(ttl),
        });
        Ok(Some(format!("Bearer {token}")))
    }
}

#[allow(dead_code)]
fn _assert_send_sync<T: Send + Sync>() {}
#[allow(dead_code)]
fn _assertions() {
    _assert_send_sync::<Arc<TokenExchange>>();
    _assert_send_sync::<Arc<ClientCredentials>>();
}
