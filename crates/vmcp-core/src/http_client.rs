//! A [`rmcp::transport::streamable_http_client::StreamableHttpClient`]
//! implementation that injects a per-request, per-identity `Authorization`
//! header computed from an [`OutgoingAuthRegistry`], and enforces the
//! response body size cap and wall-clock deadline from spec §4.1/§5 (default
//! 100 MiB / 30 s).

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use bytes::Bytes;
use futures::TryStreamExt;
use rmcp::model::ClientJsonRpcMessage;
use rmcp::transport::streamable_http_client::{
    StreamableHttpClient, StreamableHttpError, StreamableHttpPostJsonResponse,
    StreamableHttpPostResponse,
};
use sse_stream::{Error as SseError, Sse, SseStream};

use crate::auth::OutgoingAuthRegistry;
use crate::error::ConnectError;
use crate::identity::Identity;

const SESSION_ID_HEADER: &str = "mcp-session-id";
const LAST_EVENT_ID_HEADER: &str = "last-event-id";

#[derive(Debug, thiserror::Error)]
pub enum HttpClientError {
    #[error("http request failed: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("response body exceeded the {limit} byte cap")]
    BodyTooLarge { limit: u64 },
    #[error("auth strategy failed: {0}")]
    Auth(#[from] ConnectError),
}

/// A `reqwest`-backed [`StreamableHttpClient`] carrying a fixed response-body
/// size cap and a per-request wall-clock deadline (spec §4.1(d)). The
/// `Authorization` header is computed fresh on every call by invoking
/// `strategy.header_for(identity)` — never cached here, since the strategy
/// itself owns whatever caching/refresh makes sense for its credential kind
/// (spec §4.1: "the strategy is validated once at connection time; then
/// invoked on every outgoing request"). The trait's own `auth_header`
/// parameter is honored when the caller (the vendored worker) supplies one
/// directly, which it currently never does.
#[derive(Clone)]
pub struct CappedHttpClient {
    http: reqwest::Client,
    max_body_bytes: u64,
    strategy: Arc<dyn OutgoingAuthRegistry>,
    identity: Identity,
    session_id_capture: Arc<StdMutex<Option<String>>>,
}

impl CappedHttpClient {
    pub fn new(
        max_body_bytes: u64,
        request_timeout: Duration,
        strategy: Arc<dyn OutgoingAuthRegistry>,
        identity: Identity,
    ) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(request_timeout)
                .build()
                .expect("reqwest client configuration is valid"),
            max_body_bytes,
            strategy,
            identity,
            session_id_capture: Arc::new(StdMutex::new(None)),
        }
    }

    /// The `mcp-session-id` captured off the most recent response that
    /// carried one (spec §4.1 step 4, §3 `Backend Session.backend_session_id`).
    pub fn captured_session_id(&self) -> Option<String> {
        self.session_id_capture.lock().expect("lock poisoned").clone()
    }

    async fn resolve_auth_header(
        &self,
        auth_header: Option<String>,
    ) -> Result<Option<String>, HttpClientError> {
        if auth_header.is_some() {
            return Ok(auth_header);
        }
        Ok(self.strategy.header_for(&self.identity).await?)
    }

    fn capture_session_id(&self, session_id: &Option<String>) {
        if let Some(sid) = session_id {
            *self.session_id_capture.lock().expect("lock poisoned") = Some(sid.clone());
        }
    }

    async fn read_capped_body(
        &self,
        response: reqwest::Response,
    ) -> Result<Bytes, StreamableHttpError<HttpClientError>> {
        if let Some(len) = response.content_length() {
            if len > self.max_body_bytes {
                return Err(StreamableHttpError::Client(HttpClientError::BodyTooLarge {
                    limit: self.max_body_bytes,
                }));
            }
        }
        let mut buf = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream
            .try_next()
            .await
            .map_err(|e| StreamableHttpError::Client(HttpClientError::Reqwest(e)))?
        {
            buf.extend_from_slice(&chunk);
            if buf.len() as u64 > self.max_body_bytes {
                return Err(StreamableHttpError::Client(HttpClientError::BodyTooLarge {
                    limit: self.max_body_bytes,
                }));
            }
        }
        Ok(Bytes::from(buf))
    }
}

impl StreamableHttpClient for CappedHttpClient {
    type Error = HttpClientError;

    async fn post_message(
        &self,
        uri: Arc<str>,
        message: ClientJsonRpcMessage,
        session_id: Option<Arc<str>>,
        auth_header: Option<String>,
    ) -> Result<StreamableHttpPostResponse, StreamableHttpError<Self::Error>> {
        let mut request = self
            .http
            .post(uri.as_ref())
            .header("content-type", "application/json")
            .header("accept", "application/json, text/event-stream")
            .json(&message);
        if let Some(session_id) = &session_id {
            request = request.header(SESSION_ID_HEADER, session_id.as_ref());
        }
        if let Some(auth_header) = self
            .resolve_auth_header(auth_header)
            .await
            .map_err(StreamableHttpError::Client)?
        {
            request = request.header("authorization", auth_header);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StreamableHttpError::Client(HttpClientError::Reqwest(e)))?;

        if response.status() == reqwest::StatusCode::ACCEPTED {
            return Ok(StreamableHttpPostResponse::Accepted);
        }

        let session_id = response
            .headers()
            .get(SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.capture_session_id(&session_id);

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        match content_type.as_deref() {
            Some(ct) if ct.starts_with("text/event-stream") => {
                let stream = response.bytes_stream().map_err(SseError::from);
                let sse_stream = SseStream::new(stream);
                Ok(StreamableHttpPostResponse::Sse(Box::pin(sse_stream)))
            }
            Some(ct) if ct.starts_with("application/json") => {
                let body = self.read_capped_body(response).await?;
                let message: rmcp::model::ServerJsonRpcMessage =
                    serde_json::from_slice(&body)
                        .map_err(StreamableHttpError::Deserialize)?;
                Ok(StreamableHttpPostResponse::Json(
                    StreamableHttpPostJsonResponse { message, session_id },
                ))
            }
            other => Err(StreamableHttpError::UnexpectedContentType(other.map(String::from))),
        }
    }

    async fn delete_session(
        &self,
        uri: Arc<str>,
        session_id: Arc<str>,
        auth_header: Option<String>,
    ) -> Result<(), StreamableHttpError<Self::Error>> {
        let mut request = self.http.delete(uri.as_ref()).header(SESSION_ID_HEADER, session_id.as_ref());
        if let Some(auth_header) = self
            .resolve_auth_header(auth_header)
            .await
            .map_err(StreamableHttpError::Client)?
        {
            request = request.header("authorization", auth_header);
        }
        let response = request
            .send()
            .await
            .map_err(|e| StreamableHttpError::Client(HttpClientError::Reqwest(e)))?;
        if response.status() == reqwest::StatusCode::METHOD_NOT_ALLOWED {
            return Err(StreamableHttpError::SeverDoesNotSupportDeleteSession);
        }
        Ok(())
    }

    async fn get_stream(
        &self,
        uri: Arc<str>,
        session_id: Arc<str>,
        last_event_id: Option<String>,
        auth_header: Option<String>,
    ) -> Result<
        futures::stream::BoxStream<'static, Result<Sse, SseError>>,
        StreamableHttpError<Self::Error>,
    > {
        let mut request = self
            .http
            .get(uri.as_ref())
            .header("accept", "text/event-stream")
            .header(SESSION_ID_HEADER, session_id.as_ref());
        if let Some(last_event_id) = &last_event_id {
            request = request.header(LAST_EVENT_ID_HEADER, last_event_id);
        }
        if let Some(auth_header) = self
            .resolve_auth_header(auth_header)
            .await
            .map_err(StreamableHttpError::Client)?
        {
            request = request.header("authorization", auth_header);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StreamableHttpError::Client(HttpClientError::Reqwest(e)))?;

        if response.status() == reqwest::StatusCode::METHOD_NOT_ALLOWED {
            return Err(StreamableHttpError::SeverDoesNotSupportSse);
        }

        let stream = response.bytes_stream().map_err(SseError::from);
        Ok(Box::pin(SseStream::new(stream)))
    }
}

/// A `reqwest`-backed [`SseClient`] for the legacy SSE transport (spec
/// §4.1's `sse` branch). Deliberately carries none of [`CappedHttpClient`]'s
/// limits: no body-size cap (would truncate the stream mid-flight) and no
/// per-request wall-clock timeout (would kill a connection that is supposed
/// to stay open indefinitely). The only deadline applied to this transport
/// is the outer per-backend init timeout in [`crate::connector::RmcpConnector`],
/// which bounds connection setup, not the stream's subsequent lifetime.
#[derive(Clone)]
pub struct UncappedSseClient {
    http: reqwest::Client,
    strategy: Arc<dyn OutgoingAuthRegistry>,
    identity: Identity,
}

impl UncappedSseClient {
    pub fn new(strategy: Arc<dyn OutgoingAuthRegistry>, identity: Identity) -> Self {
        Self {
            http: reqwest::Client::new(),
            strategy,
            identity,
        }
    }

    async fn resolve_auth_header(
        &self,
        auth_header: Option<String>,
    ) -> Result<Option<String>, HttpClientError> {
        if auth_header.is_some() {
            return Ok(auth_header);
        }
        Ok(self.strategy.header_for(&self.identity).await?)
    }
}

impl rmcp::transport::sse_client::SseClient for UncappedSseClient {
    type Error = HttpClientError;

    async fn post_message(
        &self,
        uri: Arc<str>,
        message: ClientJsonRpcMessage,
        auth_token: Option<String>,
    ) -> Result<(), rmcp::transport::sse_client::SseTransportError<Self::Error>> {
        let mut request = self
            .http
            .post(uri.as_ref())
            .header("content-type", "application/json")
            .json(&message);
        if let Some(auth_header) = self
            .resolve_auth_header(auth_token)
            .await
            .map_err(rmcp::transport::sse_client::SseTransportError::Client)?
        {
            request = request.header("authorization", auth_header);
        }
        request
            .send()
            .await
            .map_err(|e| {
                rmcp::transport::sse_client::SseTransportError::Client(HttpClientError::Reqwest(e))
            })?
            .error_for_status()
            .map_err(|e| {
                rmcp::transport::sse_client::SseTransportError::Client(HttpClientError::Reqwest(e))
            })?;
        Ok(())
    }

    async fn get_stream(
        &self,
        uri: Arc<str>,
        last_event_id: Option<String>,
        auth_token: Option<String>,
    ) -> Result<
        futures::stream::BoxStream<'static, Result<Sse, SseError>>,
        rmcp::transport::sse_client::SseTransportError<Self::Error>,
    > {
        let mut request = self.http.get(uri.as_ref()).header("accept", "text/event-stream");
        if let Some(last_event_id) = &last_event_id {
            request = request.header(LAST_EVENT_ID_HEADER, last_event_id);
        }
        if let Some(auth_header) = self
            .resolve_auth_header(auth_token)
            .await
            .map_err(rmcp::transport::sse_client::SseTransportError::Client)?
        {
            request = request.header("authorization", auth_header);
        }
        let response = request.send().await.map_err(|e| {
            rmcp::transport::sse_client::SseTransportError::Client(HttpClientError::Reqwest(e))
        })?;
        let stream = response.bytes_stream().map_err(SseError::from);
        Ok(Box::pin(SseStream::new(stream)))
    }
}
