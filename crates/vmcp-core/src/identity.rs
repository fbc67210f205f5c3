//! Client identity carried through a vMCP session (spec §3 `Identity`).

use serde_json::{Map, Value};

/// Whatever the front door (e.g. an OAuth-validating proxy in front of the
/// vMCP server) established about the connecting client. Opaque to routing;
/// consumed only by [`crate::auth`] strategies that need to mint outgoing
/// credentials on the client's behalf (e.g. token exchange).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Identity {
    pub subject: Option<String>,
    pub claims: Map<String, Value>,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: Some(subject.into()),
            claims: Map::new(),
        }
    }

    pub fn with_claim(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.claims.insert(key.into(), value.into());
        self
    }

    pub fn claim(&self, key: &str) -> Option<&Value> {
        self.claims.get(key)
    }
}
