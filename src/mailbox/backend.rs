//! Personal-data-store client contract.
//!
//! A connector hands out stateful clients; each client may keep a read cache
//! that is only dropped by `clear_cache`. Clients are owned by exactly one
//! `MailboxSession` and never shared across requests.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::XmailResult;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: password.into() }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential").field("username", &self.username).field("password", &"<redacted>").finish()
    }
}

/// A stored document and the id the backend assigned to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub data: JsonValue,
}

pub trait PdsConnector: Send + Sync {
    fn connect(&self, credential: &Credential) -> XmailResult<Box<dyn PdsClient>>;
}

pub trait PdsClient: Send {
    fn put(&mut self, namespace: &str, data: JsonValue) -> XmailResult<Document>;
    /// May be served from the client's read cache.
    fn list(&mut self, namespace: &str) -> XmailResult<Vec<Document>>;
    /// Returns false when no document with `id` exists in `namespace`.
    fn delete(&mut self, namespace: &str, id: &str) -> XmailResult<bool>;
    fn clear_cache(&mut self);
    fn close(&mut self) -> XmailResult<()>;
}
