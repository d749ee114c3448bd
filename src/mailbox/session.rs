//! Request-scoped mailbox connection.
//!
//! `Unopened -> Open -> Closed`. The client is connected on first use and
//! closed exactly once, either by `close` or on drop. Any call after close is a
//! `Programming` error. Writes mark the session stale so the next listing goes
//! past the client's read cache.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use super::backend::{Credential, Document, PdsClient, PdsConnector};
use crate::error::{XmailError, XmailResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unopened,
    Open,
    Closed,
}

enum Slot {
    Unopened,
    Open(Box<dyn PdsClient>),
    Closed,
}

pub struct MailboxSession {
    connector: Arc<dyn PdsConnector>,
    credential: Credential,
    slot: Slot,
    stale: bool,
}

impl MailboxSession {
    pub fn new(connector: Arc<dyn PdsConnector>, credential: Credential) -> Self {
        Self { connector, credential, slot: Slot::Unopened, stale: false }
    }

    pub fn state(&self) -> SessionState {
        match self.slot {
            Slot::Unopened => SessionState::Unopened,
            Slot::Open(_) => SessionState::Open,
            Slot::Closed => SessionState::Closed,
        }
    }

    fn client(&mut self) -> XmailResult<&mut Box<dyn PdsClient>> {
        if let Slot::Unopened = self.slot {
            let client = self.connector.connect(&self.credential)?;
            debug!(target: "xmail::mailbox", "session.open user={}", self.credential.username);
            self.slot = Slot::Open(client);
        }
        match &mut self.slot {
            Slot::Open(client) => Ok(client),
            Slot::Closed => Err(XmailError::programming("mailbox session used after close")),
            Slot::Unopened => Err(XmailError::programming("mailbox session failed to open")),
        }
    }

    pub fn put(&mut self, namespace: &str, data: JsonValue) -> XmailResult<Document> {
        let doc = self.client()?.put(namespace, data)?;
        self.stale = true;
        Ok(doc)
    }

    /// Lists `namespace`, dropping the read cache first if this session wrote since the last listing.
    pub fn list(&mut self, namespace: &str) -> XmailResult<Vec<Document>> {
        let stale = self.stale;
        let client = self.client()?;
        if stale { client.clear_cache(); }
        let docs = client.list(namespace)?;
        self.stale = false;
        Ok(docs)
    }

    pub fn delete(&mut self, namespace: &str, id: &str) -> XmailResult<bool> {
        let removed = self.client()?.delete(namespace, id);
        // A failed delete may still have reached the backend.
        self.stale = true;
        removed
    }

    pub fn clear_cache(&mut self) -> XmailResult<()> {
        self.client()?.clear_cache();
        self.stale = false;
        Ok(())
    }

    /// Ends the scope. A session that never connected closes without touching the backend.
    pub fn close(&mut self) -> XmailResult<()> {
        match std::mem::replace(&mut self.slot, Slot::Closed) {
            Slot::Open(mut client) => {
                debug!(target: "xmail::mailbox", "session.close user={}", self.credential.username);
                client.close()
            }
            Slot::Unopened | Slot::Closed => Ok(()),
        }
    }
}

impl Drop for MailboxSession {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(target: "xmail::mailbox", "session.close on drop failed: {}", e);
        }
    }
}
