//! In-process personal-data-store.
//!
//! All clients share one backend map; each client keeps its own read cache per
//! namespace, so a client that wrote and then lists again sees the old listing
//! until it calls `clear_cache`. Counters and fault switches exist for tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use tracing::debug;
use uuid::Uuid;

use super::backend::{Credential, Document, PdsClient, PdsConnector};
use crate::error::{XmailError, XmailResult};

#[derive(Default)]
struct Backend {
    namespaces: RwLock<HashMap<String, Vec<Document>>>,
    accounts: RwLock<HashMap<String, String>>,
    failing_deletes: RwLock<HashSet<String>>,
    failing_put_namespaces: RwLock<HashSet<String>>,
    failing_delete_namespaces: RwLock<HashSet<String>>,
    unavailable: AtomicBool,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl Backend {
    fn check_available(&self) -> XmailResult<()> {
        if self.unavailable.load(Ordering::SeqCst) { Err(XmailError::unavailable("pds connection refused")) } else { Ok(()) }
    }
}

#[derive(Clone, Default)]
pub struct MemoryPds {
    backend: Arc<Backend>,
}

impl MemoryPds {
    pub fn new() -> Self { Self::default() }

    /// Once any account is registered, `connect` checks credentials.
    pub fn with_account(self, credential: &Credential) -> Self {
        self.backend.accounts.write().insert(credential.username.clone(), credential.password.clone());
        self
    }

    pub fn set_available(&self, available: bool) { self.backend.unavailable.store(!available, Ordering::SeqCst); }

    /// Make every delete of `id` fail with `StoreUnavailable`.
    pub fn fail_delete_of(&self, id: &str) { self.backend.failing_deletes.write().insert(id.to_string()); }

    /// Make every put into `namespace` fail with `StoreUnavailable`.
    pub fn fail_puts_into(&self, namespace: &str) { self.backend.failing_put_namespaces.write().insert(namespace.to_string()); }

    /// Make every delete in `namespace` fail with `StoreUnavailable`.
    pub fn fail_deletes_in(&self, namespace: &str) { self.backend.failing_delete_namespaces.write().insert(namespace.to_string()); }

    pub fn opened(&self) -> usize { self.backend.opened.load(Ordering::SeqCst) }
    pub fn closed(&self) -> usize { self.backend.closed.load(Ordering::SeqCst) }

    /// Documents in `namespace`, read straight from the backend.
    pub fn documents(&self, namespace: &str) -> Vec<Document> {
        self.backend.namespaces.read().get(namespace).cloned().unwrap_or_default()
    }
}

impl PdsConnector for MemoryPds {
    fn connect(&self, credential: &Credential) -> XmailResult<Box<dyn PdsClient>> {
        self.backend.check_available()?;
        {
            let accounts = self.backend.accounts.read();
            if !accounts.is_empty() && accounts.get(&credential.username) != Some(&credential.password) {
                return Err(XmailError::unavailable(format!("pds rejected credentials for '{}'", credential.username)));
            }
        }
        self.backend.opened.fetch_add(1, Ordering::SeqCst);
        debug!(target: "xmail::mailbox", "pds.connect user={}", credential.username);
        Ok(Box::new(MemoryPdsClient { backend: self.backend.clone(), cache: HashMap::new(), closed: false }))
    }
}

struct MemoryPdsClient {
    backend: Arc<Backend>,
    cache: HashMap<String, Vec<Document>>,
    closed: bool,
}

impl MemoryPdsClient {
    fn check(&self) -> XmailResult<()> {
        if self.closed { return Err(XmailError::programming("pds client used after close")); }
        self.backend.check_available()
    }
}

impl PdsClient for MemoryPdsClient {
    fn put(&mut self, namespace: &str, data: JsonValue) -> XmailResult<Document> {
        self.check()?;
        if self.backend.failing_put_namespaces.read().contains(namespace) {
            return Err(XmailError::unavailable(format!("pds put into {} timed out", namespace)));
        }
        let doc = Document { id: Uuid::new_v4().simple().to_string(), data };
        self.backend.namespaces.write().entry(namespace.to_string()).or_default().push(doc.clone());
        Ok(doc)
    }

    fn list(&mut self, namespace: &str) -> XmailResult<Vec<Document>> {
        self.check()?;
        if let Some(cached) = self.cache.get(namespace) { return Ok(cached.clone()); }
        let docs = self.backend.namespaces.read().get(namespace).cloned().unwrap_or_default();
        self.cache.insert(namespace.to_string(), docs.clone());
        Ok(docs)
    }

    fn delete(&mut self, namespace: &str, id: &str) -> XmailResult<bool> {
        self.check()?;
        if self.backend.failing_deletes.read().contains(id) || self.backend.failing_delete_namespaces.read().contains(namespace) {
            return Err(XmailError::unavailable(format!("pds delete of {} timed out", id)));
        }
        let mut guard = self.backend.namespaces.write();
        let Some(docs) = guard.get_mut(namespace) else { return Ok(false) };
        let before = docs.len();
        docs.retain(|d| d.id != id);
        Ok(docs.len() != before)
    }

    fn clear_cache(&mut self) { self.cache.clear(); }

    fn close(&mut self) -> XmailResult<()> {
        if self.closed { return Err(XmailError::programming("pds client closed twice")); }
        self.closed = true;
        self.cache.clear();
        self.backend.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cache_hides_writes_until_cleared() {
        let pds = MemoryPds::new();
        let mut c = pds.connect(&Credential::new("svc", "pw")).unwrap();
        assert!(c.list("ns").unwrap().is_empty());
        c.put("ns", json!({"n": 1})).unwrap();
        assert!(c.list("ns").unwrap().is_empty());
        c.clear_cache();
        assert_eq!(c.list("ns").unwrap().len(), 1);
        assert_eq!(pds.documents("ns").len(), 1);
    }

    #[test]
    fn caches_are_per_client() {
        let pds = MemoryPds::new();
        let mut a = pds.connect(&Credential::new("svc", "pw")).unwrap();
        let mut b = pds.connect(&Credential::new("svc", "pw")).unwrap();
        a.put("ns", json!({})).unwrap();
        assert_eq!(b.list("ns").unwrap().len(), 1);
        assert_eq!(pds.opened(), 2);
    }

    #[test]
    fn delete_reports_presence() {
        let pds = MemoryPds::new();
        let mut c = pds.connect(&Credential::new("svc", "pw")).unwrap();
        let doc = c.put("ns", json!({})).unwrap();
        assert!(c.delete("ns", &doc.id).unwrap());
        assert!(!c.delete("ns", &doc.id).unwrap());
        assert!(!c.delete("other", &doc.id).unwrap());
    }

    #[test]
    fn credentials_and_outages() {
        let pds = MemoryPds::new().with_account(&Credential::new("svc", "pw"));
        assert!(pds.connect(&Credential::new("svc", "nope")).err().is_some_and(|e| e.is_unavailable()));
        let mut c = pds.connect(&Credential::new("svc", "pw")).unwrap();
        pds.set_available(false);
        assert!(c.put("ns", json!({})).unwrap_err().is_unavailable());
        pds.set_available(true);
        c.close().unwrap();
        assert!(matches!(c.list("ns"), Err(XmailError::Programming(_))));
        assert!(matches!(c.close(), Err(XmailError::Programming(_))));
        assert_eq!(pds.closed(), 1);
    }

    #[test]
    fn namespace_faults_leave_other_namespaces_alone() {
        let pds = MemoryPds::new();
        let mut c = pds.connect(&Credential::new("svc", "pw")).unwrap();
        let doc = c.put("a", json!({})).unwrap();
        pds.fail_puts_into("b");
        pds.fail_deletes_in("a");
        assert!(c.put("b", json!({})).unwrap_err().is_unavailable());
        assert!(c.delete("a", &doc.id).unwrap_err().is_unavailable());
        assert!(pds.documents("b").is_empty());
        assert_eq!(pds.documents("a").len(), 1);
        c.put("c", json!({})).unwrap();
    }
}
