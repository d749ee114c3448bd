//! In-memory document store with exact-match secondary indexes and optional
//! bincode snapshots on disk. Stands in for the external store in tests and in
//! the admin tool. Like the external store it indexes but does not enforce
//! uniqueness; that is the adapter's job.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use super::document::{DocumentStore, IndexDeclaration, IndexReport, Record};
use crate::error::{XmailError, XmailResult};

#[derive(Clone)]
struct Entry {
    /// Insertion order; lookups return the oldest record first.
    seq: u64,
    body: JsonValue,
}

#[derive(Default)]
struct Index {
    unique: bool,
    /// value -> keys
    entries: HashMap<String, BTreeSet<String>>,
}

#[derive(Default)]
struct Inner {
    next_seq: u64,
    /// entity -> key -> entry
    records: HashMap<String, HashMap<String, Entry>>,
    /// (entity, attribute) -> index
    indexes: BTreeMap<(String, String), Index>,
}

impl Inner {
    fn index_record(&mut self, entity: &str, key: &str, body: &JsonValue) {
        for ((ent, attr), idx) in self.indexes.iter_mut() {
            if ent != entity { continue; }
            if let Some(v) = body.get(attr).and_then(|v| v.as_str()) {
                idx.entries.entry(v.to_string()).or_default().insert(key.to_string());
            }
        }
    }

    fn unindex_record(&mut self, entity: &str, key: &str, body: &JsonValue) {
        for ((ent, attr), idx) in self.indexes.iter_mut() {
            if ent != entity { continue; }
            if let Some(v) = body.get(attr).and_then(|v| v.as_str()) {
                if let Some(keys) = idx.entries.get_mut(v) {
                    keys.remove(key);
                    if keys.is_empty() { idx.entries.remove(v); }
                }
            }
        }
    }

    fn build_index(&self, entity: &str, attribute: &str, unique: bool) -> Index {
        let mut idx = Index { unique, entries: HashMap::new() };
        if let Some(recs) = self.records.get(entity) {
            for (k, e) in recs.iter() {
                if let Some(v) = e.body.get(attribute).and_then(|v| v.as_str()) {
                    idx.entries.entry(v.to_string()).or_default().insert(k.clone());
                }
            }
        }
        idx
    }
}

#[derive(Serialize, Deserialize)]
struct SnapEntry { entity: String, key: String, seq: u64, body: Vec<u8> }
#[derive(Serialize, Deserialize)]
struct Snapshot { version: u32, created_ms: i64, next_seq: u64, indexes: Vec<IndexDeclaration>, entries: Vec<SnapEntry> }

/// Thread-safe in-memory document store. Clones share state.
#[derive(Clone)]
pub struct MemoryDocumentStore {
    dir: Option<PathBuf>,
    inner: Arc<RwLock<Inner>>,
    available: Arc<AtomicBool>,
    lookups: Arc<AtomicU64>,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self { Self::new() }
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            dir: None,
            inner: Arc::new(RwLock::new(Inner::default())),
            available: Arc::new(AtomicBool::new(true)),
            lookups: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Open a store persisted under `dir`, loading `snapshot.bin` if present.
    pub fn open(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let mut s = Self::new();
        s.dir = Some(dir);
        s.load_snapshot()?;
        Ok(s)
    }

    fn snapshot_path(&self) -> Option<PathBuf> { self.dir.as_ref().map(|d| d.join("snapshot.bin")) }

    /// Simulate the remote store going away (or coming back).
    pub fn set_available(&self, available: bool) { self.available.store(available, Ordering::SeqCst); }

    /// Number of indexed lookups served so far.
    pub fn lookup_count(&self) -> u64 { self.lookups.load(Ordering::SeqCst) }

    pub fn len(&self, entity: &str) -> usize {
        self.inner.read().records.get(entity).map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool { self.inner.read().records.values().all(|m| m.is_empty()) }

    fn check_available(&self) -> XmailResult<()> {
        if self.available.load(Ordering::SeqCst) { Ok(()) } else { Err(XmailError::unavailable("document store connection refused")) }
    }

    pub fn save_snapshot(&self) -> anyhow::Result<()> {
        let Some(path) = self.snapshot_path() else { return Ok(()); };
        let now_ms = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0);
        let snap = {
            let r = self.inner.read();
            let mut entries = Vec::new();
            for (entity, recs) in r.records.iter() {
                for (key, e) in recs.iter() {
                    entries.push(SnapEntry { entity: entity.clone(), key: key.clone(), seq: e.seq, body: serde_json::to_vec(&e.body)? });
                }
            }
            let indexes = r.indexes.iter()
                .map(|((entity, attribute), idx)| IndexDeclaration { entity: entity.clone(), attribute: attribute.clone(), unique: idx.unique })
                .collect();
            Snapshot { version: 1, created_ms: now_ms, next_seq: r.next_seq, indexes, entries }
        };
        let bytes = bincode::serialize(&snap)?;
        let tmp = path.with_extension("bin.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(tmp, &path)?;
        debug!(target: "xmail::storage", "snapshot saved: {} records, {} indexes", snap.entries.len(), snap.indexes.len());
        Ok(())
    }

    fn load_snapshot(&self) -> anyhow::Result<()> {
        let Some(path) = self.snapshot_path() else { return Ok(()); };
        if !path.exists() { return Ok(()); }
        let bytes = std::fs::read(&path)?;
        let snap: Snapshot = bincode::deserialize(&bytes)?;
        let mut w = self.inner.write();
        *w = Inner { next_seq: snap.next_seq, ..Default::default() };
        for e in snap.entries.into_iter() {
            let body: JsonValue = serde_json::from_slice(&e.body)?;
            w.records.entry(e.entity).or_default().insert(e.key, Entry { seq: e.seq, body });
        }
        for d in snap.indexes.into_iter() {
            let idx = w.build_index(&d.entity, &d.attribute, d.unique);
            w.indexes.insert((d.entity, d.attribute), idx);
        }
        info!(target: "xmail::storage", "snapshot loaded from {}", path.display());
        Ok(())
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn put(&self, record: Record) -> XmailResult<Record> {
        self.check_available()?;
        if record.key.is_empty() {
            return Err(XmailError::programming(format!("record for '{}' has an empty key", record.entity)));
        }
        let mut w = self.inner.write();
        let previous = w.records.get(&record.entity).and_then(|m| m.get(&record.key)).cloned();
        let seq = match &previous {
            Some(p) => {
                w.unindex_record(&record.entity, &record.key, &p.body);
                p.seq
            }
            None => { w.next_seq += 1; w.next_seq }
        };
        w.index_record(&record.entity, &record.key, &record.body);
        w.records.entry(record.entity.clone()).or_default()
            .insert(record.key.clone(), Entry { seq, body: record.body.clone() });
        Ok(record)
    }

    fn get(&self, entity: &str, key: &str) -> XmailResult<Option<Record>> {
        self.check_available()?;
        let r = self.inner.read();
        Ok(r.records.get(entity).and_then(|m| m.get(key)).map(|e| Record::new(entity, key, e.body.clone())))
    }

    fn delete(&self, entity: &str, key: &str) -> XmailResult<bool> {
        self.check_available()?;
        let mut w = self.inner.write();
        let removed = w.records.get_mut(entity).and_then(|m| m.remove(key));
        match removed {
            Some(e) => { w.unindex_record(entity, key, &e.body); Ok(true) }
            None => Ok(false),
        }
    }

    fn find_by_indexed_attribute(&self, entity: &str, attribute: &str, value: &str) -> XmailResult<Vec<Record>> {
        self.check_available()?;
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let r = self.inner.read();
        let Some(idx) = r.indexes.get(&(entity.to_string(), attribute.to_string())) else {
            return Err(XmailError::programming(format!("no index declared for {}.{}", entity, attribute)));
        };
        let Some(keys) = idx.entries.get(value) else { return Ok(Vec::new()); };
        let mut found: Vec<(u64, Record)> = Vec::with_capacity(keys.len());
        if let Some(recs) = r.records.get(entity) {
            for k in keys.iter() {
                if let Some(e) = recs.get(k) { found.push((e.seq, Record::new(entity, k.clone(), e.body.clone()))); }
            }
        }
        found.sort_by_key(|(seq, _)| *seq);
        Ok(found.into_iter().map(|(_, rec)| rec).collect())
    }

    fn ensure_indexes(&self, schema: &[IndexDeclaration]) -> XmailResult<IndexReport> {
        self.check_available()?;
        let mut report = IndexReport::default();
        // One write lock for the whole batch so concurrent migrations serialise.
        let mut w = self.inner.write();
        for d in schema.iter() {
            let id = (d.entity.clone(), d.attribute.clone());
            match w.indexes.get(&id).map(|idx| idx.unique) {
                Some(unique) if unique == d.unique => report.unchanged.push(d.clone()),
                Some(_) => {
                    if let Some(idx) = w.indexes.get_mut(&id) { idx.unique = d.unique; }
                    report.updated.push(d.clone());
                }
                None => {
                    let idx = w.build_index(&d.entity, &d.attribute, d.unique);
                    w.indexes.insert(id, idx);
                    report.created.push(d.clone());
                }
            }
        }
        Ok(report)
    }

    fn indexes(&self) -> XmailResult<Vec<IndexDeclaration>> {
        self.check_available()?;
        let r = self.inner.read();
        Ok(r.indexes.iter()
            .map(|((entity, attribute), idx)| IndexDeclaration { entity: entity.clone(), attribute: attribute.clone(), unique: idx.unique })
            .collect())
    }
}
