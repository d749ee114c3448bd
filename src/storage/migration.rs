//! Startup index migration.
//!
//! Models declare their indexes; the migrator hands the combined declaration to
//! `DocumentStore::ensure_indexes`. It runs as an explicit startup step, before
//! any adapter over the store is constructed, and is idempotent: running it
//! again (from this process or another instance) leaves the index state as is.

use tracing::{debug, info};

use super::document::{DocumentStore, IndexDeclaration, IndexReport};
use crate::error::{XmailError, XmailResult};

/// A model type whose documents live in the store under `entity()`.
pub trait IndexedModel {
    fn entity() -> &'static str;
}

#[derive(Debug, Clone, Default)]
pub struct Migrator {
    declarations: Vec<IndexDeclaration>,
}

impl Migrator {
    pub fn new() -> Self { Self::default() }

    /// Add declarations; duplicates are collapsed, later uniqueness flags win.
    pub fn declare(mut self, decls: impl IntoIterator<Item = IndexDeclaration>) -> Self {
        for d in decls {
            match self.declarations.iter_mut().find(|e| e.entity == d.entity && e.attribute == d.attribute) {
                Some(existing) => existing.unique = d.unique,
                None => self.declarations.push(d),
            }
        }
        self
    }

    pub fn declarations(&self) -> &[IndexDeclaration] { &self.declarations }

    pub fn run(&self, store: &dyn DocumentStore) -> XmailResult<IndexReport> {
        let report = store.ensure_indexes(&self.declarations)?;
        for d in report.created.iter() {
            info!(target: "xmail::migration", "created index {}.{} unique={}", d.entity, d.attribute, d.unique);
        }
        for d in report.updated.iter() {
            info!(target: "xmail::migration", "updated index {}.{} unique={}", d.entity, d.attribute, d.unique);
        }
        debug!(target: "xmail::migration", "migration done: created={} updated={} unchanged={}", report.created.len(), report.updated.len(), report.unchanged.len());
        Ok(report)
    }

    /// Declarations the store does not (yet) carry with the declared uniqueness.
    pub fn missing(&self, store: &dyn DocumentStore) -> XmailResult<Vec<IndexDeclaration>> {
        let present = store.indexes()?;
        Ok(self.declarations.iter().filter(|d| !present.contains(d)).cloned().collect())
    }

    /// Fails with a programming error when migration has not been run.
    pub fn require_migrated(&self, store: &dyn DocumentStore) -> XmailResult<()> {
        let missing = self.missing(store)?;
        if missing.is_empty() { return Ok(()); }
        let names: Vec<String> = missing.iter().map(|d| format!("{}.{}", d.entity, d.attribute)).collect();
        Err(XmailError::programming(format!("indexes not migrated: {}", names.join(", "))))
    }
}
