//!
//! xmail storage module
//! --------------------
//! The identity adapter talks to an external key/value document store through the
//! `DocumentStore` contract defined here. The store offers whole-record put/get/delete
//! and exact-match lookups through secondary indexes that must be declared up front.
//!
//! Key pieces:
//! - `DocumentStore`, `Record`, `IndexDeclaration`: the consumed contract.
//! - `MemoryDocumentStore`: in-process implementation with optional snapshots.
//! - `Migrator`: idempotent index creation, run once at startup.

mod document;
pub mod memory;
pub mod migration;

pub use document::{DocumentStore, IndexDeclaration, IndexReport, Record};
pub use memory::MemoryDocumentStore;
pub use migration::{IndexedModel, Migrator};
