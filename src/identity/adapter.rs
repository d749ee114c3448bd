//! `UserDatastore` over an indexed document store.
//!
//! The store only does exact-match lookups through declared indexes and does not
//! enforce uniqueness, so this adapter:
//! - filters query attributes through the `AttributeIndex` allow-list,
//! - normalises values of case-insensitive attributes before writing and querying,
//! - checks every unique attribute for a clash before writing.
//! The uniqueness check and the write are two store calls; concurrent
//! registrations of the same name can still race at the store.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use super::attributes::{AttributeIndex, UserAttribute, UserQuery};
use super::datastore::UserDatastore;
use super::model::{Entity, Role, User, ROLE_ENTITY, USER_ENTITY};
use crate::error::{XmailError, XmailResult};
use crate::storage::{DocumentStore, Migrator, Record};

fn new_key() -> String { Uuid::new_v4().simple().to_string() }

/// Migrator declaring every index the identity adapter relies on.
pub fn identity_migrator(index: &AttributeIndex) -> Migrator {
    Migrator::new().declare(index.index_declarations())
}

pub struct IndexedUserDatastore {
    store: Arc<dyn DocumentStore>,
    index: AttributeIndex,
}

impl IndexedUserDatastore {
    /// Wrap `store`. Index migration must already have run; otherwise this is a
    /// programming error rather than a lazily failing first lookup.
    pub fn new(store: Arc<dyn DocumentStore>, index: AttributeIndex) -> XmailResult<Self> {
        identity_migrator(&index).require_migrated(store.as_ref())?;
        Ok(Self { store, index })
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> { &self.store }

    fn decode_user(rec: Record) -> XmailResult<User> {
        let mut u: User = serde_json::from_value(rec.body)?;
        u.pk = Some(rec.key);
        Ok(u)
    }

    fn decode_role(rec: Record) -> XmailResult<Role> {
        let mut r: Role = serde_json::from_value(rec.body)?;
        r.pk = Some(rec.key);
        Ok(r)
    }

    /// Fail with `Conflict` if another record already holds `value` for `attribute`.
    fn ensure_unique(&self, entity: &str, attribute: &str, value: &str, own_key: &str) -> XmailResult<()> {
        let clash = self.store.find_by_indexed_attribute(entity, attribute, value)?
            .into_iter()
            .any(|r| r.key != own_key);
        if clash {
            return Err(XmailError::conflict(format!("{} {} '{}' already exists", entity, attribute, value)));
        }
        Ok(())
    }

    fn persist_user(&self, mut user: User) -> XmailResult<User> {
        user.username = self.index.normalize(UserAttribute::Username, &user.username);
        if let Some(email) = user.email.take() {
            user.email = Some(self.index.normalize(UserAttribute::Email, &email));
        }
        if user.fs_uniquifier.is_empty() { user.fs_uniquifier = new_key(); }
        let key = user.pk.clone().unwrap_or_else(new_key);
        for entry in self.index.entries() {
            if let Some(v) = entry.attribute.value_of(&user) {
                self.ensure_unique(USER_ENTITY, entry.attribute.as_str(), v, &key)?;
            }
        }
        user.pk = Some(key.clone());
        let body = serde_json::to_value(&user)?;
        self.store.put(Record::new(USER_ENTITY, key, body))?;
        debug!(target: "xmail::identity", "persisted user username={} pk={:?}", user.username, user.pk);
        Ok(user)
    }

    fn persist_role(&self, mut role: Role) -> XmailResult<Role> {
        let key = role.pk.clone().unwrap_or_else(new_key);
        self.ensure_unique(ROLE_ENTITY, "name", &role.name, &key)?;
        role.pk = Some(key.clone());
        let body = serde_json::to_value(&role)?;
        self.store.put(Record::new(ROLE_ENTITY, key, body))?;
        debug!(target: "xmail::identity", "persisted role name={} pk={:?}", role.name, role.pk);
        Ok(role)
    }
}

impl UserDatastore for IndexedUserDatastore {
    fn attribute_index(&self) -> &AttributeIndex { &self.index }

    fn find_user(&self, query: &UserQuery) -> XmailResult<Option<User>> {
        if query.is_case_insensitive() {
            warn!(target: "xmail::identity", "document store does not support case-insensitive queries; querying case-sensitively");
        }
        let (attrs, dropped) = self.index.resolve(query.names());
        if !dropped.is_empty() {
            let by: Vec<&str> = attrs.iter().map(|a| a.as_str()).collect();
            warn!(target: "xmail::identity", "invalid query attributes {:?}; querying by {:?}", dropped, by);
        }
        for attr in attrs {
            let Some(raw) = query.value(attr.as_str()) else { continue };
            let value = self.index.normalize(attr, raw);
            if let Some(rec) = self.store.find_by_indexed_attribute(USER_ENTITY, attr.as_str(), &value)?.into_iter().next() {
                return Ok(Some(Self::decode_user(rec)?));
            }
        }
        Ok(None)
    }

    fn find_role(&self, name: &str) -> XmailResult<Option<Role>> {
        match self.store.find_by_indexed_attribute(ROLE_ENTITY, "name", name)?.into_iter().next() {
            Some(rec) => Ok(Some(Self::decode_role(rec)?)),
            None => Ok(None),
        }
    }

    fn persist(&self, entity: Entity) -> XmailResult<Entity> {
        match entity {
            Entity::User(u) => self.persist_user(u).map(Entity::User),
            Entity::Role(r) => self.persist_role(r).map(Entity::Role),
        }
    }

    fn delete(&self, entity: &Entity) -> XmailResult<()> {
        let Some(pk) = entity.pk() else {
            return Err(XmailError::programming(format!("cannot delete a {} that was never persisted", entity.kind())));
        };
        let removed = self.store.delete(entity.kind(), pk)?;
        debug!(target: "xmail::identity", "delete {} pk={} removed={}", entity.kind(), pk, removed);
        Ok(())
    }
}

#[cfg(test)]
mod adapter_tests;
