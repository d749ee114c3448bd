use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::storage::IndexedModel;

pub const USER_ENTITY: &str = "user";
pub const ROLE_ENTITY: &str = "role";

fn default_active() -> bool { true }

/// A named bundle of permissions. Users reference roles by name; a role's
/// lifecycle is independent of the users that reference it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    #[serde(default)]
    pub pk: Option<String>,
    pub name: String,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self { pk: None, name: name.into(), permissions: BTreeSet::new() }
    }

    pub fn with_permissions<I, S>(mut self, perms: I) -> Self
    where I: IntoIterator<Item = S>, S: Into<String> {
        self.permissions.extend(perms.into_iter().map(Into::into));
        self
    }
}

/// Identity record.
///
/// `username` and `fs_uniquifier` are globally unique. `fs_uniquifier` identifies
/// the account to sessions and survives username changes; rotating it logs the
/// user out everywhere. `roles` holds role names and never contains duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub pk: Option<String>,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub fs_uniquifier: String,
    /// Opaque digest produced by a `PasswordService`.
    #[serde(rename = "password")]
    pub password_digest: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

impl User {
    pub fn new(username: impl Into<String>, password_digest: impl Into<String>) -> Self {
        Self {
            pk: None,
            username: username.into(),
            email: None,
            fs_uniquifier: String::new(),
            password_digest: password_digest.into(),
            active: true,
            roles: BTreeSet::new(),
        }
    }

    pub fn has_role(&self, role: &str) -> bool { self.roles.contains(role) }

    /// JSON view handed to session/auth consumers. The password digest is left out.
    pub fn security_payload(&self) -> JsonValue {
        let mut v = serde_json::to_value(self).unwrap_or(JsonValue::Null);
        if let Some(obj) = v.as_object_mut() { obj.remove("password"); }
        v
    }
}

/// Input for `UserDatastore::create_user`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub password_digest: String,
    pub email: Option<String>,
    pub active: bool,
    pub roles: Vec<String>,
}

impl NewUser {
    pub fn new(username: impl Into<String>, password_digest: impl Into<String>) -> Self {
        Self { username: username.into(), password_digest: password_digest.into(), email: None, active: true, roles: Vec::new() }
    }
    pub fn email(mut self, email: impl Into<String>) -> Self { self.email = Some(email.into()); self }
    pub fn role(mut self, role: impl Into<String>) -> Self { self.roles.push(role.into()); self }
    pub fn inactive(mut self) -> Self { self.active = false; self }
}

/// Anything `persist`/`delete` accept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    User(User),
    Role(Role),
}

impl Entity {
    pub fn kind(&self) -> &'static str {
        match self { Entity::User(_) => USER_ENTITY, Entity::Role(_) => ROLE_ENTITY }
    }

    pub fn pk(&self) -> Option<&str> {
        match self { Entity::User(u) => u.pk.as_deref(), Entity::Role(r) => r.pk.as_deref() }
    }

    pub fn into_user(self) -> Option<User> { match self { Entity::User(u) => Some(u), _ => None } }
    pub fn into_role(self) -> Option<Role> { match self { Entity::Role(r) => Some(r), _ => None } }
}

impl From<User> for Entity { fn from(u: User) -> Self { Entity::User(u) } }
impl From<Role> for Entity { fn from(r: Role) -> Self { Entity::Role(r) } }

impl IndexedModel for User { fn entity() -> &'static str { USER_ENTITY } }
impl IndexedModel for Role { fn entity() -> &'static str { ROLE_ENTITY } }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn security_payload_hides_digest() {
        let mut u = User::new("alice", "$argon2id$secret");
        u.roles.insert("admin".into());
        let p = u.security_payload();
        assert!(p.get("password").is_none());
        assert_eq!(p["username"], "alice");
        assert_eq!(p["roles"][0], "admin");
    }

    #[test]
    fn user_document_defaults() {
        let u: User = serde_json::from_value(serde_json::json!({
            "username": "bob", "fs_uniquifier": "u-1", "password": "d"
        })).unwrap();
        assert!(u.active);
        assert!(u.roles.is_empty());
        assert!(u.email.is_none());
        // Absent email is not written, so it never lands in the email index.
        assert!(serde_json::to_value(&u).unwrap().get("email").is_none());
    }
}
