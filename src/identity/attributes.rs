//! Queryable identity attributes.
//!
//! The set of attributes a caller may look users up by is a fixed table
//! (`UserAttribute`), narrowed per deployment by an `AttributeIndex`. Names that
//! are not in the table can never reach the store.

use serde::{Deserialize, Serialize};

use super::model::{Role, User};
use crate::storage::{IndexDeclaration, IndexedModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserAttribute {
    Username,
    Email,
    FsUniquifier,
}

impl UserAttribute {
    pub const ALL: [UserAttribute; 3] = [UserAttribute::Username, UserAttribute::Email, UserAttribute::FsUniquifier];

    pub fn as_str(&self) -> &'static str {
        match self {
            UserAttribute::Username => "username",
            UserAttribute::Email => "email",
            UserAttribute::FsUniquifier => "fs_uniquifier",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|a| a.as_str() == name)
    }

    pub fn value_of<'a>(&self, user: &'a User) -> Option<&'a str> {
        match self {
            UserAttribute::Username => Some(user.username.as_str()),
            UserAttribute::Email => user.email.as_deref(),
            UserAttribute::FsUniquifier => Some(user.fs_uniquifier.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityAttribute {
    pub attribute: UserAttribute,
    #[serde(default)]
    pub case_insensitive: bool,
}

impl IdentityAttribute {
    pub fn exact(attribute: UserAttribute) -> Self { Self { attribute, case_insensitive: false } }
    pub fn folded(attribute: UserAttribute) -> Self { Self { attribute, case_insensitive: true } }
}

/// Ordered allow-list of queryable user attributes.
///
/// `username` and `fs_uniquifier` are always present: recipient checks and
/// session reloads depend on them. Attributes declared case-insensitive are
/// stored and queried lower-cased, so exact-match indexes still find them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeIndex {
    entries: Vec<IdentityAttribute>,
}

impl Default for AttributeIndex {
    fn default() -> Self {
        Self::new(vec![IdentityAttribute::exact(UserAttribute::Username), IdentityAttribute::exact(UserAttribute::FsUniquifier)])
    }
}

impl AttributeIndex {
    pub fn new(entries: Vec<IdentityAttribute>) -> Self {
        let mut out: Vec<IdentityAttribute> = Vec::with_capacity(entries.len() + 2);
        for e in entries {
            if !out.iter().any(|o| o.attribute == e.attribute) { out.push(e); }
        }
        for required in [UserAttribute::Username, UserAttribute::FsUniquifier] {
            if !out.iter().any(|o| o.attribute == required) { out.push(IdentityAttribute::exact(required)); }
        }
        Self { entries: out }
    }

    pub fn entries(&self) -> &[IdentityAttribute] { &self.entries }

    pub fn get(&self, attribute: UserAttribute) -> Option<&IdentityAttribute> {
        self.entries.iter().find(|e| e.attribute == attribute)
    }

    pub fn contains(&self, attribute: UserAttribute) -> bool { self.get(attribute).is_some() }

    pub fn is_case_insensitive(&self, attribute: UserAttribute) -> bool {
        self.get(attribute).map(|e| e.case_insensitive).unwrap_or(false)
    }

    /// Canonical stored form of a value for `attribute`.
    /// Folded attributes are trimmed and lower-cased. Exact attributes are kept as given.
    pub fn normalize(&self, attribute: UserAttribute, value: &str) -> String {
        if self.is_case_insensitive(attribute) { value.trim().to_lowercase() } else { value.to_string() }
    }

    /// Split requested attribute names into the allowed ones (in declared order)
    /// and the ones that get dropped.
    pub fn resolve<'a, I>(&self, requested: I) -> (Vec<UserAttribute>, Vec<String>)
    where I: IntoIterator<Item = &'a str> {
        let requested: Vec<&str> = requested.into_iter().collect();
        let allowed: Vec<UserAttribute> = self.entries.iter()
            .map(|e| e.attribute)
            .filter(|a| requested.contains(&a.as_str()))
            .collect();
        let mut dropped: Vec<String> = requested.iter()
            .filter(|name| !allowed.iter().any(|a| a.as_str() == **name))
            .map(|s| s.to_string())
            .collect();
        dropped.sort();
        dropped.dedup();
        (allowed, dropped)
    }

    /// Index declarations for the user and role documents.
    pub fn index_declarations(&self) -> Vec<IndexDeclaration> {
        let mut out: Vec<IndexDeclaration> = self.entries.iter()
            .map(|e| IndexDeclaration::unique(User::entity(), e.attribute.as_str()))
            .collect();
        out.push(IndexDeclaration::unique(Role::entity(), "name"));
        out
    }
}

/// Attribute/value pairs a caller wants a user looked up by.
/// Names are free-form here; the datastore filters them through its `AttributeIndex`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserQuery {
    attrs: Vec<(String, String)>,
    case_insensitive: bool,
}

impl UserQuery {
    pub fn new() -> Self { Self::default() }

    pub fn by(attribute: &str, value: impl Into<String>) -> Self { Self::new().and(attribute, value) }
    pub fn username(value: impl Into<String>) -> Self { Self::by("username", value) }
    pub fn email(value: impl Into<String>) -> Self { Self::by("email", value) }
    pub fn fs_uniquifier(value: impl Into<String>) -> Self { Self::by("fs_uniquifier", value) }

    /// Add a pair; a repeated name keeps its first value.
    pub fn and(mut self, attribute: &str, value: impl Into<String>) -> Self {
        if !self.attrs.iter().any(|(a, _)| a == attribute) {
            self.attrs.push((attribute.to_string(), value.into()));
        }
        self
    }

    pub fn case_insensitive(mut self, flag: bool) -> Self { self.case_insensitive = flag; self }

    pub fn is_case_insensitive(&self) -> bool { self.case_insensitive }
    pub fn is_empty(&self) -> bool { self.attrs.is_empty() }

    pub fn names(&self) -> impl Iterator<Item = &str> { self.attrs.iter().map(|(a, _)| a.as_str()) }

    pub fn value(&self, attribute: &str) -> Option<&str> {
        self.attrs.iter().find(|(a, _)| a == attribute).map(|(_, v)| v.as_str())
    }
}
