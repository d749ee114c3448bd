//! The user-management capability an auth layer expects from its storage backend.
//!
//! Implementors provide the four primitives (`find_user`, `find_role`,
//! `persist`, `delete`); the account-management helpers are default methods
//! expressed purely in terms of them, so they behave the same over any backend.

use std::collections::BTreeSet;

use super::attributes::{AttributeIndex, UserQuery};
use super::model::{Entity, NewUser, Role, User};
use crate::error::{XmailError, XmailResult};

pub trait UserDatastore: Send + Sync {
    /// Allow-list that governs `find_user`.
    fn attribute_index(&self) -> &AttributeIndex;

    /// First user matching any allowed attribute of `query`, or `None`.
    fn find_user(&self, query: &UserQuery) -> XmailResult<Option<User>>;

    fn find_role(&self, name: &str) -> XmailResult<Option<Role>>;

    /// Whole-record insert or replace. A new entity comes back with its `pk` set.
    fn persist(&self, entity: Entity) -> XmailResult<Entity>;

    /// Remove by key. Never cascades between users and roles.
    fn delete(&self, entity: &Entity) -> XmailResult<()>;

    fn put_user(&self, user: User) -> XmailResult<User> {
        self.persist(Entity::User(user))?.into_user()
            .ok_or_else(|| XmailError::programming("persist returned a non-user entity"))
    }

    fn put_role(&self, role: Role) -> XmailResult<Role> {
        self.persist(Entity::Role(role))?.into_role()
            .ok_or_else(|| XmailError::programming("persist returned a non-role entity"))
    }

    fn find_user_by_username(&self, username: &str) -> XmailResult<Option<User>> {
        self.find_user(&UserQuery::username(username))
    }

    fn create_user(&self, new: NewUser) -> XmailResult<User> {
        let mut user = User::new(new.username, new.password_digest);
        user.email = new.email;
        user.active = new.active;
        for name in new.roles {
            let role = self.find_role(&name)?.ok_or_else(|| XmailError::not_found(format!("role '{}'", name)))?;
            user.roles.insert(role.name);
        }
        self.put_user(user)
    }

    fn create_role(&self, name: &str, permissions: BTreeSet<String>) -> XmailResult<Role> {
        let mut role = Role::new(name);
        role.permissions = permissions;
        self.put_role(role)
    }

    fn find_or_create_role(&self, name: &str) -> XmailResult<Role> {
        match self.find_role(name)? {
            Some(r) => Ok(r),
            None => self.create_role(name, BTreeSet::new()),
        }
    }

    /// Returns false when the user already held the role.
    fn add_role_to_user(&self, user: &mut User, role: &str) -> XmailResult<bool> {
        let role = self.find_role(role)?.ok_or_else(|| XmailError::not_found(format!("role '{}'", role)))?;
        if !user.roles.insert(role.name) { return Ok(false); }
        *user = self.put_user(user.clone())?;
        Ok(true)
    }

    /// Returns false when the user did not hold the role.
    fn remove_role_from_user(&self, user: &mut User, role: &str) -> XmailResult<bool> {
        if !user.roles.remove(role) { return Ok(false); }
        *user = self.put_user(user.clone())?;
        Ok(true)
    }

    /// Returns false when `active` already had the requested value.
    fn set_active(&self, user: &mut User, active: bool) -> XmailResult<bool> {
        if user.active == active { return Ok(false); }
        user.active = active;
        *user = self.put_user(user.clone())?;
        Ok(true)
    }

    fn activate_user(&self, user: &mut User) -> XmailResult<bool> { self.set_active(user, true) }
    fn deactivate_user(&self, user: &mut User) -> XmailResult<bool> { self.set_active(user, false) }

    fn toggle_active(&self, user: &mut User) -> XmailResult<bool> {
        let next = !user.active;
        self.set_active(user, next)?;
        Ok(next)
    }

    /// Rotate the session identity token, invalidating existing sessions.
    fn reset_uniquifier(&self, user: &mut User) -> XmailResult<()> {
        user.fs_uniquifier = uuid::Uuid::new_v4().simple().to_string();
        *user = self.put_user(user.clone())?;
        Ok(())
    }

    fn delete_user(&self, user: &User) -> XmailResult<()> { self.delete(&Entity::User(user.clone())) }

    /// Union of the permissions of every role the user references. Roles that
    /// no longer exist contribute nothing.
    fn permissions_of(&self, user: &User) -> XmailResult<BTreeSet<String>> {
        let mut out = BTreeSet::new();
        for name in user.roles.iter() {
            if let Some(role) = self.find_role(name)? { out.extend(role.permissions); }
        }
        Ok(out)
    }

    fn user_has_permission(&self, user: &User, permission: &str) -> XmailResult<bool> {
        Ok(self.permissions_of(user)?.contains(permission))
    }
}
