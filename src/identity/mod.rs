//! Identity storage: users, roles and the datastore capability an auth layer consumes.
//! Keep the public surface thin and split implementation across sub-modules.

mod model;
mod attributes;
mod datastore;
mod adapter;
mod password;
mod provider;

pub use model::{Entity, NewUser, Role, User, ROLE_ENTITY, USER_ENTITY};
pub use attributes::{AttributeIndex, IdentityAttribute, UserAttribute, UserQuery};
pub use datastore::UserDatastore;
pub use adapter::{identity_migrator, IndexedUserDatastore};
pub use password::{Argon2Service, PasswordService};
pub use provider::{AuthError, AuthProvider, LocalAuthProvider, LoginRequest, LoginResponse, RegisterRequest};
