use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::{info, warn};

use super::attributes::{UserAttribute, UserQuery};
use super::datastore::UserDatastore;
use super::model::{NewUser, User};
use super::password::PasswordService;
use crate::error::XmailError;

static USERNAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\w\-.]{1,64}$").unwrap());

/// Errors at the authentication boundary. Storage failures arrive here already
/// translated; callers never see raw datastore errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid_credentials")]
    InvalidCredentials,
    #[error("account_inactive")]
    Inactive,
    #[error("username '{0}' is already taken")]
    UsernameTaken(String),
    #[error("invalid username '{0}'")]
    InvalidUsername(String),
    #[error("authentication service unavailable: {0}")]
    Unavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn http_status(&self) -> u16 {
        match self {
            AuthError::InvalidCredentials => 401,
            AuthError::Inactive => 403,
            AuthError::UsernameTaken(_) => 409,
            AuthError::InvalidUsername(_) => 400,
            AuthError::Unavailable(_) => 503,
            AuthError::Internal(_) => 500,
        }
    }
}

impl From<XmailError> for AuthError {
    fn from(err: XmailError) -> Self {
        match err {
            XmailError::StoreUnavailable(msg) => AuthError::Unavailable(msg),
            XmailError::Conflict(msg) => AuthError::UsernameTaken(msg),
            other => AuthError::Internal(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoginResponse {
    pub user: User,
    /// Session identity token (`fs_uniquifier`).
    pub identity: String,
}

pub trait AuthProvider: Send + Sync {
    fn login(&self, req: &LoginRequest) -> Result<LoginResponse, AuthError>;
    fn register(&self, req: &RegisterRequest) -> Result<User, AuthError>;
    /// Reload the account behind a session identity token. Inactive accounts resolve to `None`.
    fn load_identity(&self, identity: &str) -> Result<Option<User>, AuthError>;
}

pub struct LocalAuthProvider {
    users: Arc<dyn UserDatastore>,
    passwords: Arc<dyn PasswordService>,
}

impl LocalAuthProvider {
    pub fn new(users: Arc<dyn UserDatastore>, passwords: Arc<dyn PasswordService>) -> Self { Self { users, passwords } }

    pub fn users(&self) -> &Arc<dyn UserDatastore> { &self.users }

    fn normalize_username(&self, username: &str) -> String {
        self.users.attribute_index().normalize(UserAttribute::Username, username)
    }
}

impl AuthProvider for LocalAuthProvider {
    fn login(&self, req: &LoginRequest) -> Result<LoginResponse, AuthError> {
        let username = self.normalize_username(&req.username);
        let Some(user) = self.users.find_user(&UserQuery::username(username.as_str()))? else {
            info!(target: "xmail::auth", "auth.login unknown user={}", username);
            return Err(AuthError::InvalidCredentials);
        };
        if !self.passwords.verify(&req.password, &user.password_digest) {
            info!(target: "xmail::auth", "auth.login bad password user={}", username);
            return Err(AuthError::InvalidCredentials);
        }
        if !user.active {
            return Err(AuthError::Inactive);
        }
        info!(target: "xmail::auth", "auth.login user={}", username);
        Ok(LoginResponse { identity: user.fs_uniquifier.clone(), user })
    }

    fn register(&self, req: &RegisterRequest) -> Result<User, AuthError> {
        let username = self.normalize_username(&req.username);
        if !USERNAME_RE.is_match(&username) {
            return Err(AuthError::InvalidUsername(req.username.clone()));
        }
        if self.users.find_user(&UserQuery::username(username.as_str()))?.is_some() {
            return Err(AuthError::UsernameTaken(username));
        }
        let digest = self.passwords.hash(&req.password).map_err(|e| AuthError::Internal(e.to_string()))?;
        let mut new = NewUser::new(username.as_str(), digest);
        new.email = req.email.clone();
        let user = self.users.create_user(new).map_err(|e| match e {
            XmailError::Conflict(_) => AuthError::UsernameTaken(username.clone()),
            other => AuthError::from(other),
        })?;
        info!(target: "xmail::auth", "auth.register user={}", user.username);
        Ok(user)
    }

    fn load_identity(&self, identity: &str) -> Result<Option<User>, AuthError> {
        let user = self.users.find_user(&UserQuery::fs_uniquifier(identity))?;
        Ok(user.filter(|u| {
            if !u.active { warn!(target: "xmail::auth", "session for inactive user={}", u.username); }
            u.active
        }))
    }
}
