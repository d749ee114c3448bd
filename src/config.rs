//! Resolved runtime settings.
//!
//! Sources: `XMAIL_*` environment variables or a JSON file with the same field
//! names. The library itself never reads the environment; binaries resolve a
//! `Settings` once and pass it down.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::identity::{AttributeIndex, IdentityAttribute, UserAttribute};
use crate::mailbox::Credential;

pub const ENV_PREFIX: &str = "XMAIL_";

fn default_domain() -> String { "xmail.com".to_string() }
fn default_namespace() -> String { "xmail".to_string() }
fn default_identity_root() -> PathBuf { PathBuf::from("dbs/identity") }
fn default_attributes() -> Vec<IdentityAttribute> { vec![IdentityAttribute::exact(UserAttribute::Username)] }

#[derive(Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_domain")]
    pub email_domain: String,
    #[serde(default)]
    pub pds_username: String,
    #[serde(default)]
    pub pds_password: String,
    #[serde(default = "default_namespace")]
    pub pds_namespace: String,
    #[serde(default = "default_identity_root")]
    pub identity_root: PathBuf,
    #[serde(default = "default_attributes")]
    pub identity_attributes: Vec<IdentityAttribute>,
    #[serde(default)]
    pub email_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            email_domain: default_domain(),
            pds_username: String::new(),
            pds_password: String::new(),
            pds_namespace: default_namespace(),
            identity_root: default_identity_root(),
            identity_attributes: default_attributes(),
            email_enabled: false,
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("email_domain", &self.email_domain)
            .field("pds_username", &self.pds_username)
            .field("pds_password", &"<redacted>")
            .field("pds_namespace", &self.pds_namespace)
            .field("identity_root", &self.identity_root)
            .field("identity_attributes", &self.identity_attributes)
            .field("email_enabled", &self.email_enabled)
            .finish()
    }
}

pub fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse `username,email:ci` into attribute declarations.
pub fn parse_attributes(text: &str) -> Result<Vec<IdentityAttribute>> {
    let mut out = Vec::new();
    for part in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (name, ci) = match part.split_once(':') {
            Some((n, "ci")) => (n.trim(), true),
            Some((_, flag)) => return Err(anyhow!("unknown attribute flag '{}' in '{}'", flag, part)),
            None => (part, false),
        };
        let attribute = UserAttribute::parse(name).ok_or_else(|| anyhow!("unknown identity attribute '{}'", name))?;
        out.push(IdentityAttribute { attribute, case_insensitive: ci });
    }
    Ok(out)
}

impl Settings {
    pub fn from_env() -> Result<Self> { Self::from_lookup(|name| std::env::var(name).ok()) }

    /// Resolve from any `name -> value` source; unset names keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where F: Fn(&str) -> Option<String> {
        let var = |suffix: &str| lookup(&format!("{}{}", ENV_PREFIX, suffix));
        let mut s = Settings::default();
        if let Some(v) = var("EMAIL_DOMAIN") { s.email_domain = v; }
        if let Some(v) = var("PDS_USERNAME") { s.pds_username = v; }
        if let Some(v) = var("PDS_PASSWORD") { s.pds_password = v; }
        if let Some(v) = var("PDS_NAMESPACE") { s.pds_namespace = v; }
        if let Some(v) = var("IDENTITY_ROOT") { s.identity_root = PathBuf::from(v); }
        if let Some(v) = var("IDENTITY_ATTRIBUTES") {
            s.identity_attributes = parse_attributes(&v).context("XMAIL_IDENTITY_ATTRIBUTES")?;
        }
        if let Some(v) = var("EMAIL_ENABLED") {
            s.email_enabled = parse_bool(&v).ok_or_else(|| anyhow!("XMAIL_EMAIL_ENABLED: expected a boolean, got '{}'", v))?;
        }
        s.validate()?;
        Ok(s)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let s: Settings = serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        s.validate()?;
        Ok(s)
    }

    fn validate(&self) -> Result<()> {
        let d = self.email_domain.trim();
        if d.is_empty() || !d.contains('.') || d.contains('@') {
            return Err(anyhow!("invalid email domain '{}'", self.email_domain));
        }
        if self.pds_namespace.trim().is_empty() {
            return Err(anyhow!("pds namespace must not be empty"));
        }
        Ok(())
    }

    /// The identity allow-list. `email` is added when enabled and not already declared.
    pub fn attribute_index(&self) -> AttributeIndex {
        let mut entries = self.identity_attributes.clone();
        if self.email_enabled && !entries.iter().any(|e| e.attribute == UserAttribute::Email) {
            entries.push(IdentityAttribute::exact(UserAttribute::Email));
        }
        AttributeIndex::new(entries)
    }

    pub fn pds_credential(&self) -> Credential { Credential::new(self.pds_username.clone(), self.pds_password.clone()) }
}
