//! Message value types.
//!
//! `EmailHeader` is immutable once built: fields are private and only the
//! builder can produce one, after checking the recipient lists. Serialised
//! field names follow the header names (`To`, `CC`, `From`, `Reply-To`, ...).

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ValidationReason;

static ADDRESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9!#$%&'*+/=?^_`{|}~.\-]+)@([A-Za-z0-9](?:[A-Za-z0-9\-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9\-]*[A-Za-z0-9])?)+)$").unwrap()
});

/// A mailbox address split into local part and domain. The domain is kept lower-case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EmailAddress {
    local: String,
    domain: String,
}

impl EmailAddress {
    pub fn parse(text: &str) -> Result<Self, ValidationReason> {
        let t = text.trim();
        let caps = ADDRESS_RE.captures(t).ok_or_else(|| ValidationReason::InvalidAddress(t.to_string()))?;
        let local = caps[1].to_string();
        if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
            return Err(ValidationReason::InvalidAddress(t.to_string()));
        }
        Ok(Self { local, domain: caps[2].to_ascii_lowercase() })
    }

    pub fn new(local: &str, domain: &str) -> Result<Self, ValidationReason> {
        Self::parse(&format!("{}@{}", local, domain))
    }

    pub fn local_part(&self) -> &str { &self.local }
    pub fn domain(&self) -> &str { &self.domain }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}@{}", self.local, self.domain) }
}

impl TryFrom<String> for EmailAddress {
    type Error = ValidationReason;
    fn try_from(s: String) -> Result<Self, Self::Error> { Self::parse(&s) }
}

impl From<EmailAddress> for String {
    fn from(a: EmailAddress) -> Self { a.to_string() }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawHeader")]
pub struct EmailHeader {
    #[serde(rename = "To")]
    to: Vec<EmailAddress>,
    #[serde(rename = "CC", default)]
    cc: Vec<EmailAddress>,
    #[serde(rename = "BCC", default)]
    bcc: Vec<EmailAddress>,
    #[serde(rename = "From")]
    sender: EmailAddress,
    #[serde(rename = "Reply-To")]
    reply_to: EmailAddress,
    #[serde(rename = "Return-Path")]
    return_path: EmailAddress,
    #[serde(rename = "Subject", default)]
    subject: String,
    #[serde(rename = "Date")]
    date: DateTime<Utc>,
}

impl EmailHeader {
    pub fn builder(sender: EmailAddress) -> EmailHeaderBuilder { EmailHeaderBuilder::new(sender) }

    pub fn to(&self) -> &[EmailAddress] { &self.to }
    pub fn cc(&self) -> &[EmailAddress] { &self.cc }
    pub fn bcc(&self) -> &[EmailAddress] { &self.bcc }
    pub fn sender(&self) -> &EmailAddress { &self.sender }
    pub fn reply_to(&self) -> &EmailAddress { &self.reply_to }
    pub fn return_path(&self) -> &EmailAddress { &self.return_path }
    pub fn subject(&self) -> &str { &self.subject }
    pub fn date(&self) -> DateTime<Utc> { self.date }

    /// Every recipient: `to`, then `cc`, then `bcc`.
    pub fn recipients(&self) -> impl Iterator<Item = &EmailAddress> {
        self.to.iter().chain(self.cc.iter()).chain(self.bcc.iter())
    }

    fn is_old(&self, now: DateTime<Utc>) -> bool { now - self.date >= Duration::weeks(1) }

    /// Inbox column: "Aug 12" for mail older than a week, "Tue 01:23 PM" otherwise.
    pub fn short_date(&self) -> String { self.short_date_at(Utc::now()) }

    pub fn short_date_at(&self, now: DateTime<Utc>) -> String {
        let fmt = if self.is_old(now) { "%b %d" } else { "%a %I:%M %p" };
        self.date.format(fmt).to_string()
    }

    /// Reading pane: "Tue Aug 12 – 01:23 PM" for mail older than a week, "Tue 01:23 PM" otherwise.
    pub fn full_date(&self) -> String { self.full_date_at(Utc::now()) }

    pub fn full_date_at(&self, now: DateTime<Utc>) -> String {
        let fmt = if self.is_old(now) { "%a %b %d – %I:%M %p" } else { "%a %I:%M %p" };
        self.date.format(fmt).to_string()
    }
}

/// Wire form of a stored header. Decoding goes through the builder so stored
/// documents obey the same rules as freshly built headers.
#[derive(Deserialize)]
struct RawHeader {
    #[serde(rename = "To")]
    to: Vec<EmailAddress>,
    #[serde(rename = "CC", default)]
    cc: Vec<EmailAddress>,
    #[serde(rename = "BCC", default)]
    bcc: Vec<EmailAddress>,
    #[serde(rename = "From")]
    sender: EmailAddress,
    #[serde(rename = "Reply-To", default)]
    reply_to: Option<EmailAddress>,
    #[serde(rename = "Return-Path", default)]
    return_path: Option<EmailAddress>,
    #[serde(rename = "Subject", default)]
    subject: String,
    #[serde(rename = "Date")]
    date: DateTime<Utc>,
}

impl TryFrom<RawHeader> for EmailHeader {
    type Error = ValidationReason;
    fn try_from(raw: RawHeader) -> Result<Self, Self::Error> {
        let mut b = EmailHeader::builder(raw.sender).subject(raw.subject).date(raw.date);
        b.to = raw.to;
        b.cc = raw.cc;
        b.bcc = raw.bcc;
        b.reply_to = raw.reply_to;
        b.return_path = raw.return_path;
        b.build()
    }
}

fn check_unique(list: &[EmailAddress]) -> Result<(), ValidationReason> {
    for (i, a) in list.iter().enumerate() {
        if list[..i].contains(a) { return Err(ValidationReason::DuplicateRecipient(a.to_string())); }
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct EmailHeaderBuilder {
    to: Vec<EmailAddress>,
    cc: Vec<EmailAddress>,
    bcc: Vec<EmailAddress>,
    sender: EmailAddress,
    reply_to: Option<EmailAddress>,
    return_path: Option<EmailAddress>,
    subject: String,
    date: Option<DateTime<Utc>>,
}

impl EmailHeaderBuilder {
    fn new(sender: EmailAddress) -> Self {
        Self { to: Vec::new(), cc: Vec::new(), bcc: Vec::new(), sender, reply_to: None, return_path: None, subject: String::new(), date: None }
    }

    pub fn to(mut self, addr: EmailAddress) -> Self { self.to.push(addr); self }
    pub fn cc(mut self, addr: EmailAddress) -> Self { self.cc.push(addr); self }
    pub fn bcc(mut self, addr: EmailAddress) -> Self { self.bcc.push(addr); self }
    pub fn reply_to(mut self, addr: EmailAddress) -> Self { self.reply_to = Some(addr); self }
    pub fn return_path(mut self, addr: EmailAddress) -> Self { self.return_path = Some(addr); self }
    pub fn subject(mut self, subject: impl Into<String>) -> Self { self.subject = subject.into(); self }
    pub fn date(mut self, date: DateTime<Utc>) -> Self { self.date = Some(date); self }

    /// `reply_to` and `return_path` default to the sender, `date` to now.
    pub fn build(self) -> Result<EmailHeader, ValidationReason> {
        if self.to.is_empty() { return Err(ValidationReason::EmptyRecipients); }
        check_unique(&self.to)?;
        check_unique(&self.cc)?;
        check_unique(&self.bcc)?;
        Ok(EmailHeader {
            reply_to: self.reply_to.unwrap_or_else(|| self.sender.clone()),
            return_path: self.return_path.unwrap_or_else(|| self.sender.clone()),
            to: self.to,
            cc: self.cc,
            bcc: self.bcc,
            sender: self.sender,
            subject: self.subject.trim().to_string(),
            date: self.date.unwrap_or_else(Utc::now),
        })
    }
}

/// Backend-assigned identifier of a stored message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(pub String);

impl Uid {
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for Uid { fn from(s: &str) -> Self { Uid(s.to_string()) } }
impl From<String> for Uid { fn from(s: String) -> Self { Uid(s) } }

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    pub header: EmailHeader,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Set by the mailbox backend on save; never part of the stored document.
    #[serde(skip)]
    pub uid: Option<Uid>,
}

impl Email {
    pub fn new(header: EmailHeader, body: Option<String>) -> Self { Self { header, body, uid: None } }
}

#[cfg(test)]
mod model_tests;
