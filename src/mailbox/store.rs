//! Per-user mailbox operations over a personal-data-store session.
//!
//! Each user's mail lives in namespace `<base>/<username>`. Recipient checks
//! run in a fixed order before anything is written: address syntax, domain,
//! then existence in the identity store.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::backend::{Credential, PdsConnector};
use super::model::{Email, EmailAddress, EmailHeader, Uid};
use super::session::MailboxSession;
use crate::error::{DeleteReport, DeliveryReport, ValidationReason, XmailError, XmailResult};
use crate::identity::{UserAttribute, UserDatastore};

pub const NO_SUBJECT: &str = "(No subject)";

pub struct MailboxStore {
    domain: String,
    namespace: String,
    users: Arc<dyn UserDatastore>,
    connector: Arc<dyn PdsConnector>,
    credential: Credential,
}

impl MailboxStore {
    pub fn new(
        domain: impl Into<String>,
        namespace: impl Into<String>,
        users: Arc<dyn UserDatastore>,
        connector: Arc<dyn PdsConnector>,
        credential: Credential,
    ) -> Self {
        let domain: String = domain.into();
        Self { domain: domain.trim().to_ascii_lowercase(), namespace: namespace.into(), users, connector, credential }
    }

    pub fn domain(&self) -> &str { &self.domain }

    pub fn open_session(&self) -> MailboxSession { MailboxSession::new(self.connector.clone(), self.credential.clone()) }

    /// Runs `f` with a fresh session and closes it on every exit path.
    /// A close failure is reported only when `f` itself succeeded.
    pub fn scoped<T, F>(&self, f: F) -> XmailResult<T>
    where F: FnOnce(&mut MailboxSession) -> XmailResult<T> {
        let mut session = self.open_session();
        let result = f(&mut session);
        let closed = session.close();
        match (result, closed) {
            (Ok(v), Ok(())) => Ok(v),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => {
                warn!(target: "xmail::mailbox", "session.close failed after error: {}", close_err);
                Err(e)
            }
        }
    }

    pub fn mailbox_namespace(&self, username: &str) -> String {
        let user = self.users.attribute_index().normalize(UserAttribute::Username, username);
        format!("{}/{}", self.namespace, user)
    }

    /// Messages in `username`'s mailbox, newest first.
    pub fn list_inbox(&self, session: &mut MailboxSession, username: &str) -> XmailResult<Vec<Email>> {
        let ns = self.mailbox_namespace(username);
        let docs = session.list(&ns)?;
        let mut out = Vec::with_capacity(docs.len());
        for doc in docs {
            match serde_json::from_value::<Email>(doc.data) {
                Ok(mut email) => {
                    email.uid = Some(Uid(doc.id));
                    out.push(email);
                }
                Err(e) => warn!(target: "xmail::mailbox", "skipping undecodable message {} in {}: {}", doc.id, ns, e),
            }
        }
        out.sort_by(|a, b| b.header.date().cmp(&a.header.date()));
        Ok(out)
    }

    /// Drops the session's read cache, then lists.
    pub fn refresh_inbox(&self, session: &mut MailboxSession, username: &str) -> XmailResult<Vec<Email>> {
        session.clear_cache()?;
        self.list_inbox(session, username)
    }

    /// Builds a message from `sender_username` to `to` and saves it to the recipient's mailbox.
    pub fn compose(&self, session: &mut MailboxSession, to: &str, subject: &str, body: &str, sender_username: &str) -> XmailResult<Email> {
        let recipient = EmailAddress::parse(to)?;
        let sender = EmailAddress::new(sender_username, &self.domain)?;
        let subject = if subject.trim().is_empty() { NO_SUBJECT } else { subject };
        let header = EmailHeader::builder(sender).to(recipient).subject(subject).date(Utc::now()).build()?;
        let body = if body.is_empty() { None } else { Some(body.to_string()) };
        self.save(session, Email::new(header, body))
    }

    /// Checks one recipient and returns the mailbox owner's username.
    fn check_recipient(&self, addr: &EmailAddress) -> XmailResult<String> {
        if addr.domain() != self.domain {
            return Err(ValidationReason::DomainMismatch { expected: self.domain.clone(), got: addr.domain().to_string() }.into());
        }
        match self.users.find_user_by_username(addr.local_part())? {
            Some(user) => Ok(user.username),
            None => Err(ValidationReason::RecipientDoesNotExist(addr.to_string()).into()),
        }
    }

    fn put_into(&self, session: &mut MailboxSession, owner: &str, email: &Email) -> XmailResult<Email> {
        let data = serde_json::to_value(email)?;
        let doc = session.put(&self.mailbox_namespace(owner), data)?;
        let mut stored = email.clone();
        stored.uid = Some(Uid(doc.id));
        Ok(stored)
    }

    /// Saves `email` into the mailbox of its first `to` recipient.
    pub fn save(&self, session: &mut MailboxSession, email: Email) -> XmailResult<Email> {
        let primary = email.header.to().first().cloned().ok_or(ValidationReason::EmptyRecipients)?;
        let owner = self.check_recipient(&primary).map_err(|e| {
            info!(target: "xmail::mailbox", "save rejected to={}: {}", primary, e);
            e
        })?;
        let stored = self.put_into(session, &owner, &email)?;
        debug!(target: "xmail::mailbox", "save to={} uid={:?}", owner, stored.uid);
        Ok(stored)
    }

    /// Saves a copy into every recipient's mailbox. Nothing is written unless all recipients pass.
    /// If a write fails midway, copies already stored are withdrawn; any that cannot be
    /// withdrawn are reported through `PartialDeliver`.
    pub fn deliver(&self, session: &mut MailboxSession, email: Email) -> XmailResult<Vec<Email>> {
        let mut owners: Vec<String> = Vec::new();
        for addr in email.header.recipients() {
            let owner = self.check_recipient(addr)?;
            if !owners.contains(&owner) { owners.push(owner); }
        }
        if owners.is_empty() { return Err(ValidationReason::EmptyRecipients.into()); }

        let mut stored: Vec<(String, Email)> = Vec::with_capacity(owners.len());
        for (i, owner) in owners.iter().enumerate() {
            match self.put_into(session, owner, &email) {
                Ok(copy) => stored.push((owner.clone(), copy)),
                Err(e) => {
                    warn!(target: "xmail::mailbox", "deliver to {} failed, withdrawing {} copies: {}", owner, stored.len(), e);
                    let mut report = DeliveryReport { delivered: Vec::new(), failed: owners[i..].to_vec() };
                    for (done, copy) in stored {
                        let Some(uid) = copy.uid else { continue };
                        if let Err(undo) = session.delete(&self.mailbox_namespace(&done), uid.as_str()) {
                            warn!(target: "xmail::mailbox", "withdrawing copy {} from {} failed: {}", uid, done, undo);
                            report.delivered.push(done);
                        } else {
                            report.failed.push(done);
                        }
                    }
                    if report.delivered.is_empty() { return Err(e); }
                    return Err(XmailError::PartialDeliver(report));
                }
            }
        }
        Ok(stored.into_iter().map(|(_, copy)| copy).collect())
    }

    /// Deletes every message in `username`'s current listing whose uid is in `selected`.
    /// Unknown uids are ignored. Failures surface as `PartialDelete` with the full report.
    pub fn delete_selected(&self, session: &mut MailboxSession, username: &str, selected: &BTreeSet<Uid>) -> XmailResult<DeleteReport> {
        if selected.is_empty() { return Ok(DeleteReport::default()); }
        let listing = self.refresh_inbox(session, username)?;
        self.delete_listed(session, username, listing.into_iter().filter(|e| e.uid.as_ref().is_some_and(|u| selected.contains(u))))
    }

    /// Empties `username`'s mailbox.
    pub fn clear(&self, session: &mut MailboxSession, username: &str) -> XmailResult<DeleteReport> {
        let listing = self.refresh_inbox(session, username)?;
        self.delete_listed(session, username, listing.into_iter())
    }

    fn delete_listed<I>(&self, session: &mut MailboxSession, username: &str, emails: I) -> XmailResult<DeleteReport>
    where I: Iterator<Item = Email> {
        let ns = self.mailbox_namespace(username);
        let mut report = DeleteReport::default();
        for uid in emails.filter_map(|e| e.uid) {
            match session.delete(&ns, uid.as_str()) {
                // Already gone counts as deleted.
                Ok(_) => report.deleted.push(uid.0),
                Err(e) if e.is_unavailable() => {
                    warn!(target: "xmail::mailbox", "delete of {} in {} failed: {}", uid, ns, e);
                    report.failed.push(uid.0);
                }
                Err(e) if report.deleted.is_empty() => return Err(e),
                Err(e) => {
                    warn!(target: "xmail::mailbox", "delete batch in {} aborted at {}: {}", ns, uid, e);
                    report.failed.push(uid.0);
                    report.aborted = Some(e.to_string());
                    break;
                }
            }
        }
        info!(target: "xmail::mailbox", "delete user={} deleted={} failed={}", username, report.deleted.len(), report.failed.len());
        if report.is_complete() { Ok(report) } else { Err(XmailError::PartialDelete(report)) }
    }

    /// Removes one message. It must carry the uid it was listed with.
    pub fn delete(&self, session: &mut MailboxSession, username: &str, email: &Email) -> XmailResult<()> {
        let uid = email.uid.as_ref().ok_or_else(|| XmailError::programming("cannot delete a message that was never saved"))?;
        let ns = self.mailbox_namespace(username);
        if session.delete(&ns, uid.as_str())? {
            debug!(target: "xmail::mailbox", "delete user={} uid={}", username, uid);
            Ok(())
        } else {
            Err(XmailError::not_found(format!("message {} in mailbox of {}", uid, username)))
        }
    }
}
