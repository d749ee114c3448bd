//! Startup wiring. Index migration always runs before any adapter is built.

use std::sync::Arc;

use tracing::info;

use crate::config::Settings;
use crate::error::XmailResult;
use crate::identity::{identity_migrator, Argon2Service, IndexedUserDatastore, LocalAuthProvider, PasswordService, UserDatastore};
use crate::mailbox::{MailboxStore, PdsConnector};
use crate::storage::{DocumentStore, IndexReport};

pub struct Xmail {
    pub settings: Settings,
    pub users: Arc<dyn UserDatastore>,
    pub auth: LocalAuthProvider,
    pub mailbox: MailboxStore,
    pub migration: IndexReport,
}

impl Xmail {
    pub fn bootstrap(settings: Settings, store: Arc<dyn DocumentStore>, connector: Arc<dyn PdsConnector>) -> XmailResult<Self> {
        Self::bootstrap_with(settings, store, connector, Arc::new(Argon2Service))
    }

    pub fn bootstrap_with(
        settings: Settings,
        store: Arc<dyn DocumentStore>,
        connector: Arc<dyn PdsConnector>,
        passwords: Arc<dyn PasswordService>,
    ) -> XmailResult<Self> {
        let index = settings.attribute_index();
        let migration = identity_migrator(&index).run(store.as_ref())?;
        let users: Arc<dyn UserDatastore> = Arc::new(IndexedUserDatastore::new(store, index)?);
        let auth = LocalAuthProvider::new(users.clone(), passwords);
        let mailbox = MailboxStore::new(
            settings.email_domain.clone(),
            settings.pds_namespace.clone(),
            users.clone(),
            connector,
            settings.pds_credential(),
        );
        info!(target: "xmail::app", "xmail ready: domain={} indexes created={} updated={}", mailbox.domain(), migration.created.len(), migration.updated.len());
        Ok(Self { settings, users, auth, mailbox, migration })
    }
}
