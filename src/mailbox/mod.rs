//! Mailbox storage: message types, the personal-data-store client contract, and
//! per-user mailbox operations scoped to a session.

mod model;
mod backend;
pub mod memory;
mod session;
mod store;

pub use model::{Email, EmailAddress, EmailHeader, EmailHeaderBuilder, Uid};
pub use backend::{Credential, Document, PdsClient, PdsConnector};
pub use memory::MemoryPds;
pub use session::{MailboxSession, SessionState};
pub use store::{MailboxStore, NO_SUBJECT};
