//! xmail storage core: identity records behind an indexed document store and
//! per-user mailboxes in a personal-data-store.

pub mod error;
pub mod config;
pub mod storage;
pub mod identity;
pub mod mailbox;
pub mod app;

pub use app::Xmail;
pub use config::Settings;
pub use error::{DeleteReport, DeliveryReport, ValidationReason, XmailError, XmailResult};
