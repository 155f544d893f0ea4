//! `imapscrub`: rule-driven cleanup of IMAP mailboxes.
//!
//! Messages matched by configured rules are listed, deleted, or rewritten
//! without their attachments. Removed attachments can be saved to disk, and
//! the rewritten message carries a notice describing what was taken out.

pub mod config;
pub mod engine;
pub mod error;
pub mod mailbox;
pub mod model;
pub mod parser;
pub mod report;
pub mod rewrite;
pub mod store;
