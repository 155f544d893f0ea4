//! Local storage for attachments removed from messages.

pub mod attachment;

pub use attachment::AttachmentStore;
