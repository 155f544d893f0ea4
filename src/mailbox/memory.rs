//! In-process mailbox store.
//!
//! Clones share the same underlying store but keep their own selected
//! mailbox, so a reader and a writer session can be opened on it just like
//! two IMAP connections.

use std::collections::BTreeMap;
use std::sync::mpsc::SyncSender;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::{appendable_flags, MailboxInfo, MailboxSession, SearchCriteria};
use crate::error::ProtocolError;
use crate::model::message::{Envelope, FetchMode, FetchedMessage};
use crate::parser::header::split_message;

/// A message held by [`MemoryMailbox`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub uid: u32,
    pub raw: Vec<u8>,
    pub flags: Vec<String>,
    pub internal_date: Option<DateTime<Utc>>,
}

impl StoredMessage {
    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f.eq_ignore_ascii_case(flag))
    }
}

#[derive(Debug, Default)]
struct Folder {
    trash: bool,
    next_uid: u32,
    messages: Vec<StoredMessage>,
}

#[derive(Debug, Default)]
struct Store {
    folders: BTreeMap<String, Folder>,
    expunges: usize,
    fail_next: Option<&'static str>,
}

/// Mailbox collaborator backed by memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryMailbox {
    store: Arc<Mutex<Store>>,
    selected: Option<String>,
}

impl MemoryMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        // A panic while holding the lock leaves the data usable
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create an empty mailbox.
    pub fn create(&mut self, name: &str) {
        self.lock().folders.entry(name.to_string()).or_default();
    }

    /// Create an empty mailbox carrying the `\Trash` attribute.
    pub fn create_trash(&mut self, name: &str) {
        self.lock().folders.entry(name.to_string()).or_default().trash = true;
    }

    /// Store a message and return its UID. Creates the mailbox if needed.
    pub fn insert(
        &mut self,
        mailbox: &str,
        raw: &[u8],
        flags: &[&str],
        internal_date: Option<DateTime<Utc>>,
    ) -> u32 {
        let flags: Vec<String> = flags.iter().map(|f| f.to_string()).collect();
        let mut store = self.lock();
        let folder = store.folders.entry(mailbox.to_string()).or_default();
        push_message(folder, raw.to_vec(), flags, internal_date)
    }

    /// Snapshot of the messages in `mailbox`.
    pub fn messages(&self, mailbox: &str) -> Vec<StoredMessage> {
        self.lock()
            .folders
            .get(mailbox)
            .map(|f| f.messages.clone())
            .unwrap_or_default()
    }

    /// Number of `expunge` calls made against the store.
    pub fn expunge_count(&self) -> usize {
        self.lock().expunges
    }

    /// Make the next call to `operation` fail.
    pub fn fail_next(&mut self, operation: &'static str) {
        self.lock().fail_next = Some(operation);
    }

    fn check(&self, operation: &'static str) -> Result<(), ProtocolError> {
        let mut store = self.lock();
        if store.fail_next == Some(operation) {
            store.fail_next = None;
            return Err(ProtocolError::new(operation, "injected failure"));
        }
        Ok(())
    }

    fn selected(&self, operation: &'static str) -> Result<String, ProtocolError> {
        self.selected
            .clone()
            .ok_or_else(|| ProtocolError::new(operation, "no mailbox selected"))
    }
}

fn push_message(
    folder: &mut Folder,
    raw: Vec<u8>,
    flags: Vec<String>,
    internal_date: Option<DateTime<Utc>>,
) -> u32 {
    folder.next_uid += 1;
    let uid = folder.next_uid;
    folder.messages.push(StoredMessage {
        uid,
        raw,
        flags,
        internal_date,
    });
    uid
}

impl MailboxSession for MemoryMailbox {
    fn list_mailboxes(&mut self) -> Result<Vec<MailboxInfo>, ProtocolError> {
        self.check("list")?;
        Ok(self
            .lock()
            .folders
            .iter()
            .map(|(name, folder)| MailboxInfo {
                name: name.clone(),
                selectable: true,
                trash: folder.trash,
            })
            .collect())
    }

    fn select(&mut self, mailbox: &str) -> Result<u32, ProtocolError> {
        self.check("select")?;
        let count = self
            .lock()
            .folders
            .get(mailbox)
            .map(|f| f.messages.len() as u32)
            .ok_or_else(|| ProtocolError::new("select", format!("no such mailbox \"{mailbox}\"")))?;
        self.selected = Some(mailbox.to_string());
        Ok(count)
    }

    fn search(&mut self, criteria: &SearchCriteria) -> Result<Vec<u32>, ProtocolError> {
        self.check("search")?;
        let selected = self.selected("search")?;
        let store = self.lock();
        Ok(store
            .folders
            .get(&selected)
            .map(|folder| {
                folder
                    .messages
                    .iter()
                    .filter(|m| criteria.matches(&m.raw, &m.flags, m.raw.len() as u64))
                    .map(|m| m.uid)
                    .collect()
            })
            .unwrap_or_default())
    }

    fn fetch(
        &mut self,
        uids: &[u32],
        mode: FetchMode,
        sink: &SyncSender<FetchedMessage>,
    ) -> Result<(), ProtocolError> {
        self.check("fetch")?;
        let selected = self.selected("fetch")?;
        let messages = self.messages(&selected);

        for uid in uids {
            let Some(stored) = messages.iter().find(|m| m.uid == *uid) else {
                continue;
            };
            let body = match mode {
                FetchMode::Full => stored.raw.clone(),
                FetchMode::HeadersOnly => split_message(&stored.raw).0.to_vec(),
            };
            let fetched = FetchedMessage {
                uid: stored.uid,
                flags: stored.flags.clone(),
                size: stored.raw.len() as u64,
                internal_date: stored.internal_date,
                envelope: Envelope::from_headers(&stored.raw),
                body: Some(body),
            };
            if sink.send(fetched).is_err() {
                return Ok(());
            }
        }
        Ok(())
    }

    fn append(
        &mut self,
        mailbox: &str,
        raw: &[u8],
        flags: &[String],
        date: Option<DateTime<Utc>>,
    ) -> Result<(), ProtocolError> {
        self.check("append")?;
        let mut store = self.lock();
        let folder = store
            .folders
            .get_mut(mailbox)
            .ok_or_else(|| ProtocolError::new("append", format!("[TRYCREATE] no mailbox \"{mailbox}\"")))?;
        push_message(folder, raw.to_vec(), appendable_flags(flags), date);
        Ok(())
    }

    fn move_to(&mut self, uids: &[u32], mailbox: &str) -> Result<(), ProtocolError> {
        self.check("move")?;
        let selected = self.selected("move")?;
        let mut store = self.lock();
        if !store.folders.contains_key(mailbox) {
            return Err(ProtocolError::new("move", format!("no mailbox \"{mailbox}\"")));
        }

        let moved: Vec<StoredMessage> = match store.folders.get_mut(&selected) {
            Some(source) => {
                let (moved, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut source.messages)
                    .into_iter()
                    .partition(|m| uids.contains(&m.uid));
                source.messages = kept;
                moved
            }
            None => Vec::new(),
        };
        if let Some(target) = store.folders.get_mut(mailbox) {
            for message in moved {
                push_message(target, message.raw, message.flags, message.internal_date);
            }
        }
        Ok(())
    }

    fn mark_deleted(&mut self, uids: &[u32]) -> Result<(), ProtocolError> {
        self.check("store")?;
        let selected = self.selected("store")?;
        let mut store = self.lock();
        if let Some(folder) = store.folders.get_mut(&selected) {
            for message in folder.messages.iter_mut().filter(|m| uids.contains(&m.uid)) {
                if !message.has_flag("\\Deleted") {
                    message.flags.push("\\Deleted".to_string());
                }
            }
        }
        Ok(())
    }

    fn expunge(&mut self) -> Result<(), ProtocolError> {
        self.check("expunge")?;
        let selected = self.selected("expunge")?;
        let mut store = self.lock();
        store.expunges += 1;
        if let Some(folder) = store.folders.get_mut(&selected) {
            folder.messages.retain(|m| !m.has_flag("\\Deleted"));
        }
        Ok(())
    }

    fn logout(&mut self) -> Result<(), ProtocolError> {
        self.selected = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_store_but_not_selection() {
        let mut reader = MemoryMailbox::new();
        reader.create("INBOX");
        let mut writer = reader.clone();

        reader.select("INBOX").unwrap();
        writer
            .append("INBOX", b"Subject: x\r\n\r\n", &["\\Seen".to_string()], None)
            .unwrap();
        assert_eq!(reader.messages("INBOX").len(), 1);
        assert!(writer.search(&SearchCriteria::default()).is_err());
    }

    #[test]
    fn test_mark_and_expunge() {
        let mut mailbox = MemoryMailbox::new();
        let uid = mailbox.insert("INBOX", b"Subject: a\r\n\r\n", &[], None);
        mailbox.insert("INBOX", b"Subject: b\r\n\r\n", &[], None);
        mailbox.select("INBOX").unwrap();
        mailbox.mark_deleted(&[uid]).unwrap();
        assert_eq!(mailbox.messages("INBOX").len(), 2);
        mailbox.expunge().unwrap();
        assert_eq!(mailbox.messages("INBOX").len(), 1);
        assert_eq!(mailbox.expunge_count(), 1);
    }

    #[test]
    fn test_move_to_trash() {
        let mut mailbox = MemoryMailbox::new();
        mailbox.create_trash("Trash");
        let uid = mailbox.insert("INBOX", b"Subject: a\r\n\r\n", &["\\Seen"], None);
        mailbox.select("INBOX").unwrap();
        mailbox.move_to(&[uid], "Trash").unwrap();
        assert!(mailbox.messages("INBOX").is_empty());
        assert_eq!(mailbox.messages("Trash")[0].flags, vec!["\\Seen"]);
    }

    #[test]
    fn test_append_drops_recent_flag() {
        let mut mailbox = MemoryMailbox::new();
        mailbox.create("INBOX");
        mailbox
            .append(
                "INBOX",
                b"Subject: a\r\n\r\n",
                &["\\Recent".to_string(), "\\Seen".to_string()],
                None,
            )
            .unwrap();
        assert_eq!(mailbox.messages("INBOX")[0].flags, vec!["\\Seen"]);
    }

    #[test]
    fn test_headers_only_fetch() {
        let mut mailbox = MemoryMailbox::new();
        let uid = mailbox.insert("INBOX", b"Subject: a\r\n\r\nsecret body", &[], None);
        mailbox.select("INBOX").unwrap();
        let (tx, rx) = std::sync::mpsc::sync_channel(4);
        mailbox.fetch(&[uid], FetchMode::HeadersOnly, &tx).unwrap();
        let fetched = rx.recv().unwrap();
        assert_eq!(fetched.body.unwrap(), b"Subject: a\r\n");
        assert_eq!(fetched.envelope.subject, "a");
    }
}
