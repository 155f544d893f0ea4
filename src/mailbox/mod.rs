//! The remote mailbox boundary.
//!
//! [`MailboxSession`] is the only way the engine talks to a server. The IMAP
//! adapter lives in [`imap`]; [`memory`] provides an in-process mailbox with
//! the same behavior for tests and dry runs against fixtures.

pub mod imap;
pub mod memory;
pub mod search;
pub mod stream;

use std::sync::mpsc::SyncSender;

use chrono::{DateTime, Utc};

use crate::error::ProtocolError;
use crate::model::message::{FetchMode, FetchedMessage};

pub use memory::MemoryMailbox;
pub use search::SearchCriteria;
pub use stream::{with_stream, MessageStream};

/// One mailbox as reported by `LIST`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxInfo {
    pub name: String,
    /// `false` for `\Noselect` containers.
    pub selectable: bool,
    /// Carries the `\Trash` special-use attribute (RFC 6154).
    pub trash: bool,
}

/// Operations the engine needs from a logged-in mailbox connection.
///
/// All UIDs refer to the currently selected mailbox.
pub trait MailboxSession: Send {
    fn list_mailboxes(&mut self) -> Result<Vec<MailboxInfo>, ProtocolError>;

    /// Select `mailbox` and return its message count.
    fn select(&mut self, mailbox: &str) -> Result<u32, ProtocolError>;

    fn search(&mut self, criteria: &SearchCriteria) -> Result<Vec<u32>, ProtocolError>;

    /// Fetch `uids` and push each message into `sink` as it arrives.
    ///
    /// Implementations stop early, returning `Ok`, once the receiving side
    /// has hung up.
    fn fetch(
        &mut self,
        uids: &[u32],
        mode: FetchMode,
        sink: &SyncSender<FetchedMessage>,
    ) -> Result<(), ProtocolError>;

    /// Store a complete message in `mailbox` with the given flags and date.
    fn append(
        &mut self,
        mailbox: &str,
        raw: &[u8],
        flags: &[String],
        date: Option<DateTime<Utc>>,
    ) -> Result<(), ProtocolError>;

    fn move_to(&mut self, uids: &[u32], mailbox: &str) -> Result<(), ProtocolError>;

    /// Add `\Deleted` to `uids`.
    fn mark_deleted(&mut self, uids: &[u32]) -> Result<(), ProtocolError>;

    fn expunge(&mut self) -> Result<(), ProtocolError>;

    fn logout(&mut self) -> Result<(), ProtocolError>;
}

/// Flags that may be set on an appended message (`\Recent` is server-owned).
pub fn appendable_flags(flags: &[String]) -> Vec<String> {
    flags
        .iter()
        .filter(|f| !f.eq_ignore_ascii_case("\\Recent"))
        .cloned()
        .collect()
}

/// Compact UID set: `1:3,7,9:10`.
pub fn uid_set(uids: &[u32]) -> String {
    let mut sorted = uids.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut ranges: Vec<String> = Vec::new();
    let mut iter = sorted.into_iter().peekable();
    while let Some(start) = iter.next() {
        let mut end = start;
        while iter.peek() == Some(&(end + 1)) {
            end += 1;
            iter.next();
        }
        if start == end {
            ranges.push(start.to_string());
        } else {
            ranges.push(format!("{start}:{end}"));
        }
    }
    ranges.join(",")
}
