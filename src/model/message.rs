//! Messages as handed over by the mailbox collaborator.

use chrono::{DateTime, Utc};

use super::address::EmailAddress;
use crate::parser::header::{decode_encoded_words, parse_date, HeaderBlock};

/// Archive owner used when a message has no parsable sender.
pub const UNKNOWN_OWNER: &str = "no-email";

/// The envelope fields the engine needs, parsed from the message headers.
#[derive(Debug, Clone, Default)]
pub struct Envelope {
    /// Parsed `Date:` header.
    pub date: Option<DateTime<Utc>>,
    /// First `From:` mailbox.
    pub from: Option<EmailAddress>,
    /// Decoded subject line.
    pub subject: String,
}

impl Envelope {
    /// Build an envelope from raw header (or full message) bytes.
    pub fn from_headers(raw: &[u8]) -> Self {
        let block = HeaderBlock::parse(raw);
        let date = block.get("date").and_then(|d| parse_date(&d));
        let from = block
            .get("from")
            .and_then(|f| EmailAddress::parse_first(&decode_encoded_words(&f)));
        let subject = block
            .get("subject")
            .map(|s| decode_encoded_words(&s))
            .unwrap_or_default();
        Self {
            date,
            from,
            subject,
        }
    }

    /// Sender address used to group archived attachments.
    pub fn owner(&self) -> &str {
        self.from
            .as_ref()
            .map(|a| a.address.as_str())
            .filter(|a| !a.is_empty())
            .unwrap_or(UNKNOWN_OWNER)
    }
}

/// How much of each message the collaborator should download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Headers only; enough to list matches.
    HeadersOnly,
    /// The complete RFC 5322 message.
    Full,
}

/// One message delivered by a fetch.
#[derive(Debug, Clone)]
pub struct FetchedMessage {
    pub uid: u32,
    /// IMAP flags in wire form (`\Seen`, `\Flagged`, keywords).
    pub flags: Vec<String>,
    /// `RFC822.SIZE` in bytes.
    pub size: u64,
    pub internal_date: Option<DateTime<Utc>>,
    pub envelope: Envelope,
    /// Complete message bytes; `None` when only headers were fetched.
    pub body: Option<Vec<u8>>,
}

impl FetchedMessage {
    /// Timestamp that best represents when the message was sent.
    pub fn sent_date(&self) -> DateTime<Utc> {
        self.envelope
            .date
            .or(self.internal_date)
            .unwrap_or(DateTime::UNIX_EPOCH)
    }

    pub fn is_flagged(&self) -> bool {
        self.flags.iter().any(|f| f.eq_ignore_ascii_case("\\Flagged"))
    }
}
