//! [`MailboxSession`] over a live IMAP connection.

use std::sync::mpsc::SyncSender;

use ::imap::types::Flag;
use ::imap::{ClientBuilder, ConnectionMode, TlsKind};
use chrono::{DateTime, Utc};
use tracing::debug;

use super::{appendable_flags, uid_set, MailboxInfo, MailboxSession, SearchCriteria};
use crate::config::Account;
use crate::error::ProtocolError;
use crate::model::message::{Envelope, FetchMode, FetchedMessage};

/// UIDs requested per `UID FETCH` command.
const FETCH_CHUNK: usize = 100;

/// A logged-in IMAP session.
pub struct ImapSession {
    session: ::imap::Session<::imap::Connection>,
}

impl std::fmt::Debug for ImapSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapSession").finish_non_exhaustive()
    }
}

impl ImapSession {
    /// Connect and log in to the account's server.
    pub fn connect(account: &Account) -> Result<Self, ProtocolError> {
        let mode = if account.ssl {
            ConnectionMode::Tls
        } else {
            ConnectionMode::Plaintext
        };
        debug!(host = %account.host, port = account.port, ssl = account.ssl, "Connecting");

        let client = ClientBuilder::new(account.host.as_str(), account.port)
            .tls_kind(TlsKind::Native)
            .mode(mode)
            .connect()
            .map_err(|e| ProtocolError::new("connect", e))?;
        let session = client
            .login(&account.user, &account.pass)
            .map_err(|(e, _client)| ProtocolError::new("login", e))?;
        Ok(Self { session })
    }
}

fn fetch_query(mode: FetchMode) -> &'static str {
    match mode {
        FetchMode::Full => "(UID FLAGS RFC822.SIZE INTERNALDATE BODY.PEEK[])",
        FetchMode::HeadersOnly => "(UID FLAGS RFC822.SIZE INTERNALDATE BODY.PEEK[HEADER])",
    }
}

impl MailboxSession for ImapSession {
    fn list_mailboxes(&mut self) -> Result<Vec<MailboxInfo>, ProtocolError> {
        let names = self
            .session
            .list(Some(""), Some("*"))
            .map_err(|e| ProtocolError::new("list", e))?;
        Ok(names
            .iter()
            .map(|name| {
                let attributes: Vec<_> = name.attributes().into_iter().collect();
                MailboxInfo {
                    name: name.name().to_string(),
                    selectable: !attributes
                        .iter()
                        .any(|a| matches!(a, imap_proto::NameAttribute::NoSelect)),
                    trash: attributes
                        .iter()
                        .any(|a| matches!(a, imap_proto::NameAttribute::Trash)),
                }
            })
            .collect())
    }

    fn select(&mut self, mailbox: &str) -> Result<u32, ProtocolError> {
        let selected = self
            .session
            .select(mailbox)
            .map_err(|e| ProtocolError::new("select", e))?;
        Ok(selected.exists)
    }

    fn search(&mut self, criteria: &SearchCriteria) -> Result<Vec<u32>, ProtocolError> {
        let query = criteria.to_imap_query();
        debug!(query = %query, "UID SEARCH");
        let found = self
            .session
            .uid_search(&query)
            .map_err(|e| ProtocolError::new("search", e))?;
        let mut uids: Vec<u32> = found.into_iter().collect();
        uids.sort_unstable();
        Ok(uids)
    }

    fn fetch(
        &mut self,
        uids: &[u32],
        mode: FetchMode,
        sink: &SyncSender<FetchedMessage>,
    ) -> Result<(), ProtocolError> {
        for chunk in uids.chunks(FETCH_CHUNK) {
            let fetches = self
                .session
                .uid_fetch(uid_set(chunk), fetch_query(mode))
                .map_err(|e| ProtocolError::new("fetch", e))?;

            for fetch in fetches.iter() {
                let Some(uid) = fetch.uid else {
                    continue;
                };
                let body = match mode {
                    FetchMode::Full => fetch.body(),
                    FetchMode::HeadersOnly => fetch.header(),
                };
                let envelope = body.map(Envelope::from_headers).unwrap_or_default();
                let message = FetchedMessage {
                    uid,
                    flags: fetch.flags().into_iter().map(|f| f.to_string()).collect(),
                    size: fetch.size.map(u64::from).unwrap_or_default(),
                    internal_date: fetch.internal_date().map(|d| d.with_timezone(&Utc)),
                    envelope,
                    body: body.map(<[u8]>::to_vec),
                };
                if sink.send(message).is_err() {
                    debug!("Message consumer hung up, stopping fetch");
                    return Ok(());
                }
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
        let flags: Vec<Flag<'static>> = appendable_flags(flags).into_iter().map(Flag::from).collect();
        let result = match date {
            Some(date) => self
                .session
                .append(mailbox, raw)
                .flags(flags)
                .internal_date(date.fixed_offset())
                .finish(),
            None => self.session.append(mailbox, raw).flags(flags).finish(),
        };
        result
            .map(|_| ())
            .map_err(|e| ProtocolError::new("append", e))
    }

    fn move_to(&mut self, uids: &[u32], mailbox: &str) -> Result<(), ProtocolError> {
        self.session
            .uid_mv(uid_set(uids), mailbox)
            .map_err(|e| ProtocolError::new("move", e))
    }

    fn mark_deleted(&mut self, uids: &[u32]) -> Result<(), ProtocolError> {
        self.session
            .uid_store(uid_set(uids), "+FLAGS.SILENT (\\Deleted)")
            .map(|_| ())
            .map_err(|e| ProtocolError::new("store", e))
    }

    fn expunge(&mut self) -> Result<(), ProtocolError> {
        self.session
            .expunge()
            .map(|_| ())
            .map_err(|e| ProtocolError::new("expunge", e))
    }

    fn logout(&mut self) -> Result<(), ProtocolError> {
        self.session
            .logout()
            .map_err(|e| ProtocolError::new("logout", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_query_peeks() {
        assert!(fetch_query(FetchMode::Full).contains("BODY.PEEK[]"));
        assert!(fetch_query(FetchMode::HeadersOnly).contains("BODY.PEEK[HEADER]"));
    }
}
