//! Rule execution: search, list, rewrite, append, retire.
//!
//! Rules run strictly in order and matched messages are handled one at a
//! time, so mailbox mutations never interleave across messages.

pub mod resolver;

use std::io::Write;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::error::ProtocolError;
use crate::mailbox::{with_stream, MailboxSession, SearchCriteria};
use crate::model::message::{FetchMode, FetchedMessage};
use crate::model::rule::Rule;
use crate::report::{match_line, total_line};
use crate::rewrite::Rewriter;
use crate::store::AttachmentStore;

pub use resolver::{Decision, MessageState, RetirementStrategy};

/// Totals for one rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleReport {
    pub mailbox: String,
    pub matched: usize,
    pub total_size: u64,
    /// Rewritten messages appended back to the mailbox.
    pub appended: usize,
    /// Attachment parts removed across all messages.
    pub removed: usize,
    pub retired: usize,
    /// Set when the rule was abandoned because of a server error.
    pub error: Option<String>,
}

/// Totals for a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub rules: Vec<RuleReport>,
}

impl RunReport {
    pub fn retired(&self) -> usize {
        self.rules.iter().map(|r| r.retired).sum()
    }

    pub fn failed_rules(&self) -> usize {
        self.rules.iter().filter(|r| r.error.is_some()).count()
    }
}

/// Applies the configured rules to an account.
pub struct Scrubber<'a> {
    reader: &'a mut dyn MailboxSession,
    writer: &'a mut dyn MailboxSession,
    settings: &'a Settings,
    store: AttachmentStore,
    strategy: RetirementStrategy,
    perform: bool,
    now: DateTime<Utc>,
}

impl<'a> Scrubber<'a> {
    /// Prepare a run. `perform` is false for a dry run that only lists.
    ///
    /// The retirement strategy is detected here, once, using `reader`.
    pub fn new(
        reader: &'a mut dyn MailboxSession,
        writer: &'a mut dyn MailboxSession,
        settings: &'a Settings,
        perform: bool,
    ) -> Result<Self, ProtocolError> {
        let strategy =
            RetirementStrategy::detect(reader, settings.use_trash, &settings.account.host)?;
        Ok(Self {
            reader,
            writer,
            settings,
            store: AttachmentStore::new(&settings.save_path),
            strategy,
            perform,
            now: Utc::now(),
        })
    }

    /// Measure rule ages from `now` instead of the current time.
    pub fn with_clock(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn strategy(&self) -> &RetirementStrategy {
        &self.strategy
    }

    /// Run every rule in order, writing the match listing to `out`.
    pub fn run(&mut self, out: &mut dyn Write) -> RunReport {
        let settings = self.settings;
        let mut report = RunReport::default();
        for rule in &settings.rules {
            let mut rule_report = RuleReport {
                mailbox: rule.mailbox.clone(),
                ..RuleReport::default()
            };
            if let Err(e) = self.run_rule(rule, out, &mut rule_report) {
                error!(mailbox = %rule.mailbox, error = %e, "Rule aborted");
                rule_report.error = Some(e.to_string());
            }
            report.rules.push(rule_report);
        }
        report
    }

    fn run_rule(
        &mut self,
        rule: &Rule,
        out: &mut dyn Write,
        report: &mut RuleReport,
    ) -> Result<(), ProtocolError> {
        let count = self.reader.select(&rule.mailbox)?;
        if count == 0 {
            debug!(mailbox = %rule.mailbox, "Mailbox is empty");
            return Ok(());
        }

        let criteria = SearchCriteria::from_rule(rule, self.now);
        debug!(mailbox = %rule.mailbox, criteria = %criteria.summary(), "Searching");
        let uids = self.reader.search(&criteria)?;
        if uids.is_empty() {
            debug!(mailbox = %rule.mailbox, "Search returned 0 results");
            return Ok(());
        }

        if self.perform {
            self.writer.select(&rule.mailbox)?;
        }

        let mode = if self.perform && rule.actions.needs_rewrite() {
            FetchMode::Full
        } else {
            FetchMode::HeadersOnly
        };

        let mut handler = MessageHandler {
            writer: &mut *self.writer,
            rewriter: Rewriter::new(&self.store),
            strategy: &self.strategy,
            perform: self.perform,
        };
        let reader = &mut *self.reader;

        with_stream(reader, &uids, mode, |stream| {
            for message in stream {
                report.matched += 1;
                report.total_size += message.size;
                listing(out, &match_line(report.matched, &message));
                handler.handle(rule, &message, report);
            }
        })?;

        if report.total_size > 0 {
            listing(out, &total_line(report.matched, report.total_size));
        }
        Ok(())
    }
}

fn listing(out: &mut dyn Write, line: &str) {
    if let Err(e) = writeln!(out, "{line}") {
        warn!(error = %e, "Could not write listing");
    }
}

/// Per-message work, borrowing what it needs from the [`Scrubber`].
struct MessageHandler<'s> {
    writer: &'s mut dyn MailboxSession,
    rewriter: Rewriter<'s>,
    strategy: &'s RetirementStrategy,
    perform: bool,
}

impl MessageHandler<'_> {
    fn handle(&mut self, rule: &Rule, message: &FetchedMessage, report: &mut RuleReport) {
        if !self.perform {
            return;
        }

        let state = if rule.actions.needs_rewrite() {
            self.transform(rule, message, report)
        } else {
            MessageState::Matched
        };

        let state = match state.decide(&rule.actions) {
            Decision::Retire => match self.strategy.retire(&mut *self.writer, message.uid) {
                Ok(()) => MessageState::Retired,
                Err(e) => {
                    error!(uid = message.uid, error = %e, "Could not retire original message");
                    MessageState::Kept
                }
            },
            Decision::Keep => MessageState::Kept,
        };
        if state == MessageState::Retired {
            report.retired += 1;
        }
    }

    /// Rewrite, and append the result when attachments were removed.
    fn transform(
        &mut self,
        rule: &Rule,
        message: &FetchedMessage,
        report: &mut RuleReport,
    ) -> MessageState {
        let transformed = match self.rewriter.rewrite(Some(message), &rule.actions) {
            Ok(transformed) => transformed,
            Err(e) if e.is_informational() => {
                debug!(uid = message.uid, reason = %e, "Skipping message");
                return MessageState::TransformSkipped;
            }
            Err(e) => {
                warn!(uid = message.uid, error = %e, "Could not rewrite message");
                return MessageState::TransformSkipped;
            }
        };

        if transformed.removed == 0 {
            warn!(uid = message.uid, "No attachments detected");
            return MessageState::TransformApplied { removed: 0 };
        }

        if rule.is_remove_attachments() {
            let date = message.envelope.date.or(message.internal_date);
            if let Err(e) =
                self.writer
                    .append(&rule.mailbox, &transformed.raw, &message.flags, date)
            {
                error!(uid = message.uid, error = %e, "Could not append rewritten message");
                return MessageState::TransformSkipped;
            }
            report.appended += 1;
            info!(uid = message.uid, count = transformed.removed, "Removed attachments");
        }

        report.removed += transformed.removed;
        MessageState::TransformApplied {
            removed: transformed.removed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::mailbox::MemoryMailbox;
    use chrono::TimeZone;
    use std::path::Path;

    fn settings(rules: &str, save_path: &Path) -> Settings {
        let toml_str = format!(
            "host = \"imap.example.com\"\nuser = \"u\"\npass = \"p\"\nsave_path = {:?}\n{rules}",
            save_path.display().to_string()
        );
        Config::parse(&toml_str, Path::new("test.toml"))
            .unwrap()
            .validate()
            .unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    const OLD_TEXT: &[u8] =
        b"From: a@example.com\r\nSubject: old\r\nDate: Mon, 01 Jan 2024 09:00:00 +0000\r\n\r\nhello\r\n";

    #[test]
    fn test_dry_run_lists_without_touching() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(
            "[[rules]]\nmailbox = \"INBOX\"\nactions = \"delete\"\n",
            dir.path(),
        );
        let mut mailbox = MemoryMailbox::new();
        mailbox.insert("INBOX", OLD_TEXT, &["\\Seen"], None);
        let mut reader = mailbox.clone();
        let mut writer = mailbox.clone();

        let mut out = Vec::new();
        let report = Scrubber::new(&mut reader, &mut writer, &settings, false)
            .unwrap()
            .with_clock(now())
            .run(&mut out);

        assert_eq!(report.rules[0].matched, 1);
        assert_eq!(report.retired(), 0);
        assert_eq!(mailbox.messages("INBOX").len(), 1);
        let listing = String::from_utf8(out).unwrap();
        assert!(listing.starts_with("#1    01-Jan-24"));
        assert!(listing.contains("1 message(s)"));
    }

    #[test]
    fn test_delete_rule_expunges() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(
            "[[rules]]\nmailbox = \"INBOX\"\nolder_than = 30\nactions = \"delete\"\n",
            dir.path(),
        );
        let mut mailbox = MemoryMailbox::new();
        mailbox.insert("INBOX", OLD_TEXT, &["\\Seen"], None);
        mailbox.insert(
            "INBOX",
            b"From: a@example.com\r\nDate: Fri, 31 May 2024 09:00:00 +0000\r\n\r\nnew\r\n",
            &["\\Seen"],
            None,
        );
        let mut reader = mailbox.clone();
        let mut writer = mailbox.clone();

        let report = Scrubber::new(&mut reader, &mut writer, &settings, true)
            .unwrap()
            .with_clock(now())
            .run(&mut std::io::sink());

        assert_eq!(report.rules[0].matched, 1);
        assert_eq!(report.retired(), 1);
        assert_eq!(mailbox.messages("INBOX").len(), 1);
        assert_eq!(mailbox.expunge_count(), 1);
    }

    #[test]
    fn test_missing_mailbox_fails_rule_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(
            "[[rules]]\nmailbox = \"Nope\"\nactions = \"delete\"\n\n\
[[rules]]\nmailbox = \"INBOX\"\nactions = \"delete\"\n",
            dir.path(),
        );
        let mut mailbox = MemoryMailbox::new();
        mailbox.insert("INBOX", OLD_TEXT, &["\\Seen"], None);
        let mut reader = mailbox.clone();
        let mut writer = mailbox.clone();

        let report = Scrubber::new(&mut reader, &mut writer, &settings, true)
            .unwrap()
            .run(&mut std::io::sink());

        assert_eq!(report.failed_rules(), 1);
        assert_eq!(report.rules[1].retired, 1);
    }

    #[test]
    fn test_append_failure_keeps_original() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(
            "[[rules]]\nmailbox = \"INBOX\"\nactions = \"remove_attachments\"\n",
            dir.path(),
        );
        let raw = b"From: a@example.com\r\n\
Content-Type: multipart/mixed; boundary=b\r\n\
\r\n\
--b\r\n\
Content-Type: text/plain\r\n\
\r\n\
hi\r\n\
--b\r\n\
Content-Type: application/zip\r\n\
Content-Disposition: attachment; filename=\"a.zip\"\r\n\
\r\n\
PK\r\n\
--b--\r\n";
        let mut mailbox = MemoryMailbox::new();
        mailbox.insert("INBOX", raw, &["\\Seen"], None);
        mailbox.fail_next("append");
        let mut reader = mailbox.clone();
        let mut writer = mailbox.clone();

        let report = Scrubber::new(&mut reader, &mut writer, &settings, true)
            .unwrap()
            .run(&mut std::io::sink());

        assert_eq!(report.rules[0].appended, 0);
        assert_eq!(report.retired(), 0);
        let left = mailbox.messages("INBOX");
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].raw, raw.to_vec());
    }

    const WITH_ZIP: &[u8] = b"From: a@example.com\r\n\
Content-Type: multipart/mixed; boundary=b\r\n\
\r\n\
--b\r\n\
Content-Type: text/plain\r\n\
\r\n\
hi\r\n\
--b\r\n\
Content-Type: application/zip\r\n\
Content-Disposition: attachment; filename=\"a.zip\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
UEsDBA==\r\n\
--b--\r\n";

    #[test]
    fn test_unwritable_archive_keeps_original() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("archive");
        std::fs::write(&root, b"a file where the archive directory should be").unwrap();

        for actions in ["remove_attachments, save_attachments", "delete, save_attachments"] {
            let settings = settings(
                &format!("[[rules]]\nmailbox = \"INBOX\"\nactions = \"{actions}\"\n"),
                &root,
            );
            let mut mailbox = MemoryMailbox::new();
            mailbox.insert("INBOX", WITH_ZIP, &["\\Seen"], None);
            let mut reader = mailbox.clone();
            let mut writer = mailbox.clone();

            let report = Scrubber::new(&mut reader, &mut writer, &settings, true)
                .unwrap()
                .run(&mut std::io::sink());

            let rule = &report.rules[0];
            assert_eq!(rule.matched, 1, "{actions}");
            assert_eq!(rule.appended, 0, "{actions}");
            assert_eq!(rule.retired, 0, "{actions}");
            assert!(rule.error.is_none(), "{actions}");
            let left = mailbox.messages("INBOX");
            assert_eq!(left.len(), 1, "{actions}");
            assert_eq!(left[0].raw, WITH_ZIP.to_vec(), "{actions}");
            assert_eq!(mailbox.expunge_count(), 0, "{actions}");
        }
    }
}
