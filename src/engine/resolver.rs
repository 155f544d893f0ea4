//! Decide what happens to the original message once a rule has matched it.
//!
//! ```text
//! Matched ──┬──> TransformApplied{removed} ──┬──> Retired
//!           ├──> TransformSkipped ───────────┼──> Kept
//!           └────────────────────────────────┘
//! ```

use tracing::{debug, info};

use crate::error::ProtocolError;
use crate::mailbox::{MailboxInfo, MailboxSession};
use crate::model::rule::ActionSet;

/// Host whose accounts only support deleting by moving to the trash.
const GMAIL_HOST: &str = "imap.gmail.com";

/// Where a message stands in its resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageState {
    /// Found by the rule's search; no rewrite attempted.
    Matched,
    /// The rewrite ran; `removed` parts were taken out.
    TransformApplied { removed: usize },
    /// The rewrite failed or had nothing to work on.
    TransformSkipped,
    /// The original was moved to the trash or expunged.
    Retired,
    /// The original stays where it is.
    Kept,
}

/// What to do with the original.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Retire,
    Keep,
}

impl MessageState {
    /// Resolve a pre-retirement state against the rule's actions.
    pub fn decide(self, actions: &ActionSet) -> Decision {
        let retire = match self {
            Self::Matched => actions.is_delete(),
            Self::TransformApplied { removed } => {
                (actions.is_remove_attachments() && removed >= 1) || actions.is_delete()
            }
            Self::TransformSkipped | Self::Retired | Self::Kept => false,
        };
        if retire {
            Decision::Retire
        } else {
            Decision::Keep
        }
    }
}

/// How originals are retired, fixed for the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetirementStrategy {
    /// `UID MOVE` into the named trash mailbox.
    MoveToTrash(String),
    /// Flag `\Deleted` and expunge.
    MarkAndExpunge,
}

impl RetirementStrategy {
    /// Choose the strategy for an account.
    ///
    /// The mailbox list is only consulted when `use_trash` is set or the
    /// account is on Gmail. When several mailboxes carry `\Trash`, the last
    /// one listed wins.
    pub fn detect(
        session: &mut dyn MailboxSession,
        use_trash: bool,
        host: &str,
    ) -> Result<Self, ProtocolError> {
        if !use_trash && !host.eq_ignore_ascii_case(GMAIL_HOST) {
            return Ok(Self::MarkAndExpunge);
        }
        Ok(Self::from_mailboxes(&session.list_mailboxes()?))
    }

    pub fn from_mailboxes(mailboxes: &[MailboxInfo]) -> Self {
        match mailboxes.iter().rev().find(|m| m.trash) {
            Some(trash) => {
                debug!(mailbox = %trash.name, "Deleted messages will be moved to trash");
                Self::MoveToTrash(trash.name.clone())
            }
            None => Self::MarkAndExpunge,
        }
    }

    /// Retire `uid` from the mailbox selected on `session`.
    pub fn retire(&self, session: &mut dyn MailboxSession, uid: u32) -> Result<(), ProtocolError> {
        match self {
            Self::MoveToTrash(trash) => {
                session.move_to(&[uid], trash)?;
                info!(uid, trash = %trash, "Moved original message to trash");
            }
            Self::MarkAndExpunge => {
                session.mark_deleted(&[uid])?;
                session.expunge()?;
                info!(uid, "Deleted original message");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::MemoryMailbox;

    fn actions(raw: &str) -> ActionSet {
        ActionSet::parse(raw, 1).unwrap()
    }

    #[test]
    fn test_remove_attachments_retires_only_after_removal() {
        let set = actions("remove_attachments");
        assert_eq!(MessageState::TransformApplied { removed: 2 }.decide(&set), Decision::Retire);
        assert_eq!(MessageState::TransformApplied { removed: 0 }.decide(&set), Decision::Keep);
        assert_eq!(MessageState::TransformSkipped.decide(&set), Decision::Keep);
    }

    #[test]
    fn test_delete_retires() {
        assert_eq!(MessageState::Matched.decide(&actions("delete")), Decision::Retire);
        let set = actions("delete, save_attachments");
        assert_eq!(MessageState::TransformApplied { removed: 0 }.decide(&set), Decision::Retire);
        assert_eq!(MessageState::TransformSkipped.decide(&set), Decision::Keep);
    }

    #[test]
    fn test_save_only_keeps() {
        let set = actions("save_attachments");
        assert_eq!(MessageState::TransformApplied { removed: 3 }.decide(&set), Decision::Keep);
    }

    fn info(name: &str, trash: bool) -> MailboxInfo {
        MailboxInfo {
            name: name.to_string(),
            selectable: true,
            trash,
        }
    }

    #[test]
    fn test_last_trash_wins() {
        let list = [info("INBOX", false), info("Bin", true), info("[Gmail]/Trash", true)];
        assert_eq!(
            RetirementStrategy::from_mailboxes(&list),
            RetirementStrategy::MoveToTrash("[Gmail]/Trash".to_string())
        );
        assert_eq!(
            RetirementStrategy::from_mailboxes(&[info("INBOX", false)]),
            RetirementStrategy::MarkAndExpunge
        );
    }

    #[test]
    fn test_detect_skips_listing_unless_requested() {
        let mut mailbox = MemoryMailbox::new();
        mailbox.create_trash("Trash");
        mailbox.fail_next("list");
        let strategy = RetirementStrategy::detect(&mut mailbox, false, "imap.example.com").unwrap();
        assert_eq!(strategy, RetirementStrategy::MarkAndExpunge);

        // The injected failure is still pending, so listing is attempted now
        assert!(RetirementStrategy::detect(&mut mailbox, false, "IMAP.GMAIL.COM").is_err());
        let strategy = RetirementStrategy::detect(&mut mailbox, true, "imap.example.com").unwrap();
        assert_eq!(strategy, RetirementStrategy::MoveToTrash("Trash".to_string()));
    }
}
