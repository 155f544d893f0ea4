//! Validated rules: one mailbox filter plus the actions to apply to matches.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::config::RuleConfig;
use crate::error::ConfigError;

/// One of the fixed rule actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Action {
    Delete,
    SaveAttachments,
    RemoveAttachments,
}

impl Action {
    /// Configuration token for this action.
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Delete => "delete",
            Action::SaveAttachments => "save_attachments",
            Action::RemoveAttachments => "remove_attachments",
        }
    }
}

impl FromStr for Action {
    type Err = String;

    /// Parse an already case-folded, trimmed token.
    fn from_str(token: &str) -> std::result::Result<Self, Self::Err> {
        match token {
            "delete" => Ok(Action::Delete),
            "save_attachments" => Ok(Action::SaveAttachments),
            "remove_attachments" => Ok(Action::RemoveAttachments),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A non-empty, normalized set of actions.
///
/// Always free of the `delete` + `remove_attachments` conflict once built
/// through [`ActionSet::parse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSet(BTreeSet<Action>);

impl ActionSet {
    /// Parse a comma-separated action list as written in a rule.
    ///
    /// Tokens are lower-cased and trimmed. `rule` is only used to label errors.
    pub fn parse(raw: &str, rule: usize) -> std::result::Result<Self, ConfigError> {
        if raw.trim().is_empty() {
            return Err(ConfigError::MissingActions { rule });
        }

        let lowered = raw.to_lowercase();
        let mut actions = BTreeSet::new();
        for token in lowered.split(',') {
            let action = token
                .trim()
                .parse::<Action>()
                .map_err(|token| ConfigError::UnknownAction { rule, token })?;
            actions.insert(action);
        }

        if actions.contains(&Action::Delete) && actions.contains(&Action::RemoveAttachments) {
            return Err(ConfigError::ConflictingActions { rule });
        }

        Ok(Self(actions))
    }

    pub fn is_delete(&self) -> bool {
        self.0.contains(&Action::Delete)
    }

    pub fn is_remove_attachments(&self) -> bool {
        self.0.contains(&Action::RemoveAttachments)
    }

    pub fn is_save_attachments(&self) -> bool {
        self.0.contains(&Action::SaveAttachments)
    }

    /// Whether matched messages need to be downloaded and rewritten.
    pub fn needs_rewrite(&self) -> bool {
        self.is_remove_attachments() || self.is_save_attachments()
    }

    pub fn iter(&self) -> impl Iterator<Item = Action> + '_ {
        self.0.iter().copied()
    }
}

impl fmt::Display for ActionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tokens: Vec<&str> = self.iter().map(Action::as_str).collect();
        f.write_str(&tokens.join(", "))
    }
}

impl Serialize for ActionSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A validated filter + action declaration scoped to one mailbox.
#[derive(Debug, Clone, Serialize)]
pub struct Rule {
    /// Mailbox to search.
    pub mailbox: String,
    /// Minimum message size in bytes (0 = no filter).
    pub min_size: u64,
    /// Only messages sent more than this many days ago (0 = no filter).
    pub older_than: u32,
    pub from: Option<String>,
    pub to: Option<String>,
    pub subject: Option<String>,
    /// Substring searched in the message body only.
    pub body: Option<String>,
    /// Substring searched in headers and body.
    pub text: Option<String>,
    pub include_unread: bool,
    pub include_starred: bool,
    pub actions: ActionSet,
}

impl Rule {
    /// Validate one configured rule. `index` is 1-based and used in errors.
    pub fn validate(index: usize, raw: &RuleConfig) -> std::result::Result<Self, ConfigError> {
        let mailbox = raw.mailbox.trim();
        if mailbox.is_empty() {
            return Err(ConfigError::MissingMailbox { rule: index });
        }

        let actions = ActionSet::parse(&raw.actions, index)?;
        let min_size = raw
            .min_size
            .checked_mul(1024)
            .ok_or(ConfigError::InvalidSize {
                rule: index,
                kilobytes: raw.min_size,
            })?;

        Ok(Self {
            mailbox: mailbox.to_string(),
            min_size,
            older_than: raw.older_than,
            from: non_empty(&raw.from),
            to: non_empty(&raw.to),
            subject: non_empty(&raw.subject),
            body: non_empty(&raw.body),
            text: non_empty(&raw.text),
            include_unread: raw.include_unread,
            include_starred: raw.include_starred,
            actions,
        })
    }

    pub fn is_delete(&self) -> bool {
        self.actions.is_delete()
    }

    pub fn is_remove_attachments(&self) -> bool {
        self.actions.is_remove_attachments()
    }

    pub fn is_save_attachments(&self) -> bool {
        self.actions.is_save_attachments()
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
