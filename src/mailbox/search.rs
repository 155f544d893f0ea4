//! Search criteria derived from a rule.

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::model::message::Envelope;
use crate::model::rule::Rule;
use crate::parser::header::{decode_encoded_words, split_message, HeaderBlock};
use crate::report::human_size;

/// What a rule asks the server to find.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchCriteria {
    /// Only `\Seen` messages.
    pub seen_only: bool,
    /// Skip `\Flagged` messages.
    pub unflagged_only: bool,
    /// `Date:` header strictly before this day.
    pub sent_before: Option<NaiveDate>,
    /// Strictly larger than this many bytes.
    pub larger_than: Option<u64>,
    pub text: Option<String>,
    pub body: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub subject: Option<String>,
    /// Rule age filter in days, kept for the summary.
    older_than_days: u32,
}

impl SearchCriteria {
    /// Criteria for `rule`, with ages measured back from `now`.
    pub fn from_rule(rule: &Rule, now: DateTime<Utc>) -> Self {
        let sent_before = (rule.older_than > 0)
            .then(|| (now - Duration::days(i64::from(rule.older_than))).date_naive());
        Self {
            seen_only: !rule.include_unread,
            unflagged_only: !rule.include_starred,
            sent_before,
            larger_than: (rule.min_size > 0).then_some(rule.min_size),
            text: rule.text.clone(),
            body: rule.body.clone(),
            from: rule.from.clone(),
            to: rule.to.clone(),
            subject: rule.subject.clone(),
            older_than_days: rule.older_than,
        }
    }

    /// IMAP `SEARCH` keys (RFC 3501 §6.4.4). `ALL` when nothing is filtered.
    pub fn to_imap_query(&self) -> String {
        let mut keys: Vec<String> = Vec::new();
        if self.seen_only {
            keys.push("SEEN".into());
        }
        if self.unflagged_only {
            keys.push("UNFLAGGED".into());
        }
        if let Some(date) = self.sent_before {
            keys.push(format!("SENTBEFORE {}", date.format("%d-%b-%Y")));
        }
        if let Some(size) = self.larger_than {
            keys.push(format!("LARGER {size}"));
        }
        if let Some(text) = &self.text {
            keys.push(format!("TEXT {}", quote(text)));
        }
        if let Some(body) = &self.body {
            keys.push(format!("BODY {}", quote(body)));
        }
        for (name, value) in self.header_filters() {
            keys.push(format!("HEADER {name} {}", quote(value)));
        }

        if keys.is_empty() {
            "ALL".to_string()
        } else {
            keys.join(" ")
        }
    }

    /// Human summary for the log: `read, unstarred, older: 30 days`.
    pub fn summary(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if self.seen_only {
            parts.push("read".into());
        }
        if self.unflagged_only {
            parts.push("unstarred".into());
        }
        if self.sent_before.is_some() {
            parts.push(format!("older: {} days", self.older_than_days));
        }
        if let Some(size) = self.larger_than {
            parts.push(format!("larger: {}", human_size(size)));
        }
        if let Some(text) = &self.text {
            parts.push(format!("containing: \"{text}\""));
        }
        if let Some(body) = &self.body {
            parts.push(format!("body: \"{body}\""));
        }
        for (name, value) in self.header_filters() {
            parts.push(format!("{}: \"{value}\"", name.to_lowercase()));
        }
        if parts.is_empty() {
            "all messages".to_string()
        } else {
            parts.join(", ")
        }
    }

    fn header_filters(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("From", self.from.as_deref()),
            ("To", self.to.as_deref()),
            ("Subject", self.subject.as_deref()),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, v)))
    }

    /// Evaluate the criteria locally against a stored message.
    ///
    /// Substring matches are case-insensitive, as IMAP servers do.
    pub fn matches(&self, raw: &[u8], flags: &[String], size: u64) -> bool {
        let has_flag = |flag: &str| flags.iter().any(|f| f.eq_ignore_ascii_case(flag));
        if self.seen_only && !has_flag("\\Seen") {
            return false;
        }
        if self.unflagged_only && has_flag("\\Flagged") {
            return false;
        }
        if let Some(limit) = self.larger_than {
            if size <= limit {
                return false;
            }
        }
        if let Some(before) = self.sent_before {
            match Envelope::from_headers(raw).date {
                Some(date) if date.date_naive() < before => {}
                _ => return false,
            }
        }

        let (head, body) = split_message(raw);
        let body_text = String::from_utf8_lossy(body);
        if let Some(needle) = &self.body {
            if !contains_ci(&body_text, needle) {
                return false;
            }
        }
        if let Some(needle) = &self.text {
            let whole = String::from_utf8_lossy(raw);
            if !contains_ci(&decode_encoded_words(&whole), needle) {
                return false;
            }
        }

        let block = HeaderBlock::parse(head);
        self.header_filters().all(|(name, needle)| {
            block
                .get(name)
                .map(|value| contains_ci(&decode_encoded_words(&value), needle))
                .unwrap_or(false)
        })
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// IMAP quoted string.
fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}
