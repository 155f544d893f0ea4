//! Console listing of matched messages.

use humansize::{format_size, BINARY};

use crate::model::address::EmailAddress;
use crate::model::message::FetchedMessage;

/// Width of the sender column.
const SENDER_WIDTH: usize = 47;

/// Width of the subject column.
const SUBJECT_WIDTH: usize = 60;

/// Human-readable byte size (`"1.50 MiB"`).
pub fn human_size(bytes: u64) -> String {
    format_size(bytes, BINARY)
}

/// Shorten `raw` to at most `length` characters, ending in `...` when cut.
pub fn truncate(raw: &str, length: usize) -> String {
    if raw.chars().count() <= length {
        return raw.to_string();
    }
    let kept: String = raw.chars().take(length.saturating_sub(3)).collect();
    format!("{kept}...")
}

/// `Name <address>` padded to the sender column, name shortened first.
pub fn format_sender(from: Option<&EmailAddress>) -> String {
    let Some(from) = from else {
        return format!("{:<SENDER_WIDTH$}", "Unknown sender");
    };
    let email = format!(" <{}>", from.address);
    let remaining = (SENDER_WIDTH - 2).saturating_sub(email.chars().count());
    let name = if remaining > 5 {
        truncate(&from.name, remaining)
    } else {
        String::new()
    };
    format!("{:<SENDER_WIDTH$}", format!("{name}{email}").trim())
}

/// One listing line: `#N    dd-Mon-yy  sender subject *   size`.
pub fn match_line(index: usize, message: &FetchedMessage) -> String {
    let starred = if message.is_flagged() { "*" } else { " " };
    format!(
        "#{index:<4} {}  {} {:<width$} {starred}{:>10}",
        message.sent_date().format("%d-%b-%y"),
        format_sender(message.envelope.from.as_ref()),
        truncate(&message.envelope.subject, SUBJECT_WIDTH),
        human_size(message.size),
        width = SUBJECT_WIDTH + 2,
    )
}

/// Summary printed after a rule's matches.
pub fn total_line(count: usize, total_bytes: u64) -> String {
    format!("{count} message(s), {} total", human_size(total_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::message::Envelope;

    #[test]
    fn test_truncate_is_char_aware() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ñandú ñandú ñandú", 8), "ñandú...");
        assert_eq!(truncate("abc", 2), "...");
    }

    #[test]
    fn test_format_sender_pads_and_truncates() {
        let addr = EmailAddress {
            name: "A very long display name that will not fit at all".to_string(),
            address: "someone@example.com".to_string(),
        };
        let out = format_sender(Some(&addr));
        assert_eq!(out.chars().count(), SENDER_WIDTH);
        assert!(out.starts_with("A very long display ... <someone@example.com>"));

        assert_eq!(format_sender(None).trim_end(), "Unknown sender");
    }

    #[test]
    fn test_match_line_marks_flagged() {
        let msg = FetchedMessage {
            uid: 1,
            flags: vec!["\\Flagged".to_string()],
            size: 2048,
            internal_date: None,
            envelope: Envelope::from_headers(
                b"From: a@example.com\r\nSubject: hello\r\nDate: Fri, 02 Feb 2024 10:00:00 +0000\r\n\r\n",
            ),
            body: None,
        };
        let line = match_line(3, &msg);
        assert!(line.starts_with("#3    02-Feb-24  <a@example.com>"));
        assert!(line.contains(" *"));
        assert!(line.ends_with("2 KiB"));
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(0), "0 B");
        assert_eq!(human_size(2 * 1024 * 1024), "2 MiB");
    }
}
