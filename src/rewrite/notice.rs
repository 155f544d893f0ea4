//! The synthetic attachment listing what was removed from a message.

use chrono::{DateTime, Utc};

use crate::model::part::{RemovalRecord, NOTICE_SUFFIX};

/// `<count>-attachments-deleted.txt`
pub fn notice_filename(count: usize) -> String {
    format!("{count}{NOTICE_SUFFIX}")
}

/// Plain-text notice body. Lines end in `\n`.
pub fn notice_body(records: &[RemovalRecord], saved: bool, now: DateTime<Utc>) -> String {
    let date = now.format("%Y-%m-%d %H:%M:%S UTC");
    let mut body = if saved {
        format!("Attachments were deleted on {date} and moved to the following locations:\n\n")
    } else {
        format!("Attachments were deleted on {date}:\n\n")
    };
    for record in records {
        body.push_str(&format!("- {} [{}]\n", record.identity(), record.size));
    }
    body
}

/// Headers and encoded body of the notice part.
pub fn notice_part(
    records: &[RemovalRecord],
    saved: bool,
    now: DateTime<Utc>,
) -> (Vec<(&'static str, String)>, Vec<u8>) {
    let filename = notice_filename(records.len());
    let text = notice_body(records, saved, now);

    let text = text.replace('\n', "\r\n");
    let (encoding, body) = if text.is_ascii() {
        ("7bit", text)
    } else {
        ("quoted-printable", quoted_printable::encode_to_str(&text))
    };

    let headers = vec![
        (
            "Content-Type",
            format!("text/plain; charset=utf-8; name=\"{filename}\""),
        ),
        (
            "Content-Disposition",
            format!("attachment; filename=\"{filename}\""),
        ),
        ("Content-Transfer-Encoding", encoding.to_string()),
    ];
    (headers, body.into_bytes())
}
