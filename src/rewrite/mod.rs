//! Message rewriting: drop attachment-kind parts, keep inline text, and
//! append a notice listing what was removed.

pub mod builder;
pub mod classify;
pub mod notice;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::TransformError;
use crate::model::message::FetchedMessage;
use crate::model::part::{
    BodyPart, PartHeaders, PartKind, RemovalRecord, TransformedMessage, DEFAULT_ATTACHMENT_NAME,
    NOTICE_SUFFIX,
};
use crate::model::rule::ActionSet;
use crate::parser::mime;
use crate::report::human_size;
use crate::store::AttachmentStore;

use builder::{utf8_content_type, MessageBuilder};

/// Rewrites messages, archiving removed parts into an [`AttachmentStore`].
#[derive(Debug, Clone, Copy)]
pub struct Rewriter<'a> {
    store: &'a AttachmentStore,
}

impl<'a> Rewriter<'a> {
    pub fn new(store: &'a AttachmentStore) -> Self {
        Self { store }
    }

    /// Rewrite `message` according to `actions`, stamping the notice with now.
    pub fn rewrite(
        &self,
        message: Option<&FetchedMessage>,
        actions: &ActionSet,
    ) -> Result<TransformedMessage, TransformError> {
        self.rewrite_at(message, actions, Utc::now())
    }

    /// Same as [`Rewriter::rewrite`] with an explicit notice timestamp.
    pub fn rewrite_at(
        &self,
        message: Option<&FetchedMessage>,
        actions: &ActionSet,
        now: DateTime<Utc>,
    ) -> Result<TransformedMessage, TransformError> {
        let message = message.ok_or(TransformError::NoMessage)?;
        let raw = message.body.as_deref().ok_or(TransformError::NoBody)?;

        let decomposed = mime::decompose(raw)?;
        let mut builder = MessageBuilder::new(&decomposed.headers, raw);
        let parts = classify::classify_parts(decomposed.parts);

        let mut inspected = 0usize;
        let mut records = Vec::new();

        for part in &parts {
            match part.kind {
                PartKind::InlineText => {
                    inspected += 1;
                    write_inline_text(&mut builder, part)?;
                }
                PartKind::InlineImage => {
                    inspected += 1;
                    let filename = part
                        .filename()
                        .unwrap_or_else(|| default_image_name(&part.headers));
                    records.push(self.remove(message, part, filename, actions)?);
                }
                PartKind::Attachment => {
                    let filename = part
                        .filename()
                        .unwrap_or_else(|| DEFAULT_ATTACHMENT_NAME.to_string());
                    if filename.ends_with(NOTICE_SUFFIX) {
                        debug!(uid = message.uid, filename = %filename, "Skipping earlier removal notice");
                        continue;
                    }
                    inspected += 1;
                    records.push(self.remove(message, part, filename, actions)?);
                }
            }
        }

        if inspected == 0 {
            return Err(TransformError::NoAttachments);
        }

        builder.close_inline()?;
        if !records.is_empty() {
            let (headers, body) =
                notice::notice_part(&records, actions.is_save_attachments(), now);
            builder.write_attachment(&headers, &body)?;
        }
        let raw = builder.finalize()?;

        Ok(TransformedMessage {
            raw,
            removed: records.len(),
            records,
        })
    }

    /// Read a part fully, archive it when saving is on, and describe it.
    fn remove(
        &self,
        message: &FetchedMessage,
        part: &BodyPart,
        filename: String,
        actions: &ActionSet,
    ) -> Result<RemovalRecord, TransformError> {
        let bytes = part.decoded();
        let location = if actions.is_save_attachments() {
            Some(self.store.persist(
                bytes,
                message.envelope.owner(),
                &filename,
                message.sent_date(),
            )?)
        } else {
            None
        };

        Ok(RemovalRecord {
            filename,
            mime_type: part.headers.mime_type.clone(),
            size: human_size(bytes.len() as u64),
            location,
        })
    }
}

/// Write an inline text part, retrying once with a UTF-8 content type when
/// the declared charset is unknown.
fn write_inline_text(builder: &mut MessageBuilder, part: &BodyPart) -> Result<(), TransformError> {
    match builder.write_inline(&part.headers, &part.raw) {
        Err(TransformError::UnsupportedCharset(charset)) => {
            warn!(charset = %charset, "Unhandled charset, rewriting part as UTF-8");
            let forced = PartHeaders {
                content_type: Some(utf8_content_type(&part.headers.mime_type)),
                charset: Some("UTF-8".to_string()),
                ..part.headers.clone()
            };
            builder.write_inline(&forced, &part.raw)
        }
        other => other,
    }
}

/// `image.<subtype>` for inline images that carry no filename.
fn default_image_name(headers: &PartHeaders) -> String {
    let subtype = headers
        .mime_type
        .split_once('/')
        .map(|(_, sub)| sub)
        .filter(|sub| !sub.is_empty())
        .unwrap_or("bin");
    format!("image.{subtype}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::message::Envelope;
    use chrono::TimeZone;

    const MIXED: &[u8] = b"From: Sender <sender@example.com>\r\n\
Subject: report\r\n\
Date: Mon, 01 Jan 2024 09:00:00 +0000\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"b1\"\r\n\
\r\n\
--b1\r\n\
Content-Type: text/plain; charset=windows-1252\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\
\r\n\
See attached caf=E9 numbers.\r\n\
--b1\r\n\
Content-Type: application/pdf; name=\"q1.pdf\"\r\n\
Content-Disposition: attachment; filename=\"q1.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0xLjQK\r\n\
--b1--\r\n";

    fn fetched(raw: &[u8]) -> FetchedMessage {
        FetchedMessage {
            uid: 7,
            flags: vec!["\\Seen".to_string()],
            size: raw.len() as u64,
            internal_date: None,
            envelope: Envelope::from_headers(raw),
            body: Some(raw.to_vec()),
        }
    }

    fn actions(raw: &str) -> ActionSet {
        ActionSet::parse(raw, 1).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_missing_message_and_body() {
        let store = AttachmentStore::new("/nonexistent");
        let rewriter = Rewriter::new(&store);
        let set = actions("remove_attachments");
        assert!(matches!(
            rewriter.rewrite_at(None, &set, now()),
            Err(TransformError::NoMessage)
        ));
        let mut msg = fetched(MIXED);
        msg.body = None;
        assert!(matches!(
            rewriter.rewrite_at(Some(&msg), &set, now()),
            Err(TransformError::NoBody)
        ));
    }

    #[test]
    fn test_removes_pdf_and_keeps_text() {
        let store = AttachmentStore::new("/nonexistent");
        let out = Rewriter::new(&store)
            .rewrite_at(Some(&fetched(MIXED)), &actions("remove_attachments"), now())
            .unwrap();
        assert_eq!(out.removed, 1);
        assert_eq!(out.records[0].filename, "q1.pdf");
        assert_eq!(out.records[0].mime_type, "application/pdf");
        assert_eq!(out.records[0].size, "9 B");

        let text = String::from_utf8(out.raw).unwrap();
        assert!(text.contains("Subject: report\r\n"));
        assert!(text.contains("See attached caf=E9 numbers."));
        assert!(text.contains("charset=windows-1252"));
        assert!(!text.contains("JVBERi0xLjQK"));
        assert!(text.contains("1-attachments-deleted.txt"));
    }

    #[test]
    fn test_unknown_charset_falls_back_to_utf8() {
        let raw = String::from_utf8(MIXED.to_vec())
            .unwrap()
            .replace("charset=windows-1252", "charset=x-bogus");
        let store = AttachmentStore::new("/nonexistent");
        let out = Rewriter::new(&store)
            .rewrite_at(Some(&fetched(raw.as_bytes())), &actions("remove_attachments"), now())
            .unwrap();
        let text = String::from_utf8(out.raw).unwrap();
        assert!(text.contains("Content-Type: text/plain; charset=\"UTF-8\""));
        assert!(!text.contains("x-bogus"));
    }

    #[test]
    fn test_inline_image_without_name_gets_default() {
        let raw = b"From: a@example.com\r\n\
Content-Type: multipart/related; boundary=r\r\n\
\r\n\
--r\r\n\
Content-Type: text/html\r\n\
\r\n\
<img src=\"cid:x\">\r\n\
--r\r\n\
Content-Type: image/png\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
iVBORw0KGgo=\r\n\
--r--\r\n";
        let store = AttachmentStore::new("/nonexistent");
        let out = Rewriter::new(&store)
            .rewrite_at(Some(&fetched(raw)), &actions("remove_attachments"), now())
            .unwrap();
        assert_eq!(out.removed, 1);
        assert_eq!(out.records[0].filename, "image.png");
        assert_eq!(out.records[0].mime_type, "image/png");
    }

    #[test]
    fn test_eight_bit_top_level_headers_are_kept() {
        let raw = b"From: a@example.com\r\n\
Subject: caf\xE9\r\n\
Content-Type: multipart/mixed; boundary=z\r\n\
\r\n\
--z\r\n\
Content-Type: text/plain\r\n\
\r\n\
see zip\r\n\
--z\r\n\
Content-Type: application/zip; name=\"a.zip\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
UEsDBA==\r\n\
--z--\r\n";
        let store = AttachmentStore::new("/nonexistent");
        let out = Rewriter::new(&store)
            .rewrite_at(Some(&fetched(raw)), &actions("remove_attachments"), now())
            .unwrap();
        assert_eq!(out.removed, 1);
        assert_eq!(out.records[0].filename, "a.zip");
        let subject: &[u8] = b"\r\nSubject: caf\xE9\r\n";
        assert!(out.raw.windows(subject.len()).any(|w| w == subject));
        assert!(!out.raw.windows(3).any(|w| w == "é".as_bytes()));
    }

    #[test]
    fn test_text_only_message_removes_nothing() {
        let raw = b"From: a@example.com\r\nSubject: hi\r\n\r\nplain\r\n";
        let store = AttachmentStore::new("/nonexistent");
        let out = Rewriter::new(&store)
            .rewrite_at(Some(&fetched(raw)), &actions("remove_attachments"), now())
            .unwrap();
        assert_eq!(out.removed, 0);
        assert!(!String::from_utf8(out.raw).unwrap().contains("attachments-deleted"));
    }
}
