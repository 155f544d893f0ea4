//! Body parts of a decomposed message and the records of what was removed.

use std::path::PathBuf;

/// Suffix of the synthetic notice attachment appended by the rewriter.
pub const NOTICE_SUFFIX: &str = "-attachments-deleted.txt";

/// Filename used for attachment-kind parts that carry none.
pub const DEFAULT_ATTACHMENT_NAME: &str = "text.txt";

/// How a leaf body part is treated by the rewriter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKind {
    /// `text/*` content rendered as part of the visible body.
    InlineText,
    /// `image/*` content embedded in the body.
    InlineImage,
    /// A discrete file presented for download.
    Attachment,
}

/// The MIME header fields a body part carries into the rewriter.
///
/// The three header values are unfolded but otherwise kept as they appeared
/// on the wire, for re-emission. The remaining fields are their parsed form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartHeaders {
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
    pub transfer_encoding: Option<String>,
    /// Lower-cased `type/subtype` without parameters.
    pub mime_type: String,
    /// The `charset` parameter of the content type, if declared.
    pub charset: Option<String>,
    /// Lower-cased disposition type (`inline`, `attachment`, ...).
    pub disposition: Option<String>,
    /// Decoded disposition `filename`, falling back to the content type `name`.
    pub filename: Option<String>,
}

impl PartHeaders {
    /// Implied type of a part without a usable `Content-Type` (RFC 2045 §5.2).
    pub const DEFAULT_MIME_TYPE: &'static str = "text/plain";
}

impl Default for PartHeaders {
    fn default() -> Self {
        Self {
            content_type: None,
            content_disposition: None,
            transfer_encoding: None,
            mime_type: Self::DEFAULT_MIME_TYPE.to_string(),
            charset: None,
            disposition: None,
            filename: None,
        }
    }
}

/// One leaf segment of a message, labeled with how it should be treated.
#[derive(Debug, Clone)]
pub struct BodyPart {
    pub kind: PartKind,
    pub headers: PartHeaders,
    /// Body bytes exactly as transferred (still transfer-encoded).
    pub raw: Vec<u8>,
    decoded: Vec<u8>,
}

impl BodyPart {
    pub fn new(kind: PartKind, headers: PartHeaders, raw: Vec<u8>, decoded: Vec<u8>) -> Self {
        Self {
            kind,
            headers,
            raw,
            decoded,
        }
    }

    /// Body bytes with the content-transfer-encoding undone.
    pub fn decoded(&self) -> &[u8] {
        &self.decoded
    }

    /// Filename this part is stored and reported under.
    pub fn filename(&self) -> Option<String> {
        self.headers.filename.clone()
    }
}

/// What the rewriter removed from a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalRecord {
    pub filename: String,
    /// `type/subtype` with all parameters stripped.
    pub mime_type: String,
    /// Human-readable decoded size.
    pub size: String,
    /// Where the bytes were archived, when saving is enabled.
    pub location: Option<PathBuf>,
}

impl RemovalRecord {
    /// Name listed in the removal notice: the archive path when saved.
    pub fn identity(&self) -> String {
        match &self.location {
            Some(path) => path.display().to_string(),
            None => self.filename.clone(),
        }
    }
}

/// The rewritten message and what was taken out of it.
#[derive(Debug, Clone)]
pub struct TransformedMessage {
    /// Serialized RFC 5322 message.
    pub raw: Vec<u8>,
    /// Number of removed parts (equals `records.len()`).
    pub removed: usize,
    pub records: Vec<RemovalRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_headers_are_plain_text() {
        let headers = PartHeaders::default();
        assert_eq!(headers.mime_type, "text/plain");
        assert!(headers.filename.is_none());
    }

    #[test]
    fn test_record_identity_uses_location_when_saved() {
        let mut record = RemovalRecord {
            filename: "a.pdf".into(),
            mime_type: "application/pdf".into(),
            size: "1 KiB".into(),
            location: None,
        };
        assert_eq!(record.identity(), "a.pdf");
        record.location = Some(PathBuf::from("/archive/x@y.z/abcdef-a.pdf"));
        assert_eq!(record.identity(), "/archive/x@y.z/abcdef-a.pdf");
    }
}
