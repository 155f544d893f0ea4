//! Serializer for rewritten messages.
//!
//! The output is a `multipart/mixed` message whose first part is a
//! `multipart/alternative` holding the kept inline text, followed by
//! attachment-kind parts. The inline section must be closed before any
//! attachment is written; [`MessageBuilder`] enforces this at runtime:
//!
//! ```text
//! Inline --close_inline--> InlineClosed --write_attachment--> Attachments
//!                               |                                  |
//!                               +------------finalize--------------+--> Finalized
//! ```

use sha2::{Digest, Sha256};

use crate::error::TransformError;
use crate::model::part::PartHeaders;
use crate::parser::header::HeaderBlock;

/// Top-level fields replaced by the builder's own MIME framing.
const REPLACED_HEADERS: [&str; 3] = [
    "content-type",
    "content-transfer-encoding",
    "content-disposition",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Inline,
    InlineClosed,
    Attachments,
    Finalized,
}

impl Phase {
    fn name(self) -> &'static str {
        match self {
            Self::Inline => "writing inline parts",
            Self::InlineClosed => "closed for inline parts",
            Self::Attachments => "writing attachments",
            Self::Finalized => "finalized",
        }
    }
}

/// Builds one rewritten message.
#[derive(Debug)]
pub struct MessageBuilder {
    phase: Phase,
    head: Vec<u8>,
    mixed_boundary: String,
    alternative_boundary: String,
    inline: Vec<u8>,
    inline_parts: usize,
    attachments: Vec<u8>,
}

impl MessageBuilder {
    /// Start a message carrying the original top-level `headers`.
    ///
    /// `seed` (normally the original message bytes) determines the
    /// boundaries, so the same input always produces the same output.
    pub fn new(headers: &HeaderBlock, seed: &[u8]) -> Self {
        let digest = Sha256::digest(seed);
        let token: String = digest[..12].iter().map(|b| format!("{b:02x}")).collect();

        let mut head = Vec::new();
        for field in headers.iter() {
            if REPLACED_HEADERS.iter().any(|name| field.is(name)) {
                continue;
            }
            head.extend_from_slice(&field.raw);
            head.extend_from_slice(b"\r\n");
        }
        if !headers.contains("mime-version") {
            head.extend_from_slice(b"MIME-Version: 1.0\r\n");
        }

        Self {
            phase: Phase::Inline,
            head,
            mixed_boundary: format!("=_mixed_{token}"),
            alternative_boundary: format!("=_alt_{token}"),
            inline: Vec::new(),
            inline_parts: 0,
            attachments: Vec::new(),
        }
    }

    fn expect_phase(&self, operation: &'static str, allowed: &[Phase]) -> Result<(), TransformError> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(TransformError::OutOfPhase {
                operation,
                phase: self.phase.name(),
            })
        }
    }

    /// Append an inline text part verbatim.
    ///
    /// A declared charset that is not a known encoding label is rejected
    /// with [`TransformError::UnsupportedCharset`] and nothing is written.
    pub fn write_inline(&mut self, headers: &PartHeaders, raw: &[u8]) -> Result<(), TransformError> {
        self.expect_phase("write inline part", &[Phase::Inline])?;

        if let Some(charset) = &headers.charset {
            if encoding_rs::Encoding::for_label(charset.as_bytes()).is_none() {
                return Err(TransformError::UnsupportedCharset(charset.clone()));
            }
        }

        let delimiter = format!("--{}\r\n", self.alternative_boundary);
        self.inline.extend_from_slice(delimiter.as_bytes());
        write_part_headers(&mut self.inline, headers);
        write_body(&mut self.inline, raw);
        self.inline_parts += 1;
        Ok(())
    }

    /// Close the inline section. Required before attachments or finalize.
    pub fn close_inline(&mut self) -> Result<(), TransformError> {
        self.expect_phase("close inline section", &[Phase::Inline])?;
        if self.inline_parts > 0 {
            let closing = format!("--{}--\r\n", self.alternative_boundary);
            self.inline.extend_from_slice(closing.as_bytes());
        }
        self.phase = Phase::InlineClosed;
        Ok(())
    }

    /// Append an attachment-kind part with already encoded `body`.
    pub fn write_attachment(&mut self, headers: &[(&str, String)], body: &[u8]) -> Result<(), TransformError> {
        self.expect_phase(
            "write attachment",
            &[Phase::InlineClosed, Phase::Attachments],
        )?;

        let delimiter = format!("--{}\r\n", self.mixed_boundary);
        self.attachments.extend_from_slice(delimiter.as_bytes());
        for (name, value) in headers {
            self.attachments.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        self.attachments.extend_from_slice(b"\r\n");
        write_body(&mut self.attachments, body);
        self.phase = Phase::Attachments;
        Ok(())
    }

    /// Serialize the finished message. The builder cannot be used afterwards.
    pub fn finalize(&mut self) -> Result<Vec<u8>, TransformError> {
        self.expect_phase("finalize", &[Phase::InlineClosed, Phase::Attachments])?;
        self.phase = Phase::Finalized;

        let mut out = std::mem::take(&mut self.head);
        out.extend_from_slice(
            format!(
                "Content-Type: multipart/mixed; boundary=\"{}\"\r\n\r\n",
                self.mixed_boundary
            )
            .as_bytes(),
        );

        if self.inline_parts > 0 {
            out.extend_from_slice(
                format!(
                    "--{}\r\nContent-Type: multipart/alternative; boundary=\"{}\"\r\n\r\n",
                    self.mixed_boundary, self.alternative_boundary
                )
                .as_bytes(),
            );
            out.append(&mut self.inline);
        }
        out.append(&mut self.attachments);
        out.extend_from_slice(format!("--{}--\r\n", self.mixed_boundary).as_bytes());
        Ok(out)
    }
}

fn write_part_headers(out: &mut Vec<u8>, headers: &PartHeaders) {
    let fields = [
        ("Content-Type", &headers.content_type),
        ("Content-Disposition", &headers.content_disposition),
        ("Content-Transfer-Encoding", &headers.transfer_encoding),
    ];
    for (name, value) in fields {
        if let Some(value) = value {
            out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
    }
    out.extend_from_slice(b"\r\n");
}

fn write_body(out: &mut Vec<u8>, raw: &[u8]) {
    let body = normalize_crlf(raw);
    out.extend_from_slice(&body);
    if !body.is_empty() && !body.ends_with(b"\r\n") {
        out.extend_from_slice(b"\r\n");
    }
}

/// Bring bare CR and LF line breaks to CRLF.
fn normalize_crlf(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len() + raw.len() / 32);
    let mut i = 0;
    while i < raw.len() {
        match raw[i] {
            b'\r' => {
                out.extend_from_slice(b"\r\n");
                if raw.get(i + 1) == Some(&b'\n') {
                    i += 1;
                }
            }
            b'\n' => out.extend_from_slice(b"\r\n"),
            b => out.push(b),
        }
        i += 1;
    }
    out
}

/// Content type with the charset forced to UTF-8, keeping the HTML/plain
/// distinction of the original `mime_type`.
pub fn utf8_content_type(mime_type: &str) -> String {
    if mime_type == "text/html" {
        "text/html; charset=\"UTF-8\"".to_string()
    } else {
        "text/plain; charset=\"UTF-8\"".to_string()
    }
}
