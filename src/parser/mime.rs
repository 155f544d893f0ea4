//! MIME structure: split a raw message into its top-level headers and an
//! ordered list of leaf body parts, keeping every byte as transferred.
//!
//! `mail-parser` walks the part tree and decodes bodies; the byte offsets it
//! records on each part give back the untouched wire form.

use mail_parser::{Message, MessageParser, MessagePart, MimeHeaders, PartType};

use crate::error::TransformError;
use crate::model::part::PartHeaders;

use super::header::HeaderBlock;

/// Maximum multipart nesting depth (guards against adversarial input).
const MAX_DEPTH: usize = 10;

/// A message split into its top-level header block and leaf parts.
#[derive(Debug, Clone)]
pub struct MimeMessage {
    pub headers: HeaderBlock,
    /// Leaf parts in document order; multipart containers are flattened.
    pub parts: Vec<MimeLeaf>,
}

/// One non-multipart body segment.
#[derive(Debug, Clone)]
pub struct MimeLeaf {
    pub headers: PartHeaders,
    /// Body bytes exactly as transferred.
    pub raw: Vec<u8>,
    /// Body bytes with the transfer encoding undone.
    pub decoded: Vec<u8>,
}

/// Decompose a complete RFC 5322 message.
pub fn decompose(raw: &[u8]) -> Result<MimeMessage, TransformError> {
    let headers = HeaderBlock::parse(raw);
    if headers.fields.is_empty() {
        return Err(TransformError::Parse("message has no header section".into()));
    }
    let message = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| TransformError::Parse("message structure could not be parsed".into()))?;

    let mut parts = Vec::new();
    walk(raw, &message, 0, 0, &mut parts)?;
    Ok(MimeMessage { headers, parts })
}

fn walk(
    raw: &[u8],
    message: &Message<'_>,
    id: usize,
    depth: usize,
    out: &mut Vec<MimeLeaf>,
) -> Result<(), TransformError> {
    let Some(part) = message.parts.get(id) else {
        return Ok(());
    };

    let PartType::Multipart(children) = &part.body else {
        return leaf(raw, part, depth, out);
    };
    if depth >= MAX_DEPTH {
        return Err(TransformError::Parse(format!(
            "multipart nesting deeper than {MAX_DEPTH} levels"
        )));
    }
    for &child in children {
        walk(raw, message, child, depth + 1, out)?;
    }
    Ok(())
}

fn leaf(
    raw: &[u8],
    part: &MessagePart<'_>,
    depth: usize,
    out: &mut Vec<MimeLeaf>,
) -> Result<(), TransformError> {
    let start = (part.offset_header as usize).min(raw.len());
    let body_start = (part.offset_body as usize).clamp(start, raw.len());
    let end = (part.offset_end as usize).clamp(body_start, raw.len());

    // A section opening with a non-field line has no header block at all.
    if depth > 0 && !starts_with_field(&raw[start..end]) {
        let body = trim_line_end(&raw[start..end]).to_vec();
        out.push(MimeLeaf {
            headers: PartHeaders::default(),
            decoded: body.clone(),
            raw: body,
        });
        return Ok(());
    }

    let headers = part_headers(part, &raw[start..body_start]);
    if headers.mime_type.starts_with("multipart/") {
        // A container that mail-parser could not split: without a boundary
        // the structure is unusable, with one it simply holds no parts.
        let has_boundary = part
            .content_type()
            .and_then(|ct| ct.attribute("boundary"))
            .is_some_and(|b| !b.is_empty());
        if has_boundary {
            return Ok(());
        }
        return Err(TransformError::Parse(format!(
            "{} without boundary",
            headers.mime_type
        )));
    }

    let body = &raw[body_start..end];
    let body = if depth > 0 { trim_line_end(body) } else { body };
    out.push(MimeLeaf {
        headers,
        raw: body.to_vec(),
        decoded: part.contents().to_vec(),
    });
    Ok(())
}

/// Header values for re-emission come from the raw section; everything
/// interpreted comes from mail-parser.
fn part_headers(part: &MessagePart<'_>, header_bytes: &[u8]) -> PartHeaders {
    let block = HeaderBlock::parse(header_bytes);
    let content_type = part.content_type();

    let mime_type = content_type
        .and_then(|ct| {
            let subtype = ct.subtype().filter(|s| !s.is_empty())?;
            Some(format!("{}/{}", ct.ctype(), subtype).to_ascii_lowercase())
        })
        .unwrap_or_else(|| PartHeaders::DEFAULT_MIME_TYPE.to_string());

    PartHeaders {
        content_type: block.get("content-type"),
        content_disposition: block.get("content-disposition"),
        transfer_encoding: block.get("content-transfer-encoding"),
        mime_type,
        charset: content_type
            .and_then(|ct| ct.attribute("charset"))
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty()),
        disposition: part
            .content_disposition()
            .map(|cd| cd.ctype().trim().to_ascii_lowercase())
            .filter(|d| !d.is_empty()),
        filename: part
            .attachment_name()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty()),
    }
}

/// Whether the first line of a part section is a header field (or the blank
/// separator of an empty header block).
fn starts_with_field(section: &[u8]) -> bool {
    let first = section
        .split(|&b| b == b'\n')
        .next()
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .unwrap_or_default();
    first.is_empty() || first.contains(&b':')
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
