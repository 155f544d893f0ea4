//! Label each leaf part as inline text, inline image, or attachment.

use crate::model::part::{BodyPart, PartHeaders, PartKind};
use crate::parser::mime::MimeLeaf;

/// Decide how a part is treated.
///
/// An explicit `attachment` disposition always wins. Otherwise `text/*` is
/// inline text and `image/*` an inline image; any other inline content is
/// treated as an attachment so that it is never dropped silently.
pub fn classify(headers: &PartHeaders) -> PartKind {
    if headers.disposition.as_deref() == Some("attachment") {
        return PartKind::Attachment;
    }
    let mime_type = &headers.mime_type;
    if mime_type.starts_with("text/") {
        PartKind::InlineText
    } else if mime_type.starts_with("image/") {
        PartKind::InlineImage
    } else {
        PartKind::Attachment
    }
}

/// Classify every leaf of a decomposed message, preserving order.
pub fn classify_parts(leaves: Vec<MimeLeaf>) -> Vec<BodyPart> {
    leaves
        .into_iter()
        .map(|leaf| BodyPart::new(classify(&leaf.headers), leaf.headers, leaf.raw, leaf.decoded))
        .collect()
}
