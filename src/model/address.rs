//! Sender address parsing (RFC 5322 §3.4), enough to name an archive owner.

/// A parsed mailbox address.
///
/// - `"Jane Doe <jane@example.com>"` → `name = "Jane Doe"`, `address = "jane@example.com"`
/// - `"jane@example.com"` → `name = ""`, `address = "jane@example.com"`
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize)]
pub struct EmailAddress {
    pub name: String,
    pub address: String,
}

impl EmailAddress {
    /// Parse the first mailbox of an (already encoded-word decoded) header value.
    ///
    /// Returns `None` when the value holds no address at all.
    pub fn parse_first(raw: &str) -> Option<Self> {
        let first = split_first_mailbox(raw).trim();
        if first.is_empty() {
            return None;
        }

        if let (Some(open), Some(close)) = (first.rfind('<'), first.rfind('>')) {
            if close > open {
                let address = first[open + 1..close].trim().to_string();
                if address.is_empty() {
                    return None;
                }
                return Some(Self {
                    name: unquote(&first[..open]),
                    address,
                });
            }
        }

        Some(Self {
            name: String::new(),
            address: first.to_string(),
        })
    }
}

/// Everything up to the first comma that is outside quotes and angle brackets.
fn split_first_mailbox(raw: &str) -> &str {
    let mut in_quotes = false;
    let mut in_angle = false;
    for (idx, ch) in raw.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '<' if !in_quotes => in_angle = true,
            '>' if !in_quotes => in_angle = false,
            ',' if !in_quotes && !in_angle => return &raw[..idx],
            _ => {}
        }
    }
    raw
}

fn unquote(s: &str) -> String {
    let trimmed = s.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.name.is_empty() {
            f.write_str(&self.address)
        } else {
            write!(f, "{} <{}>", self.name, self.address)
        }
    }
}
