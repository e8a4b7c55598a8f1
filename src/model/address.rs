//! Mailbox addresses as shown in envelope headers.

use serde::{Deserialize, Serialize};

/// A single `Name <user@host>` mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress {
    /// Display name, without surrounding quotes.
    pub name: Option<String>,
    /// Bare `user@host`.
    pub address: String,
}

impl EmailAddress {
    pub fn new(name: Option<&str>, address: &str) -> Self {
        Self {
            name: name
                .map(|n| unquote(n.trim()))
                .filter(|n| !n.is_empty()),
            address: address.trim().to_string(),
        }
    }

    /// Parse one mailbox: `user@host`, `<user@host>` or `"Name" <user@host>`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        match (raw.rfind('<'), raw.rfind('>')) {
            (Some(open), Some(close)) if close > open => {
                let address = &raw[open + 1..close];
                let name = raw[..open].trim();
                Some(Self::new((!name.is_empty()).then_some(name), address))
            }
            _ => Some(Self::new(None, raw)),
        }
    }

    /// Split a recipient list on `,` and `;`, ignoring separators inside
    /// quotes and angle brackets.
    pub fn parse_list(raw: &str) -> Vec<Self> {
        split_recipients(raw)
            .iter()
            .filter_map(|item| Self::parse(item))
            .filter(|addr| !addr.address.is_empty())
            .collect()
    }

    /// What the message list shows: the display name, else the address.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.address)
    }

    /// Whether the host part is present and real. Incomplete addresses from
    /// broken headers come through with an `UNKNOWN` host or none at all.
    pub fn is_complete(&self) -> bool {
        match self.address.rsplit_once('@') {
            Some((local, host)) => {
                !local.is_empty() && !host.is_empty() && !host.to_ascii_uppercase().contains("UNKNOWN")
            }
            None => false,
        }
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) if name.contains([',', ';', '"']) => {
                write!(f, "\"{}\" <{}>", name.replace('"', "\\\""), self.address)
            }
            Some(name) => write!(f, "{name} <{}>", self.address),
            None => f.write_str(&self.address),
        }
    }
}

/// Quote-aware split of a recipient field into trimmed, non-empty items.
pub fn split_recipients(raw: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut angle = false;

    for ch in raw.chars() {
        match ch {
            '"' => {
                quoted = !quoted;
                current.push(ch);
            }
            '<' if !quoted => {
                angle = true;
                current.push(ch);
            }
            '>' if !quoted => {
                angle = false;
                current.push(ch);
            }
            ',' | ';' if !quoted && !angle => {
                items.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    items.push(current);

    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn unquote(s: &str) -> String {
    s.strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(s)
        .replace("\\\"", "\"")
        .trim()
        .to_string()
}
