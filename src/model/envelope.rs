//! Envelope summary of a fetched message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::address::EmailAddress;

/// The summary headers the display needs before any body is rendered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Envelope {
    pub from: Vec<EmailAddress>,
    pub to: Vec<EmailAddress>,
    pub cc: Vec<EmailAddress>,
    /// Decoded subject; empty when the header is missing.
    pub subject: String,
    pub date: Option<DateTime<Utc>>,
    /// Remaining raw header fields (`List-*`, `X-Priority`, ...) in message
    /// order, names as written.
    pub headers: Vec<(String, String)>,
}

impl Envelope {
    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }
}
