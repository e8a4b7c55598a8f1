//! Header presentation for the message view: labels, mailing-list data,
//! priority and address lines.

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;

use crate::i18n;
use crate::model::address::EmailAddress;
use crate::model::envelope::Envelope;
use crate::render::html::escape;

/// Address lists longer than this are collapsed behind a toggle.
const ADDRESS_TOGGLE_THRESHOLD: usize = 15;

/// RFC 2369 list headers, plus `List-Id` (RFC 2919).
pub const LIST_HEADERS: [&str; 7] = [
    "List-Help",
    "List-Unsubscribe",
    "List-Subscribe",
    "List-Owner",
    "List-Post",
    "List-Archive",
    "List-Id",
];

/// Header names shown in every view, paired with their localized labels.
pub fn basic_headers() -> Vec<(&'static str, &'static str)> {
    vec![
        ("date", i18n::hdr_date()),
        ("from", i18n::hdr_from()),
        ("to", i18n::hdr_to()),
        ("cc", i18n::hdr_cc()),
        ("bcc", i18n::hdr_bcc()),
        ("reply-to", i18n::hdr_reply_to()),
        ("subject", i18n::hdr_subject()),
    ]
}

/// Extra headers the user asked to see (`mail_hdr` preference, one per
/// line). Colons are dropped, duplicates removed, sorted ignoring case.
pub fn user_headers(pref: &str) -> Vec<String> {
    let mut headers: Vec<String> = Vec::new();
    for line in pref.replace(':', "").split(['\n', '\r']) {
        let name = line.trim();
        if !name.is_empty() && !headers.iter().any(|h| h == name) {
            headers.push(name.to_string());
        }
    }
    headers.sort_by_key(|h| h.to_lowercase());
    headers
}

/// Render the value of a list header.
///
/// Only the first URL that can be handled is shown: a `mailto:` entry wins
/// outright, otherwise the first web URL. Entries without angle brackets
/// are returned as text. With `raw`, the bare address or URL is returned
/// instead of markup.
pub fn parse_list_header(value: &str, raw: bool) -> String {
    let mut output = String::new();

    for entry in value.split(',') {
        let Some(inner) = bracketed(entry) else {
            return entry.trim().to_string();
        };
        let target: String = inner.chars().filter(|c| !c.is_whitespace()).collect();
        let comment = entry
            .find('(')
            .zip(entry.rfind(')'))
            .filter(|(open, close)| close > open)
            .map(|(open, close)| &entry[open..=close]);

        if let Some(pos) = target.to_ascii_lowercase().find("mailto:") {
            let address = &target[pos + "mailto:".len()..];
            if raw {
                return address.to_string();
            }
            output = format!(
                "<a href=\"mailto:{}\">{}</a>",
                escape(address),
                escape(address)
            );
            if let Some(comment) = comment {
                output.push_str(&format!("&nbsp;{}", escape(comment)));
            }
            break;
        }

        if target.contains("://") {
            if raw {
                return target;
            }
            output = format!(
                "<a href=\"{}\" target=\"_blank\">{}</a>",
                escape(&target),
                escape(&target)
            );
            if let Some(comment) = comment {
                output.push_str(&format!("&nbsp;{}", escape(comment)));
            }
            break;
        }

        // Keep it unless something better turns up.
        output = target;
    }

    output
}

fn bracketed(entry: &str) -> Option<&str> {
    let open = entry.find('<')?;
    let close = open + entry[open..].find('>')?;
    let inner = &entry[open + 1..close];
    (!inner.is_empty()).then_some(inner)
}

/// Mailing-list facts of a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ListInformation {
    /// Any list header is present.
    pub exists: bool,
    /// Posting address from `List-Post`, unless the list forbids posting.
    pub reply_list: Option<String>,
}

pub fn list_information(envelope: &Envelope) -> ListInformation {
    let exists = LIST_HEADERS.iter().any(|h| envelope.has_header(h));
    let reply_list = envelope
        .header("List-Post")
        .filter(|v| exists && v.trim() != "NO")
        .map(|v| parse_list_header(v, true))
        .filter(|v| !v.is_empty());
    ListInformation { exists, reply_list }
}

/// `X-Priority` classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl Priority {
    pub fn label(self) -> &'static str {
        match self {
            Self::High => i18n::priority_high(),
            Self::Normal => i18n::priority_normal(),
            Self::Low => i18n::priority_low(),
        }
    }
}

/// 1 and 2 are high, 4 and 5 low, anything else normal.
pub fn x_priority(header: Option<&str>) -> Priority {
    let digits: String = header
        .unwrap_or_default()
        .trim_start()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    match digits.parse::<u32>() {
        Ok(1 | 2) => Priority::High,
        Ok(4 | 5) => Priority::Low,
        _ => Priority::Normal,
    }
}

/// The "mailing list" system flag shown next to a message.
#[derive(Debug, Clone, Copy, Default)]
pub struct MailingListFlag;

impl MailingListFlag {
    pub const ID: &'static str = "list";
    pub const CSS: &'static str = "flagList";

    pub fn label(&self) -> &'static str {
        i18n::mailing_list_message()
    }

    pub fn matches(&self, envelope: &Envelope) -> bool {
        envelope.has_header("List-Post")
    }
}

/// HTML for an address header.
///
/// Incomplete addresses are shown but not linked. More than
/// [`ADDRESS_TOGGLE_THRESHOLD`] entries are collapsed behind a show/hide
/// toggle.
pub fn address_line(addresses: &[EmailAddress]) -> String {
    let items: Vec<String> = addresses
        .iter()
        .filter(|a| !a.address.is_empty())
        .map(|a| {
            let shown = escape(&a.to_string());
            if a.is_complete() {
                format!(
                    "<a href=\"mailto:{}\" title=\"{}\">{shown}</a>",
                    escape(&a.address),
                    escape(&a.address)
                )
            } else {
                shown
            }
        })
        .collect();

    if items.is_empty() {
        return i18n::undisclosed_recipients().to_string();
    }

    let line = format!(
        "<span class=\"nowrap\">{}</span>",
        items.join(",</span> <span class=\"nowrap\">")
    );
    if items.len() <= ADDRESS_TOGGLE_THRESHOLD {
        return line;
    }

    format!(
        "<span><span class=\"widget largeaddrlist\" data-toggle=\"show\">{}</span>\
<span class=\"widget largeaddrlist\" data-toggle=\"hide\" style=\"display:none\">{}</span>\
<span style=\"display:none\">{line}</span></span>",
        i18n::fill(i18n::show_addresses(), &items.len().to_string()),
        i18n::hide_addresses()
    )
}

/// Date header in the reader's timezone: "Today, 14:05 +01:00" for
/// today's messages, the full date otherwise.
pub fn local_time(date: &DateTime<Utc>, now: &DateTime<FixedOffset>) -> String {
    let local = date.with_timezone(&now.timezone());
    let time = local.format("%H:%M %:z").to_string();
    if local.date_naive() == now.date_naive() {
        i18n::fill(i18n::today_at(), &time)
    } else {
        format!("{} {time}", local.format("%a, %d %b %Y"))
    }
}
