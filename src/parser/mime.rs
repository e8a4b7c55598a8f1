//! MIME message parsing: part tree, envelope and threading keys.
//!
//! `mail-parser` does the MIME work. This module flattens its part list
//! into a [`MessageTree`] addressed the way IMAP addresses body parts: the
//! top-level multipart is the root (shown as `0`), its children are `1`,
//! `2`, ... and a single-part message's body is `1`. An attached
//! `message/rfc822` part's body parts sit beneath the attachment's own
//! address.

use chrono::{DateTime, Utc};
use mail_parser::{Address, Message, MessageParser, MessagePart, MimeHeaders, PartType};
use tracing::{debug, warn};

use crate::error::{Result, ViewError};
use crate::model::address::EmailAddress;
use crate::model::envelope::Envelope;
use crate::model::part::{PartAddress, PartNode};
use crate::model::tree::MessageTree;

/// Maximum nesting of multiparts and attached messages that is descended.
const MAX_DEPTH: usize = 10;

/// Headers needed to place a message in its thread.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadKeys {
    pub message_id: String,
    pub in_reply_to: Option<String>,
    pub references: Vec<String>,
}

/// Everything the renderer side needs from one raw message.
#[derive(Debug)]
pub struct ParsedMessage {
    pub envelope: Envelope,
    pub tree: MessageTree,
    pub thread_keys: ThreadKeys,
}

/// Parse a raw RFC 822 message (an MBOX `From ` line is skipped).
pub fn parse_message(raw_message: &[u8]) -> Result<ParsedMessage> {
    let message_bytes = skip_from_line(raw_message);
    if message_bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ViewError::MalformedInput("empty message".into()));
    }

    let headers = parse_header_block(message_bytes);
    let thread_keys = ThreadKeys {
        message_id: header_value(&headers, "Message-ID")
            .and_then(|v| message_ids(v).into_iter().next())
            .unwrap_or_default(),
        in_reply_to: header_value(&headers, "In-Reply-To")
            .and_then(|v| message_ids(v).into_iter().next()),
        references: header_value(&headers, "References")
            .map(message_ids)
            .unwrap_or_default(),
    };

    let Some(message) = MessageParser::default().parse(message_bytes) else {
        warn!("mail-parser rejected the message, showing it as plain text");
        return Ok(fallback(message_bytes, headers, thread_keys));
    };

    let mut nodes = Vec::new();
    flatten_message(&message, &PartAddress::root(), true, 0, &mut nodes);
    debug!(parts = nodes.len(), "Parsed message structure");

    Ok(ParsedMessage {
        envelope: envelope_of(&message, headers),
        tree: MessageTree::new(nodes),
        thread_keys,
    })
}

/// Flatten one (possibly nested) message.
///
/// `base` is the address of the enclosing `message/rfc822` part, or the
/// root for the top-level message. A top-level multipart occupies the
/// root address itself; a nested one shares its attachment's address and
/// gets no node of its own.
fn flatten_message(
    message: &Message<'_>,
    base: &PartAddress,
    top_level: bool,
    depth: usize,
    out: &mut Vec<PartNode>,
) {
    let Some(root) = message.parts.first() else {
        return;
    };
    match &root.body {
        PartType::Multipart(ids) => {
            if top_level {
                out.push(part_node(root, base.clone()));
            }
            flatten_children(message, ids, base, depth, out);
        }
        _ => flatten_part(message, root, base.child(1), depth, out),
    }
}

fn flatten_children(
    message: &Message<'_>,
    ids: &[mail_parser::MessagePartId],
    parent: &PartAddress,
    depth: usize,
    out: &mut Vec<PartNode>,
) {
    if depth >= MAX_DEPTH {
        warn!(address = %parent, "Part nesting too deep, ignoring children");
        return;
    }
    for (n, id) in (1u32..).zip(ids) {
        match message.parts.get(*id as usize) {
            Some(part) => flatten_part(message, part, parent.child(n), depth + 1, out),
            None => warn!(address = %parent, part_id = *id as usize, "Dangling part reference"),
        }
    }
}

fn flatten_part(
    message: &Message<'_>,
    part: &MessagePart<'_>,
    address: PartAddress,
    depth: usize,
    out: &mut Vec<PartNode>,
) {
    match &part.body {
        PartType::Multipart(ids) => {
            out.push(part_node(part, address.clone()));
            flatten_children(message, ids, &address, depth, out);
        }
        PartType::Message(nested) => {
            out.push(part_node(part, address.clone()));
            if depth >= MAX_DEPTH {
                warn!(address = %address, "Attached message nested too deep, not descending");
                return;
            }
            flatten_message(nested, &address, false, depth + 1, out);
        }
        _ => out.push(part_node(part, address)),
    }
}

fn part_node(part: &MessagePart<'_>, address: PartAddress) -> PartNode {
    let declared = part.content_type().map(|ct| match ct.subtype() {
        Some(sub) => format!("{}/{}", ct.ctype(), sub),
        None => ct.ctype().to_string(),
    });
    let content_type = declared.unwrap_or_else(|| {
        match &part.body {
            PartType::Text(_) => "text/plain",
            PartType::Html(_) => "text/html",
            PartType::Message(_) => "message/rfc822",
            PartType::Multipart(_) => "multipart/mixed",
            PartType::Binary(_) | PartType::InlineBinary(_) => "application/octet-stream",
        }
        .to_string()
    });

    let bytes = match &part.body {
        PartType::Multipart(_) => Vec::new(),
        _ => part.contents().to_vec(),
    };

    let mut node = PartNode::new(address, &content_type).with_bytes(bytes);
    if let Some(charset) = text_charset(part, &content_type) {
        node = node.with_charset(charset);
    }
    if let Some(name) = part.attachment_name() {
        node = node.with_name(name);
    }
    let is_attachment = part
        .content_disposition()
        .is_some_and(|d| d.ctype().eq_ignore_ascii_case("attachment"));
    if is_attachment {
        node = node.as_attachment();
    }
    node
}

/// Charset of the stored bytes of a text part.
///
/// Parts mail-parser decoded are UTF-8 already; text it left as raw bytes
/// keeps the charset the part declared.
fn text_charset(part: &MessagePart<'_>, content_type: &str) -> Option<String> {
    match &part.body {
        PartType::Text(_) | PartType::Html(_) => Some("utf-8".to_string()),
        PartType::Binary(_) | PartType::InlineBinary(_) if content_type.starts_with("text/") => part
            .content_type()
            .and_then(|ct| ct.attribute("charset"))
            .map(|charset| charset.trim().to_ascii_lowercase()),
        _ => None,
    }
}

fn envelope_of(message: &Message<'_>, headers: Vec<(String, String)>) -> Envelope {
    Envelope {
        from: addresses(message.from()),
        to: addresses(message.to()),
        cc: addresses(message.cc()),
        subject: message.subject().unwrap_or_default().to_string(),
        date: message
            .date()
            .and_then(|d| DateTime::<Utc>::from_timestamp(d.to_timestamp(), 0)),
        headers,
    }
}

fn addresses(field: Option<&Address<'_>>) -> Vec<EmailAddress> {
    let convert = |addr: &mail_parser::Addr<'_>| {
        addr.address
            .as_deref()
            .map(|a| EmailAddress::new(addr.name.as_deref(), a))
    };
    match field {
        Some(Address::List(list)) => list.iter().filter_map(convert).collect(),
        Some(Address::Group(groups)) => groups
            .iter()
            .flat_map(|g| g.addresses.iter())
            .filter_map(convert)
            .collect(),
        None => Vec::new(),
    }
}

/// Unfolded `(name, value)` pairs of the header block.
fn parse_header_block(data: &[u8]) -> Vec<(String, String)> {
    let text = String::from_utf8_lossy(data);
    let mut headers: Vec<(String, String)> = Vec::new();
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            break;
        }
        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = headers.last_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }
    headers
}

fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// `<id>` tokens of a Message-ID style header. A bare id is accepted.
fn message_ids(value: &str) -> Vec<String> {
    let mut ids: Vec<String> = value
        .split('<')
        .skip(1)
        .filter_map(|chunk| chunk.split_once('>').map(|(id, _)| id.trim()))
        .filter(|id| !id.is_empty())
        .map(|id| format!("<{id}>"))
        .collect();
    if ids.is_empty() {
        let bare = value.trim();
        if !bare.is_empty() && !bare.contains(char::is_whitespace) {
            ids.push(format!("<{bare}>"));
        }
    }
    ids
}

/// Used when `mail-parser` cannot make sense of the message.
fn fallback(data: &[u8], headers: Vec<(String, String)>, thread_keys: ThreadKeys) -> ParsedMessage {
    let text = String::from_utf8_lossy(data);
    let body = text
        .find("\r\n\r\n")
        .map(|pos| &text[pos + 4..])
        .or_else(|| text.find("\n\n").map(|pos| &text[pos + 2..]))
        .unwrap_or_default();

    let envelope = Envelope {
        from: header_value(&headers, "From")
            .map(EmailAddress::parse_list)
            .unwrap_or_default(),
        to: header_value(&headers, "To")
            .map(EmailAddress::parse_list)
            .unwrap_or_default(),
        cc: header_value(&headers, "Cc")
            .map(EmailAddress::parse_list)
            .unwrap_or_default(),
        subject: header_value(&headers, "Subject").unwrap_or_default().to_string(),
        date: None,
        headers,
    };
    let tree = MessageTree::new(vec![
        PartNode::new(PartAddress::root().child(1), "text/plain").with_bytes(body.as_bytes())
    ]);
    ParsedMessage {
        envelope,
        tree,
        thread_keys,
    }
}

/// Skip the `From ` separator line at the start of MBOX messages.
fn skip_from_line(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data);
    if data.starts_with(b"From ") {
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return &data[pos + 1..];
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::viewers::decode_text;

    fn addresses_of(tree: &MessageTree) -> Vec<(String, String)> {
        tree.parts()
            .map(|p| (p.address.to_string(), p.content_type.clone()))
            .collect()
    }

    const MIXED: &str = "From sender@example.com Mon Jan 01 00:00:00 2024\r\n\
From: Alice <alice@example.com>\r\n\
To: bob@example.com, \"Carol C\" <carol@example.com>\r\n\
Subject: Quarterly report\r\n\
Date: Tue, 02 Jan 2024 10:00:00 +0000\r\n\
Message-ID: <report@example.com>\r\n\
References: <a@example.com>\r\n <b@example.com>\r\n\
In-Reply-To: <b@example.com>\r\n\
List-Post: <mailto:team@example.com>\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"outer\"\r\n\
\r\n\
--outer\r\n\
Content-Type: multipart/alternative; boundary=\"inner\"\r\n\
\r\n\
--inner\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Plain body\r\n\
--inner\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>HTML body</p>\r\n\
--inner--\r\n\
--outer\r\n\
Content-Type: application/pdf; name=\"report.pdf\"\r\n\
Content-Disposition: attachment; filename=\"report.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0xLjQK\r\n\
--outer--\r\n";

    #[test]
    fn test_multipart_addresses() {
        let parsed = parse_message(MIXED.as_bytes()).unwrap();
        assert_eq!(
            addresses_of(&parsed.tree),
            vec![
                ("0".to_string(), "multipart/mixed".to_string()),
                ("1".to_string(), "multipart/alternative".to_string()),
                ("1.1".to_string(), "text/plain".to_string()),
                ("1.2".to_string(), "text/html".to_string()),
                ("2".to_string(), "application/pdf".to_string()),
            ]
        );
        let pdf = parsed.tree.part(&"2".parse().unwrap()).unwrap();
        assert!(pdf.is_attachment);
        assert_eq!(pdf.display_name(), Some("report.pdf"));
        assert_eq!(pdf.content.bytes().unwrap(), b"%PDF-1.4\n");
    }

    #[test]
    fn test_envelope_and_thread_keys() {
        let parsed = parse_message(MIXED.as_bytes()).unwrap();
        let env = &parsed.envelope;
        assert_eq!(env.subject, "Quarterly report");
        assert_eq!(env.from[0].address, "alice@example.com");
        assert_eq!(env.to.len(), 2);
        assert_eq!(env.to[1].name.as_deref(), Some("Carol C"));
        assert_eq!(env.date.map(|d| d.timestamp()), Some(1_704_189_600));
        assert_eq!(env.header("list-post"), Some("<mailto:team@example.com>"));

        let keys = &parsed.thread_keys;
        assert_eq!(keys.message_id, "<report@example.com>");
        assert_eq!(keys.in_reply_to.as_deref(), Some("<b@example.com>"));
        assert_eq!(keys.references, vec!["<a@example.com>", "<b@example.com>"]);
    }

    #[test]
    fn test_single_part_body_is_one() {
        let raw = "Subject: hi\r\nContent-Type: text/plain\r\n\r\nJust text\r\n";
        let parsed = parse_message(raw.as_bytes()).unwrap();
        assert_eq!(
            addresses_of(&parsed.tree),
            vec![("1".to_string(), "text/plain".to_string())]
        );
    }

    #[test]
    fn test_attached_message_parts_nest_under_it() {
        let raw = "Subject: fwd\r\n\
Content-Type: multipart/mixed; boundary=\"b\"\r\n\
\r\n\
--b\r\n\
Content-Type: text/plain\r\n\
\r\n\
See below\r\n\
--b\r\n\
Content-Type: message/rfc822\r\n\
\r\n\
Subject: inner\r\n\
Content-Type: multipart/mixed; boundary=\"c\"\r\n\
\r\n\
--c\r\n\
Content-Type: text/plain\r\n\
\r\n\
Inner text\r\n\
--c\r\n\
Content-Type: image/png\r\n\
\r\n\
png\r\n\
--c--\r\n\
--b--\r\n";
        let parsed = parse_message(raw.as_bytes()).unwrap();
        let shape: Vec<String> = parsed.tree.parts().map(|p| p.address.to_string()).collect();
        assert_eq!(shape, vec!["0", "1", "2", "2.1", "2.2"]);
        assert_eq!(
            parsed.tree.part(&"2".parse().unwrap()).unwrap().content_type,
            "message/rfc822"
        );
    }

    #[test]
    fn test_text_parts_record_charset() {
        let mut raw = b"Subject: menu\r\n\
Content-Type: multipart/mixed; boundary=\"b\"\r\n\
\r\n\
--b\r\n\
Content-Type: text/plain; charset=iso-8859-1\r\n\
\r\n\
Caf"
        .to_vec();
        raw.push(0xE9);
        raw.extend_from_slice(
            b"\r\n--b\r\n\
Content-Type: text/csv; charset=ISO-8859-1\r\n\
Content-Disposition: attachment; filename=\"prices.csv\"\r\n\
\r\n\
caf",
        );
        raw.push(0xE9);
        raw.extend_from_slice(b",3\r\n--b\r\nContent-Type: image/png\r\n\r\npng\r\n--b--\r\n");

        let parsed = parse_message(&raw).unwrap();
        let part = |a: &str| parsed.tree.part(&a.parse().unwrap()).unwrap();

        assert!(part("1").charset.is_some());
        assert_eq!(decode_text(part("1")).unwrap().trim_end(), "Caf\u{e9}");
        assert!(part("2").charset.is_some());
        assert_eq!(decode_text(part("2")).unwrap().trim_end(), "caf\u{e9},3");
        assert_eq!(part("3").charset, None);
    }

    #[test]
    fn test_message_ids() {
        assert_eq!(message_ids("<a@x> <b@x>"), vec!["<a@x>", "<b@x>"]);
        assert_eq!(message_ids("bare@x"), vec!["<bare@x>"]);
        assert!(message_ids("").is_empty());
    }

    #[test]
    fn test_header_block_unfolds() {
        let headers = parse_header_block(b"Subject: a\r\n  b\r\nX-Y: z\r\n\r\nBody: no\r\n");
        assert_eq!(
            headers,
            vec![
                ("Subject".to_string(), "a b".to_string()),
                ("X-Y".to_string(), "z".to_string())
            ]
        );
    }

    #[test]
    fn test_empty_message_is_malformed() {
        assert!(matches!(
            parse_message(b"\r\n  "),
            Err(ViewError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_skip_from_line() {
        assert_eq!(skip_from_line(b"From x\nSubject: y\n"), b"Subject: y\n");
        assert_eq!(skip_from_line(b"Subject: y\n"), b"Subject: y\n");
    }
}
