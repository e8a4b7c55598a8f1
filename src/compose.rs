//! Compose-side text helpers: switching a draft between plain text and
//! HTML with its signature carried across, and recipient normalization.

use std::ops::Range;

use serde::Serialize;

use crate::model::address::{split_recipients, EmailAddress};
use crate::render::html;
use crate::store::UserPreferences;

const PLACEHOLDER: &str = "###MIMEVIEW_SIGNATURE###";

/// Draft body formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeFormat {
    Text,
    Html,
}

/// Signature settings of the sending identity.
#[derive(Debug, Clone, Default)]
pub struct Identity {
    pub signature: String,
    pub signature_html: String,
    /// Put the signature above the body instead of below.
    pub sig_first: bool,
}

impl Identity {
    /// Read `signature`, `signature_html` and `sig_first`.
    pub fn from_preferences(prefs: &impl UserPreferences) -> Self {
        Self {
            signature: prefs.value("signature").unwrap_or_default(),
            signature_html: prefs.value("signature_html").unwrap_or_default(),
            sig_first: prefs.flag("sig_first"),
        }
    }
}

/// Result of [`convert_compose_text`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conversion {
    pub text: String,
    /// The old-format signature was found in the body and swapped in place.
    pub signature_replaced: bool,
}

/// Convert a draft to `target`, replacing the signature with the
/// identity's signature in the new format.
///
/// If the current signature cannot be found in the body, the new one is
/// added at the top (`sig_first`) or after a newline at the bottom.
pub fn convert_compose_text(data: &str, target: ComposeFormat, identity: &Identity) -> Conversion {
    let (converted, replaced, signature) = match target {
        ComposeFormat::Html => {
            let (marked, replaced) = match find_signature(data, &identity.signature) {
                Some(span) if !identity.signature.is_empty() => {
                    (splice(data, span, PLACEHOLDER), true)
                }
                _ => (data.to_string(), false),
            };
            (html::text_to_html(&marked), replaced, &identity.signature_html)
        }
        ComposeFormat::Text => {
            let (marked, replaced) = match find_signature_div(data) {
                Some(span) if !identity.signature_html.is_empty() => {
                    (splice(data, span, PLACEHOLDER), true)
                }
                _ => (data.to_string(), false),
            };
            (html::html_to_text(&marked), replaced, &identity.signature)
        }
    };

    let text = if replaced {
        converted.replacen(PLACEHOLDER, signature, 1)
    } else if identity.sig_first {
        format!("{signature}{converted}")
    } else {
        format!("{converted}\n{signature}")
    };
    Conversion {
        text,
        signature_replaced: replaced,
    }
}

/// Normalize a recipient field typed by the user: `,` or `;` separated,
/// returned as an RFC 5322 `, ` joined list.
pub fn address_list(input: &str) -> String {
    let input = input.trim().trim_end_matches(',');
    split_recipients(input)
        .iter()
        .map(|item| match EmailAddress::parse(item) {
            Some(addr) if !addr.address.is_empty() => addr.to_string(),
            _ => item.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn splice(data: &str, span: Range<usize>, with: &str) -> String {
    let mut out = String::with_capacity(data.len());
    out.push_str(&data[..span.start]);
    out.push_str(with);
    out.push_str(&data[span.end..]);
    out
}

/// First occurrence of `sig` in `data`, where each inner whitespace run of
/// the signature matches any non-empty whitespace run. Leading whitespace
/// must match exactly.
fn find_signature(data: &str, sig: &str) -> Option<Range<usize>> {
    let rest = sig.trim_start();
    let lead = &sig[..sig.len() - rest.len()];
    let words: Vec<&str> = rest.split_whitespace().collect();
    let Some((first, others)) = words.split_first() else {
        return data.find(sig).map(|start| start..start + sig.len());
    };
    let trailing = rest.ends_with(char::is_whitespace);
    let head = format!("{lead}{first}");

    let mut from = 0;
    while let Some(pos) = data[from..].find(&head) {
        let start = from + pos;
        if let Some(end) = match_words(data, start + head.len(), others, trailing) {
            return Some(start..end);
        }
        from = start + data[start..].chars().next().map_or(1, char::len_utf8);
    }
    None
}

fn match_words(data: &str, mut at: usize, words: &[&str], trailing: bool) -> Option<usize> {
    for word in words {
        at = skip_whitespace(data, at)?;
        if !data[at..].starts_with(word) {
            return None;
        }
        at += word.len();
    }
    if trailing {
        at = skip_whitespace(data, at)?;
    }
    Some(at)
}

/// Index past a non-empty whitespace run starting at `at`.
fn skip_whitespace(data: &str, at: usize) -> Option<usize> {
    let run: usize = data[at..]
        .chars()
        .take_while(|c| c.is_whitespace())
        .map(char::len_utf8)
        .sum();
    (run > 0).then_some(at + run)
}

/// Span of the first `<div class="signature">` element, nested divs
/// included.
fn find_signature_div(html: &str) -> Option<Range<usize>> {
    let lower = html.to_ascii_lowercase();
    let mut from = 0;
    while let Some(pos) = lower[from..].find("<div") {
        let start = from + pos;
        let tag_end = start + lower[start..].find('>')? + 1;
        if class_of(&lower[start..tag_end]).as_deref() == Some("signature") {
            return closing_div(&lower, tag_end).map(|end| start..end);
        }
        from = tag_end;
    }
    None
}

fn class_of(tag: &str) -> Option<String> {
    let pos = tag.find("class=")?;
    let value = &tag[pos + "class=".len()..];
    let (quote, body) = match value.chars().next()? {
        q @ ('"' | '\'') => (Some(q), &value[1..]),
        _ => (None, value),
    };
    let end = match quote {
        Some(q) => body.find(q)?,
        None => body.find([' ', '>', '/']).unwrap_or(body.len()),
    };
    Some(body[..end].trim().to_string())
}

/// End of the `</div>` balancing a div whose opening tag ends at `from`.
fn closing_div(lower: &str, mut from: usize) -> Option<usize> {
    let mut depth = 1;
    loop {
        let open = lower[from..].find("<div").map(|p| from + p);
        let close = from + lower[from..].find("</div")?;
        match open {
            Some(open) if open < close => {
                depth += 1;
                from = open + 4;
            }
            _ => {
                depth -= 1;
                let end = close + lower[close..].find('>')? + 1;
                if depth == 0 {
                    return Some(end);
                }
                from = end;
            }
        }
    }
}
