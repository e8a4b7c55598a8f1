//! HTML helpers shared by the renderers and the display layer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use super::fragment::StatusMessage;
use crate::model::part::PartAddress;

/// Escape text for inclusion in HTML element content or attribute values.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Convert plain text to HTML: escaped, line breaks kept, quoted lines
/// (`>`) wrapped in a quote span.
pub fn text_to_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 64);
    out.push_str("<div class=\"fixed leftAlign\">");
    let mut first = true;
    for line in text.lines() {
        if !first {
            out.push_str("<br />");
        }
        first = false;
        let escaped = escape(line).replace('\t', "&nbsp;&nbsp;&nbsp;&nbsp;");
        if line.trim_start().starts_with('>') {
            out.push_str("<span class=\"quoted\">");
            out.push_str(&escaped);
            out.push_str("</span>");
        } else {
            out.push_str(&escaped);
        }
    }
    out.push_str("</div>");
    out
}

/// Convert HTML to plain text.
///
/// Block elements become line breaks, scripts and styles are dropped,
/// common entities are decoded, and runs of blank lines collapse to one.
pub fn html_to_text(html: &str) -> String {
    let mut text = remove_tag_block(html, "script");
    text = remove_tag_block(&text, "style");

    let mut flat = String::with_capacity(text.len());
    let mut chars = text.char_indices();
    while let Some((start, ch)) = chars.next() {
        if ch != '<' {
            flat.push(ch);
            continue;
        }
        for (_, c) in chars.by_ref() {
            if c == '>' {
                break;
            }
        }
        let tag = tag_name(&text[start..]);
        if matches!(
            tag.as_str(),
            "br" | "p" | "div" | "tr" | "li" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "table"
        ) {
            flat.push('\n');
        }
    }

    let decoded = decode_entities(&flat);

    let mut cleaned = String::with_capacity(decoded.len());
    let mut prev_blank = true;
    for line in decoded.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !prev_blank {
                cleaned.push('\n');
            }
            prev_blank = true;
        } else {
            cleaned.push_str(trimmed);
            cleaned.push('\n');
            prev_blank = false;
        }
    }
    cleaned.trim().to_string()
}

/// Lower-cased element name of a tag (`<BR/>` → `br`, `</p>` → `p`).
fn tag_name(tag: &str) -> String {
    tag.trim_start_matches('<')
        .trim_start_matches('/')
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Remove every `<tag ...>...</tag>` block, case-insensitively.
fn remove_tag_block(html: &str, tag: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let open = format!("<{tag}");
    let close = format!("</{tag}>");

    let mut out = String::with_capacity(html.len());
    let mut pos = 0;
    while let Some(found) = lower[pos..].find(&open) {
        let start = pos + found;
        out.push_str(&html[pos..start]);
        match lower[start..].find(&close) {
            Some(end) => pos = start + end + close.len(),
            None => {
                pos = html.len();
                break;
            }
        }
    }
    out.push_str(&html[pos..]);
    out
}

/// Sanitize mail HTML for embedding in the page.
///
/// Scripts, styles, event handlers and non-whitelisted URL schemes are
/// removed, as are `srcset`, `background` and `poster`. Unless
/// `allow_remote` is set, `src` attributes that point off-message are
/// dropped too. Returns the clean HTML and whether a remote source was
/// blocked.
pub fn sanitize_html(html: &str, allow_remote: bool) -> (String, bool) {
    let blocked = Arc::new(AtomicBool::new(false));
    let filter_blocked = Arc::clone(&blocked);
    let mut builder = ammonia::Builder::default();
    builder
        .add_url_schemes(&["cid"])
        .attribute_filter(move |_element, attribute, value| {
            if !allow_remote && attribute == "src" && is_remote_url(value) {
                filter_blocked.store(true, Ordering::Relaxed);
                return None;
            }
            Some(value.into())
        });
    let clean = builder.clean(html).to_string();
    (clean, blocked.load(Ordering::Relaxed))
}

/// `http`, `https` or protocol-relative URL.
fn is_remote_url(value: &str) -> bool {
    let url = value.trim_start().to_ascii_lowercase();
    url.starts_with("http://") || url.starts_with("https://") || url.starts_with("//")
}

/// Render a status block as an HTML table, with an icon cell when present.
pub fn format_status_msg(status: &StatusMessage) -> String {
    if status.text.is_empty() && status.icon.is_none() {
        return String::new();
    }

    let id = status
        .id
        .as_ref()
        .map(|id| format!("id=\"{}\" ", escape(id)))
        .unwrap_or_default();
    let mut out = vec![format!("<table {id}class=\"mimeStatusMessage\">")];

    match &status.icon {
        None => {
            out.extend(status.text.iter().map(|line| format!("<tr><td>{line}</td></tr>")));
        }
        Some(icon) => {
            out.push(format!(
                "<tr><td class=\"mimeStatusIcon\">{}</td><td><table>",
                icon_img(icon)
            ));
            out.extend(status.text.iter().map(|line| format!("<tr><td>{line}</td></tr>")));
            out.push("</table></td></tr>".to_string());
        }
    }

    out.join("\n") + "\n</table>\n"
}

fn icon_img(icon: &str) -> String {
    format!(
        "<img src=\"{}.png\" alt=\"{}\" />",
        escape(icon),
        escape(icon)
    )
}

/// Builds links back into the hosting page for part actions.
#[derive(Debug, Clone)]
pub struct LinkBuilder {
    base: String,
}

impl LinkBuilder {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    /// URL for a part action (`download_attach`, `view_attach`).
    pub fn url(&self, action: &str, address: &PartAddress) -> String {
        let sep = if self.base.contains('?') { "&" } else { "?" };
        format!("{}{sep}actionID={action}&id={address}", self.base)
    }

    /// An anchor that downloads the part, titled with `title`.
    pub fn download(&self, address: &PartAddress, label: &str, title: &str) -> String {
        format!(
            "<a href=\"{}\" title=\"{}\" class=\"downloadAttach\">{}</a>",
            escape(&self.url("download_attach", address)),
            escape(title),
            escape(label)
        )
    }

    pub fn view(&self, address: &PartAddress) -> String {
        self.url("view_attach", address)
    }
}

impl Default for LinkBuilder {
    fn default() -> Self {
        Self::new("view.php")
    }
}

/// Truncate to `max_width` display columns, ending in "..." when cut.
pub fn truncate(s: &str, max_width: usize) -> String {
    if UnicodeWidthStr::width(s) <= max_width {
        return s.to_string();
    }
    if max_width <= 3 {
        return s.chars().take(max_width).collect();
    }
    let mut out = String::new();
    let mut width = 0;
    for ch in s.chars() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if width + w + 3 > max_width {
            break;
        }
        out.push(ch);
        width += w;
    }
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape("<a href=\"x\">&</a>"), "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;");
    }

    #[test]
    fn test_text_to_html_marks_quotes() {
        let html = text_to_html("hi\n> quoted <b>\nbye");
        assert!(html.contains("hi<br />"));
        assert!(html.contains("<span class=\"quoted\">&gt; quoted &lt;b&gt;</span>"));
    }

    #[test]
    fn test_html_to_text() {
        let text = html_to_text("<p>Hello <b>world</b></p><P>Tom &amp; Jerry</P><script>x()</script>");
        assert_eq!(text, "Hello world\n\nTom & Jerry");
    }

    #[test]
    fn test_remove_tag_block_is_case_insensitive() {
        assert_eq!(remove_tag_block("a<STYLE>p{}</STYLE>b", "style"), "ab");
        assert_eq!(remove_tag_block("a<script>never closed", "script"), "a");
    }

    #[test]
    fn test_sanitize_html_strips_scripting() {
        let dirty = "<img src=\"cid:x\" onerror=\"alert(document.cookie)\">\
<a href=\"javascript:alert(1)\">x</a><script>evil()</script><p onclick=\"x()\">ok</p>";
        let (clean, blocked) = sanitize_html(dirty, false);
        assert!(!blocked);
        assert!(!clean.contains("onerror"));
        assert!(!clean.contains("onclick"));
        assert!(!clean.contains("javascript:"));
        assert!(!clean.contains("evil"));
        assert!(clean.contains("src=\"cid:x\""));
        assert!(clean.contains("ok"));
    }

    #[test]
    fn test_sanitize_html_blocks_remote_images() {
        for dirty in [
            "<img src = \"http://tracker.test/p.gif\">",
            "<img SRC=http://t.test/q.gif>",
            "<img src=\"//cdn.test/r.gif\">",
        ] {
            let (clean, blocked) = sanitize_html(dirty, false);
            assert!(blocked, "{dirty}");
            assert!(!clean.contains("test/"), "{clean}");
        }

        let (clean, _) = sanitize_html(
            "<img srcset=\"https://t.test/s.png 2x\"><table background=\"http://t.test/b.gif\"><tr><td>x</td></tr></table>",
            false,
        );
        assert!(!clean.contains("t.test"), "{clean}");

        let (clean, blocked) = sanitize_html("<img src = \"http://tracker.test/p.gif\">", true);
        assert!(!blocked);
        assert!(clean.contains("src=\"http://tracker.test/p.gif\""));

        let (_, blocked) = sanitize_html("<p>no images</p>", false);
        assert!(!blocked);
    }

    #[test]
    fn test_format_status_msg_with_icon() {
        let status = StatusMessage::new("line one").with_icon("apple");
        let html = format_status_msg(&status);
        assert!(html.starts_with("<table class=\"mimeStatusMessage\">"));
        assert!(html.contains("mimeStatusIcon"));
        assert!(html.contains("<tr><td>line one</td></tr>"));
        assert!(html.ends_with("</table>\n"));
    }

    #[test]
    fn test_link_builder() {
        let links = LinkBuilder::new("/view?uid=4");
        let addr: PartAddress = "2.1".parse().unwrap();
        assert_eq!(
            links.url("download_attach", &addr),
            "/view?uid=4&actionID=download_attach&id=2.1"
        );
        assert!(links.download(&addr, "HERE", "fork").contains(">HERE</a>"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a long subject line", 10), "a long ...");
    }
}
