//! The built-in renderer kinds.

use humansize::{format_size, BINARY};
use tracing::warn;

use super::appledouble;
use super::fragment::{RenderResult, RenderedFragment, SideEffect, StatusMessage};
use super::html::{self, escape};
use super::resolver::ContentResolver;
use super::{Capability, RenderMode};
use crate::error::Result;
use crate::i18n;
use crate::model::part::PartNode;
use crate::model::tree::MessageTree;

/// Closed set of renderers, selected by content type through the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Renderer {
    /// `text/plain`
    PlainText,
    /// `text/html`
    Html,
    /// `image/*`
    Image,
    /// `message/rfc822`
    Rfc822,
    /// `multipart/appledouble` (RFC 1740)
    AppleDouble,
    /// Anything else: offered for download.
    Attachment,
}

/// What a renderer hands back to the resolver.
#[derive(Debug)]
pub enum RendererOutput {
    /// One fragment for the rendered part's own address.
    Fragment(RenderedFragment),
    /// Results spanning several addresses. Only composite splitters
    /// return this.
    Composite(RenderResult),
}

impl Renderer {
    pub const ALL: [Renderer; 6] = [
        Renderer::PlainText,
        Renderer::Html,
        Renderer::Image,
        Renderer::Rfc822,
        Renderer::AppleDouble,
        Renderer::Attachment,
    ];

    /// Name used in the `[renderers]` configuration section.
    pub fn name(self) -> &'static str {
        match self {
            Self::PlainText => "plain",
            Self::Html => "html",
            Self::Image => "image",
            Self::Rfc822 => "rfc822",
            Self::AppleDouble => "appledouble",
            Self::Attachment => "attachment",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|r| r.name().eq_ignore_ascii_case(name))
    }

    pub fn capability(self) -> Capability {
        match self {
            Self::PlainText | Self::Html => Capability {
                inline: true,
                info: false,
                force_inline: false,
                embedded: false,
            },
            Self::Image => Capability {
                inline: true,
                info: true,
                force_inline: false,
                embedded: true,
            },
            Self::Rfc822 => Capability {
                inline: false,
                info: true,
                force_inline: false,
                embedded: true,
            },
            Self::AppleDouble => Capability {
                inline: true,
                info: true,
                force_inline: true,
                embedded: false,
            },
            Self::Attachment => Capability {
                inline: false,
                info: true,
                force_inline: false,
                embedded: false,
            },
        }
    }

    /// Whether this renderer splits its part into synthetic children.
    pub fn is_composite(self) -> bool {
        matches!(self, Self::AppleDouble)
    }

    pub fn render(
        self,
        resolver: &ContentResolver,
        tree: &MessageTree,
        node: &PartNode,
        mode: RenderMode,
    ) -> Result<RendererOutput> {
        let fragment = match self {
            Self::PlainText => render_plain(node)?,
            Self::Html => render_html(resolver, node)?,
            Self::Image if mode.contains(RenderMode::INLINE) => render_image(resolver, node),
            Self::Image | Self::Attachment => render_attachment_info(resolver, node),
            Self::Rfc822 => render_rfc822_info(tree, node),
            Self::AppleDouble => {
                return appledouble::render(resolver, tree, node, mode)
                    .map(RendererOutput::Composite)
            }
        };
        Ok(RendererOutput::Fragment(fragment))
    }
}

/// Decode a text part's bytes using its declared charset.
pub fn decode_text(node: &PartNode) -> Result<String> {
    let bytes = node.content.bytes()?;
    let charset = node.charset.as_deref().unwrap_or("utf-8");
    if charset.eq_ignore_ascii_case("utf-8") || charset.eq_ignore_ascii_case("utf8") {
        return Ok(String::from_utf8_lossy(bytes).into_owned());
    }
    match encoding_rs::Encoding::for_label(charset.as_bytes()) {
        Some(encoding) => {
            let (decoded, _, had_errors) = encoding.decode(bytes);
            if had_errors {
                warn!(
                    address = %node.address,
                    charset = charset,
                    "Malformed sequences while decoding text part"
                );
            }
            Ok(decoded.into_owned())
        }
        None => {
            warn!(
                address = %node.address,
                charset = charset,
                "Unknown charset, falling back to UTF-8 lossy"
            );
            Ok(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

fn render_plain(node: &PartNode) -> Result<RenderedFragment> {
    let text = decode_text(node)?;
    if text.trim().is_empty() {
        return Ok(RenderedFragment::html(""));
    }
    Ok(RenderedFragment::html(html::text_to_html(&text)))
}

fn render_html(resolver: &ContentResolver, node: &PartNode) -> Result<RenderedFragment> {
    let source = decode_text(node)?;
    let (body, blocked) = html::sanitize_html(&source, resolver.policy().remote_images);
    let mut fragment = RenderedFragment::html(wrap_html(&body));
    if blocked {
        let id = format!("images-{}", node.address);
        let mut status = StatusMessage::new(i18n::images_blocked()).with_icon("image");
        status.push(format!(
            "<a href=\"#\" class=\"showImages\" data-part=\"{}\">{}</a>",
            node.address,
            i18n::show_images()
        ));
        status.id = Some(id.clone());
        fragment = fragment.with_status(status).with_side_effect(SideEffect::InlineScript(
            format!("MimeView.unblockImages('{id}', '{}');", node.address),
        ));
    }
    Ok(fragment)
}

fn wrap_html(body: &str) -> String {
    format!("<div class=\"htmlMessage\">{body}</div>")
}

fn render_image(resolver: &ContentResolver, node: &PartNode) -> RenderedFragment {
    let alt = node.display_name().unwrap_or(&node.content_type);
    RenderedFragment::html(format!(
        "<img class=\"mimeImage\" src=\"{}\" alt=\"{}\" />",
        escape(&resolver.links().view(&node.address)),
        escape(alt)
    ))
}

fn render_attachment_info(resolver: &ContentResolver, node: &PartNode) -> RenderedFragment {
    let name = node.display_name().unwrap_or(i18n::unnamed());
    let mut status = StatusMessage::new(format!(
        "{}: {} ({}, {})",
        i18n::attachment(),
        escape(name),
        escape(&node.content_type),
        format_size(node.size_hint, BINARY)
    ))
    .with_icon("attachment");
    status.push(resolver.links().download(&node.address, i18n::download(), name));
    RenderedFragment::status_only(status)
}

fn render_rfc822_info(tree: &MessageTree, node: &PartNode) -> RenderedFragment {
    let name = node.display_name().unwrap_or(i18n::unnamed());
    let parts = tree.subtree(&node.address).count().saturating_sub(1);
    let status = StatusMessage::new(i18n::fill(i18n::attached_message(), &escape(name)))
        .with_icon("mail");
    let mut fragment = RenderedFragment::status_only(status);
    fragment.status[0].push(format!(
        "{} ({} part{})",
        format_size(node.size_hint, BINARY),
        parts,
        if parts == 1 { "" } else { "s" }
    ));
    fragment
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::part::PartAddress;
    use crate::render::registry::RendererRegistry;
    use crate::render::InlinePolicy;

    fn addr(s: &str) -> PartAddress {
        s.parse().unwrap()
    }

    fn html_resolver(remote_images: bool) -> ContentResolver {
        ContentResolver::new(RendererRegistry::builtin().build().unwrap()).with_policy(
            InlinePolicy {
                remote_images,
                ..InlinePolicy::default()
            },
        )
    }

    #[test]
    fn test_names_roundtrip_through_config() {
        for renderer in Renderer::ALL {
            assert_eq!(Renderer::from_name(renderer.name()), Some(renderer));
        }
        assert_eq!(Renderer::from_name(" HTML "), Some(Renderer::Html));
        assert_eq!(Renderer::from_name("pdf"), None);
    }

    #[test]
    fn test_only_appledouble_is_composite_and_forced() {
        for renderer in Renderer::ALL {
            let forced = renderer.capability().force_inline;
            assert_eq!(renderer.is_composite(), renderer == Renderer::AppleDouble);
            assert_eq!(forced, renderer == Renderer::AppleDouble);
        }
    }

    #[test]
    fn test_decode_text_legacy_charset() {
        let node = PartNode::new(addr("1"), "text/plain")
            .with_charset("iso-8859-1")
            .with_bytes(vec![b'c', b'a', b'f', 0xE9]);
        assert_eq!(decode_text(&node).unwrap(), "caf\u{e9}");
    }

    #[test]
    fn test_decode_text_unknown_charset_is_lossy_utf8() {
        let node = PartNode::new(addr("1"), "text/plain")
            .with_charset("x-made-up")
            .with_bytes("plain".as_bytes());
        assert_eq!(decode_text(&node).unwrap(), "plain");
    }

    #[test]
    fn test_render_plain_escapes() {
        let node = PartNode::new(addr("1"), "text/plain").with_bytes("a < b".as_bytes());
        let fragment = render_plain(&node).unwrap();
        assert!(fragment.body.contains("a &lt; b"));
        assert!(fragment.content_type.starts_with("text/html"));
    }

    #[test]
    fn test_render_html_drops_script_handlers() {
        let node = PartNode::new(addr("1"), "text/html").with_bytes(
            "<img src=\"cid:x\" onerror=\"alert(document.cookie)\"><a href=\"javascript:alert(1)\">x</a>"
                .as_bytes(),
        );
        let fragment = render_html(&html_resolver(false), &node).unwrap();
        assert!(fragment.body.starts_with("<div class=\"htmlMessage\">"));
        assert!(!fragment.body.contains("onerror"));
        assert!(!fragment.body.contains("javascript:"));
        assert!(fragment.status.is_empty());
        assert!(fragment.side_effects.is_empty());
    }

    #[test]
    fn test_render_html_blocks_spaced_remote_src() {
        let node = PartNode::new(addr("2"), "text/html")
            .with_bytes("<p>Hi</p><img src = \"http://tracker.test/p.gif\">".as_bytes());

        let fragment = render_html(&html_resolver(false), &node).unwrap();
        assert!(!fragment.body.contains("tracker.test"));
        assert_eq!(fragment.status.len(), 1);
        assert_eq!(fragment.status[0].id.as_deref(), Some("images-2"));
        assert_eq!(
            fragment.side_effects,
            vec![SideEffect::InlineScript(
                "MimeView.unblockImages('images-2', '2');".to_string()
            )]
        );

        let shown = render_html(&html_resolver(true), &node).unwrap();
        assert!(shown.body.contains("http://tracker.test/p.gif"));
        assert!(shown.status.is_empty());
    }
}
