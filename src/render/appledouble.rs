//! `multipart/appledouble` (RFC 1740) splitter.
//!
//! An AppleDouble container holds an `application/applefile` resource fork
//! (the descriptor) followed by the file's data fork (the payload). The
//! resource fork is of no use to the reader and is only ever offered as a
//! download. The data fork is shown inline when it can be, otherwise it is
//! offered as a download too. Every other part under the container is
//! absorbed into the container's status block.

use tracing::warn;

use super::fragment::{PartRender, RenderResult, RenderedFragment, StatusMessage};
use super::html::escape;
use super::resolver::ContentResolver;
use super::RenderMode;
use crate::error::{Result, ViewError};
use crate::i18n;
use crate::model::part::{PartAddress, PartNode};
use crate::model::tree::MessageTree;

const ICON: &str = "apple";

/// Split the container `node` into its status block and payload rendering.
pub fn render(
    resolver: &ContentResolver,
    tree: &MessageTree,
    node: &PartNode,
    mode: RenderMode,
) -> Result<RenderResult> {
    let container = &node.address;

    let (status, mut result) = match locate_forks(tree, container) {
        Ok((descriptor, payload)) => {
            let mut status = StatusMessage::new(i18n::fill(
                i18n::mac_contains_file(),
                &escape(payload.display_name().unwrap_or(i18n::unnamed())),
            ))
            .with_icon(ICON);
            status.push(i18n::fill(
                i18n::mac_resource_fork_download(),
                &resolver.links().download(
                    &descriptor.address,
                    i18n::here(),
                    "The Macintosh resource fork",
                ),
            ));

            let mut result = RenderResult::new();
            if mode.contains(RenderMode::INLINE)
                && resolver.can_display(tree, &payload.address, RenderMode::INLINE)
            {
                result = resolver.resolve(tree, &payload.address, RenderMode::INLINE)?;
                status.push(i18n::mac_contents_below());
            } else {
                status.push(i18n::fill(
                    i18n::mac_contents_download(),
                    &resolver
                        .links()
                        .download(&payload.address, i18n::here(), "The Macintosh file"),
                ));
            }
            (status, result)
        }
        Err(err) => {
            warn!(address = %container, error = %err, "Unreadable AppleDouble container");
            let status = StatusMessage::new(i18n::mac_unreadable()).with_icon(ICON);
            (status, RenderResult::new())
        }
    };

    let mut status_block = Some(status);
    for part in tree.subtree(container) {
        if result.contains(&part.address) {
            continue;
        }
        let render = if part.address == *container {
            match status_block.take() {
                Some(status) => PartRender::Visible(RenderedFragment::status_only(status)),
                None => PartRender::Suppressed,
            }
        } else {
            PartRender::Suppressed
        };
        result.insert(part.address.clone(), render)?;
    }

    Ok(result)
}

/// The descriptor (first child) and the payload (the address after it).
fn locate_forks<'a>(
    tree: &'a MessageTree,
    container: &PartAddress,
) -> Result<(&'a PartNode, &'a PartNode)> {
    let descriptor = tree.children(container).next().ok_or_else(|| {
        ViewError::MalformedInput(format!("container {container} has no parts"))
    })?;
    let payload_address = descriptor.address.next_sibling()?;
    let payload = tree
        .children(container)
        .find(|child| child.address == payload_address)
        .ok_or_else(|| {
            ViewError::MalformedInput(format!(
                "container {container} has no data fork at {payload_address}"
            ))
        })?;
    Ok((descriptor, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::registry::RendererRegistry;
    use crate::render::InlinePolicy;

    fn addr(s: &str) -> PartAddress {
        s.parse().unwrap()
    }

    fn resolver() -> ContentResolver {
        ContentResolver::new(RendererRegistry::builtin().build().unwrap())
    }

    fn tree_with_payload(content_type: &str, body: &str) -> MessageTree {
        MessageTree::new(vec![
            PartNode::new(PartAddress::root(), "multipart/mixed"),
            PartNode::new(addr("1"), "text/plain").with_bytes("see attached".as_bytes()),
            PartNode::new(addr("2"), "multipart/appledouble"),
            PartNode::new(addr("2.1"), "application/applefile")
                .with_bytes(vec![0u8, 5, 22, 7])
                .with_name("notes.txt"),
            PartNode::new(addr("2.2"), content_type)
                .with_bytes(body.as_bytes())
                .with_name("notes.txt"),
        ])
    }

    fn container_status(result: &RenderResult) -> String {
        result
            .get(&addr("2"))
            .and_then(PartRender::fragment)
            .map(|f| f.status[0].text.join("\n"))
            .unwrap()
    }

    #[test]
    fn test_payload_without_inline_renderer_is_offered_for_download() {
        let tree = tree_with_payload("application/octet-stream", "binary");
        let result = resolver().resolve(&tree, &addr("2"), RenderMode::INLINE).unwrap();

        let status = container_status(&result);
        assert!(status.contains("named \"notes.txt\""));
        assert!(status.contains("id=2.1"));
        assert!(status.contains("id=2.2"));
        assert!(!status.contains("are below"));
        assert!(result.is_suppressed(&addr("2.1")));
        assert!(result.is_suppressed(&addr("2.2")));
        assert_eq!(result.visible().count(), 1);
        assert!(!result.contains(&addr("1")));
    }

    #[test]
    fn test_inline_payload_is_rendered_after_the_status_block() {
        let tree = tree_with_payload("text/plain", "the data fork");
        let result = resolver().resolve(&tree, &addr("2"), RenderMode::INLINE).unwrap();

        assert!(container_status(&result).contains("are below"));
        assert!(result.is_suppressed(&addr("2.1")));

        let carriers: Vec<String> = result
            .visible()
            .filter(|(_, f)| f.body.contains("the data fork"))
            .map(|(a, _)| a.to_string())
            .collect();
        assert_eq!(carriers, vec!["2.2"]);

        let order: Vec<String> = result.iter().map(|(a, _)| a.to_string()).collect();
        assert_eq!(order, vec!["2", "2.1", "2.2"]);
    }

    #[test]
    fn test_info_request_never_inlines_payload() {
        let tree = tree_with_payload("text/plain", "the data fork");
        let result = resolver().resolve(&tree, &addr("2"), RenderMode::INFO).unwrap();
        assert!(!container_status(&result).contains("are below"));
        assert!(result.is_suppressed(&addr("2.2")));
    }

    #[test]
    fn test_container_is_forced_inline_despite_policy() {
        let tree = tree_with_payload("image/png", "png");
        let strict = resolver().with_policy(InlinePolicy {
            images: false,
            html: false,
            remote_images: false,
        });
        let result = strict.resolve(&tree, &addr("2"), RenderMode::INLINE).unwrap();
        assert!(result.get(&addr("2")).and_then(PartRender::fragment).is_some());
        // The image payload itself is still subject to the policy.
        assert!(result.is_suppressed(&addr("2.2")));
    }

    #[test]
    fn test_missing_data_fork_degrades_to_unreadable() {
        let tree = MessageTree::new(vec![
            PartNode::new(addr("2"), "multipart/appledouble"),
            PartNode::new(addr("2.1"), "application/applefile"),
            PartNode::new(addr("2.3"), "application/octet-stream"),
        ]);
        let result = resolver().resolve(&tree, &addr("2"), RenderMode::INLINE).unwrap();
        assert!(container_status(&result).contains("could not be read"));
        assert!(result.is_suppressed(&addr("2.1")));
        assert!(result.is_suppressed(&addr("2.3")));
    }

    #[test]
    fn test_resolution_is_repeatable() {
        let tree = tree_with_payload("text/plain", "same every time");
        let r = resolver();
        let first = r.resolve(&tree, &addr("2"), RenderMode::INLINE).unwrap();
        let second = r.resolve(&tree, &addr("2"), RenderMode::INLINE).unwrap();
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_nested_payload_parts_are_absorbed() {
        let tree = MessageTree::new(vec![
            PartNode::new(addr("1"), "multipart/appledouble"),
            PartNode::new(addr("1.1"), "application/applefile"),
            PartNode::new(addr("1.2"), "multipart/mixed"),
            PartNode::new(addr("1.2.1"), "text/plain").with_bytes("deep".as_bytes()),
        ]);
        let result = resolver().resolve(&tree, &addr("1"), RenderMode::INLINE).unwrap();
        assert_eq!(result.len(), 4);
        assert!(result.is_suppressed(&addr("1.2")));
        assert!(result.is_suppressed(&addr("1.2.1")));
        assert_eq!(result.visible().count(), 1);
    }
}
