//! The dispatch core: resolve a part address into render results.

use tracing::{debug, warn};

use super::fragment::{RenderResult, RenderedFragment, StatusMessage};
use super::html::{escape, LinkBuilder};
use super::registry::RendererRegistry;
use super::viewers::{Renderer, RendererOutput};
use super::{InlinePolicy, RenderMode};
use crate::error::{Result, ViewError};
use crate::i18n;
use crate::model::part::{PartAddress, PartNode};
use crate::model::tree::MessageTree;

/// Resolves parts of a [`MessageTree`] through a [`RendererRegistry`].
///
/// Holds no per-message state; one resolver serves every message of a
/// request.
#[derive(Debug, Clone)]
pub struct ContentResolver {
    registry: RendererRegistry,
    policy: InlinePolicy,
    links: LinkBuilder,
    prefer_html: bool,
}

impl ContentResolver {
    pub fn new(registry: RendererRegistry) -> Self {
        Self {
            registry,
            policy: InlinePolicy::default(),
            links: LinkBuilder::default(),
            prefer_html: false,
        }
    }

    pub fn with_policy(mut self, policy: InlinePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_links(mut self, links: LinkBuilder) -> Self {
        self.links = links;
        self
    }

    /// Pick `text/html` over `text/plain` inside `multipart/alternative`.
    pub fn prefer_html(mut self, prefer: bool) -> Self {
        self.prefer_html = prefer;
        self
    }

    pub fn registry(&self) -> &RendererRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &InlinePolicy {
        &self.policy
    }

    pub fn links(&self) -> &LinkBuilder {
        &self.links
    }

    /// The renderer the registry picks for a part.
    pub fn renderer_for(&self, node: &PartNode, mode: RenderMode) -> Renderer {
        self.registry.select(&node.content_type, mode, &self.policy)
    }

    /// Whether the part at `address` can be rendered in `mode`.
    pub fn can_display(&self, tree: &MessageTree, address: &PartAddress, mode: RenderMode) -> bool {
        tree.part(address).is_some_and(|node| {
            let renderer = self.renderer_for(node, mode);
            RendererRegistry::eligible(renderer, &node.content_type, mode, &self.policy)
        })
    }

    /// Render the part at `address` and everything its renderer absorbs.
    ///
    /// Unavailable output kinds and renderer failures degrade to a textual
    /// placeholder for the address. Only a missing part or two renderers
    /// claiming the same address are errors.
    pub fn resolve(
        &self,
        tree: &MessageTree,
        address: &PartAddress,
        mode: RenderMode,
    ) -> Result<RenderResult> {
        let node = tree
            .part(address)
            .ok_or_else(|| ViewError::PartNotFound(address.clone()))?;
        let renderer = self.renderer_for(node, mode);

        if !RendererRegistry::eligible(renderer, &node.content_type, mode, &self.policy) {
            debug!(
                address = %address,
                content_type = %node.content_type,
                renderer = renderer.name(),
                "Requested render mode unavailable, using placeholder"
            );
            return Ok(RenderResult::single(address.clone(), placeholder(node)));
        }

        match renderer.render(self, tree, node, mode) {
            Ok(RendererOutput::Fragment(fragment)) => {
                Ok(RenderResult::single(address.clone(), fragment))
            }
            Ok(RendererOutput::Composite(parts)) => {
                let mut merged = RenderResult::new();
                merged.merge(parts)?;
                Ok(merged)
            }
            Err(err @ ViewError::AddressCollision(_)) => Err(err),
            Err(err) => {
                warn!(
                    address = %address,
                    renderer = renderer.name(),
                    error = %err,
                    "Renderer failed, using placeholder"
                );
                Ok(RenderResult::single(address.clone(), placeholder(node)))
            }
        }
    }

    /// Locate the part holding the message text.
    ///
    /// Walks the tree from the top part: registered composite containers are
    /// taken as a whole, `multipart/alternative` picks its preferred
    /// variant (HTML only while the policy allows it inline), other multiparts yield their first displayable child. Falls
    /// back to the first leaf.
    pub fn find_body(&self, tree: &MessageTree) -> Option<PartAddress> {
        let top = tree.top()?;
        self.find_body_in(tree, top).or_else(|| {
            tree.parts()
                .find(|part| !part.is_multipart())
                .map(|part| part.address.clone())
        })
    }

    fn find_body_in(&self, tree: &MessageTree, node: &PartNode) -> Option<PartAddress> {
        if self.registry.is_composite(&node.content_type) {
            return Some(node.address.clone());
        }

        if node.content_type == "multipart/alternative" {
            let children: Vec<&PartNode> = tree.children(&node.address).collect();
            let wanted = if self.prefer_html && self.policy.html {
                ["text/html", "text/plain"]
            } else {
                ["text/plain", "text/html"]
            };
            let chosen = wanted
                .iter()
                .find_map(|ct| children.iter().find(|c| c.content_type == *ct))
                .or_else(|| children.iter().find(|c| c.is_multipart()))
                .or(children.first())?;
            return self.find_body_in(tree, chosen);
        }

        if node.is_multipart() {
            return tree
                .children(&node.address)
                .find_map(|child| self.find_body_in(tree, child));
        }

        let is_text = matches!(node.content_type.as_str(), "text/plain" | "text/html");
        (is_text && !node.is_attachment).then(|| node.address.clone())
    }
}

/// Shown when a part has no representation for the requested mode.
fn placeholder(node: &PartNode) -> RenderedFragment {
    RenderedFragment::status_only(StatusMessage::new(format!(
        "<em>{}</em>",
        i18n::fill(i18n::no_inline_representation(), &escape(&node.content_type))
    )))
}
