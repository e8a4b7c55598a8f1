//! Render output types.

use std::collections::btree_map::{self, BTreeMap};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ViewError};
use crate::model::part::PartAddress;

/// A deferred directive for the page hosting the rendered output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SideEffect {
    /// Script text to inject once into the page.
    InlineScript(String),
    /// Script file the page must load.
    ScriptFile(String),
}

/// A user-facing notice attached to a fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    /// Icon name (resolved to an image by the page layer).
    pub icon: Option<String>,
    /// Lines of the notice, already HTML.
    pub text: Vec<String>,
    /// DOM id for the status block.
    pub id: Option<String>,
}

impl StatusMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: vec![text.into()],
            ..Self::default()
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.text.push(line.into());
    }
}

/// The displayable output of one renderer for one address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedFragment {
    /// Rendered HTML.
    pub body: String,
    /// Content type of `body`, including charset.
    pub content_type: String,
    pub side_effects: Vec<SideEffect>,
    pub status: Vec<StatusMessage>,
}

impl RenderedFragment {
    pub fn html(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            content_type: "text/html; charset=UTF-8".to_string(),
            ..Self::default()
        }
    }

    /// A fragment that only carries a status block.
    pub fn status_only(status: StatusMessage) -> Self {
        let mut fragment = Self::html("");
        fragment.status.push(status);
        fragment
    }

    pub fn with_status(mut self, status: StatusMessage) -> Self {
        self.status.push(status);
        self
    }

    pub fn with_side_effect(mut self, effect: SideEffect) -> Self {
        self.side_effects.push(effect);
        self
    }

    /// Whether there is anything for the user to see.
    pub fn is_blank(&self) -> bool {
        self.body.trim().is_empty() && self.status.is_empty()
    }
}

/// Outcome for one address.
///
/// `Suppressed` means the address was absorbed into another fragment and
/// must not be rendered on its own. It differs from an address that is
/// absent from the result, which the caller renders with its default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "fragment", rename_all = "snake_case")]
pub enum PartRender {
    Visible(RenderedFragment),
    Suppressed,
}

impl PartRender {
    pub fn fragment(&self) -> Option<&RenderedFragment> {
        match self {
            Self::Visible(fragment) => Some(fragment),
            Self::Suppressed => None,
        }
    }

    pub fn is_suppressed(&self) -> bool {
        matches!(self, Self::Suppressed)
    }
}

/// Address-ordered render results for one resolution call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RenderResult {
    entries: BTreeMap<PartAddress, PartRender>,
}

impl RenderResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// A result holding a single visible fragment.
    pub fn single(address: PartAddress, fragment: RenderedFragment) -> Self {
        let mut result = Self::new();
        result.entries.insert(address, PartRender::Visible(fragment));
        result
    }

    /// Add an entry. Each address may be filled only once.
    pub fn insert(&mut self, address: PartAddress, render: PartRender) -> Result<()> {
        match self.entries.entry(address) {
            btree_map::Entry::Occupied(slot) => Err(ViewError::AddressCollision(slot.key().clone())),
            btree_map::Entry::Vacant(slot) => {
                slot.insert(render);
                Ok(())
            }
        }
    }

    /// Move every entry of `other` into `self`, failing on the first
    /// address present in both.
    pub fn merge(&mut self, other: RenderResult) -> Result<()> {
        for (address, render) in other.entries {
            self.insert(address, render)?;
        }
        Ok(())
    }

    pub fn get(&self, address: &PartAddress) -> Option<&PartRender> {
        self.entries.get(address)
    }

    pub fn contains(&self, address: &PartAddress) -> bool {
        self.entries.contains_key(address)
    }

    pub fn is_suppressed(&self, address: &PartAddress) -> bool {
        self.get(address).is_some_and(PartRender::is_suppressed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in address order.
    pub fn iter(&self) -> impl Iterator<Item = (&PartAddress, &PartRender)> {
        self.entries.iter()
    }

    /// Visible fragments in address order.
    pub fn visible(&self) -> impl Iterator<Item = (&PartAddress, &RenderedFragment)> {
        self.entries
            .iter()
            .filter_map(|(address, render)| render.fragment().map(|f| (address, f)))
    }

    /// Every side effect of every visible fragment, in address order.
    pub fn side_effects(&self) -> Vec<SideEffect> {
        self.visible()
            .flat_map(|(_, fragment)| fragment.side_effects.iter().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> PartAddress {
        s.parse().unwrap()
    }

    #[test]
    fn test_insert_rejects_duplicates() {
        let mut result = RenderResult::new();
        result.insert(addr("1"), PartRender::Suppressed).unwrap();
        let err = result
            .insert(addr("1"), PartRender::Visible(RenderedFragment::html("x")))
            .unwrap_err();
        assert!(matches!(err, ViewError::AddressCollision(a) if a == addr("1")));
        assert!(result.is_suppressed(&addr("1")));
    }

    #[test]
    fn test_merge_keeps_address_order() {
        let mut left = RenderResult::single(addr("2"), RenderedFragment::html("b"));
        let mut right = RenderResult::single(addr("1"), RenderedFragment::html("a"));
        right.insert(addr("2.1"), PartRender::Suppressed).unwrap();
        left.merge(right).unwrap();

        let order: Vec<String> = left.iter().map(|(a, _)| a.to_string()).collect();
        assert_eq!(order, vec!["1", "2", "2.1"]);
        assert_eq!(left.visible().count(), 2);
    }

    #[test]
    fn test_suppressed_differs_from_absent() {
        let mut result = RenderResult::new();
        result.insert(addr("3"), PartRender::Suppressed).unwrap();
        assert!(result.contains(&addr("3")));
        assert!(result.is_suppressed(&addr("3")));
        assert!(!result.contains(&addr("4")));
        assert!(!result.is_suppressed(&addr("4")));
    }

    #[test]
    fn test_serializes_with_dotted_keys() {
        let mut result = RenderResult::single(addr("2"), RenderedFragment::html("<p>x</p>"));
        result.insert(addr("2.1"), PartRender::Suppressed).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["2.1"]["state"], "suppressed");
        assert_eq!(json["2"]["fragment"]["body"], "<p>x</p>");
    }
}
