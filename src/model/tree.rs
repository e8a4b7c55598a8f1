//! Read-only view over one fetched message's part structure.

use std::collections::BTreeMap;

use super::part::{PartAddress, PartNode};

/// Flat, address-ordered map of a message's parts.
///
/// The tree shape is encoded in the addresses: a part's children are the
/// parts whose address extends it by one subscript. Built once per fetch and
/// never mutated afterwards.
#[derive(Debug, Default)]
pub struct MessageTree {
    parts: BTreeMap<PartAddress, PartNode>,
}

impl MessageTree {
    /// Build a tree from a list of parts. Later duplicates replace earlier ones.
    pub fn new(parts: impl IntoIterator<Item = PartNode>) -> Self {
        Self {
            parts: parts
                .into_iter()
                .map(|part| (part.address.clone(), part))
                .collect(),
        }
    }

    pub fn part(&self, address: &PartAddress) -> Option<&PartNode> {
        self.parts.get(address)
    }

    pub fn contains(&self, address: &PartAddress) -> bool {
        self.parts.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// All parts in address order.
    pub fn parts(&self) -> impl Iterator<Item = &PartNode> {
        self.parts.values()
    }

    /// The top-level part: the root container, or part `1` of a single-part
    /// message.
    pub fn top(&self) -> Option<&PartNode> {
        self.parts.values().next()
    }

    /// Immediate structural children of `address`, in order.
    pub fn children<'a>(&'a self, address: &PartAddress) -> impl Iterator<Item = &'a PartNode> {
        let depth = address.depth() + 1;
        self.subtree(address)
            .filter(move |part| part.address.depth() == depth)
    }

    /// `address` itself followed by every part below it, in order.
    pub fn subtree<'a>(&'a self, address: &PartAddress) -> impl Iterator<Item = &'a PartNode> {
        let address = address.clone();
        self.parts
            .range(address.clone()..)
            .take_while(move |(addr, _)| **addr == address || addr.is_descendant_of(&address))
            .map(|(_, part)| part)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> PartAddress {
        s.parse().unwrap()
    }

    fn sample() -> MessageTree {
        MessageTree::new(vec![
            PartNode::new(addr("2"), "multipart/appledouble"),
            PartNode::new(PartAddress::root(), "multipart/mixed"),
            PartNode::new(addr("1"), "text/plain"),
            PartNode::new(addr("2.1"), "application/applefile"),
            PartNode::new(addr("2.2"), "image/png"),
            PartNode::new(addr("3"), "application/pdf"),
        ])
    }

    #[test]
    fn test_parts_are_address_ordered() {
        let tree = sample();
        let order: Vec<String> = tree.parts().map(|p| p.address.to_string()).collect();
        assert_eq!(order, vec!["0", "1", "2", "2.1", "2.2", "3"]);
        assert_eq!(tree.top().unwrap().content_type, "multipart/mixed");
    }

    #[test]
    fn test_children_and_subtree() {
        let tree = sample();
        let root = PartAddress::root();
        let kids: Vec<String> = tree.children(&root).map(|p| p.address.to_string()).collect();
        assert_eq!(kids, vec!["1", "2", "3"]);

        let two = addr("2");
        let sub: Vec<String> = tree.subtree(&two).map(|p| p.address.to_string()).collect();
        assert_eq!(sub, vec!["2", "2.1", "2.2"]);
        assert_eq!(tree.children(&two).count(), 2);
    }

    #[test]
    fn test_iterators_outlive_the_address() {
        let tree = sample();
        let kids: Vec<&PartNode> = {
            let two = addr("2");
            tree.children(&two).collect()
        };
        assert_eq!(kids.len(), 2);
        assert_eq!(kids[1].content_type, "image/png");

        let mut sub = tree.subtree(&addr("2"));
        assert_eq!(sub.next().map(|p| p.address.to_string()), Some("2".into()));
        assert_eq!(sub.count(), 2);
    }

    #[test]
    fn test_lookup() {
        let tree = sample();
        assert!(tree.contains(&addr("2.2")));
        assert!(tree.part(&addr("4")).is_none());
        assert_eq!(tree.len(), 6);
    }
}
