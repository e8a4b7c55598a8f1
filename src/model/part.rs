//! Part addressing and part nodes.
//!
//! A [`PartAddress`] is the IMAP-style position of a part inside a message
//! (`1`, `2.1`, `2.2.3`). The root of a multipart message has the empty
//! address, rendered as `0`.

use std::cell::OnceCell;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, ViewError};

/// Position of a part in a message's part tree.
///
/// Ordering is lexicographic over the numeric subscripts, which is the
/// standard MIME part order (`1` < `1.1` < `1.2` < `2` < `10`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PartAddress(Vec<u32>);

impl PartAddress {
    /// The whole-message address.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Build an address from its subscripts. Zero subscripts are invalid.
    pub fn new(subscripts: impl Into<Vec<u32>>) -> Result<Self> {
        let subscripts = subscripts.into();
        if subscripts.contains(&0) {
            let shown = subscripts
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(".");
            return Err(ViewError::InvalidPartAddress(shown));
        }
        Ok(Self(subscripts))
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn subscripts(&self) -> &[u32] {
        &self.0
    }

    /// Nesting depth: 0 for the root, 1 for `2`, 2 for `2.1`.
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// The part following this one under the same parent.
    pub fn next_sibling(&self) -> Result<Self> {
        let mut subscripts = self.0.clone();
        match subscripts.last_mut() {
            Some(last) => {
                *last = last
                    .checked_add(1)
                    .ok_or_else(|| ViewError::InvalidPartAddress(self.to_string()))?;
                Ok(Self(subscripts))
            }
            None => Err(ViewError::RootHasNoSibling),
        }
    }

    /// The enclosing part, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    pub fn first_child(&self) -> Self {
        self.child(1)
    }

    /// The `n`-th child (1-based).
    pub fn child(&self, n: u32) -> Self {
        let mut subscripts = self.0.clone();
        subscripts.push(n.max(1));
        Self(subscripts)
    }

    /// Whether `self` lies strictly below `ancestor`.
    pub fn is_descendant_of(&self, ancestor: &PartAddress) -> bool {
        self.0.len() > ancestor.0.len() && self.0.starts_with(&ancestor.0)
    }
}

impl fmt::Display for PartAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("0");
        }
        for (i, n) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{n}")?;
        }
        Ok(())
    }
}

impl FromStr for PartAddress {
    type Err = ViewError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s == "0" || s.is_empty() {
            return Ok(Self::root());
        }
        let subscripts = s
            .split('.')
            .map(|n| n.parse::<u32>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| ViewError::InvalidPartAddress(s.to_string()))?;
        Self::new(subscripts).map_err(|_| ViewError::InvalidPartAddress(s.to_string()))
    }
}

impl Serialize for PartAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PartAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

type Loader = Box<dyn Fn() -> Result<Vec<u8>>>;

/// Decoded part bytes, loaded at most once.
///
/// Either handed over up front by the structure collaborator, or fetched on
/// first access through a loader and cached for the rest of the request.
pub struct PartContent {
    bytes: OnceCell<Vec<u8>>,
    loader: Option<Loader>,
}

impl PartContent {
    pub fn loaded(bytes: impl Into<Vec<u8>>) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(bytes.into());
        Self {
            bytes: cell,
            loader: None,
        }
    }

    pub fn deferred(loader: impl Fn() -> Result<Vec<u8>> + 'static) -> Self {
        Self {
            bytes: OnceCell::new(),
            loader: Some(Box::new(loader)),
        }
    }

    /// Container parts carry no bytes of their own.
    pub fn empty() -> Self {
        Self::loaded(Vec::new())
    }

    /// The decoded bytes, fetching them on first use.
    pub fn bytes(&self) -> Result<&[u8]> {
        if let Some(bytes) = self.bytes.get() {
            return Ok(bytes);
        }
        let fetched = match &self.loader {
            Some(load) => load()?,
            None => Vec::new(),
        };
        Ok(self.bytes.get_or_init(|| fetched))
    }

    pub fn is_loaded(&self) -> bool {
        self.bytes.get().is_some()
    }
}

impl fmt::Debug for PartContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bytes.get() {
            Some(bytes) => write!(f, "PartContent({} bytes)", bytes.len()),
            None => f.write_str("PartContent(deferred)"),
        }
    }
}

/// One node of a message's part tree.
#[derive(Debug)]
pub struct PartNode {
    pub address: PartAddress,
    /// `type/subtype`, always lower-cased.
    pub content_type: String,
    /// `charset` parameter for text parts.
    pub charset: Option<String>,
    /// Filename from `Content-Disposition` or the `name` parameter.
    pub name: Option<String>,
    /// `Content-Disposition: attachment`.
    pub is_attachment: bool,
    /// Decoded size in bytes, as reported by the structure.
    pub size_hint: u64,
    pub content: PartContent,
}

impl PartNode {
    pub fn new(address: PartAddress, content_type: &str) -> Self {
        Self {
            address,
            content_type: normalize_content_type(content_type),
            charset: None,
            name: None,
            is_attachment: false,
            size_hint: 0,
            content: PartContent::empty(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    pub fn with_bytes(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        self.size_hint = bytes.len() as u64;
        self.content = PartContent::loaded(bytes);
        self
    }

    pub fn with_content(mut self, content: PartContent, size_hint: u64) -> Self {
        self.size_hint = size_hint;
        self.content = content;
        self
    }

    pub fn as_attachment(mut self) -> Self {
        self.is_attachment = true;
        self
    }

    /// The primary type (`text` of `text/plain`).
    pub fn primary_type(&self) -> &str {
        self.content_type
            .split('/')
            .next()
            .unwrap_or(&self.content_type)
    }

    pub fn is_multipart(&self) -> bool {
        self.primary_type() == "multipart"
    }

    /// Name to show the user, with a fallback for unnamed parts.
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().map(str::trim).filter(|n| !n.is_empty())
    }
}

/// Lower-case a content type and strip parameters and whitespace.
///
/// A bare primary type (`text`) is completed to `text/plain`, other bare
/// types become `type/*`'s fallback `application/octet-stream`.
pub fn normalize_content_type(raw: &str) -> String {
    let main = raw.split(';').next().unwrap_or("").trim().to_lowercase();
    if main.is_empty() {
        return "application/octet-stream".to_string();
    }
    if main.contains('/') {
        return main;
    }
    match main.as_str() {
        "text" => "text/plain".to_string(),
        _ => "application/octet-stream".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn addr(s: &str) -> PartAddress {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(addr("1.2.3").subscripts(), &[1, 2, 3]);
        assert_eq!(addr("1.2.3").to_string(), "1.2.3");
        assert!(addr("0").is_root());
        assert_eq!(PartAddress::root().to_string(), "0");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("1..2".parse::<PartAddress>().is_err());
        assert!("a.b".parse::<PartAddress>().is_err());
        assert!("1.0".parse::<PartAddress>().is_err());
    }

    #[test]
    fn test_next_sibling() {
        assert_eq!(addr("2.1").next_sibling().unwrap(), addr("2.2"));
        assert_eq!(addr("9").next_sibling().unwrap(), addr("10"));
        assert!(matches!(
            PartAddress::root().next_sibling(),
            Err(ViewError::RootHasNoSibling)
        ));
    }

    #[test]
    fn test_next_sibling_at_subscript_limit() {
        let last = addr("3.4294967295");
        assert!(matches!(
            last.next_sibling(),
            Err(ViewError::InvalidPartAddress(ref a)) if a == "3.4294967295"
        ));
    }

    #[test]
    fn test_parent_and_children() {
        assert_eq!(addr("2.1").parent(), Some(addr("2")));
        assert_eq!(addr("2").parent(), Some(PartAddress::root()));
        assert_eq!(PartAddress::root().parent(), None);
        assert_eq!(addr("2").first_child(), addr("2.1"));
        assert_eq!(PartAddress::root().first_child(), addr("1"));
        assert!(addr("2.1.4").is_descendant_of(&addr("2")));
        assert!(!addr("2").is_descendant_of(&addr("2")));
        assert!(!addr("21").is_descendant_of(&addr("2")));
    }

    #[test]
    fn test_ordering_is_numeric_per_level() {
        let mut list = vec![addr("10"), addr("2.1"), addr("2"), addr("1.9"), addr("1.10")];
        list.sort();
        let shown: Vec<String> = list.iter().map(|a| a.to_string()).collect();
        assert_eq!(shown, vec!["1.9", "1.10", "2", "2.1", "10"]);
        assert!(PartAddress::root() < addr("1"));
    }

    #[test]
    fn test_serde_as_dotted_string() {
        let json = serde_json::to_string(&addr("3.1")).unwrap();
        assert_eq!(json, "\"3.1\"");
        let back: PartAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr("3.1"));
    }

    #[test]
    fn test_normalize_content_type() {
        assert_eq!(normalize_content_type("Text/HTML; charset=utf-8"), "text/html");
        assert_eq!(normalize_content_type("text"), "text/plain");
        assert_eq!(normalize_content_type(""), "application/octet-stream");
    }

    #[test]
    fn test_deferred_content_loads_once() {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let content = PartContent::deferred(move || {
            counter.set(counter.get() + 1);
            Ok(b"payload".to_vec())
        });
        assert!(!content.is_loaded());
        assert_eq!(content.bytes().unwrap(), b"payload");
        assert_eq!(content.bytes().unwrap(), b"payload");
        assert_eq!(calls.get(), 1);
    }

    proptest! {
        #[test]
        fn sibling_arithmetic_stays_under_parent(
            subscripts in prop::collection::vec(1u32..1000, 1..6)
        ) {
            let a = PartAddress::new(subscripts).unwrap();
            let twice = a.next_sibling().unwrap().next_sibling().unwrap();
            prop_assert_eq!(twice.parent(), a.parent());
        }

        #[test]
        fn display_parse_is_stable(
            subscripts in prop::collection::vec(1u32..1000, 1..6)
        ) {
            let a = PartAddress::new(subscripts).unwrap();
            prop_assert_eq!(a.to_string().parse::<PartAddress>().unwrap(), a);
        }
    }
}
