//! Reply threads: construction and display-position lookup.

pub mod builder;

use std::collections::HashMap;
use std::ops::Range;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Result, Uid, ViewError};

pub use builder::build_thread_tree;

/// The threading keys of one stored message.
#[derive(Debug, Clone)]
pub struct ThreadEntry {
    pub uid: Uid,
    pub message_id: String,
    pub in_reply_to: Option<String>,
    pub references: Vec<String>,
    pub subject: String,
    pub date: DateTime<Utc>,
}

/// One message's place in the display ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadNode {
    pub uid: Uid,
    /// Reply depth; thread roots are 0.
    pub depth: usize,
    /// Box-drawing prefix showing the reply nesting (`├─`, `│ └─`, ...).
    pub marker: String,
}

/// A mailbox's threads, flattened into display order.
#[derive(Debug, Clone, Default)]
pub struct ThreadTree {
    nodes: Vec<ThreadNode>,
    /// Node ranges, one per thread.
    threads: Vec<Range<usize>>,
    position: HashMap<Uid, usize>,
}

impl ThreadTree {
    /// Build a tree from nodes already in display order, one range per thread.
    pub fn from_nodes(nodes: Vec<ThreadNode>, threads: Vec<Range<usize>>) -> Self {
        let mut tree = Self {
            nodes,
            threads,
            position: HashMap::new(),
        };
        tree.reindex();
        tree
    }

    pub(crate) fn reindex(&mut self) {
        self.position = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.uid, i))
            .collect();
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[ThreadNode] {
        &self.nodes
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    pub fn node(&self, uid: Uid) -> Option<&ThreadNode> {
        self.position.get(&uid).map(|&i| &self.nodes[i])
    }

    /// All uids of the thread containing `uid`, in display order.
    pub fn thread_of(&self, uid: Uid) -> Option<Vec<Uid>> {
        let index = *self.position.get(&uid)?;
        let range = self.threads.iter().find(|r| r.contains(&index))?;
        Some(self.nodes[range.clone()].iter().map(|n| n.uid).collect())
    }
}

/// Display rank and nesting marker of one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadAnnotation {
    /// 1-based position in the tree's display order.
    pub rank: usize,
    pub depth: usize,
    pub nesting_marker: String,
}

/// Converts uids to display annotations over a prebuilt [`ThreadTree`].
#[derive(Debug, Clone, Copy)]
pub struct ThreadIndexer<'a> {
    tree: &'a ThreadTree,
}

impl<'a> ThreadIndexer<'a> {
    pub fn new(tree: &'a ThreadTree) -> Self {
        Self { tree }
    }

    /// Fails with [`ViewError::NotInThread`] when the message is not in the
    /// tree, e.g. removed after the tree was built.
    pub fn position_of(&self, uid: Uid) -> Result<ThreadAnnotation> {
        let index = *self
            .tree
            .position
            .get(&uid)
            .ok_or(ViewError::NotInThread(uid))?;
        let node = &self.tree.nodes[index];
        Ok(ThreadAnnotation {
            rank: index + 1,
            depth: node.depth,
            nesting_marker: node.marker.clone(),
        })
    }
}
