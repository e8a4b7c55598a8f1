//! JWZ-based email threading algorithm.
//!
//! Groups messages into conversation threads using `Message-ID`,
//! `In-Reply-To`, and `References` headers.
//!
//! Reference: <https://www.jwz.org/doc/threading.html>

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::{ThreadEntry, ThreadNode, ThreadTree};
use crate::error::Uid;

/// Internal container used during the threading algorithm.
#[derive(Debug)]
struct Container {
    /// Index into the `entries` slice, if this container has an actual message.
    entry_index: Option<usize>,
    message_id: String,
    parent: Option<String>,
    children: Vec<String>,
}

impl Container {
    fn empty(message_id: String) -> Self {
        Self {
            entry_index: None,
            message_id,
            parent: None,
            children: Vec::new(),
        }
    }
}

/// Build the thread tree of a mailbox.
///
/// Threads are ordered by their newest message (descending); messages
/// within a thread are in reply order, children sorted by date.
pub fn build_thread_tree(entries: &[ThreadEntry]) -> ThreadTree {
    if entries.is_empty() {
        return ThreadTree::default();
    }

    let mut containers: HashMap<String, Container> = HashMap::new();

    for (idx, entry) in entries.iter().enumerate() {
        let mid = normalize_id(&entry.message_id);
        let duplicate = containers
            .get(&mid)
            .is_some_and(|c| c.entry_index.is_some());
        if duplicate {
            debug!(message_id = %mid, uid = entry.uid, "Duplicate Message-ID, threading alone");
        }
        if mid.is_empty() || duplicate {
            let synth = format!("__synth_{}__", entry.uid);
            let mut c = Container::empty(synth.clone());
            c.entry_index = Some(idx);
            containers.insert(synth, c);
            continue;
        }

        containers
            .entry(mid.clone())
            .or_insert_with(|| Container::empty(mid.clone()))
            .entry_index = Some(idx);

        // References: A B C means A→B→C→this message.
        let mut chain: Vec<String> = entry
            .references
            .iter()
            .map(|r| normalize_id(r))
            .filter(|r| !r.is_empty())
            .collect();
        if let Some(reply_to) = &entry.in_reply_to {
            let nid = normalize_id(reply_to);
            if !nid.is_empty() && !chain.contains(&nid) {
                chain.push(nid);
            }
        }
        for rid in &chain {
            containers
                .entry(rid.clone())
                .or_insert_with(|| Container::empty(rid.clone()));
        }
        chain.push(mid);

        for window in chain.windows(2) {
            link(&mut containers, &window[0], &window[1]);
        }
    }

    let root_ids: Vec<String> = containers
        .values()
        .filter(|c| c.parent.is_none())
        .map(|c| c.message_id.clone())
        .collect();

    // Merge roots sharing a normalized subject.
    let mut subject_map: HashMap<String, Vec<String>> = HashMap::new();
    for rid in root_ids {
        let subject = root_subject(&rid, &containers, entries);
        subject_map.entry(subject).or_default().push(rid);
    }

    let mut threads: Vec<(DateTime<Utc>, Vec<(usize, usize)>)> = Vec::new();
    for mut group in subject_map.into_values() {
        group.sort_by_key(|rid| earliest_date(rid, &containers, entries));
        let mut nodes = Vec::new();
        for rid in &group {
            flatten(rid, 0, &containers, entries, &mut nodes);
        }
        if let Some(newest) = nodes.iter().map(|(idx, _)| entries[*idx].date).max() {
            threads.push((newest, nodes));
        }
    }

    // Newest thread first; uid breaks ties so the order is stable.
    threads.sort_by(|a, b| {
        b.0.cmp(&a.0)
            .then_with(|| entries[a.1[0].0].uid.cmp(&entries[b.1[0].0].uid))
    });

    let mut tree = ThreadTree::default();
    for (_, nodes) in threads {
        let start = tree.nodes.len();
        let markers = nesting_markers(&nodes);
        tree.nodes.extend(
            nodes
                .iter()
                .zip(markers)
                .map(|(&(idx, depth), marker)| ThreadNode {
                    uid: entries[idx].uid,
                    depth,
                    marker,
                }),
        );
        tree.threads.push(start..tree.nodes.len());
    }
    tree.reindex();
    tree
}

fn link(containers: &mut HashMap<String, Container>, parent_id: &str, child_id: &str) {
    if parent_id == child_id || would_create_cycle(containers, parent_id, child_id) {
        return;
    }

    if let Some(old_parent_id) = containers.get(child_id).and_then(|c| c.parent.clone()) {
        if old_parent_id == parent_id {
            return;
        }
        if let Some(old_parent) = containers.get_mut(&old_parent_id) {
            old_parent.children.retain(|c| c != child_id);
        }
    }

    if let Some(child) = containers.get_mut(child_id) {
        child.parent = Some(parent_id.to_string());
    }
    if let Some(parent) = containers.get_mut(parent_id) {
        if !parent.children.iter().any(|c| c == child_id) {
            parent.children.push(child_id.to_string());
        }
    }
}

/// Whether making `parent_id` the parent of `child_id` would create a cycle.
fn would_create_cycle(
    containers: &HashMap<String, Container>,
    parent_id: &str,
    child_id: &str,
) -> bool {
    let mut current = Some(parent_id.to_string());
    let mut depth = 0;
    while let Some(ref id) = current {
        if id == child_id {
            return true;
        }
        depth += 1;
        if depth > 100 {
            return true;
        }
        current = containers.get(id.as_str()).and_then(|c| c.parent.clone());
    }
    false
}

/// Pre-order walk producing `(entry_index, depth)` pairs.
///
/// Empty containers are skipped without consuming a nesting level.
fn flatten(
    id: &str,
    depth: usize,
    containers: &HashMap<String, Container>,
    entries: &[ThreadEntry],
    out: &mut Vec<(usize, usize)>,
) {
    let Some(container) = containers.get(id) else {
        return;
    };

    if let Some(idx) = container.entry_index {
        out.push((idx, depth));
    }

    let mut children = container.children.clone();
    children.sort_by_key(|c| earliest_date(c, containers, entries));

    let child_depth = if container.entry_index.is_some() {
        depth + 1
    } else {
        depth
    };
    for child_id in &children {
        flatten(child_id, child_depth, containers, entries, out);
    }
}

/// Date of the container's message, or of its earliest descendant.
fn earliest_date(
    id: &str,
    containers: &HashMap<String, Container>,
    entries: &[ThreadEntry],
) -> (DateTime<Utc>, Uid) {
    let Some(container) = containers.get(id) else {
        return (DateTime::<Utc>::MAX_UTC, Uid::MAX);
    };
    if let Some(idx) = container.entry_index {
        return (entries[idx].date, entries[idx].uid);
    }
    container
        .children
        .iter()
        .map(|c| earliest_date(c, containers, entries))
        .min()
        .unwrap_or((DateTime::<Utc>::MAX_UTC, Uid::MAX))
}

fn root_subject(
    root_id: &str,
    containers: &HashMap<String, Container>,
    entries: &[ThreadEntry],
) -> String {
    let subject = containers
        .get(root_id)
        .and_then(|c| {
            c.entry_index.or_else(|| {
                c.children
                    .iter()
                    .find_map(|child| containers.get(child.as_str()).and_then(|c| c.entry_index))
            })
        })
        .map(|idx| normalize_subject(&entries[idx].subject))
        .unwrap_or_default();
    if subject.is_empty() {
        // Subject-less roots stay apart.
        format!("\u{0}{root_id}")
    } else {
        subject
    }
}

/// Box-drawing prefixes for a pre-ordered `(index, depth)` list.
fn nesting_markers(nodes: &[(usize, usize)]) -> Vec<String> {
    let mut continues: Vec<bool> = Vec::new();
    let mut markers = Vec::with_capacity(nodes.len());

    for (i, &(_, depth)) in nodes.iter().enumerate() {
        let last = nodes[i + 1..]
            .iter()
            .take_while(|(_, d)| *d >= depth)
            .all(|(_, d)| *d != depth);

        let mut marker = String::new();
        for level in 1..depth {
            let open = continues.get(level).copied().unwrap_or(false);
            marker.push_str(if open { "│ " } else { "  " });
        }
        if depth > 0 {
            marker.push_str(if last { "└─" } else { "├─" });
        }
        if continues.len() <= depth {
            continues.resize(depth + 1, false);
        }
        continues[depth] = !last;
        markers.push(marker);
    }
    markers
}

/// Strip angle brackets and whitespace from a Message-ID.
pub(crate) fn normalize_id(id: &str) -> String {
    id.trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim()
        .to_string()
}

/// Normalize a subject for grouping: strip Re:/Fwd: prefixes, lowercase.
fn normalize_subject(subject: &str) -> String {
    let mut s = subject.trim();
    loop {
        let lower = s.to_lowercase();
        let cut = ["re:", "fwd:", "fw:"]
            .iter()
            .find(|p| lower.starts_with(*p))
            .map(|p| p.len());
        match cut {
            Some(n) => s = s[n..].trim_start(),
            None => break,
        }
    }
    s.to_lowercase()
}
