//! Message set assembly: turns a list of message uids into one
//! display-ready view.
//!
//! Two modes exist. [`AssemblyMode::SingleThread`] expands the request to
//! the whole thread of the given message and annotates every message with
//! its thread position. [`AssemblyMode::MultiMessage`] shows exactly the
//! requested messages in request order.
//!
//! Failures are contained per message: a message that cannot be fetched
//! or rendered is left out and reported in
//! [`AssembledView::partial_failures`]. The seen flag is set once per
//! assembly, after every message was processed.

use chrono::{DateTime, FixedOffset, Local};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::display::{
    self, address_line, list_information, local_time, x_priority, ListInformation,
    MailingListFlag, Priority,
};
use crate::error::{Result, Uid};
use crate::i18n;
use crate::model::envelope::Envelope;
use crate::model::tree::MessageTree;
use crate::render::fragment::SideEffect;
use crate::render::html::{self, escape, format_status_msg, truncate};
use crate::render::resolver::ContentResolver;
use crate::render::RenderMode;
use crate::store::{MailStore, UserPreferences};
use crate::thread::{ThreadAnnotation, ThreadIndexer, ThreadTree};

/// How the requested uids are turned into the displayed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyMode {
    /// The full thread of the requested message(s).
    SingleThread,
    /// Exactly the requested messages.
    MultiMessage,
}

/// Messages of one mailbox to display together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSet {
    pub mailbox: String,
    pub uids: Vec<Uid>,
}

impl MessageSet {
    pub fn new(mailbox: impl Into<String>, uids: impl IntoIterator<Item = Uid>) -> Self {
        Self {
            mailbox: mailbox.into(),
            uids: uids.into_iter().collect(),
        }
    }
}

/// Display settings that do not come from the store.
#[derive(Debug, Clone)]
pub struct AssemblerOptions {
    /// Width subjects are truncated to in the thread list.
    pub subject_width: usize,
    pub show_icons: bool,
    /// Extra headers to show, from the `mail_hdr` preference.
    pub user_headers: Vec<String>,
    /// Reference time for "Today" dates; the local clock when unset.
    pub now: Option<DateTime<FixedOffset>>,
}

impl Default for AssemblerOptions {
    fn default() -> Self {
        Self {
            subject_width: 60,
            show_icons: true,
            user_headers: Vec::new(),
            now: None,
        }
    }
}

impl AssemblerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            subject_width: config.display.subject_width,
            show_icons: config.display.show_icons,
            user_headers: display::user_headers(
                &config.preferences.value("mail_hdr").unwrap_or_default(),
            ),
            now: None,
        }
    }
}

/// One labelled header line of a displayed message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayHeader {
    pub name: String,
    pub label: String,
    /// HTML-safe value.
    pub value: String,
}

/// One displayed message.
#[derive(Debug, Clone, Serialize)]
pub struct DisplayUnit {
    pub uid: Uid,
    /// Thread position (SingleThread mode, message present in the tree).
    pub rank: Option<usize>,
    pub nesting_marker: Option<String>,
    pub headers: Vec<DisplayHeader>,
    /// The recipients are shown instead of the sender.
    pub addr_to: bool,
    /// HTML-escaped subject.
    pub subject: String,
    /// Thread-list entry: nesting marker, anchor, truncated subject and
    /// sender.
    pub tree_line: String,
    /// Navigation label shown next to the message.
    pub link: Option<String>,
    pub priority: Priority,
    pub list: ListInformation,
    pub mailing_list: bool,
    pub body_html: String,
    pub side_effects: Vec<SideEffect>,
}

/// A message left out of the view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartialFailure {
    pub uid: Uid,
    pub reason: String,
}

/// The assembled page.
#[derive(Debug, Clone, Serialize)]
pub struct AssembledView {
    pub mode: &'static str,
    /// "Thread View" or "Multiple Message View".
    pub page_title: String,
    /// Thread subject, or the message count.
    pub title: String,
    pub units: Vec<DisplayUnit>,
    pub partial_failures: Vec<PartialFailure>,
}

/// Outcome of an assembly.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Assembly {
    View(AssembledView),
    /// Nothing to show: send the user back to the mailbox with a notice.
    Redirect { mailbox: String, notice: String },
}

/// Orchestrates fetching, rendering and thread annotation of a message set.
pub struct MessageSetAssembler<'a, S> {
    store: S,
    resolver: &'a ContentResolver,
    options: AssemblerOptions,
}

impl<'a, S: MailStore> MessageSetAssembler<'a, S> {
    pub fn new(store: S, resolver: &'a ContentResolver) -> Self {
        Self {
            store,
            resolver,
            options: AssemblerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: AssemblerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn assemble(&self, set: &MessageSet, mode: AssemblyMode) -> Result<Assembly> {
        let mailbox = set.mailbox.as_str();

        let (uids, tree) = match mode {
            AssemblyMode::SingleThread => {
                let tree = match self.store.thread_tree_for(mailbox) {
                    Ok(tree) => tree,
                    Err(err) => {
                        warn!(mailbox = mailbox, error = %err, "Thread tree unavailable");
                        ThreadTree::default()
                    }
                };
                (expand_threads(&tree, &set.uids), Some(tree))
            }
            AssemblyMode::MultiMessage => (dedup(&set.uids), None),
        };

        if uids.is_empty() && mode == AssemblyMode::SingleThread {
            info!(mailbox = mailbox, requested = ?set.uids, "No thread to display");
            return Ok(Assembly::Redirect {
                mailbox: set.mailbox.clone(),
                notice: i18n::could_not_load_message().to_string(),
            });
        }

        let indexer = tree.as_ref().map(ThreadIndexer::new);
        let multiple = uids.len() > 1;
        let now = self
            .options
            .now
            .unwrap_or_else(|| Local::now().fixed_offset());

        let mut units = Vec::with_capacity(uids.len());
        let mut partial_failures = Vec::new();
        for &uid in &uids {
            match self.assemble_unit(mailbox, uid, indexer.as_ref(), multiple, &now) {
                Ok(unit) => units.push(unit),
                Err(err) if err.is_per_message() => {
                    warn!(mailbox = mailbox, uid = uid, error = %err, "Message left out of view");
                    partial_failures.push(PartialFailure {
                        uid,
                        reason: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }

        // One batched flag update for the whole set.
        if let Err(err) = self.store.mark_seen(mailbox, &uids) {
            warn!(mailbox = mailbox, count = uids.len(), error = %err, "Could not flag messages as seen");
        }

        let view = match mode {
            AssemblyMode::SingleThread => AssembledView {
                mode: "thread",
                page_title: i18n::thread_view().to_string(),
                title: thread_subject(&units),
                units,
                partial_failures,
            },
            AssemblyMode::MultiMessage => AssembledView {
                mode: "msgview",
                page_title: i18n::multiple_message_view().to_string(),
                title: i18n::fill(i18n::n_messages(), &units.len().to_string()),
                units,
                partial_failures,
            },
        };
        debug!(
            mailbox = mailbox,
            shown = view.units.len(),
            failed = view.partial_failures.len(),
            "Assembled message view"
        );
        Ok(Assembly::View(view))
    }

    fn assemble_unit(
        &self,
        mailbox: &str,
        uid: Uid,
        indexer: Option<&ThreadIndexer<'_>>,
        multiple: bool,
        now: &DateTime<FixedOffset>,
    ) -> Result<DisplayUnit> {
        let envelope = self.store.fetch_envelope(mailbox, uid)?;
        let tree = self.store.fetch_structure(mailbox, uid)?;
        let (body_html, side_effects) = self.render_body(&tree)?;

        let annotation = indexer.and_then(|ix| annotate(ix, uid));

        let addr_to = self.store.is_special_outgoing(mailbox);
        let (addresses, label) = if addr_to {
            (&envelope.to, i18n::hdr_to())
        } else {
            (&envelope.from, i18n::hdr_from())
        };
        let first_label = addresses
            .first()
            .map(|a| escape(a.label()))
            .unwrap_or_default();
        let tree_addr = if addr_to {
            format!("{}: {first_label}", i18n::hdr_to())
        } else {
            first_label
        };

        let subject = escape(&envelope.subject);
        let marker = annotation
            .as_ref()
            .map(|a| a.nesting_marker.as_str())
            .unwrap_or_default();
        let tree_line = format!(
            "{marker}<a href=\"#i{uid}\">{}</a> ({tree_addr})",
            escape(&truncate(&envelope.subject, self.options.subject_width))
        );

        let link = match (indexer.is_some(), multiple) {
            (true, true) => Some(i18n::thread_list().to_string()),
            (true, false) => None,
            (false, _) => Some(i18n::back_to_index().to_string()),
        };

        let mut headers = Vec::new();
        if let Some(date) = &envelope.date {
            headers.push(header("date", i18n::hdr_date(), local_time(date, now)));
        }
        let who = if addr_to { "to" } else { "from" };
        headers.push(header(who, label, address_line(addresses)));
        if !envelope.cc.is_empty() {
            headers.push(header("cc", i18n::hdr_cc(), address_line(&envelope.cc)));
        }
        headers.push(header("subject", i18n::hdr_subject(), subject.clone()));
        headers.extend(self.user_header_lines(&envelope));

        Ok(DisplayUnit {
            uid,
            rank: annotation.as_ref().map(|a| a.rank),
            nesting_marker: annotation.map(|a| a.nesting_marker),
            headers,
            addr_to,
            subject,
            tree_line,
            link,
            priority: x_priority(envelope.header("X-Priority")),
            list: list_information(&envelope),
            mailing_list: MailingListFlag.matches(&envelope),
            body_html,
            side_effects,
        })
    }

    /// Inline rendering of the message body, or the "no inline text"
    /// notice when nothing can be shown.
    fn render_body(&self, tree: &MessageTree) -> Result<(String, Vec<SideEffect>)> {
        let no_text = || format!("<em>{}</em>", i18n::no_inline_text());

        let Some(body) = self.resolver.find_body(tree) else {
            return Ok((no_text(), Vec::new()));
        };
        if !self.resolver.can_display(tree, &body, RenderMode::INLINE) {
            return Ok((no_text(), Vec::new()));
        }

        let result = self.resolver.resolve(tree, &body, RenderMode::INLINE)?;
        let mut out = String::new();
        for (_, fragment) in result.visible() {
            for status in &fragment.status {
                let mut status = status.clone();
                if !self.options.show_icons {
                    status.icon = None;
                }
                out.push_str(&format_status_msg(&status));
            }
            out.push_str(&fragment.body);
        }
        if out.trim().is_empty() {
            return Ok((no_text(), result.side_effects()));
        }
        Ok((out, result.side_effects()))
    }

    fn user_header_lines(&self, envelope: &Envelope) -> Vec<DisplayHeader> {
        self.options
            .user_headers
            .iter()
            .filter_map(|name| {
                envelope
                    .header(name)
                    .map(|value| header(&name.to_lowercase(), name, escape(value)))
            })
            .collect()
    }
}

/// Rank and nesting marker for `uid`, or `None` when a stale tree no longer
/// holds it.
fn annotate(indexer: &ThreadIndexer<'_>, uid: Uid) -> Option<ThreadAnnotation> {
    match indexer.position_of(uid) {
        Ok(annotation) => Some(annotation),
        Err(err) => {
            debug!(uid = uid, error = %err, "Message not in thread tree, no nesting marker");
            None
        }
    }
}

fn header(name: &str, label: &str, value: String) -> DisplayHeader {
    DisplayHeader {
        name: name.to_string(),
        label: label.to_string(),
        value,
    }
}

/// The threads of the requested uids, in tree order, each uid once.
fn expand_threads(tree: &ThreadTree, requested: &[Uid]) -> Vec<Uid> {
    let mut uids: Vec<Uid> = Vec::new();
    for &uid in requested {
        match tree.thread_of(uid) {
            Some(thread) => {
                for member in thread {
                    if !uids.contains(&member) {
                        uids.push(member);
                    }
                }
            }
            None => debug!(uid = uid, "Requested message is not in any thread"),
        }
    }
    uids
}

fn dedup(uids: &[Uid]) -> Vec<Uid> {
    let mut out = Vec::with_capacity(uids.len());
    for &uid in uids {
        if !out.contains(&uid) {
            out.push(uid);
        }
    }
    out
}

/// Title of a thread view: the first subject with one leading "Re:"
/// removed.
fn thread_subject(units: &[DisplayUnit]) -> String {
    let Some(subject) = units.iter().map(|u| u.subject.as_str()).find(|s| !s.is_empty()) else {
        return i18n::thread_view().to_string();
    };
    match subject.get(..3) {
        Some(prefix) if prefix.eq_ignore_ascii_case("re:") => subject[3..].trim_start().to_string(),
        _ => subject.to_string(),
    }
}

/// Plain-text rendering of an assembled view for terminals.
pub fn view_to_text(view: &AssembledView) -> String {
    let mut out = format!("{}\n{}\n\n", view.page_title, view.title);

    if view.mode == "thread" && view.units.len() > 1 {
        for unit in &view.units {
            out.push_str(&html::html_to_text(&unit.tree_line));
            out.push('\n');
        }
        out.push('\n');
    }

    for unit in &view.units {
        out.push_str(&"─".repeat(60));
        out.push('\n');
        for h in &unit.headers {
            out.push_str(&format!("{}: {}\n", h.label, html::html_to_text(&h.value)));
        }
        out.push('\n');
        out.push_str(&html::html_to_text(&unit.body_html));
        out.push_str("\n\n");
    }

    if !view.partial_failures.is_empty() {
        out.push_str(&format!("{}:\n", i18n::cli_partial_failures()));
        for failure in &view.partial_failures {
            out.push_str(&format!("  {} {}\n", failure.uid, failure.reason));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::ThreadNode;

    fn unit(subject: &str) -> DisplayUnit {
        DisplayUnit {
            uid: 1,
            rank: None,
            nesting_marker: None,
            headers: Vec::new(),
            addr_to: false,
            subject: subject.to_string(),
            tree_line: String::new(),
            link: None,
            priority: Priority::Normal,
            list: ListInformation::default(),
            mailing_list: false,
            body_html: String::new(),
            side_effects: Vec::new(),
        }
    }

    #[test]
    fn test_thread_subject_strips_one_reply_marker() {
        assert_eq!(thread_subject(&[unit("RE:  Budget")]), "Budget");
        assert_eq!(thread_subject(&[unit(""), unit("Re: Re: Budget")]), "Re: Budget");
        assert_eq!(thread_subject(&[unit("Fwd: x")]), "Fwd: x");
        assert_eq!(thread_subject(&[]), i18n::thread_view());
    }

    #[test]
    fn test_annotate_stale_uid_has_no_marker() {
        let node = |uid, depth, marker: &str| ThreadNode {
            uid,
            depth,
            marker: marker.to_string(),
        };
        let tree = ThreadTree::from_nodes(vec![node(1, 0, ""), node(2, 1, "└─")], vec![0..2]);
        let indexer = ThreadIndexer::new(&tree);

        let reply = annotate(&indexer, 2).unwrap();
        assert_eq!(reply.rank, 2);
        assert_eq!(reply.nesting_marker, "└─");
        assert!(annotate(&indexer, 42).is_none());
    }

    #[test]
    fn test_dedup_keeps_request_order() {
        assert_eq!(dedup(&[3, 1, 3, 2, 1]), vec![3, 1, 2]);
    }
}
