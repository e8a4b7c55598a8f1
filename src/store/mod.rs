//! Collaborator contracts the assembler depends on, and the MBOX-backed
//! implementation shipped with the crate.

pub mod mbox;

use crate::error::{Result, Uid};
use crate::model::envelope::Envelope;
use crate::model::tree::MessageTree;
use crate::thread::ThreadTree;

/// Read access to stored messages plus the seen-flag side effect.
pub trait MailStore {
    /// Parsed part structure of a message. Part bytes may load lazily.
    fn fetch_structure(&self, mailbox: &str, uid: Uid) -> Result<MessageTree>;

    fn fetch_envelope(&self, mailbox: &str, uid: Uid) -> Result<Envelope>;

    /// Flag messages as seen. Called once per assembled set.
    fn mark_seen(&self, mailbox: &str, uids: &[Uid]) -> Result<()>;

    /// Thread tree of the whole mailbox.
    fn thread_tree_for(&self, mailbox: &str) -> Result<ThreadTree>;

    /// Mailboxes holding the user's own outgoing mail (sent, drafts) show
    /// recipients instead of the sender.
    fn is_special_outgoing(&self, _mailbox: &str) -> bool {
        false
    }
}

/// Read-only user preference lookup.
pub trait UserPreferences {
    fn value(&self, name: &str) -> Option<String>;

    /// A preference read as a boolean; unset means `false`.
    fn flag(&self, name: &str) -> bool {
        self.flag_or(name, false)
    }

    fn flag_or(&self, name: &str, unset: bool) -> bool {
        self.value(name).map_or(unset, |v| {
            matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
    }
}

impl<S: MailStore + ?Sized> MailStore for &S {
    fn fetch_structure(&self, mailbox: &str, uid: Uid) -> Result<MessageTree> {
        (**self).fetch_structure(mailbox, uid)
    }

    fn fetch_envelope(&self, mailbox: &str, uid: Uid) -> Result<Envelope> {
        (**self).fetch_envelope(mailbox, uid)
    }

    fn mark_seen(&self, mailbox: &str, uids: &[Uid]) -> Result<()> {
        (**self).mark_seen(mailbox, uids)
    }

    fn thread_tree_for(&self, mailbox: &str) -> Result<ThreadTree> {
        (**self).thread_tree_for(mailbox)
    }

    fn is_special_outgoing(&self, mailbox: &str) -> bool {
        (**self).is_special_outgoing(mailbox)
    }
}
