//! MBOX file as a [`MailStore`].
//!
//! The file is read into memory and split once on open. Uids are 1-based
//! positions in the file. Envelopes and thread keys are cached in an LRU;
//! part trees are parsed again on every fetch.

use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use lru::LruCache;
use tracing::{debug, info, warn};

use super::MailStore;
use crate::error::{Result, Uid, ViewError};
use crate::model::envelope::Envelope;
use crate::model::tree::MessageTree;
use crate::parser::mbox::split_messages;
use crate::parser::mime::{self, ThreadKeys};
use crate::thread::{build_thread_tree, ThreadEntry, ThreadTree};

/// Default number of parsed envelopes kept in memory.
pub const DEFAULT_CACHE_SIZE: usize = 50;

#[derive(Debug, Clone)]
struct Summary {
    envelope: Envelope,
    thread_keys: ThreadKeys,
}

/// A read-only MBOX mailbox with an in-memory seen set.
pub struct MboxMailbox {
    path: PathBuf,
    name: String,
    data: Vec<u8>,
    spans: Vec<Range<usize>>,
    cache: Mutex<LruCache<Uid, Summary>>,
    seen: Mutex<BTreeSet<Uid>>,
    outgoing: bool,
}

impl MboxMailbox {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_cache(path, DEFAULT_CACHE_SIZE)
    }

    pub fn open_with_cache(path: impl AsRef<Path>, cache_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(ViewError::FileNotFound(path));
        }
        let data = std::fs::read(&path).map_err(|e| ViewError::io(&path, e))?;

        let spans = split_messages(&data);
        if spans.is_empty() && !data.is_empty() {
            return Err(ViewError::InvalidMbox(path));
        }
        info!(path = %path.display(), messages = spans.len(), "Opened mailbox");

        let capacity = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            name: path.display().to_string(),
            path,
            data,
            spans,
            cache: Mutex::new(LruCache::new(capacity)),
            seen: Mutex::new(BTreeSet::new()),
            outgoing: false,
        })
    }

    /// Treat the mailbox as holding the user's own sent mail.
    pub fn outgoing(mut self, outgoing: bool) -> Self {
        self.outgoing = outgoing;
        self
    }

    /// Mailbox name used in requests: the path as given.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn uids(&self) -> impl Iterator<Item = Uid> {
        1..=self.spans.len() as Uid
    }

    /// Uids flagged seen during this session.
    pub fn seen(&self) -> BTreeSet<Uid> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn raw(&self, mailbox: &str, uid: Uid) -> Result<&[u8]> {
        self.check_mailbox(mailbox)?;
        let span = usize::try_from(uid)
            .ok()
            .and_then(|u| u.checked_sub(1))
            .and_then(|i| self.spans.get(i))
            .ok_or_else(|| ViewError::MessageNotFound {
                mailbox: mailbox.to_string(),
                uid,
            })?;
        Ok(&self.data[span.clone()])
    }

    fn check_mailbox(&self, mailbox: &str) -> Result<()> {
        if mailbox == self.name {
            return Ok(());
        }
        Err(ViewError::Unreachable {
            mailbox: mailbox.to_string(),
            reason: format!("this store serves '{}'", self.name),
        })
    }

    fn summary(&self, mailbox: &str, uid: Uid) -> Result<Summary> {
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(summary) = cache.get(&uid) {
                return Ok(summary.clone());
            }
        }

        let parsed = mime::parse_message(self.raw(mailbox, uid)?)?;
        let summary = Summary {
            envelope: parsed.envelope,
            thread_keys: parsed.thread_keys,
        };
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(uid, summary.clone());
        }
        Ok(summary)
    }
}

impl MailStore for MboxMailbox {
    fn fetch_structure(&self, mailbox: &str, uid: Uid) -> Result<MessageTree> {
        let raw = self.raw(mailbox, uid)?;
        debug!(uid = uid, length = raw.len(), "Parsing message structure");
        Ok(mime::parse_message(raw)?.tree)
    }

    fn fetch_envelope(&self, mailbox: &str, uid: Uid) -> Result<Envelope> {
        Ok(self.summary(mailbox, uid)?.envelope)
    }

    fn mark_seen(&self, mailbox: &str, uids: &[Uid]) -> Result<()> {
        self.check_mailbox(mailbox)?;
        let mut seen = self.seen.lock().map_err(|_| ViewError::Unreachable {
            mailbox: mailbox.to_string(),
            reason: "seen set lock poisoned".into(),
        })?;
        seen.extend(uids.iter().copied());
        debug!(mailbox = mailbox, count = uids.len(), "Flagged messages as seen");
        Ok(())
    }

    fn thread_tree_for(&self, mailbox: &str) -> Result<ThreadTree> {
        self.check_mailbox(mailbox)?;
        let mut entries = Vec::with_capacity(self.spans.len());
        for uid in self.uids() {
            match self.summary(mailbox, uid) {
                Ok(summary) => entries.push(ThreadEntry {
                    uid,
                    message_id: summary.thread_keys.message_id,
                    in_reply_to: summary.thread_keys.in_reply_to,
                    references: summary.thread_keys.references,
                    subject: summary.envelope.subject,
                    date: summary.envelope.date.unwrap_or_else(DateTime::<Utc>::default),
                }),
                Err(err) => warn!(uid = uid, error = %err, "Message left out of thread tree"),
            }
        }
        Ok(build_thread_tree(&entries))
    }

    fn is_special_outgoing(&self, _mailbox: &str) -> bool {
        self.outgoing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MBOX: &str = "From a@example.com Mon Jan  1 00:00:00 2024
Message-ID: <one@example.com>
From: Ann <a@example.com>
Subject: Lunch
Date: Mon, 1 Jan 2024 10:00:00 +0000

Shall we?

From b@example.com Mon Jan  1 00:00:00 2024
Message-ID: <two@example.com>
In-Reply-To: <one@example.com>
From: Bob <b@example.com>
Subject: Re: Lunch
Date: Mon, 1 Jan 2024 11:00:00 +0000

Sure.
";

    fn mailbox() -> (tempfile::NamedTempFile, MboxMailbox) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MBOX.as_bytes()).unwrap();
        let mbox = MboxMailbox::open(file.path()).unwrap();
        (file, mbox)
    }

    #[test]
    fn test_fetch_by_uid() {
        let (_file, mbox) = mailbox();
        assert_eq!(mbox.len(), 2);
        let env = mbox.fetch_envelope(mbox.name(), 2).unwrap();
        assert_eq!(env.subject, "Re: Lunch");
        let tree = mbox.fetch_structure(mbox.name(), 1).unwrap();
        assert!(!tree.is_empty());
    }

    #[test]
    fn test_unknown_uid_and_mailbox() {
        let (_file, mbox) = mailbox();
        assert!(matches!(
            mbox.fetch_envelope(mbox.name(), 0),
            Err(ViewError::MessageNotFound { uid: 0, .. })
        ));
        assert!(matches!(
            mbox.fetch_envelope(mbox.name(), 3),
            Err(ViewError::MessageNotFound { uid: 3, .. })
        ));
        assert!(matches!(
            mbox.fetch_envelope("Other", 1),
            Err(ViewError::Unreachable { .. })
        ));
    }

    #[test]
    fn test_thread_tree() {
        let (_file, mbox) = mailbox();
        let tree = mbox.thread_tree_for(mbox.name()).unwrap();
        assert_eq!(tree.thread_of(2), Some(vec![1, 2]));
        assert_eq!(tree.node(2).map(|n| n.depth), Some(1));
    }

    #[test]
    fn test_mark_seen() {
        let (_file, mbox) = mailbox();
        mbox.mark_seen(mbox.name(), &[2, 1]).unwrap();
        assert_eq!(mbox.seen().into_iter().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_open_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            MboxMailbox::open(dir.path().join("missing.mbox")),
            Err(ViewError::FileNotFound(_))
        ));

        let bogus = dir.path().join("bogus.mbox");
        std::fs::write(&bogus, "just some text\n").unwrap();
        assert!(matches!(
            MboxMailbox::open(&bogus),
            Err(ViewError::InvalidMbox(_))
        ));
    }
}
