//! Centralized error types for mimeview.

use std::path::PathBuf;
use thiserror::Error;

use crate::model::part::PartAddress;

/// Message identifier within a mailbox.
pub type Uid = u64;

/// All errors produced by the mimeview library.
#[derive(Error, Debug)]
pub enum ViewError {
    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified mailbox file does not exist.
    #[error("Mailbox file not found: {0}")]
    FileNotFound(PathBuf),

    /// The file does not appear to be a valid MBOX.
    #[error("File does not appear to be a valid MBOX: {0}")]
    InvalidMbox(PathBuf),

    /// The renderer registry has no default renderer. Fatal at startup.
    #[error("Renderer configuration error: {0}")]
    Configuration(String),

    /// A part address was requested that the message tree does not contain.
    #[error("No part at address {0}")]
    PartNotFound(PartAddress),

    /// A dotted part address could not be parsed.
    #[error("Invalid part address: '{0}'")]
    InvalidPartAddress(String),

    /// Sibling arithmetic was attempted on the root address.
    #[error("The root part has no siblings")]
    RootHasNoSibling,

    /// A container part does not have the structure its format requires.
    #[error("Malformed message structure: {0}")]
    MalformedInput(String),

    /// Two renderers produced output for the same address.
    #[error("Part address {0} was rendered twice")]
    AddressCollision(PartAddress),

    /// The mail store could not be reached.
    #[error("Mailbox '{mailbox}' is unreachable: {reason}")]
    Unreachable { mailbox: String, reason: String },

    /// The requested message does not exist in the mailbox.
    #[error("Message {uid} not found in '{mailbox}'")]
    MessageNotFound { mailbox: String, uid: Uid },

    /// The message is not part of the mailbox's thread tree.
    #[error("Message {0} is not present in the thread tree")]
    NotInThread(Uid),
}

/// Convenience alias for `Result<T, ViewError>`.
pub type Result<T> = std::result::Result<T, ViewError>;

impl ViewError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the error is contained at the message boundary (reported as a
    /// partial failure) rather than aborting the whole assembly.
    pub fn is_per_message(&self) -> bool {
        !matches!(self, Self::Configuration(_))
    }
}
