//! Message parsing: MBOX splitting and MIME structure.

pub mod mbox;
pub mod mime;
