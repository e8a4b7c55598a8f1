//! `mimeview`: render stored email messages for display.
//!
//! This crate resolves a message's MIME parts to display fragments through
//! a registry of per-type renderers, splits composite containers such as
//! AppleDouble attachments, and assembles whole threads or message sets
//! into one view with thread nesting markers.

pub mod assemble;
pub mod compose;
pub mod config;
pub mod display;
pub mod error;
pub mod i18n;
pub mod model;
pub mod parser;
pub mod render;
pub mod store;
pub mod thread;
